use anyhow::Result;
use tracing::{instrument, Level};

pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

#[cfg(unix)]
#[instrument(level = Level::INFO, skip_all, err(Display))]
pub async fn get_cluster_domain() -> Result<String> {
    use tokio::{fs::File, io::AsyncReadExt};

    // Read the file
    let mut buf = Default::default();
    let mut f = File::open("/etc/resolv.conf").await?;
    f.read_to_end(&mut buf).await?;

    parse_cluster_domain(&buf)
}

#[cfg(not(unix))]
#[instrument(level = Level::INFO, skip_all, err(Display))]
pub async fn get_cluster_domain() -> Result<String> {
    Ok(DEFAULT_CLUSTER_DOMAIN.into())
}

/// Picks the cluster domain out of a pod's resolver config.
///
/// Pods search `<ns>.svc.<domain>`, `svc.<domain>` and `<domain>`, so the
/// domain is whatever follows the shortest `svc.` entry.
pub fn parse_cluster_domain(buf: &[u8]) -> Result<String> {
    let cfg = ::resolv_conf::Config::parse(buf)?;
    Ok(cfg
        .get_search()
        .and_then(|list| {
            list.iter()
                .filter_map(|search| search.strip_prefix("svc."))
                .min_by_key(|domain| domain.len())
        })
        .unwrap_or(DEFAULT_CLUSTER_DOMAIN)
        .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_from_pod_search_list() {
        let conf = b"search myns.svc.k8s.example svc.k8s.example k8s.example\nnameserver 10.96.0.10\noptions ndots:5\n";
        assert_eq!(parse_cluster_domain(conf).unwrap(), "k8s.example");
    }

    #[test]
    fn fallback_outside_cluster() {
        let conf = b"search lan\nnameserver 192.168.0.1\n";
        assert_eq!(parse_cluster_domain(conf).unwrap(), DEFAULT_CLUSTER_DOMAIN);
    }
}
