#![recursion_limit = "256"]

mod ctx;
mod reconciler;

use cronjob_trigger_core::signal::TerminationSignal;
use cronjob_trigger_core_k8s::manager::Ctx;
use tokio::join;

pub(crate) mod consts {
    use cronjob_trigger_core::env::{infer_list, infer_string};
    use cronjob_trigger_core_k8s::domain::{get_cluster_domain, DEFAULT_CLUSTER_DOMAIN};
    use cronjob_trigger_provider::job::RuntimeConfig;
    use tracing::warn;

    pub const NAME: &str = "cronjob-trigger-operator";

    const ENV_CLUSTER_DOMAIN: &str = "CLUSTER_DOMAIN";
    const ENV_IMAGE_PULL_SECRETS: &str = "IMAGE_PULL_SECRETS";
    const ENV_RUNTIME_IMAGE: &str = "RUNTIME_IMAGE";

    pub fn infer_runtime_image() -> String {
        infer_string(ENV_RUNTIME_IMAGE).unwrap_or_else(|_| "kubeless/unzip:latest".into())
    }

    pub async fn infer_cluster_domain() -> String {
        match infer_string(ENV_CLUSTER_DOMAIN) {
            Ok(domain) => domain,
            Err(_) => get_cluster_domain().await.unwrap_or_else(|error| {
                warn!("failed to discover the cluster domain: {error}");
                DEFAULT_CLUSTER_DOMAIN.into()
            }),
        }
    }

    pub async fn infer_runtime_config() -> RuntimeConfig {
        RuntimeConfig {
            image: infer_runtime_image(),
            image_pull_secrets: infer_list(ENV_IMAGE_PULL_SECRETS),
            cluster_domain: infer_cluster_domain().await,
        }
    }
}

#[tokio::main]
async fn main() {
    let signal = TerminationSignal::default();
    signal
        .trap_on_sigint()
        .expect("installing a termination signal handler");

    join!(
        self::ctx::cronjob_trigger::Ctx::spawn_crd(signal.clone()),
        self::ctx::function::Ctx::spawn(signal),
    );
}
