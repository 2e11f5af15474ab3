use anyhow::{anyhow, Result};

pub fn infer<K, R>(key: K) -> Result<R>
where
    K: AsRef<str>,
    R: ::core::str::FromStr,
    <R as ::core::str::FromStr>::Err: 'static + Send + Sync + ::core::fmt::Display,
{
    let key = key.as_ref();

    infer_string(key).and_then(|e| {
        e.parse()
            .map_err(|error| anyhow!("failed to parse the environment variable ({key}): {error}"))
    })
}

pub fn infer_string<K>(key: K) -> Result<String>
where
    K: AsRef<str>,
{
    let key = key.as_ref();

    ::std::env::var(key).map_err(|_| anyhow!("failed to find the environment variable: {key}"))
}

/// Splits a comma-separated environment variable, skipping blank items.
///
/// A missing variable yields an empty list.
pub fn infer_list<K>(key: K) -> Vec<String>
where
    K: AsRef<str>,
{
    infer_string(key)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(Into::into)
                .collect()
        })
        .unwrap_or_default()
}
