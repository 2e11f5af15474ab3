use std::collections::BTreeMap;

/// Unions two mappings; on shared keys the value from `overlay` wins.
pub fn merge<K, V>(base: &BTreeMap<K, V>, overlay: &BTreeMap<K, V>) -> BTreeMap<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    base.iter()
        .chain(overlay)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Merges optional metadata mappings the way object metadata stores them.
pub fn merge_opt(
    base: Option<&BTreeMap<String, String>>,
    overlay: Option<&BTreeMap<String, String>>,
) -> BTreeMap<String, String> {
    let empty = BTreeMap::default();
    merge(base.unwrap_or(&empty), overlay.unwrap_or(&empty))
}
