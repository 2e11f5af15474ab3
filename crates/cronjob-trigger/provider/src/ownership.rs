use std::collections::BTreeMap;

use kube::api::ObjectMeta;

/// Marks the objects this controller creates, so it never adopts or
/// overwrites an object that merely shares a name.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OwnershipMarker {
    pub key: &'static str,
    pub value: &'static str,
    pub version: &'static str,
}

impl OwnershipMarker {
    pub const CURRENT: Self = Self {
        key: "created-by",
        value: "kubeless",
        version: "v1",
    };

    pub const ANNOTATION_VERSION: &'static str = "cronjob-trigger.kubeless.io/ownership-version";

    /// Stamps the marker over already merged metadata.
    ///
    /// Applied last, so a user label with the same key never survives.
    pub fn apply(
        &self,
        labels: &mut BTreeMap<String, String>,
        annotations: &mut BTreeMap<String, String>,
    ) {
        labels.insert(self.key.into(), self.value.into());
        annotations.insert(Self::ANNOTATION_VERSION.into(), self.version.into());
    }

    pub fn is_marked(&self, metadata: &ObjectMeta) -> bool {
        metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(self.key))
            .map(|value| value == self.value)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use maplit::btreemap;

    use super::*;

    #[test]
    fn override_user_label() {
        let mut labels = btreemap! { "created-by".into() => "someone".into() };
        let mut annotations = BTreeMap::default();

        OwnershipMarker::CURRENT.apply(&mut labels, &mut annotations);
        assert_eq!(labels["created-by"], "kubeless");
        assert_eq!(annotations[OwnershipMarker::ANNOTATION_VERSION], "v1");
    }

    #[test]
    fn recognize_marked_objects() {
        let marker = OwnershipMarker::CURRENT;

        let unmarked = ObjectMeta::default();
        assert!(!marker.is_marked(&unmarked));

        let foreign = ObjectMeta {
            labels: Some(btreemap! { "created-by".into() => "helm".into() }),
            ..Default::default()
        };
        assert!(!marker.is_marked(&foreign));

        // objects written before the version annotation existed
        let legacy = ObjectMeta {
            labels: Some(btreemap! { "created-by".into() => "kubeless".into() }),
            ..Default::default()
        };
        assert!(marker.is_marked(&legacy));
    }
}
