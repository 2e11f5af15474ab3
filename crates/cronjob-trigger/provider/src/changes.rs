use cronjob_trigger_api::cronjob_trigger::CronJobTriggerCrd;

/// Tells whether moving from `old` to `new` needs a reconcile.
///
/// Any persisted mutation bumps the resource version, so other spec fields
/// (the payload included) are covered by that comparison.
pub fn has_changed(old: &CronJobTriggerCrd, new: &CronJobTriggerCrd) -> bool {
    old.metadata.deletion_timestamp != new.metadata.deletion_timestamp
        || old.metadata.resource_version != new.metadata.resource_version
        || old.spec.schedule != new.spec.schedule
}

#[cfg(test)]
mod tests {
    use k8s_openapi::{
        apimachinery::pkg::apis::meta::v1::Time,
        chrono::{TimeZone, Utc},
    };
    use kube::api::ObjectMeta;
    use maplit::btreemap;

    use super::*;

    fn trigger(metadata: ObjectMeta, schedule: &str) -> CronJobTriggerCrd {
        let mut trigger = CronJobTriggerCrd::default();
        trigger.metadata = metadata;
        trigger.spec.schedule = schedule.into();
        trigger
    }

    fn meta(resource_version: Option<&str>, deletion: Option<i64>) -> ObjectMeta {
        ObjectMeta {
            name: Some("foo".into()),
            resource_version: resource_version.map(Into::into),
            deletion_timestamp: deletion
                .map(|secs| Time(Utc.timestamp_opt(secs, 0).unwrap())),
            ..Default::default()
        }
    }

    #[test]
    fn same_object_is_unchanged() {
        let old = trigger(meta(Some("1"), None), "* * * * *");
        assert!(!has_changed(&old, &old.clone()));
    }

    #[test]
    fn detect_deletion() {
        let old = trigger(meta(Some("1"), None), "* * * * *");
        let new = trigger(meta(Some("1"), Some(1_700_000_000)), "* * * * *");
        assert!(has_changed(&old, &new));

        let old = trigger(meta(None, Some(1_700_000_000)), "");
        let new = trigger(meta(None, Some(1_700_000_001)), "");
        assert!(has_changed(&old, &new));
    }

    #[test]
    fn detect_resource_version() {
        let old = trigger(meta(Some("1"), None), "");
        let new = trigger(meta(Some("2"), None), "");
        assert!(has_changed(&old, &new));
    }

    #[test]
    fn detect_schedule() {
        let old = trigger(meta(None, None), "*/10 * * * *");
        let new = trigger(meta(None, None), "* * * * *");
        assert!(has_changed(&old, &new));

        let old = trigger(meta(None, None), "* * * * *");
        let new = trigger(meta(None, None), "* * * * *");
        assert!(!has_changed(&old, &new));
    }

    #[test]
    fn ignore_incidental_fields() {
        let old = trigger(meta(Some("7"), None), "* * * * *");
        let mut new = old.clone();
        new.metadata.labels = Some(btreemap! { "team".into() => "a".into() });
        new.spec.payload = btreemap! { "test".into() => "foo".into() };
        assert!(!has_changed(&old, &new));
    }
}
