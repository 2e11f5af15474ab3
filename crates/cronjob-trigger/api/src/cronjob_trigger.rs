use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema, CustomResource)]
#[kube(
    group = "kubeless.io",
    version = "v1beta1",
    kind = "CronJobTrigger",
    root = "CronJobTriggerCrd",
    derive = "Default",
    derive = "PartialEq",
    namespaced,
    printcolumn = r#"{
        "name": "function",
        "type": "string",
        "description": "name of the function to invoke",
        "jsonPath": ".spec.functionName"
    }"#,
    printcolumn = r#"{
        "name": "schedule",
        "type": "string",
        "description": "cron schedule of the invocations",
        "jsonPath": ".spec.schedule"
    }"#,
    printcolumn = r#"{
        "name": "created-at",
        "type": "date",
        "description": "created time",
        "jsonPath": ".metadata.creationTimestamp"
    }"#
)]
#[serde(rename_all = "camelCase")]
pub struct CronJobTriggerSpec {
    pub function_name: String,
    pub schedule: String,
    /// Sent as the JSON body of every invocation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payload: BTreeMap<String, String>,
}

impl CronJobTriggerCrd {
    pub const FINALIZER_NAME: &'static str = "kubeless.io/cronjobtrigger";

    pub fn has_finalizer(&self) -> bool {
        ::kube::ResourceExt::finalizers(self)
            .iter()
            .any(|finalizer| finalizer == Self::FINALIZER_NAME)
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}
