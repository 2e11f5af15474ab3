use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The subset of a kubeless `Function` this controller reads.
///
/// The resource itself is owned by the function controller; fields not
/// listed here are ignored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema, CustomResource)]
#[kube(
    group = "kubeless.io",
    version = "v1beta1",
    kind = "Function",
    root = "FunctionCrd",
    derive = "Default",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    /// Invocation timeout in seconds, encoded as a string.
    #[serde(default)]
    pub timeout: String,
}

impl FunctionCrd {
    /// Name of the scheduled job derived from this function.
    pub fn trigger_job_name(&self) -> String {
        trigger_job_name(&::kube::ResourceExt::name_any(self))
    }
}

pub fn trigger_job_name(function_name: &str) -> String {
    format!("trigger-{function_name}")
}
