pub(crate) mod cronjob_trigger;
pub(crate) mod function;

use cronjob_trigger_api::function::FunctionCrd;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;

/// Scheduled jobs are garbage collected together with their function.
fn owner_references(function: &FunctionCrd) -> Vec<OwnerReference> {
    function.controller_owner_ref(&()).into_iter().collect()
}
