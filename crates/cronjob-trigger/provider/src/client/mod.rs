mod kubernetes;
#[cfg(any(test, feature = "memory"))]
mod memory;

use async_trait::async_trait;
use cronjob_trigger_api::{cronjob_trigger::CronJobTriggerCrd, function::FunctionCrd};
use k8s_openapi::api::batch::v1::CronJob;

pub use self::kubernetes::KubernetesClient;
#[cfg(any(test, feature = "memory"))]
pub use self::memory::MemoryClient;
use crate::Result;

/// Namespaced object access, the only way the controller touches cluster
/// state.
#[async_trait]
pub trait ObjectClient<K>
where
    Self: Send + Sync,
    K: Send + Sync,
{
    /// Returns `None` when no such object exists.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    async fn list(&self, namespace: &str) -> Result<Vec<K>>;

    async fn create(&self, namespace: &str, data: &K) -> Result<K>;

    /// Replaces the stored object. A resource version on `data` makes the
    /// call fail with a conflict when the stored object has moved on.
    async fn replace(&self, namespace: &str, name: &str, data: &K) -> Result<K>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, namespace: &str, name: &str) -> Result<bool>;
}

/// Everything the reconcilers need to read and write.
pub trait TriggerClient
where
    Self: ObjectClient<FunctionCrd> + ObjectClient<CronJobTriggerCrd> + ObjectClient<CronJob>,
{
}

impl<T> TriggerClient for T where
    T: ObjectClient<FunctionCrd> + ObjectClient<CronJobTriggerCrd> + ObjectClient<CronJob>
{
}
