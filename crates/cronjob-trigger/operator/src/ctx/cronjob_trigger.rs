use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result};
use async_trait::async_trait;
use cronjob_trigger_api::cronjob_trigger::CronJobTriggerCrd;
use cronjob_trigger_core_k8s::{
    informer::ResourceEvent,
    manager::{Manager, TryDefault},
};
use cronjob_trigger_provider::{client::KubernetesClient, job::RuntimeConfig};
use kube::ResourceExt;
use tracing::{instrument, Level};

pub struct Ctx {
    runtime: RuntimeConfig,
}

#[async_trait]
impl TryDefault for Ctx {
    async fn try_default() -> Result<Self> {
        Ok(Self {
            runtime: crate::consts::infer_runtime_config().await,
        })
    }
}

#[async_trait]
impl ::cronjob_trigger_core_k8s::manager::Ctx for Ctx {
    type Data = CronJobTriggerCrd;

    const NAME: &'static str = crate::consts::NAME;
    const FALLBACK: Duration = Duration::from_secs(30); // 30 seconds

    #[instrument(
        level = Level::INFO,
        skip_all,
        fields(name = %event.latest().name_any(), namespace = event.latest().namespace()),
        err(Display),
    )]
    async fn handle(
        manager: Arc<Manager<Self>>,
        event: ResourceEvent<<Self as ::cronjob_trigger_core_k8s::manager::Ctx>::Data>,
    ) -> Result<()>
    where
        Self: Sized,
    {
        let client = KubernetesClient {
            kube: manager.kube.clone(),
            field_manager: <Self as ::cronjob_trigger_core_k8s::manager::Ctx>::NAME.into(),
        };

        crate::reconciler::cronjob_trigger::handle(&client, &manager.ctx.runtime, event)
            .await
            .map_err(Into::into)
    }

    fn error_policy(_manager: Arc<Manager<Self>>, error: &Error) -> Option<Duration>
    where
        Self: Sized,
    {
        if super::is_permanent(error) {
            None
        } else {
            Some(<Self as ::cronjob_trigger_core_k8s::manager::Ctx>::FALLBACK)
        }
    }
}
