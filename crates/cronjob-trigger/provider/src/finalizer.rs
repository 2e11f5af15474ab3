use cronjob_trigger_api::cronjob_trigger::CronJobTriggerCrd;
use kube::ResourceExt;
use tracing::{info, instrument, Level};

use crate::{client::ObjectClient, Result};

/// Registers the cleanup hook on a trigger, unless it is already there.
#[instrument(level = Level::INFO, skip_all, fields(name = %trigger.name_any()), err(Display))]
pub async fn add_finalizer<C>(client: &C, trigger: &CronJobTriggerCrd) -> Result<CronJobTriggerCrd>
where
    C: ObjectClient<CronJobTriggerCrd>,
{
    if trigger.has_finalizer() {
        return Ok(trigger.clone());
    }

    let mut data = trigger.clone();
    data.finalizers_mut()
        .push(CronJobTriggerCrd::FINALIZER_NAME.into());
    replace(client, &data).await.map(|data| {
        info!("added finalizer");
        data
    })
}

/// Releases a trigger, letting the API server complete its deletion.
#[instrument(level = Level::INFO, skip_all, fields(name = %trigger.name_any()), err(Display))]
pub async fn remove_finalizer<C>(
    client: &C,
    trigger: &CronJobTriggerCrd,
) -> Result<CronJobTriggerCrd>
where
    C: ObjectClient<CronJobTriggerCrd>,
{
    if !trigger.has_finalizer() {
        return Ok(trigger.clone());
    }

    let mut data = trigger.clone();
    data.finalizers_mut()
        .retain(|finalizer| finalizer != CronJobTriggerCrd::FINALIZER_NAME);
    replace(client, &data).await.map(|data| {
        info!("removed finalizer");
        data
    })
}

async fn replace<C>(client: &C, data: &CronJobTriggerCrd) -> Result<CronJobTriggerCrd>
where
    C: ObjectClient<CronJobTriggerCrd>,
{
    let namespace = data.namespace().unwrap_or_default();
    let name = data.name_any();
    client.replace(&namespace, &name, data).await
}
