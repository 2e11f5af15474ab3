use cronjob_trigger_api::{cronjob_trigger::CronJobTriggerCrd, function::FunctionCrd};
use cronjob_trigger_core_k8s::informer::ResourceEvent;
use cronjob_trigger_provider::{
    client::{ObjectClient, TriggerClient},
    finalizer::remove_finalizer,
    job::{CronJobSynchronizer, RuntimeConfig},
    Result,
};
use kube::ResourceExt;
use tracing::{debug, info, instrument, Level};

#[derive(Clone, Debug, PartialEq)]
pub enum FunctionAction {
    Skip,
    Sync(FunctionCrd),
    Cleanup(FunctionCrd),
}

pub fn plan(event: ResourceEvent<FunctionCrd>) -> FunctionAction {
    match event {
        ResourceEvent::Added(data) => FunctionAction::Sync(data),
        // a periodic relist
        ResourceEvent::Updated { old, new }
            if old.metadata.resource_version == new.metadata.resource_version =>
        {
            FunctionAction::Skip
        }
        ResourceEvent::Updated { new, .. } => FunctionAction::Sync(new),
        ResourceEvent::Deleted(data) => FunctionAction::Cleanup(data),
    }
}

pub async fn handle<C>(
    client: &C,
    runtime: &RuntimeConfig,
    event: ResourceEvent<FunctionCrd>,
) -> Result<()>
where
    C: TriggerClient,
{
    match plan(event) {
        FunctionAction::Skip => Ok(()),
        FunctionAction::Sync(data) => on_function_event(client, runtime, &data, false).await,
        FunctionAction::Cleanup(data) => on_function_event(client, runtime, &data, true).await,
    }
}

/// Brings the scheduled job of a function in line with its triggers, or
/// tears both down once the function is gone.
#[instrument(
    level = Level::INFO,
    skip(client, runtime, function),
    fields(name = %function.name_any(), namespace = function.namespace()),
    err(Display),
)]
pub async fn on_function_event<C>(
    client: &C,
    runtime: &RuntimeConfig,
    function: &FunctionCrd,
    is_deleted: bool,
) -> Result<()>
where
    C: TriggerClient,
{
    let namespace = function.namespace().unwrap_or_default();
    let name = function.name_any();

    let triggers: Vec<_> = ObjectClient::<CronJobTriggerCrd>::list(client, &namespace)
        .await?
        .into_iter()
        .filter(|trigger| trigger.spec.function_name == name)
        .collect();

    let synchronizer = CronJobSynchronizer { client, runtime };
    if is_deleted {
        synchronizer.delete(&namespace, &name).await?;
        for trigger in &triggers {
            delete_trigger(client, &namespace, &trigger.name_any()).await?;
        }
        return Ok(());
    }

    if triggers.is_empty() {
        debug!("no triggers for function: {namespace}/{name}");
        return Ok(());
    }

    // the event may be a redelivery; write only what is stored now
    let function = match ObjectClient::<FunctionCrd>::get(client, &namespace, &name).await? {
        Some(function) if function.metadata.deletion_timestamp.is_none() => function,
        _ => {
            debug!("function is gone: {namespace}/{name}");
            return Ok(());
        }
    };

    let owner_references = super::owner_references(&function);
    for trigger in triggers.iter().filter(|trigger| !trigger.is_deleting()) {
        synchronizer
            .ensure(&function, trigger, owner_references.clone())
            .await?;
    }
    Ok(())
}

async fn delete_trigger<C>(client: &C, namespace: &str, name: &str) -> Result<()>
where
    C: TriggerClient,
{
    ObjectClient::<CronJobTriggerCrd>::delete(client, namespace, name).await?;

    // nothing is left for our own finalizer to clean up
    match ObjectClient::<CronJobTriggerCrd>::get(client, namespace, name).await? {
        Some(trigger) if trigger.has_finalizer() => match remove_finalizer(client, &trigger).await
        {
            Ok(_) => (),
            Err(error) if error.is_not_found() => (),
            Err(error) => return Err(error),
        },
        Some(_) | None => (),
    }

    info!("deleted trigger: {namespace}/{name}");
    Ok(())
}
