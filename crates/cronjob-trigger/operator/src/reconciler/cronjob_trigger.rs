use cronjob_trigger_api::{cronjob_trigger::CronJobTriggerCrd, function::FunctionCrd};
use cronjob_trigger_core_k8s::informer::ResourceEvent;
use cronjob_trigger_provider::{
    changes::has_changed,
    client::{ObjectClient, TriggerClient},
    finalizer::{add_finalizer, remove_finalizer},
    job::{CronJobSynchronizer, RuntimeConfig},
    Error, Result,
};
use kube::ResourceExt;
use tracing::{debug, info, instrument, Level};

#[derive(Clone, Debug, PartialEq)]
pub enum TriggerAction {
    Skip,
    AddFinalizer(CronJobTriggerCrd),
    Sync(CronJobTriggerCrd),
    /// The trigger now names another function; the old one's job goes first.
    Retarget {
        old: CronJobTriggerCrd,
        new: CronJobTriggerCrd,
    },
    /// Deletion was requested; clean up, then release the trigger.
    Finalize(CronJobTriggerCrd),
    /// The trigger is already gone.
    Cleanup(CronJobTriggerCrd),
}

pub fn plan(event: ResourceEvent<CronJobTriggerCrd>) -> TriggerAction {
    let data = match event {
        ResourceEvent::Added(data) => data,
        ResourceEvent::Updated { old, new } if has_changed(&old, &new) => {
            if old.has_finalizer() && old.spec.function_name != new.spec.function_name {
                return TriggerAction::Retarget { old, new };
            }
            new
        }
        ResourceEvent::Updated { .. } => return TriggerAction::Skip,
        ResourceEvent::Deleted(data) => return TriggerAction::Cleanup(data),
    };

    if data.is_deleting() {
        if data.has_finalizer() {
            TriggerAction::Finalize(data)
        } else {
            TriggerAction::Skip
        }
    } else if !data.has_finalizer() {
        TriggerAction::AddFinalizer(data)
    } else {
        TriggerAction::Sync(data)
    }
}

pub async fn handle<C>(
    client: &C,
    runtime: &RuntimeConfig,
    event: ResourceEvent<CronJobTriggerCrd>,
) -> Result<()>
where
    C: TriggerClient,
{
    on_trigger_event(client, runtime, plan(event)).await
}

#[instrument(level = Level::INFO, skip_all, err(Display))]
pub async fn on_trigger_event<C>(
    client: &C,
    runtime: &RuntimeConfig,
    action: TriggerAction,
) -> Result<()>
where
    C: TriggerClient,
{
    let data = match action {
        TriggerAction::Skip => return Ok(()),
        TriggerAction::Cleanup(data) => return release_job(client, runtime, &data).await,
        TriggerAction::Retarget { old, new } => {
            info!(
                "trigger {} moved from function {} to {}",
                new.name_any(),
                old.spec.function_name,
                new.spec.function_name,
            );
            release_job(client, runtime, &old).await?;
            new
        }
        TriggerAction::AddFinalizer(data)
        | TriggerAction::Sync(data)
        | TriggerAction::Finalize(data) => data,
    };

    // the event may be a redelivery; act on what is stored now
    let namespace = data.namespace().unwrap_or_default();
    let name = data.name_any();
    let data = match ObjectClient::<CronJobTriggerCrd>::get(client, &namespace, &name).await? {
        Some(data) => data,
        None => {
            debug!("trigger is gone: {namespace}/{name}");
            return Ok(());
        }
    };

    if data.is_deleting() {
        if data.has_finalizer() {
            release_job(client, runtime, &data).await?;
            match remove_finalizer(client, &data).await {
                Ok(_) => (),
                Err(error) if error.is_not_found() => (),
                Err(error) => return Err(error),
            }
        }
        Ok(())
    } else if !data.has_finalizer() {
        // the resulting update event syncs the job
        add_finalizer(client, &data).await.map(|_| ())
    } else {
        sync_job(client, runtime, &data).await
    }
}

#[instrument(
    level = Level::INFO,
    skip_all,
    fields(name = %trigger.name_any(), function = %trigger.spec.function_name),
    err(Display),
)]
async fn sync_job<C>(client: &C, runtime: &RuntimeConfig, trigger: &CronJobTriggerCrd) -> Result<()>
where
    C: TriggerClient,
{
    let namespace = trigger.namespace().unwrap_or_default();
    let function_name = &trigger.spec.function_name;

    let function = match ObjectClient::<FunctionCrd>::get(client, &namespace, function_name).await? {
        Some(function) if function.metadata.deletion_timestamp.is_none() => function,
        _ => {
            return Err(Error::FunctionNotFound {
                namespace,
                name: function_name.clone(),
            })
        }
    };

    let synchronizer = CronJobSynchronizer { client, runtime };
    synchronizer
        .ensure(&function, trigger, super::owner_references(&function))
        .await
        .map(|_| ())
}

/// Drops the scheduled job of a trigger's function, unless another trigger
/// still schedules it; that one takes the job over instead.
async fn release_job<C>(client: &C, runtime: &RuntimeConfig, trigger: &CronJobTriggerCrd) -> Result<()>
where
    C: TriggerClient,
{
    let namespace = trigger.namespace().unwrap_or_default();
    let name = trigger.name_any();
    let function_name = &trigger.spec.function_name;

    let successor = ObjectClient::<CronJobTriggerCrd>::list(client, &namespace)
        .await?
        .into_iter()
        .find(|other| {
            other.name_any() != name
                && other.spec.function_name == *function_name
                && other.has_finalizer()
                && !other.is_deleting()
        });

    match successor {
        Some(successor) => {
            info!(
                "handing over the scheduled job of {namespace}/{function_name} to {}",
                successor.name_any(),
            );
            match sync_job(client, runtime, &successor).await {
                Err(Error::FunctionNotFound { .. }) => Ok(()),
                result => result,
            }
        }
        None => {
            let synchronizer = CronJobSynchronizer { client, runtime };
            synchronizer
                .delete(&namespace, function_name)
                .await
                .map(|_| ())
        }
    }
}

#[cfg(test)]
mod tests {
    use cronjob_trigger_provider::client::MemoryClient;
    use k8s_openapi::{
        api::batch::v1::CronJob, apimachinery::pkg::apis::meta::v1::Time, chrono::Utc,
    };
    use maplit::btreemap;

    use super::*;
    use crate::reconciler::fixtures::{
        finalized, function, get_job, list_triggers, runtime, trigger, NAMESPACE,
    };

    fn schedule(job: &CronJob) -> &str {
        &job.spec.as_ref().unwrap().schedule
    }

    #[tokio::test]
    async fn follow_trigger_lifecycle() {
        let client = MemoryClient::default();
        let runtime = runtime();
        client
            .create(NAMESPACE, &function("func1", "120"))
            .await
            .unwrap();
        let created = client
            .create(NAMESPACE, &trigger("func1-trigger", "func1", "* * * * *"))
            .await
            .unwrap();

        // first sight: register the finalizer, nothing scheduled yet
        handle(&client, &runtime, ResourceEvent::Added(created.clone()))
            .await
            .unwrap();
        assert!(get_job(&client, "func1").await.is_none());

        let stored: CronJobTriggerCrd = client
            .get(NAMESPACE, "func1-trigger")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.has_finalizer());

        handle(
            &client,
            &runtime,
            ResourceEvent::Updated {
                old: created,
                new: stored.clone(),
            },
        )
        .await
        .unwrap();
        let job = get_job(&client, "func1").await.unwrap();
        assert_eq!(schedule(&job), "* * * * *");

        // reschedule with a payload
        let mut rescheduled = stored.clone();
        rescheduled.spec.schedule = "*/10 * * * *".into();
        rescheduled.spec.payload = btreemap! { "test".into() => "foo".into() };
        let rescheduled = client
            .replace(NAMESPACE, "func1-trigger", &rescheduled)
            .await
            .unwrap();

        handle(
            &client,
            &runtime,
            ResourceEvent::Updated {
                old: stored,
                new: rescheduled.clone(),
            },
        )
        .await
        .unwrap();
        let updated = get_job(&client, "func1").await.unwrap();
        assert_eq!(schedule(&updated), "*/10 * * * *");
        assert_eq!(updated.metadata.uid, job.metadata.uid);

        let args = updated
            .spec
            .as_ref()
            .and_then(|spec| spec.job_template.spec.as_ref())
            .and_then(|spec| spec.template.spec.as_ref())
            .and_then(|spec| spec.containers[0].args.clone())
            .unwrap();
        assert!(args[0].ends_with(r#"-d '{"test":"foo"}'"#), "{}", args[0]);

        // deletion is held back until the job is gone
        assert!(
            ObjectClient::<CronJobTriggerCrd>::delete(&client, NAMESPACE, "func1-trigger")
                .await
                .unwrap()
        );
        let deleting: CronJobTriggerCrd = client
            .get(NAMESPACE, "func1-trigger")
            .await
            .unwrap()
            .unwrap();

        handle(
            &client,
            &runtime,
            ResourceEvent::Updated {
                old: rescheduled,
                new: deleting,
            },
        )
        .await
        .unwrap();
        assert!(get_job(&client, "func1").await.is_none());
        assert!(list_triggers(&client).await.is_empty());
    }

    #[tokio::test]
    async fn report_missing_function() {
        let client = MemoryClient::default();
        let data = client
            .create(NAMESPACE, &finalized(trigger("func1-trigger", "func1", "* * * * *")))
            .await
            .unwrap();

        let error = handle(&client, &runtime(), ResourceEvent::Added(data))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::FunctionNotFound { .. }), "{error}");
        assert!(get_job(&client, "func1").await.is_none());
    }

    #[tokio::test]
    async fn report_foreign_job() {
        let client = MemoryClient::default();
        client
            .create(NAMESPACE, &function("func1", "120"))
            .await
            .unwrap();
        let data = client
            .create(NAMESPACE, &finalized(trigger("func1-trigger", "func1", "* * * * *")))
            .await
            .unwrap();

        let mut foreign = CronJob::default();
        foreign.metadata.name = Some("trigger-func1".into());
        let foreign = client.create(NAMESPACE, &foreign).await.unwrap();

        let error = handle(&client, &runtime(), ResourceEvent::Added(data))
            .await
            .unwrap_err();
        assert!(error.is_conflict(), "{error}");
        assert_eq!(get_job(&client, "func1").await, Some(foreign));
    }

    #[tokio::test]
    async fn hand_over_shared_job() {
        let client = MemoryClient::default();
        let runtime = runtime();
        client
            .create(NAMESPACE, &function("func1", "120"))
            .await
            .unwrap();
        let hourly = client
            .create(NAMESPACE, &finalized(trigger("hourly", "func1", "@hourly")))
            .await
            .unwrap();
        client
            .create(NAMESPACE, &finalized(trigger("daily", "func1", "@daily")))
            .await
            .unwrap();

        handle(&client, &runtime, ResourceEvent::Added(hourly.clone()))
            .await
            .unwrap();
        assert_eq!(schedule(&get_job(&client, "func1").await.unwrap()), "@hourly");

        // removed without passing through the finalizer
        assert!(
            ObjectClient::<CronJobTriggerCrd>::delete(&client, NAMESPACE, "hourly")
                .await
                .unwrap()
        );
        let hourly: CronJobTriggerCrd = client.get(NAMESPACE, "hourly").await.unwrap().unwrap();
        let mut released = hourly.clone();
        released.metadata.finalizers = None;
        client.replace(NAMESPACE, "hourly", &released).await.unwrap();

        handle(&client, &runtime, ResourceEvent::Deleted(hourly))
            .await
            .unwrap();
        assert_eq!(schedule(&get_job(&client, "func1").await.unwrap()), "@daily");
    }

    #[tokio::test]
    async fn move_job_with_retargeted_trigger() {
        let client = MemoryClient::default();
        let runtime = runtime();
        for name in ["func1", "func2"] {
            client
                .create(NAMESPACE, &function(name, "120"))
                .await
                .unwrap();
        }
        let data = client
            .create(NAMESPACE, &finalized(trigger("func-trigger", "func1", "* * * * *")))
            .await
            .unwrap();

        handle(&client, &runtime, ResourceEvent::Added(data.clone()))
            .await
            .unwrap();
        assert!(get_job(&client, "func1").await.is_some());

        let mut retargeted = data.clone();
        retargeted.spec.function_name = "func2".into();
        let retargeted = client
            .replace(NAMESPACE, "func-trigger", &retargeted)
            .await
            .unwrap();

        handle(
            &client,
            &runtime,
            ResourceEvent::Updated {
                old: data,
                new: retargeted,
            },
        )
        .await
        .unwrap();
        assert!(get_job(&client, "func1").await.is_none());
        assert_eq!(
            schedule(&get_job(&client, "func2").await.unwrap()),
            "* * * * *",
        );
    }

    #[tokio::test]
    async fn keep_job_of_retargeted_trigger_for_other_trigger() {
        let client = MemoryClient::default();
        let runtime = runtime();
        for name in ["func1", "func2"] {
            client
                .create(NAMESPACE, &function(name, "120"))
                .await
                .unwrap();
        }
        let hourly = client
            .create(NAMESPACE, &finalized(trigger("hourly", "func1", "@hourly")))
            .await
            .unwrap();
        client
            .create(NAMESPACE, &finalized(trigger("daily", "func1", "@daily")))
            .await
            .unwrap();

        handle(&client, &runtime, ResourceEvent::Added(hourly.clone()))
            .await
            .unwrap();

        let mut retargeted = hourly.clone();
        retargeted.spec.function_name = "func2".into();
        let retargeted = client
            .replace(NAMESPACE, "hourly", &retargeted)
            .await
            .unwrap();

        handle(
            &client,
            &runtime,
            ResourceEvent::Updated {
                old: hourly,
                new: retargeted,
            },
        )
        .await
        .unwrap();
        assert_eq!(schedule(&get_job(&client, "func1").await.unwrap()), "@daily");
        assert_eq!(schedule(&get_job(&client, "func2").await.unwrap()), "@hourly");
    }

    #[test]
    fn plan_by_lifecycle() {
        let mut data = trigger("func1-trigger", "func1", "* * * * *");
        data.metadata.resource_version = Some("1".into());
        assert_eq!(
            plan(ResourceEvent::Added(data.clone())),
            TriggerAction::AddFinalizer(data.clone()),
        );

        let data = finalized(data);
        assert_eq!(
            plan(ResourceEvent::Added(data.clone())),
            TriggerAction::Sync(data.clone()),
        );
        assert_eq!(
            plan(ResourceEvent::Updated {
                old: data.clone(),
                new: data.clone(),
            }),
            TriggerAction::Skip,
        );

        let mut retargeted = data.clone();
        retargeted.metadata.resource_version = Some("2".into());
        retargeted.spec.function_name = "func2".into();
        assert_eq!(
            plan(ResourceEvent::Updated {
                old: data.clone(),
                new: retargeted.clone(),
            }),
            TriggerAction::Retarget {
                old: data.clone(),
                new: retargeted,
            },
        );

        let mut deleting = data.clone();
        deleting.metadata.resource_version = Some("2".into());
        deleting.metadata.deletion_timestamp = Some(Time(Utc::now()));
        assert_eq!(
            plan(ResourceEvent::Updated {
                old: data.clone(),
                new: deleting.clone(),
            }),
            TriggerAction::Finalize(deleting),
        );

        assert_eq!(
            plan(ResourceEvent::Deleted(data.clone())),
            TriggerAction::Cleanup(data),
        );
    }
}
