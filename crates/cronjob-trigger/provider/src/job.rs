use cronjob_trigger_api::{cronjob_trigger::CronJobTriggerCrd, function::FunctionCrd};
use k8s_openapi::{
    api::{
        batch::v1::{CronJob, CronJobSpec, JobSpec, JobTemplateSpec},
        core::v1::{
            Container, EnvVar, EnvVarSource, LocalObjectReference, ObjectFieldSelector, PodSpec,
            PodTemplateSpec,
        },
    },
    apimachinery::pkg::apis::meta::v1::OwnerReference,
};
use kube::{api::ObjectMeta, ResourceExt};
use tracing::{debug, info, instrument, Level};

use crate::{
    client::ObjectClient, command::InvocationCommand, merge::merge_opt,
    ownership::OwnershipMarker, schedule::validate_schedule, Error, Result,
};

pub const SUCCESSFUL_JOBS_HISTORY_LIMIT: i32 = 3;
pub const FAILED_JOBS_HISTORY_LIMIT: i32 = 1;

/// The CronJob controller appends an 11 character suffix to the names of
/// the jobs it spawns, which must stay within 63 characters.
pub const MAX_JOB_NAME_LEN: usize = 52;

const CONTAINER_NAME: &str = "trigger";
const RESTART_POLICY: &str = "Never";

/// How invocation jobs are run, shared by every trigger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Image performing the HTTP call; its entrypoint runs the single
    /// argument as a shell command.
    pub image: String,
    pub image_pull_secrets: Vec<String>,
    pub cluster_domain: String,
}

/// Keeps the scheduled job of a function in line with its trigger.
pub struct CronJobSynchronizer<'a, C> {
    pub client: &'a C,
    pub runtime: &'a RuntimeConfig,
}

impl<'a, C> CronJobSynchronizer<'a, C>
where
    C: ObjectClient<CronJob>,
{
    /// Creates the scheduled job, or updates the fields this controller owns.
    ///
    /// Fails with [`Error::Conflict`] when an object of the same name exists
    /// but was not created by this controller; that object is left as is.
    #[instrument(
        level = Level::INFO,
        skip_all,
        fields(function = %function.name_any(), namespace = ?function.namespace()),
        err(Display),
    )]
    pub async fn ensure(
        &self,
        function: &FunctionCrd,
        trigger: &CronJobTriggerCrd,
        owner_references: Vec<OwnerReference>,
    ) -> Result<CronJob> {
        let desired = build_cron_job(function, trigger, self.runtime, owner_references)?;
        let namespace = desired.namespace().unwrap_or_default();
        let name = desired.name_any();

        match ObjectClient::<CronJob>::get(self.client, &namespace, &name).await? {
            None => {
                let created = self.client.create(&namespace, &desired).await?;
                info!("created scheduled job: {namespace}/{name}");
                Ok(created)
            }
            Some(existing) if !OwnershipMarker::CURRENT.is_marked(&existing.metadata) => {
                Err(Error::Conflict { namespace, name })
            }
            Some(existing) => {
                let updated = update_owned_fields(&existing, desired);
                if updated == existing {
                    debug!("scheduled job is up-to-date: {namespace}/{name}");
                    return Ok(existing);
                }

                // carries the resource version we read, so a concurrent
                // writer makes this fail instead of being overwritten
                let replaced = self.client.replace(&namespace, &name, &updated).await?;
                info!("updated scheduled job: {namespace}/{name}");
                Ok(replaced)
            }
        }
    }

    /// Deletes the scheduled job of a function, if this controller owns it.
    #[instrument(level = Level::INFO, skip(self), err(Display))]
    pub async fn delete(&self, namespace: &str, function_name: &str) -> Result<bool> {
        let name = ::cronjob_trigger_api::function::trigger_job_name(function_name);

        match ObjectClient::<CronJob>::get(self.client, namespace, &name).await? {
            Some(existing) if OwnershipMarker::CURRENT.is_marked(&existing.metadata) => {
                let deleted = ObjectClient::<CronJob>::delete(self.client, namespace, &name).await?;
                if deleted {
                    info!("deleted scheduled job: {namespace}/{name}");
                }
                Ok(deleted)
            }
            Some(_) => {
                info!("skipping deleting unmanaged scheduled job: {namespace}/{name}");
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

/// Renders the scheduled job a function and its trigger ask for.
pub fn build_cron_job(
    function: &FunctionCrd,
    trigger: &CronJobTriggerCrd,
    runtime: &RuntimeConfig,
    owner_references: Vec<OwnerReference>,
) -> Result<CronJob> {
    validate_schedule(&trigger.spec.schedule)?;
    let active_deadline_seconds = parse_timeout(function)?;

    let name = function.trigger_job_name();
    if name.len() > MAX_JOB_NAME_LEN {
        return Err(Error::JobNameTooLong {
            name,
            max: MAX_JOB_NAME_LEN,
        });
    }

    let function_name = function.name_any();
    let namespace = function.namespace().unwrap_or_else(|| "default".into());

    let mut labels = merge_opt(
        function.metadata.labels.as_ref(),
        trigger.metadata.labels.as_ref(),
    );
    let mut annotations = merge_opt(
        function.metadata.annotations.as_ref(),
        trigger.metadata.annotations.as_ref(),
    );
    OwnershipMarker::CURRENT.apply(&mut labels, &mut annotations);

    let command = InvocationCommand {
        function_name: &function_name,
        namespace: &namespace,
        cluster_domain: &runtime.cluster_domain,
        payload: &trigger.spec.payload,
    }
    .build()?;

    let image_pull_secrets: Vec<_> = runtime
        .image_pull_secrets
        .iter()
        .map(|name| LocalObjectReference {
            name: Some(name.clone()),
        })
        .collect();

    Ok(CronJob {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace),
            labels: Some(labels),
            annotations: Some(annotations),
            owner_references: (!owner_references.is_empty()).then_some(owner_references),
            ..Default::default()
        },
        spec: Some(CronJobSpec {
            schedule: trigger.spec.schedule.clone(),
            successful_jobs_history_limit: Some(SUCCESSFUL_JOBS_HISTORY_LIMIT),
            failed_jobs_history_limit: Some(FAILED_JOBS_HISTORY_LIMIT),
            job_template: JobTemplateSpec {
                metadata: None,
                spec: Some(JobSpec {
                    active_deadline_seconds,
                    template: PodTemplateSpec {
                        metadata: None,
                        spec: Some(PodSpec {
                            containers: vec![Container {
                                name: CONTAINER_NAME.into(),
                                image: Some(runtime.image.clone()),
                                args: Some(vec![command]),
                                env: Some(vec![EnvVar {
                                    name: "POD_UID".into(),
                                    value: None,
                                    value_from: Some(EnvVarSource {
                                        field_ref: Some(ObjectFieldSelector {
                                            api_version: Some("v1".into()),
                                            field_path: "metadata.uid".into(),
                                        }),
                                        ..Default::default()
                                    }),
                                }]),
                                ..Default::default()
                            }],
                            image_pull_secrets: (!image_pull_secrets.is_empty())
                                .then_some(image_pull_secrets),
                            restart_policy: Some(RESTART_POLICY.into()),
                            ..Default::default()
                        }),
                    },
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    })
}

/// An empty timeout means no deadline.
fn parse_timeout(function: &FunctionCrd) -> Result<Option<i64>> {
    let value = function.spec.timeout.trim();
    if value.is_empty() {
        return Ok(None);
    }

    match value.parse::<i64>() {
        Ok(seconds) if seconds > 0 => Ok(Some(seconds)),
        _ => Err(Error::InvalidTimeout {
            function: function.name_any(),
            value: function.spec.timeout.clone(),
        }),
    }
}

/// Copies what this controller owns from `desired` onto `existing`.
///
/// Identity, owner references, status and fields defaulted by the API
/// server stay as stored.
fn update_owned_fields(existing: &CronJob, desired: CronJob) -> CronJob {
    let mut updated = existing.clone();
    updated.metadata.labels = desired.metadata.labels;
    updated.metadata.annotations = desired.metadata.annotations;

    let desired = desired.spec.unwrap_or_default();
    let spec = updated.spec.get_or_insert_with(Default::default);
    spec.schedule = desired.schedule;
    spec.successful_jobs_history_limit = desired.successful_jobs_history_limit;
    spec.failed_jobs_history_limit = desired.failed_jobs_history_limit;

    let desired = desired.job_template.spec.unwrap_or_default();
    let job = spec.job_template.spec.get_or_insert_with(Default::default);
    job.active_deadline_seconds = desired.active_deadline_seconds;

    let desired = desired.template.spec.unwrap_or_default();
    let pod = job.template.spec.get_or_insert_with(Default::default);
    pod.image_pull_secrets = desired.image_pull_secrets;
    pod.restart_policy = desired.restart_policy;

    let desired_container = desired
        .containers
        .into_iter()
        .find(|container| container.name == CONTAINER_NAME);
    if let Some(desired) = desired_container {
        match pod
            .containers
            .iter_mut()
            .find(|container| container.name == CONTAINER_NAME)
        {
            Some(container) => {
                container.image = desired.image;
                container.args = desired.args;
                container.env = desired.env;
            }
            None => pod.containers = vec![desired],
        }
    }
    updated
}
