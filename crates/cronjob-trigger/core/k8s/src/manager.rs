use core::{future::Future, time::Duration};
use std::sync::Arc;

use anyhow::{Error, Result};
use async_trait::async_trait;
use cronjob_trigger_core::{signal::TerminationSignal, tracer};
use futures::{stream, StreamExt};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    api::{Patch, PatchParams, PostParams},
    runtime::watcher::Config,
    Api, Client, CustomResourceExt, Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use crate::informer::{informer, ResourceEvent};

pub struct Manager<C> {
    pub kube: Client,
    pub ctx: Arc<C>,
}

#[async_trait]
pub trait Ctx
where
    Self: 'static + Send + Sync + TryDefault,
    <Self as Ctx>::Data: 'static
        + Send
        + Sync
        + Clone
        + ::core::fmt::Debug
        + DeserializeOwned
        + Resource<DynamicType = ()>,
{
    type Data;

    const NAME: &'static str;
    const FALLBACK: Duration = Duration::from_secs(30); // 30 seconds

    fn get_subcrds() -> Vec<CustomResourceDefinition> {
        Default::default()
    }

    async fn spawn(signal: TerminationSignal)
    where
        Self: Sized,
    {
        <Self as Ctx>::try_spawn(signal, |client| async move { Ok(Self::init_resource(client)) })
            .await
            .expect("spawning a manager with resource")
    }

    async fn spawn_crd(signal: TerminationSignal)
    where
        Self: Sized,
        <Self as Ctx>::Data: CustomResourceExt,
    {
        <Self as Ctx>::try_spawn(signal, |client| async move {
            Self::init_crd(client.clone())
                .await
                .map(|()| Self::init_resource(client))
        })
        .await
        .expect("spawning a manager with CRD")
    }

    async fn try_spawn<F, Fut>(signal: TerminationSignal, f_init: F) -> Result<()>
    where
        Self: Sized,
        F: FnOnce(Client) -> Fut + Send,
        Fut: Future<Output = Result<Api<<Self as Ctx>::Data>>> + Send,
    {
        tracer::init_once(<Self as Ctx>::NAME);

        let client = Client::try_default().await?;
        let ctx = Arc::new(Self::try_default().await?);
        let manager = Arc::new(Manager {
            kube: client.clone(),
            ctx,
        });

        let api = f_init(client).await?;
        let kind = <<Self as Ctx>::Data>::kind(&());

        // failed events are fed back into the same loop after a delay
        let (tx, rx) = mpsc::unbounded_channel();
        let mut events = stream::select(
            informer(api, Config::default()).boxed(),
            UnboundedReceiverStream::new(rx),
        );

        info!("watching {kind}");
        loop {
            let event = ::tokio::select! {
                () = signal.wait_to_terminate() => break,
                event = events.next() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let name = event.latest().name_any();
            if let Err(error) = Self::handle(manager.clone(), event.clone()).await {
                warn!("failed to handle {kind} {name:?}: {error:?}");
                if let Some(delay) = Self::error_policy(manager.clone(), &error) {
                    let tx = tx.clone();
                    ::tokio::spawn(async move {
                        ::tokio::time::sleep(delay).await;
                        // the loop may already be gone on shutdown
                        tx.send(event).ok();
                    });
                }
            }
        }

        info!("stopped watching {kind}");
        Ok(())
    }

    fn init_resource(client: Client) -> Api<<Self as Ctx>::Data> {
        Api::<<Self as Ctx>::Data>::all(client)
    }

    async fn init_crd(client: Client) -> Result<()>
    where
        <Self as Ctx>::Data: CustomResourceExt,
    {
        let create_crd = |api: Api<CustomResourceDefinition>, crd: CustomResourceDefinition| async move {
            let name = crd.name_any();
            if api.get_opt(&name).await?.is_none() {
                let pp = PostParams {
                    dry_run: false,
                    field_manager: Some(<Self as Ctx>::NAME.into()),
                };
                api.create(&pp, &crd).await?;

                info!("Created CRD: {name}");
                Result::<_, ::kube::Error>::Ok(())
            } else {
                let pp = PatchParams {
                    dry_run: false,
                    force: true,
                    field_manager: Some(<Self as Ctx>::NAME.into()),
                    ..Default::default()
                };
                api.patch(&name, &pp, &Patch::Apply(&crd)).await?;

                info!("Updated CRD: {name}");
                Result::<_, ::kube::Error>::Ok(())
            }
        };

        // Ensure CRD is installed before loop-watching
        let api = Api::<CustomResourceDefinition>::all(client);

        for crd in <Self as Ctx>::get_subcrds() {
            create_crd(api.clone(), crd).await?;
        }
        create_crd(api, <Self as Ctx>::Data::crd()).await?;
        Ok(())
    }

    async fn handle(
        manager: Arc<Manager<Self>>,
        event: ResourceEvent<<Self as Ctx>::Data>,
    ) -> Result<()>
    where
        Self: Sized;

    /// Returns how long to wait before redelivering a failed event,
    /// or `None` to drop it.
    fn error_policy(_manager: Arc<Manager<Self>>, _error: &Error) -> Option<Duration>
    where
        Self: Sized,
    {
        Some(<Self as Ctx>::FALLBACK)
    }
}

#[async_trait]
pub trait TryDefault {
    async fn try_default() -> Result<Self>
    where
        Self: Sized;
}

#[async_trait]
impl<T> TryDefault for T
where
    T: Default,
{
    async fn try_default() -> Result<Self> {
        Ok(T::default())
    }
}
