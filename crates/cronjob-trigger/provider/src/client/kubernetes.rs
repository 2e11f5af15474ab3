use std::fmt;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{DeleteParams, ListParams, PostParams},
    Api, Client, Resource,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{instrument, Level};

use super::ObjectClient;
use crate::Result;

#[derive(Clone)]
pub struct KubernetesClient {
    pub kube: Client,
    pub field_manager: String,
}

impl KubernetesClient {
    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.kube.clone(), namespace)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(self.field_manager.clone()),
        }
    }
}

#[async_trait]
impl<K> ObjectClient<K> for KubernetesClient
where
    K: 'static
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Send
        + Sync,
{
    #[instrument(level = Level::DEBUG, skip(self), err(Display))]
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        self.api::<K>(namespace).get_opt(name).await.map_err(Into::into)
    }

    #[instrument(level = Level::DEBUG, skip(self), err(Display))]
    async fn list(&self, namespace: &str) -> Result<Vec<K>> {
        let lp = ListParams::default();
        Ok(self.api::<K>(namespace).list(&lp).await?.items)
    }

    #[instrument(level = Level::DEBUG, skip(self, data), err(Display))]
    async fn create(&self, namespace: &str, data: &K) -> Result<K> {
        let pp = self.post_params();
        self.api::<K>(namespace)
            .create(&pp, data)
            .await
            .map_err(Into::into)
    }

    #[instrument(level = Level::DEBUG, skip(self, data), err(Display))]
    async fn replace(&self, namespace: &str, name: &str, data: &K) -> Result<K> {
        let pp = self.post_params();
        self.api::<K>(namespace)
            .replace(name, &pp, data)
            .await
            .map_err(Into::into)
    }

    #[instrument(level = Level::DEBUG, skip(self), err(Display))]
    async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
        let dp = DeleteParams::default();
        match self.api::<K>(namespace).delete(name, &dp).await {
            Ok(_) => Ok(true),
            Err(::kube::Error::Api(response)) if response.code == 404 => Ok(false),
            Err(error) => Err(error.into()),
        }
    }
}
