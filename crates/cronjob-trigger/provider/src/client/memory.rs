use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use k8s_openapi::{apimachinery::pkg::apis::meta::v1::Time, chrono::Utc};
use kube::{error::ErrorResponse, Resource};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::ObjectClient;
use crate::{Error, Result};

/// (apiVersion/kind, namespace, name)
type ObjectKey = (String, String, String);

/// An in-process stand-in for the API server.
///
/// It keeps the semantics the reconcilers rely on: resource versions,
/// optimistic concurrency on replace, `409`/`404` responses and
/// finalizer-aware deletion. Owner-reference garbage collection is not
/// emulated.
#[derive(Clone, Default)]
pub struct MemoryClient {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, Value>,
    version: u64,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

impl MemoryClient {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key<K>(namespace: &str, name: &str) -> ObjectKey
    where
        K: Resource<DynamicType = ()>,
    {
        let api_version = K::api_version(&());
        let kind = K::kind(&());
        (
            format!("{api_version}/{kind}"),
            namespace.into(),
            name.into(),
        )
    }
}

fn api_error(code: u16, reason: &str, message: String) -> Error {
    Error::Kube(::kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message,
        reason: reason.into(),
        code,
    }))
}

fn decode<K>(value: &Value) -> Result<K>
where
    K: DeserializeOwned,
{
    ::serde_json::from_value(value.clone()).map_err(Into::into)
}

#[async_trait]
impl<K> ObjectClient<K> for MemoryClient
where
    K: 'static + Clone + Serialize + DeserializeOwned + Resource<DynamicType = ()> + Send + Sync,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let state = self.lock();
        state
            .objects
            .get(&Self::key::<K>(namespace, name))
            .map(decode)
            .transpose()
    }

    async fn list(&self, namespace: &str) -> Result<Vec<K>> {
        let (kind, namespace, _) = Self::key::<K>(namespace, "");

        let state = self.lock();
        state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && *ns == namespace)
            .map(|(_, value)| decode(value))
            .collect()
    }

    async fn create(&self, namespace: &str, data: &K) -> Result<K> {
        let kind = K::kind(&());
        let name = match data.meta().name.clone() {
            Some(name) => name,
            None => {
                return Err(api_error(
                    422,
                    "Invalid",
                    format!("{kind}: metadata.name: Required value"),
                ))
            }
        };
        let key = Self::key::<K>(namespace, &name);

        let mut state = self.lock();
        if state.objects.contains_key(&key) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("{kind} {name:?} already exists"),
            ));
        }

        let mut object = data.clone();
        let version = state.next_version();
        let meta = object.meta_mut();
        meta.namespace = Some(namespace.into());
        meta.uid = Some(format!("{namespace}-{name}-{version}"));
        meta.creation_timestamp = Some(Time(Utc::now()));
        meta.deletion_timestamp = None;
        meta.resource_version = Some(version);

        // respond with what a later read would see
        let value = ::serde_json::to_value(&object)?;
        let created = decode(&value)?;
        state.objects.insert(key, value);
        Ok(created)
    }

    async fn replace(&self, namespace: &str, name: &str, data: &K) -> Result<K> {
        let kind = K::kind(&());
        let key = Self::key::<K>(namespace, name);

        let mut state = self.lock();
        let stored: K = match state.objects.get(&key) {
            Some(value) => decode(value)?,
            None => {
                return Err(api_error(
                    404,
                    "NotFound",
                    format!("{kind} {name:?} not found"),
                ))
            }
        };
        let stored = stored.meta();

        if data.meta().name.as_deref() != Some(name) {
            return Err(api_error(
                400,
                "BadRequest",
                format!("{kind}: the name of the object does not match {name:?}"),
            ));
        }
        if let Some(version) = data.meta().resource_version.as_ref() {
            if stored.resource_version.as_ref() != Some(version) {
                return Err(api_error(
                    409,
                    "Conflict",
                    format!(
                        "Operation cannot be fulfilled on {kind} {name:?}: the object has been modified; please apply your changes to the latest version and try again"
                    ),
                ));
            }
        }

        let mut object = data.clone();
        let version = state.next_version();
        let meta = object.meta_mut();
        meta.namespace = Some(namespace.into());
        meta.uid.clone_from(&stored.uid);
        meta.creation_timestamp.clone_from(&stored.creation_timestamp);
        meta.deletion_timestamp.clone_from(&stored.deletion_timestamp);
        meta.resource_version = Some(version);

        let is_released = meta.deletion_timestamp.is_some()
            && meta
                .finalizers
                .as_ref()
                .map(|finalizers| finalizers.is_empty())
                .unwrap_or(true);
        if is_released {
            state.objects.remove(&key);
            Ok(object)
        } else {
            let value = ::serde_json::to_value(&object)?;
            let replaced = decode(&value)?;
            state.objects.insert(key, value);
            Ok(replaced)
        }
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
        let key = Self::key::<K>(namespace, name);

        let mut state = self.lock();
        let mut object: K = match state.objects.get(&key) {
            Some(value) => decode(value)?,
            None => return Ok(false),
        };

        let has_finalizers = object
            .meta()
            .finalizers
            .as_ref()
            .map(|finalizers| !finalizers.is_empty())
            .unwrap_or_default();
        if has_finalizers {
            if object.meta().deletion_timestamp.is_none() {
                let version = state.next_version();
                let meta = object.meta_mut();
                meta.deletion_timestamp = Some(Time(Utc::now()));
                meta.resource_version = Some(version);
                state.objects.insert(key, ::serde_json::to_value(&object)?);
            }
        } else {
            state.objects.remove(&key);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    use super::*;

    fn config_map(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn reject_duplicated_create() {
        let client = MemoryClient::default();
        client.create("default", &config_map("foo")).await.unwrap();

        let error = client
            .create("default", &config_map("foo"))
            .await
            .unwrap_err();
        assert!(error.is_conflict());
    }

    #[tokio::test]
    async fn reject_stale_replace() {
        let client = MemoryClient::default();
        let created = client.create("default", &config_map("foo")).await.unwrap();

        let mut first = created.clone();
        first.data = Some([("key".to_string(), "first".to_string())].into());
        client.replace("default", "foo", &first).await.unwrap();

        // still carries the resource version of `created`
        let mut second = created;
        second.data = Some([("key".to_string(), "second".to_string())].into());
        let error = client.replace("default", "foo", &second).await.unwrap_err();
        assert!(error.is_conflict());

        let stored: ConfigMap = client.get("default", "foo").await.unwrap().unwrap();
        assert_eq!(stored.data, first.data);
    }

    #[tokio::test]
    async fn scope_objects_by_namespace() {
        let client = MemoryClient::default();
        client.create("a", &config_map("foo")).await.unwrap();
        client.create("b", &config_map("bar")).await.unwrap();

        let listed: Vec<ConfigMap> = client.list("a").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].metadata.namespace.as_deref(), Some("a"));

        let missing: Option<ConfigMap> = client.get("a", "bar").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn hold_deletion_until_finalized() {
        let client = MemoryClient::default();
        let mut data = config_map("foo");
        data.metadata.finalizers = Some(vec!["example.com/finalizer".into()]);
        client.create("default", &data).await.unwrap();

        assert!(ObjectClient::<ConfigMap>::delete(&client, "default", "foo")
            .await
            .unwrap());
        let mut deleting: ConfigMap = client.get("default", "foo").await.unwrap().unwrap();
        assert!(deleting.metadata.deletion_timestamp.is_some());

        deleting.metadata.finalizers = None;
        client.replace("default", "foo", &deleting).await.unwrap();

        let gone: Option<ConfigMap> = client.get("default", "foo").await.unwrap();
        assert!(gone.is_none());
        assert!(!ObjectClient::<ConfigMap>::delete(&client, "default", "foo")
            .await
            .unwrap());
    }
}
