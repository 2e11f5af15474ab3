use std::collections::{HashMap, HashSet};

use futures::{future, stream, Stream, StreamExt};
use kube::{
    runtime::{
        reflector::ObjectRef,
        watcher::{watcher, Config, Event},
        WatchStreamExt,
    },
    Api, Resource,
};
use serde::de::DeserializeOwned;
use tracing::warn;

/// A change notification carrying the affected snapshot(s).
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceEvent<K> {
    Added(K),
    Updated { old: K, new: K },
    Deleted(K),
}

impl<K> ResourceEvent<K> {
    /// The most recent snapshot the event knows of.
    pub fn latest(&self) -> &K {
        match self {
            Self::Added(data) | Self::Deleted(data) => data,
            Self::Updated { new, .. } => new,
        }
    }
}

/// Remembers the last seen copy of every object so that raw watch events
/// can be expanded into [`ResourceEvent`]s with both the old and the new
/// snapshot.
pub struct Informer<K>
where
    K: Resource,
    <K as Resource>::DynamicType: Clone + Eq + ::core::hash::Hash,
{
    cache: HashMap<ObjectRef<K>, K>,
}

impl<K> Default for Informer<K>
where
    K: Resource,
    <K as Resource>::DynamicType: Clone + Eq + ::core::hash::Hash,
{
    fn default() -> Self {
        Self {
            cache: HashMap::default(),
        }
    }
}

impl<K> Informer<K>
where
    K: Clone + Resource,
    <K as Resource>::DynamicType: Clone + Default + Eq + ::core::hash::Hash,
{
    pub fn apply(&mut self, event: Event<K>) -> Vec<ResourceEvent<K>> {
        match event {
            Event::Applied(data) => vec![self.upsert(data)],
            Event::Deleted(data) => {
                self.cache.remove(&ObjectRef::from_obj(&data));
                vec![ResourceEvent::Deleted(data)]
            }
            // a relist: anything we knew of that is missing was deleted while
            // the watch was down
            Event::Restarted(list) => {
                let present: HashSet<_> = list.iter().map(ObjectRef::from_obj).collect();
                let removed: Vec<_> = self
                    .cache
                    .keys()
                    .filter(|key| !present.contains(*key))
                    .cloned()
                    .collect();

                let mut events: Vec<_> = list.into_iter().map(|data| self.upsert(data)).collect();
                events.extend(
                    removed
                        .into_iter()
                        .filter_map(|key| self.cache.remove(&key))
                        .map(ResourceEvent::Deleted),
                );
                events
            }
        }
    }

    fn upsert(&mut self, data: K) -> ResourceEvent<K> {
        match self.cache.insert(ObjectRef::from_obj(&data), data.clone()) {
            Some(old) => ResourceEvent::Updated { old, new: data },
            None => ResourceEvent::Added(data),
        }
    }
}

/// Watches `api` and yields tagged events, retrying the watch with backoff.
pub fn informer<K>(api: Api<K>, config: Config) -> impl Stream<Item = ResourceEvent<K>> + Send
where
    K: 'static + Clone + ::core::fmt::Debug + DeserializeOwned + Resource + Send + Sync,
    <K as Resource>::DynamicType: Clone + Default + Eq + ::core::hash::Hash + Send + Sync,
{
    watcher(api, config)
        .default_backoff()
        .filter_map(|event| {
            future::ready(match event {
                Ok(event) => Some(event),
                Err(error) => {
                    let kind = K::kind(&Default::default()).into_owned();
                    warn!("failed to watch {kind}: {error}");
                    None
                }
            })
        })
        .scan(Informer::default(), |informer, event: Event<K>| {
            future::ready(Some(informer.apply(event)))
        })
        .flat_map(stream::iter)
}
