// src/realtime/reducers.rs
//
// Resource Event Reducers - translating realtime events into cache
// mutations.
//
// Policy per action:
// - created: invalidate for uniformly paged lists; optimistic head splice
//   (with invalidate fallback) for head/tail collections.
// - updated: always invalidate. A terse event payload may omit fields, so a
//   partial patch is never attempted.
// - deleted: strip the id synchronously from every cached page, then
//   invalidate to reconcile totals. Deleting a parent document also strips
//   dependent rows (payments, transactions) and invalidates their
//   collections.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::CacheEntity;
use crate::realtime::event::{EventAction, RemoteEvent};
use crate::sync::Collection;

/// What a reducer needs from a collection's cache, independent of the
/// entity type.
#[async_trait]
pub trait ResourceCache: Send + Sync {
    fn resource_name(&self) -> &'static str;

    /// Synchronously remove an id from every cached page, across all fetch
    /// keys. Unknown ids are a no-op.
    fn strip_id(&self, id: i64);

    /// Synchronously remove every row referencing a deleted parent.
    fn strip_children_of(&self, parent_resource: &str, parent_id: i64);

    /// Bump the generation and refetch.
    async fn invalidate_and_refetch(&self);

    /// Apply a `created` event per the collection's create plan.
    async fn on_created(&self, id: i64);
}

#[async_trait]
impl<E: CacheEntity> ResourceCache for Collection<E> {
    fn resource_name(&self) -> &'static str {
        self.resource()
    }

    fn strip_id(&self, id: i64) {
        self.strip(id);
    }

    fn strip_children_of(&self, parent_resource: &str, parent_id: i64) {
        self.strip_children(parent_resource, parent_id);
    }

    async fn invalidate_and_refetch(&self) {
        self.reload().await;
    }

    async fn on_created(&self, id: i64) {
        self.apply_created(id).await;
    }
}

/// Rows of `child` resources reference a deleted `parent` by foreign id and
/// must be stripped along with it.
#[derive(Debug, Clone)]
pub struct CascadeRule {
    pub parent: &'static str,
    pub children: Vec<&'static str>,
}

/// Dispatches every realtime event to the reducer for its resource.
#[derive(Default)]
pub struct ReducerRegistry {
    caches: HashMap<&'static str, Arc<dyn ResourceCache>>,
    cascades: Vec<CascadeRule>,
}

impl ReducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, cache: Arc<dyn ResourceCache>) {
        self.caches.insert(cache.resource_name(), cache);
    }

    pub fn cascade(&mut self, rule: CascadeRule) {
        self.cascades.push(rule);
    }

    /// Handle one event. Strips run synchronously so the UI reflects a
    /// delete with zero latency; refetches are spawned.
    pub fn handle(&self, event: &RemoteEvent) {
        let Some(cache) = self.caches.get(event.resource.as_str()) else {
            // Events for resources this app doesn't cache are fine to skip.
            return;
        };
        let Some(id) = event.payload_id() else {
            log::warn!(
                "realtime {:?} event for '{}' carries no id, ignoring",
                event.action,
                event.resource
            );
            return;
        };

        match event.action {
            EventAction::Created => {
                let cache = Arc::clone(cache);
                tokio::spawn(async move {
                    cache.on_created(id).await;
                });
            }
            EventAction::Updated => {
                let cache = Arc::clone(cache);
                tokio::spawn(async move {
                    cache.invalidate_and_refetch().await;
                });
            }
            EventAction::Deleted => {
                cache.strip_id(id);

                let mut to_refetch: Vec<Arc<dyn ResourceCache>> = vec![Arc::clone(cache)];
                for rule in self
                    .cascades
                    .iter()
                    .filter(|rule| rule.parent == event.resource)
                {
                    for child in &rule.children {
                        if let Some(child_cache) = self.caches.get(child) {
                            child_cache.strip_children_of(&event.resource, id);
                            to_refetch.push(Arc::clone(child_cache));
                        }
                    }
                }

                tokio::spawn(async move {
                    for cache in to_refetch {
                        cache.invalidate_and_refetch().await;
                    }
                });
            }
        }
    }
}
