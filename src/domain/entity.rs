// src/domain/entity.rs
//
// The contract every cached entity satisfies.
//
// The sync engine only cares about a stable integer id and the handful of
// fields the client-side filters inspect. Everything else an entity carries
// is opaque payload that flows through the cache untouched.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub trait CacheEntity:
    Clone + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Resource name used both as the backend collection path segment and
    /// as the `resource` field of realtime events.
    const RESOURCE: &'static str;

    /// Stable id, unique within the entity's collection.
    fn id(&self) -> i64;

    /// Text the free-text filter searches, concatenated from the fields
    /// configured for this entity (name, phone, reference, ...).
    fn search_haystack(&self) -> String;

    fn city(&self) -> Option<&str> {
        None
    }

    fn bank(&self) -> Option<&str> {
        None
    }

    fn category(&self) -> Option<&str> {
        None
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn has_pending_balance(&self) -> bool {
        false
    }

    /// Foreign reference to a parent resource, used by delete cascades
    /// (a payment row referencing its sale, a transaction referencing the
    /// sale or purchase that produced it).
    fn parent_id(&self, parent_resource: &str) -> Option<i64> {
        let _ = parent_resource;
        None
    }
}
