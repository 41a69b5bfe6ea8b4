//! Per-request metadata bag shared between plugins and the recovery coordinator.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Key under which the current attempt number (1-based) is stored.
pub const ATTEMPT_KEY: &str = "turbofetch.attempt";

/// Key under which [`RequestIdPlugin`](crate::plugins::RequestIdPlugin) stores
/// the correlation id.
pub const CORRELATION_ID_KEY: &str = "turbofetch.correlation_id";

/// Thread-safe key/value metadata attached to every request.
///
/// Cloning is cheap and every clone observes the same map, so a value written
/// in `prepare` is visible in `did_finish` and in the recovery coordinator.
/// The manager itself only reads and writes [`ATTEMPT_KEY`].
#[derive(Debug, Clone, Default)]
pub struct UserInfo {
    entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl UserInfo {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.write().insert(key.into(), value.into())
    }

    /// Returns a copy of the value under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    /// Returns the value under `key` deserialized as `T`, if present and well-typed.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    /// Removes and returns the value under `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.write().remove(key)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if the bag holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Current attempt number, `0` before the first dispatch.
    pub fn attempt(&self) -> u32 {
        self.get_as(ATTEMPT_KEY).unwrap_or(0)
    }

    pub(crate) fn set_attempt(&self, attempt: u32) {
        self.insert(ATTEMPT_KEY, attempt);
    }

    /// Correlation id stamped by the request-id plugin, if any.
    pub fn correlation_id(&self) -> Option<String> {
        self.get_as(CORRELATION_ID_KEY)
    }

    /// Copies the whole map.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.entries.read().clone()
    }
}
