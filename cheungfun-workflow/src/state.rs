//! Per-run shared state.
//!
//! The [`StateStore`] is the one designated shared mutable resource of a run.
//! Handlers coordinate through it; the store serializes every operation behind
//! its own lock, so any interleaving of readers and writers observes a
//! linearizable history. Iteration order of keys is unspecified.

use serde::{Serialize, de::DeserializeOwned};
use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// Thread-safe key-value store scoped to one workflow run
#[derive(Debug, Default)]
pub struct StateStore {
    data: RwLock<HashMap<String, serde_json::Value>>,
}

impl StateStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, serde_json::Value>> {
        // A panicking writer cannot leave the map half-updated; recover the guard.
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, serde_json::Value>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a value with the given key
    pub fn set(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.write().insert(key.into(), value.into());
    }

    /// Serialize and store any value
    pub fn set_as<T: Serialize>(&self, key: impl Into<String>, value: &T) -> crate::Result<()> {
        let value = serde_json::to_value(value)?;
        self.write().insert(key.into(), value);
        Ok(())
    }

    /// Retrieve a value by key
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.read().get(key).cloned()
    }

    /// Retrieve a string value; `None` when missing or not a string
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.read()
            .get(key)
            .and_then(|v| v.as_str().map(ToString::to_string))
    }

    /// Retrieve an integer value; `None` when missing or not an integer
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.read().get(key).and_then(serde_json::Value::as_i64)
    }

    /// Retrieve a boolean value; `None` when missing or not a boolean
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.read().get(key).and_then(serde_json::Value::as_bool)
    }

    /// Retrieve and deserialize a value; `None` when missing or of another shape
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        serde_json::from_value(value).ok()
    }

    /// Retrieve a value by key with a default
    pub fn get_or_default<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get_as(key).unwrap_or(default)
    }

    /// Atomically read-modify-write one key.
    ///
    /// The closure runs under the write lock, so concurrent updates never
    /// lose writes.
    pub fn update<F>(&self, key: &str, f: F) -> serde_json::Value
    where
        F: FnOnce(Option<&serde_json::Value>) -> serde_json::Value,
    {
        let mut data = self.write();
        let next = f(data.get(key));
        data.insert(key.to_string(), next.clone());
        next
    }

    /// Check if a key exists
    pub fn contains_key(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Remove a value by key
    pub fn delete(&self, key: &str) -> Option<serde_json::Value> {
        self.write().remove(key)
    }

    /// Get all keys, in unspecified order
    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Clear all data
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Get the number of stored items
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Point-in-time copy of the whole mapping
    pub fn to_map(&self) -> HashMap<String, serde_json::Value> {
        self.read().clone()
    }
}

impl Clone for StateStore {
    /// Point-in-time copy; later mutations on either side stay independent.
    fn clone(&self) -> Self {
        Self {
            data: RwLock::new(self.to_map()),
        }
    }
}

impl From<HashMap<String, serde_json::Value>> for StateStore {
    fn from(data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }
}
