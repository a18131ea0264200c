//! Named key-value stores.
//!
//! One store exists per service, one for the process, and one per-invocation
//! store owned by the execution context.

use std::sync::{Mutex, PoisonError};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::error;

#[derive(Debug)]
pub struct Store {
    name: String,
    values: Mutex<IndexMap<String, Value>>,
}

impl Store {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Mutex::new(IndexMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read `key`, logging and returning `Value::Null` when it was never set.
    pub fn get(&self, key: &str) -> Value {
        match self.try_get(key) {
            Some(value) => value,
            None => {
                error!(store = %self.name, key = %key, "store has no value for key");
                Value::Null
            }
        }
    }

    pub fn try_get(&self, key: &str) -> Option<Value> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).contains_key(key)
    }

    pub fn clear(&self) {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Copy of every entry in insertion order.
    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unset_keys_read_as_null() {
        let store = Store::new("users");
        assert_eq!(store.get("missing"), Value::Null);
        assert!(!store.contains("missing"));
    }

    #[test]
    fn set_overwrites_and_clear_empties() {
        let store = Store::new("activity");
        store.set("user", json!({"name": "Ada"}));
        store.set("user", json!({"name": "Grace"}));
        assert_eq!(store.get("user"), json!({"name": "Grace"}));
        assert_eq!(store.snapshot().len(), 1);

        store.clear();
        assert!(store.snapshot().is_empty());
    }
}
