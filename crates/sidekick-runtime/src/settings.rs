//! In-memory [`SettingsStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use sidekick_protocols::SettingsStore;

/// Settings held in memory, seeded from configuration.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemorySettingsStore {
    pub fn new(values: HashMap<String, Value>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.write().remove(key)
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get_values(&self, keys: &[&str]) -> HashMap<String, Value> {
        let values = self.values.read();
        keys.iter()
            .filter_map(|key| values.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect()
    }
}
