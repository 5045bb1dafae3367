//! In-memory stores for tests and throwaway sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use mathroom_core::error::StoreError;
use mathroom_core::traits::{merge_fields, DeviceStorage, DocumentStore};

/// A document store held in process memory.
///
/// Counts writes and can be switched offline to exercise the engine's
/// persistence-failure paths.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<String, Value>>,
    writes: AtomicU32,
    offline: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stored document.
    pub fn document(&self, key: &str) -> Option<Value> {
        self.lock().ok().and_then(|docs| docs.get(key).cloned())
    }

    /// Number of successful `set`/`merge` calls.
    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::Relaxed)
    }

    /// While offline every write fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>, StoreError> {
        self.docs
            .lock()
            .map_err(|_| StoreError::Io("memory store lock poisoned".into()))
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::Relaxed) {
            Err(StoreError::Network("memory store is offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, document: Value) -> Result<(), StoreError> {
        self.check_online()?;
        self.lock()?.insert(key.to_string(), document);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn merge(&self, key: &str, patch: Map<String, Value>) -> Result<(), StoreError> {
        self.check_online()?;
        let mut docs = self.lock()?;
        let doc = docs.entry(key.to_string()).or_insert(Value::Null);
        merge_fields(doc, patch);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Device storage held in process memory.
#[derive(Default)]
pub struct MemoryDeviceStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryDeviceStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.items
            .lock()
            .map_err(|_| StoreError::Io("device storage lock poisoned".into()))
    }
}

impl DeviceStorage for MemoryDeviceStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }
}
