//! Boundary traits for the stores and services the engine talks to.
//!
//! The async traits are implemented by the `mathroom-store` crate; the engine
//! only ever holds them as trait objects.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::model::{Grade, Question};

// ---------------------------------------------------------------------------
// Durable session store
// ---------------------------------------------------------------------------

/// Document-oriented key-value store holding one document per room code.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Human-readable backend name (e.g. "rest").
    fn name(&self) -> &str;

    /// Read a whole document. `Ok(None)` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the whole document.
    async fn set(&self, key: &str, document: Value) -> Result<(), StoreError>;

    /// Merge top-level fields into the document, creating it if absent.
    /// Fields not named in `patch` are left untouched.
    async fn merge(&self, key: &str, patch: Map<String, Value>) -> Result<(), StoreError>;
}

/// Shallow field merge shared by the store implementations.
///
/// A non-object target is replaced by an object holding just the patch.
pub fn merge_fields(target: &mut Value, patch: Map<String, Value>) {
    match target {
        Value::Object(existing) => {
            for (key, value) in patch {
                existing.insert(key, value);
            }
        }
        other => *other = Value::Object(patch),
    }
}

// ---------------------------------------------------------------------------
// Device-local storage
// ---------------------------------------------------------------------------

/// Simple string key-value storage local to this device.
///
/// Callers are expected to degrade on error (treat as absent) rather than
/// propagate, so implementations may fail freely.
pub trait DeviceStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Question pool provider
// ---------------------------------------------------------------------------

/// Read-only provider of question content.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// All questions for a grade, as a point-in-time snapshot.
    async fn questions_for_grade(&self, grade: Grade) -> anyhow::Result<Vec<Question>>;
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Wall-clock source in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta: i64) {
        self.now_ms.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
