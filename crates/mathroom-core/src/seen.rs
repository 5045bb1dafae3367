//! Seen-question tracking at two scopes.
//!
//! The session scope is keyed by room code; the device scope is keyed by
//! grade and survives fresh starts on the same device. Both are JSON string
//! arrays in device storage. Reads fail open: a missing, unreadable or
//! malformed list is an empty list.

use std::collections::HashSet;
use std::sync::Arc;

use crate::model::Grade;
use crate::traits::DeviceStorage;

const SESSION_KEY_PREFIX: &str = "seen_questions_room_";
const DEVICE_KEY_PREFIX: &str = "seen_questions_grade_";

/// Records which question ids a learner has been shown.
#[derive(Clone)]
pub struct SeenTracker {
    storage: Arc<dyn DeviceStorage>,
}

impl SeenTracker {
    pub fn new(storage: Arc<dyn DeviceStorage>) -> Self {
        Self { storage }
    }

    /// Ids shown in this room, in insertion order.
    pub fn session_seen(&self, room_code: &str) -> Vec<String> {
        self.read(&session_key(room_code))
    }

    /// Ids shown on this device for `grade`, in insertion order.
    pub fn device_seen(&self, grade: Grade) -> Vec<String> {
        self.read(&device_key(grade))
    }

    /// Union of both scopes.
    pub fn all_seen(&self, room_code: &str, grade: Grade) -> HashSet<String> {
        let mut ids: HashSet<String> = self.device_seen(grade).into_iter().collect();
        ids.extend(self.session_seen(room_code));
        ids
    }

    /// Append `question_id` to both scopes. Idempotent.
    pub fn mark_seen(&self, room_code: &str, question_id: &str, grade: Grade) {
        self.append(&session_key(room_code), question_id);
        self.append(&device_key(grade), question_id);
    }

    pub fn clear_session_seen(&self, room_code: &str) {
        self.clear(&session_key(room_code));
    }

    pub fn clear_device_seen(&self, grade: Grade) {
        self.clear(&device_key(grade));
    }

    fn read(&self, key: &str) -> Vec<String> {
        let raw = match self.storage.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("reading seen list {key} failed, treating as empty: {e}");
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("seen list {key} is malformed, treating as empty: {e}");
                Vec::new()
            }
        }
    }

    fn append(&self, key: &str, question_id: &str) {
        let mut ids = self.read(key);
        if ids.iter().any(|id| id == question_id) {
            return;
        }
        ids.push(question_id.to_string());
        let encoded = match serde_json::to_string(&ids) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("encoding seen list {key} failed: {e}");
                return;
            }
        };
        if let Err(e) = self.storage.set_item(key, &encoded) {
            tracing::warn!("writing seen list {key} failed: {e}");
        }
    }

    fn clear(&self, key: &str) {
        if let Err(e) = self.storage.remove_item(key) {
            tracing::warn!("clearing seen list {key} failed: {e}");
        }
    }
}

fn session_key(room_code: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{room_code}")
}

fn device_key(grade: Grade) -> String {
    format!("{DEVICE_KEY_PREFIX}{grade}")
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::testing::MapStorage;
    use super::*;

    fn grade(n: u8) -> Grade {
        Grade::new(n).unwrap()
    }

    fn tracker() -> (Arc<MapStorage>, SeenTracker) {
        let storage = Arc::new(MapStorage::default());
        (storage.clone(), SeenTracker::new(storage))
    }

    #[test]
    fn empty_when_nothing_seen() {
        let (_, seen) = tracker();
        assert!(seen.device_seen(grade(5)).is_empty());
        assert!(seen.session_seen("TEST-ROOM-10").is_empty());
    }

    #[test]
    fn mark_appends_to_both_scopes_in_order() {
        let (_, seen) = tracker();
        seen.mark_seen("TEST-ROOM-10", "q1", grade(5));
        seen.mark_seen("TEST-ROOM-10", "q2", grade(5));
        assert_eq!(seen.device_seen(grade(5)), vec!["q1", "q2"]);
        assert_eq!(seen.session_seen("TEST-ROOM-10"), vec!["q1", "q2"]);
    }

    #[test]
    fn duplicates_are_not_stored() {
        let (_, seen) = tracker();
        seen.mark_seen("R", "q1", grade(5));
        seen.mark_seen("R", "q1", grade(5));
        assert_eq!(seen.device_seen(grade(5)), vec!["q1"]);
        assert_eq!(seen.session_seen("R"), vec!["q1"]);
    }

    #[test]
    fn scopes_clear_independently() {
        let (_, seen) = tracker();
        seen.mark_seen("R", "q1", grade(5));
        seen.clear_device_seen(grade(5));
        assert!(seen.device_seen(grade(5)).is_empty());
        assert_eq!(seen.session_seen("R"), vec!["q1"]);

        seen.mark_seen("R", "q2", grade(5));
        seen.clear_session_seen("R");
        assert!(seen.session_seen("R").is_empty());
        assert_eq!(seen.device_seen(grade(5)), vec!["q2"]);
    }

    #[test]
    fn grades_are_independent() {
        let (_, seen) = tracker();
        seen.mark_seen("R", "q1", grade(1));
        seen.mark_seen("R", "q2", grade(2));
        assert_eq!(seen.device_seen(grade(1)), vec!["q1"]);
        assert_eq!(seen.device_seen(grade(2)), vec!["q2"]);
        assert_eq!(seen.all_seen("R", grade(1)).len(), 2);
    }

    #[test]
    fn malformed_json_reads_as_empty() {
        let (storage, seen) = tracker();
        storage
            .items
            .lock()
            .unwrap()
            .insert("seen_questions_grade_5".into(), "{not json".into());
        assert!(seen.device_seen(grade(5)).is_empty());

        // A fresh mark overwrites the corrupt value.
        seen.mark_seen("R", "q9", grade(5));
        assert_eq!(seen.device_seen(grade(5)), vec!["q9"]);
    }

    #[test]
    fn storage_failure_fails_open() {
        let (storage, seen) = tracker();
        storage.failing.store(true, Ordering::SeqCst);
        seen.mark_seen("R", "q1", grade(5));
        assert!(seen.device_seen(grade(5)).is_empty());
        assert!(seen.all_seen("R", grade(5)).is_empty());
    }
}
