//! Room persistence and timer recovery.
//!
//! A room is one document in the [`DocumentStore`], keyed by its shareable
//! code. Rooms are created once, loaded (with timer recovery) on resume, and
//! updated only through field-level merges so concurrent partial updates
//! compose instead of clobbering each other.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RoomError, StoreError};
use crate::model::{Grade, Level};
use crate::traits::{Clock, DocumentStore};

/// Current room document schema.
pub const SCHEMA_VERSION: u32 = 1;

/// Countdown budget for a fresh room.
pub const DEFAULT_TIME_ALLOWANCE_SECS: u32 = 3600;

/// Longest absence charged against the countdown on resume.
pub const INACTIVITY_THRESHOLD: Duration = Duration::from_secs(5 * 60);

const CODE_WORDS: &[&str] = &[
    "PI", "SUM", "PLUS", "MINUS", "TRIANGLE", "SQUARE", "CIRCLE", "ROOT", "PRIME", "LOGIC",
    "BRAIN", "SMART", "MATH", "STAR", "BLUE", "SUN", "MOON", "FAST", "OPEN", "WISE", "QUICK",
    "COOL", "BRIGHT", "GOLD", "TEAM", "SOLVE", "STEP", "PATH", "GOAL", "PEAK",
];

const CREATE_ATTEMPTS: usize = 5;

// ---------------------------------------------------------------------------
// Room codes
// ---------------------------------------------------------------------------

/// Shareable room code of the form `WORD-WORD-NN`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode(String);

impl RoomCode {
    /// Draw a fresh code from the word list.
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let first = CODE_WORDS.choose(rng).copied().unwrap_or("MATH");
        let second = CODE_WORDS.choose(rng).copied().unwrap_or("STAR");
        let number: u8 = rng.gen_range(10..=99);
        Self(format!("{first}-{second}-{number}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomCode {
    type Err = String;

    /// Accepts `[A-Z]+-[A-Z]+-[0-9]{2}`, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_uppercase();
        let parts: Vec<&str> = code.split('-').collect();
        let valid = match parts.as_slice() {
            [a, b, n] => {
                !a.is_empty()
                    && !b.is_empty()
                    && a.chars().all(|c| c.is_ascii_uppercase())
                    && b.chars().all(|c| c.is_ascii_uppercase())
                    && n.len() == 2
                    && n.chars().all(|c| c.is_ascii_digit())
            }
            _ => false,
        };
        if valid {
            Ok(Self(code))
        } else {
            Err(format!("invalid room code '{s}', expected WORD-WORD-NN"))
        }
    }
}

// ---------------------------------------------------------------------------
// Room document
// ---------------------------------------------------------------------------

/// One confirmed answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_id: String,
    pub answer: String,
    pub is_correct: bool,
    /// Wall-clock ms when the answer was confirmed.
    #[serde(rename = "timestamp", alias = "timestampMs")]
    pub timestamp_ms: i64,
}

/// Durable session state for one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRoom {
    pub schema_version: u32,
    pub room_code: String,
    pub grade: Grade,
    pub current_level: Level,
    pub streak: i32,
    /// Question on screen, or `None` when the selector must pick next.
    pub current_question_id: Option<String>,
    pub score: u32,
    pub answers: Vec<AnswerRecord>,
    pub remaining_seconds: u32,
    pub last_interaction_at: i64,
    pub created_at: DateTime<Utc>,
    /// Set when the last write of this room failed. The next sync then
    /// writes the whole room instead of just the patch.
    #[serde(skip)]
    unsynced: bool,
}

impl SessionRoom {
    /// A fresh room with the full time allowance and empty history.
    pub fn fresh(code: &RoomCode, grade: Grade, time_allowance_secs: u32, now_ms: i64) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            room_code: code.to_string(),
            grade,
            current_level: Level::MIN,
            streak: 0,
            current_question_id: None,
            score: 0,
            answers: Vec::new(),
            remaining_seconds: time_allowance_secs,
            last_interaction_at: now_ms,
            created_at: millis_to_datetime(now_ms),
            unsynced: false,
        }
    }

    /// Whether the store is known to be behind the local copy.
    pub fn is_unsynced(&self) -> bool {
        self.unsynced
    }

    /// Ids answered in this room, in order, possibly repeated.
    pub fn answered_ids(&self) -> impl Iterator<Item = &str> {
        self.answers.iter().map(|a| a.question_id.as_str())
    }

    pub fn correct_count(&self) -> u32 {
        self.answers.iter().filter(|a| a.is_correct).count() as u32
    }

    /// Apply a patch to the local copy.
    pub fn apply(&mut self, patch: &RoomPatch) {
        if let Some(level) = patch.current_level {
            self.current_level = level;
        }
        if let Some(streak) = patch.streak {
            self.streak = streak;
        }
        if let Some(current) = &patch.current_question_id {
            self.current_question_id = current.clone();
        }
        if let Some(score) = patch.score {
            self.score = score;
        }
        if let Some(answers) = &patch.answers {
            self.answers = answers.clone();
        }
        if let Some(remaining) = patch.remaining_seconds {
            self.remaining_seconds = remaining;
        }
        if let Some(at) = patch.last_interaction_at {
            self.last_interaction_at = at;
        }
    }
}

/// A partial room update. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_level: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streak: Option<i32>,
    /// `Some(None)` clears the in-flight question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_question_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answers: Option<Vec<AnswerRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_interaction_at: Option<i64>,
}

impl RoomPatch {
    /// The patch as top-level document fields.
    pub fn to_fields(&self) -> Result<Map<String, Value>, StoreError> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(fields),
            other => Err(StoreError::Serialization(format!(
                "room patch encoded as {other}, expected an object"
            ))),
        }
    }
}

/// Lenient view of a stored room, tolerating fields missing from older
/// or partially written records.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRoom {
    #[serde(default)]
    schema_version: Option<u32>,
    #[serde(default)]
    grade: Option<u8>,
    #[serde(default)]
    current_level: Option<i64>,
    #[serde(default)]
    streak: Option<i32>,
    #[serde(default)]
    current_question_id: Option<String>,
    #[serde(default)]
    answers: Option<Vec<AnswerRecord>>,
    #[serde(default)]
    remaining_seconds: Option<i64>,
    #[serde(default)]
    last_interaction_at: Option<i64>,
    #[serde(default)]
    created_at: Option<Value>,
}

impl StoredRoom {
    fn into_room(
        self,
        code: &str,
        time_allowance_secs: u32,
        now_ms: i64,
    ) -> Result<SessionRoom, RoomError> {
        let corrupt = |reason: String| RoomError::Corrupt {
            code: code.to_string(),
            reason,
        };
        let grade = self
            .grade
            .ok_or_else(|| corrupt("missing grade".into()))
            .and_then(|g| Grade::try_from(g).map_err(corrupt))?;

        let answers = self.answers.unwrap_or_default();
        let score = answers.iter().filter(|a| a.is_correct).count() as u32;
        let last_interaction_at = self.last_interaction_at.unwrap_or(now_ms);

        Ok(SessionRoom {
            schema_version: self.schema_version.unwrap_or(SCHEMA_VERSION),
            room_code: code.to_string(),
            grade,
            current_level: Level::clamped(self.current_level.unwrap_or(1)),
            streak: self.streak.unwrap_or(0),
            current_question_id: self.current_question_id.filter(|id| !id.is_empty()),
            score,
            answers,
            remaining_seconds: self
                .remaining_seconds
                .map(|s| s.clamp(0, u32::MAX as i64) as u32)
                .unwrap_or(time_allowance_secs),
            last_interaction_at,
            created_at: self
                .created_at
                .as_ref()
                .and_then(parse_created_at)
                .unwrap_or_else(|| millis_to_datetime(last_interaction_at)),
            unsynced: false,
        })
    }
}

fn parse_created_at(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().map(millis_to_datetime),
        _ => None,
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Timer recovery
// ---------------------------------------------------------------------------

/// Recompute the countdown for a room resumed after an absence.
///
/// Only the first `threshold` of the absence is charged; longer gaps are
/// treated as a pause. Never returns less than zero.
pub fn recover_remaining(
    stored_remaining: u32,
    last_interaction_ms: i64,
    now_ms: i64,
    threshold: Duration,
) -> u32 {
    let elapsed_ms = now_ms.saturating_sub(last_interaction_ms).max(0) as u64;
    let active_ms = elapsed_ms.min(threshold.as_millis() as u64);
    let charged = (active_ms / 1000).min(u32::MAX as u64) as u32;
    stored_remaining.saturating_sub(charged)
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Settings for room creation and recovery.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub time_allowance_secs: u32,
    pub inactivity_threshold: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            time_allowance_secs: DEFAULT_TIME_ALLOWANCE_SECS,
            inactivity_threshold: INACTIVITY_THRESHOLD,
        }
    }
}

/// Create, load and merge-update rooms.
#[derive(Clone)]
pub struct RoomRepository {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    config: RoomConfig,
}

impl RoomRepository {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, config: RoomConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Allocate a code and write a fresh room.
    ///
    /// Write failures are logged and the room is returned anyway; the
    /// session carries on locally and the next successful sync fills in the
    /// document.
    pub async fn create(&self, grade: Grade) -> SessionRoom {
        let code = self.allocate_code().await;
        let mut room = SessionRoom::fresh(
            &code,
            grade,
            self.config.time_allowance_secs,
            self.clock.now_ms(),
        );

        match serde_json::to_value(&room) {
            Ok(doc) => match self.store.set(code.as_str(), doc).await {
                Ok(()) => tracing::info!("created room {code} for grade {grade}"),
                Err(e) => {
                    tracing::error!("failed to persist new room {code}: {e}");
                    room.unsynced = true;
                }
            },
            Err(e) => {
                tracing::error!("failed to encode new room {code}: {e}");
                room.unsynced = true;
            }
        }
        room
    }

    /// Load a room and apply timer recovery.
    pub async fn load(&self, code: &str) -> Result<SessionRoom, RoomError> {
        let doc = self
            .store
            .get(code)
            .await?
            .ok_or_else(|| RoomError::NotFound(code.to_string()))?;

        let stored: StoredRoom =
            serde_json::from_value(doc).map_err(|e| RoomError::Corrupt {
                code: code.to_string(),
                reason: e.to_string(),
            })?;

        let now = self.clock.now_ms();
        let mut room = stored.into_room(code, self.config.time_allowance_secs, now)?;
        let recovered = recover_remaining(
            room.remaining_seconds,
            room.last_interaction_at,
            now,
            self.config.inactivity_threshold,
        );
        tracing::info!(
            "loaded room {code}: level {}, {} answers, {}s -> {}s remaining",
            room.current_level,
            room.answers.len(),
            room.remaining_seconds,
            recovered
        );
        room.remaining_seconds = recovered;
        Ok(room)
    }

    /// Stamp `patch` with the current time, apply it to `room`, and merge it
    /// into the stored document.
    ///
    /// Every write carries the local remaining time next to the new
    /// timestamp, so a recovered countdown is never written back uncharged.
    /// After a failed write the whole room is written with `set`, which
    /// restores the document even if its initial create never landed. The local copy is
    /// updated even when the remote write fails.
    pub async fn sync(
        &self,
        room: &mut SessionRoom,
        mut patch: RoomPatch,
    ) -> Result<(), StoreError> {
        patch.last_interaction_at = Some(self.clock.now_ms());
        patch.remaining_seconds.get_or_insert(room.remaining_seconds);
        room.apply(&patch);

        let result = if room.unsynced {
            tracing::debug!("room {} is behind, writing it in full", room.room_code);
            let doc = serde_json::to_value(&*room)?;
            self.store.set(&room.room_code, doc).await
        } else {
            let fields = patch.to_fields()?;
            self.store.merge(&room.room_code, fields).await
        };
        room.unsynced = result.is_err();
        result
    }

    async fn allocate_code(&self) -> RoomCode {
        let mut code = RoomCode::generate(&mut rand::thread_rng());
        for _ in 1..CREATE_ATTEMPTS {
            match self.store.get(code.as_str()).await {
                Ok(Some(_)) => {
                    tracing::debug!("room code {code} already taken, drawing another");
                    code = RoomCode::generate(&mut rand::thread_rng());
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("could not check room code {code}: {e}");
                    break;
                }
            }
        }
        code
    }
}
