//! Error types for the session engine.
//!
//! Store errors are defined here rather than in `mathroom-store` so the
//! orchestrator can classify persistence failures without string matching.

use thiserror::Error;

/// Errors raised by a document store or device storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested document does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// A network error occurred.
    #[error("network error: {0}")]
    Network(String),

    /// The backend returned an error response.
    #[error("store error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Local filesystem failure.
    #[error("io error: {0}")]
    Io(String),
}

impl StoreError {
    /// Returns `true` if a later write could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Network(_) | StoreError::Timeout(_) => true,
            StoreError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Errors from loading or creating a room.
#[derive(Debug, Error)]
pub enum RoomError {
    /// No room is stored under this code (unknown or expired).
    #[error("room not found or expired: {0}")]
    NotFound(String),

    /// The stored document exists but cannot be decoded.
    #[error("room {code} is corrupt: {reason}")]
    Corrupt { code: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by the session orchestrator to its UI shell.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Resuming an unknown room; the shell should offer a fresh start.
    #[error("room not found or expired: {0}")]
    RoomNotFound(String),

    /// The question pool has nothing for this grade.
    #[error("no questions available for grade {grade}")]
    NoContent { grade: u8 },

    /// A selected question id is missing from the loaded pool.
    #[error("question not found in pool: {0}")]
    QuestionNotFound(String),

    /// An answer was submitted with no question on screen.
    #[error("no question is currently being shown")]
    NoActiveQuestion,

    /// The turn loop has already ended.
    #[error("session has finished")]
    Finished,

    /// The question source could not be read.
    #[error("failed to load questions: {0:#}")]
    Content(anyhow::Error),

    #[error(transparent)]
    Room(RoomError),
}

impl SessionError {
    /// Returns `true` if the shell can recover by starting a fresh room.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::RoomNotFound(_) | SessionError::Room(RoomError::Corrupt { .. })
        )
    }
}

impl From<RoomError> for SessionError {
    fn from(e: RoomError) -> Self {
        match e {
            RoomError::NotFound(code) => SessionError::RoomNotFound(code),
            other => SessionError::Room(other),
        }
    }
}
