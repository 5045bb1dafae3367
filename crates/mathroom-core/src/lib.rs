//! mathroom-core - Adaptive session engine.
//!
//! This crate defines the data model, the storage boundary traits, and the
//! three pieces that drive a session: the difficulty state machine, the
//! tiered question selector, and room persistence with timer recovery. The
//! session orchestrator ties them into a turn loop.

pub mod difficulty;
pub mod error;
pub mod model;
pub mod parser;
pub mod room;
pub mod scheduler;
pub mod seen;
pub mod selector;
pub mod session;
pub mod shuffle;
pub mod traits;
