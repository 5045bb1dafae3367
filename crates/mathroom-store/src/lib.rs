//! mathroom-store - Storage backends and configuration.
//!
//! Implements the `DocumentStore`, `DeviceStorage` and `QuestionSource`
//! traits from `mathroom-core` for in-memory, file and REST backends, and
//! loads the TOML configuration that picks between them.

pub mod bank;
pub mod config;
pub mod file;
pub mod memory;
pub mod rest;

pub use bank::BankQuestionSource;
pub use config::{
    create_device_storage, create_document_store, load_config, load_config_from, MathroomConfig,
    StoreConfig,
};
