//! Configuration and store factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use mathroom_core::room::RoomConfig;
use mathroom_core::session::SessionConfig;
use mathroom_core::traits::{DeviceStorage, DocumentStore};

use crate::file::{FileDeviceStorage, FileDocumentStore};
use crate::memory::MemoryDocumentStore;
use crate::rest::{RestDocumentStore, DEFAULT_COLLECTION};

/// Where room documents are kept.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process memory; rooms vanish on exit.
    Memory,
    /// One JSON file per room.
    File {
        #[serde(default = "default_rooms_dir")]
        dir: PathBuf,
    },
    /// Remote HTTP document service.
    Rest {
        base_url: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_collection")]
        collection: String,
    },
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreConfig::Memory => f.write_str("Memory"),
            StoreConfig::File { dir } => f.debug_struct("File").field("dir", dir).finish(),
            StoreConfig::Rest {
                base_url,
                api_key,
                collection,
            } => f
                .debug_struct("Rest")
                .field("base_url", base_url)
                .field("api_key", &api_key.as_ref().map(|_| "***"))
                .field("collection", collection)
                .finish(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::File {
            dir: default_rooms_dir(),
        }
    }
}

/// Session timing, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_time_allowance")]
    pub time_allowance_secs: u32,
    #[serde(default = "default_inactivity_threshold")]
    pub inactivity_threshold_secs: u64,
    #[serde(default = "default_countdown_interval")]
    pub countdown_interval_secs: u64,
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            time_allowance_secs: default_time_allowance(),
            inactivity_threshold_secs: default_inactivity_threshold(),
            countdown_interval_secs: default_countdown_interval(),
            flush_interval_secs: default_flush_interval(),
        }
    }
}

impl SessionSettings {
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            room: RoomConfig {
                time_allowance_secs: self.time_allowance_secs,
                inactivity_threshold: Duration::from_secs(self.inactivity_threshold_secs),
            },
            countdown_interval: Duration::from_secs(self.countdown_interval_secs.max(1)),
            flush_interval: Duration::from_secs(self.flush_interval_secs.max(1)),
        }
    }
}

/// Top-level mathroom configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MathroomConfig {
    #[serde(default)]
    pub store: StoreConfig,
    /// File backing device-local storage (seen lists, last room code).
    #[serde(default = "default_device_storage")]
    pub device_storage: PathBuf,
    /// Bank file or directory of bank files.
    #[serde(default = "default_question_banks")]
    pub question_banks: PathBuf,
    #[serde(default)]
    pub session: SessionSettings,
}

fn default_rooms_dir() -> PathBuf {
    config_dir().join("rooms")
}
fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}
fn default_device_storage() -> PathBuf {
    config_dir().join("device.json")
}
fn default_question_banks() -> PathBuf {
    PathBuf::from("./question-banks")
}
fn default_time_allowance() -> u32 {
    3600
}
fn default_inactivity_threshold() -> u64 {
    300
}
fn default_countdown_interval() -> u64 {
    1
}
fn default_flush_interval() -> u64 {
    30
}

impl Default for MathroomConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            device_storage: default_device_storage(),
            question_banks: default_question_banks(),
            session: SessionSettings::default(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

fn resolve_path(path: &Path) -> PathBuf {
    PathBuf::from(resolve_env_vars(&path.to_string_lossy()))
}

/// Resolve env vars in a store config.
fn resolve_store_config(config: &StoreConfig) -> StoreConfig {
    match config {
        StoreConfig::Memory => StoreConfig::Memory,
        StoreConfig::File { dir } => StoreConfig::File {
            dir: resolve_path(dir),
        },
        StoreConfig::Rest {
            base_url,
            api_key,
            collection,
        } => StoreConfig::Rest {
            base_url: resolve_env_vars(base_url),
            api_key: api_key.as_ref().map(|k| resolve_env_vars(k)),
            collection: resolve_env_vars(collection),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `mathroom.toml` in the current directory
/// 2. `~/.config/mathroom/config.toml`
///
/// Environment variable overrides: `MATHROOM_STORE_URL`, `MATHROOM_API_KEY`.
pub fn load_config() -> Result<MathroomConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<MathroomConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("mathroom.toml");
        if local.exists() {
            Some(local)
        } else {
            let global = config_dir().join("config.toml");
            global.exists().then_some(global)
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<MathroomConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => MathroomConfig::default(),
    };

    apply_env_overrides(
        &mut config,
        std::env::var("MATHROOM_STORE_URL").ok(),
        std::env::var("MATHROOM_API_KEY").ok(),
    );

    config.store = resolve_store_config(&config.store);
    config.device_storage = resolve_path(&config.device_storage);
    config.question_banks = resolve_path(&config.question_banks);

    Ok(config)
}

fn apply_env_overrides(
    config: &mut MathroomConfig,
    store_url: Option<String>,
    api_key: Option<String>,
) {
    if let Some(url) = store_url.filter(|u| !u.is_empty()) {
        config.store = match std::mem::take(&mut config.store) {
            StoreConfig::Rest {
                api_key,
                collection,
                ..
            } => StoreConfig::Rest {
                base_url: url,
                api_key,
                collection,
            },
            _ => StoreConfig::Rest {
                base_url: url,
                api_key: None,
                collection: default_collection(),
            },
        };
    }

    if let Some(key) = api_key {
        if let StoreConfig::Rest { api_key, .. } = &mut config.store {
            *api_key = Some(key);
        }
    }
}

fn config_dir() -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(".config").join("mathroom"))
        .unwrap_or_else(|_| PathBuf::from(".mathroom"))
}

/// Create a document store from its configuration.
pub fn create_document_store(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryDocumentStore::new())),
        StoreConfig::File { dir } => Ok(Arc::new(FileDocumentStore::new(dir.clone()))),
        StoreConfig::Rest {
            base_url,
            api_key,
            collection,
        } => {
            if base_url.is_empty() {
                anyhow::bail!("rest store requires a base_url");
            }
            let store = RestDocumentStore::new(base_url, collection, api_key.clone())?;
            Ok(Arc::new(store))
        }
    }
}

/// Create the device-local storage named by the configuration.
pub fn create_device_storage(config: &MathroomConfig) -> Arc<dyn DeviceStorage> {
    Arc::new(FileDeviceStorage::new(config.device_storage.clone()))
}
