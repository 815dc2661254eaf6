//! Service configuration.
//!
//! One JSON file with every switch the core consumes. `init` (first boot)
//! writes the defaults; `daemon` loads them. Unknown keys are rejected so a
//! typo'd switch fails loudly instead of silently defaulting.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Config {
    /// Bind address for the transport layer (outside the core).
    pub host: String,
    /// Bind port for the transport layer (outside the core).
    pub port: u16,
    /// The media server's library database file.
    pub database_path: PathBuf,
    /// Directory for service-owned state (the action log database).
    pub metadata_path: PathBuf,
    /// Log verbosity: trace, debug, info, warn or error.
    pub log_level: String,
    /// Consumed by the preview-thumbnail layer (outside the core).
    pub preview_thumbnails: bool,
    /// Consumed by the launcher (outside the core).
    pub auto_open: bool,
    /// Enables the action log and the whole purge surface.
    pub backup_actions: bool,
    /// Enables the in-memory breakdown cache; off means stats queries scan
    /// the library database directly.
    pub extended_marker_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3392,
            database_path: PathBuf::new(),
            metadata_path: PathBuf::from("."),
            log_level: "info".to_string(),
            preview_thumbnails: true,
            auto_open: false,
            backup_actions: true,
            extended_marker_stats: true,
        }
    }
}

impl Config {
    /// Load and parse the config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).or_raise(|| ErrorKind::Io)?;
        serde_json::from_str(&raw).or_raise(|| ErrorKind::Config("malformed config file"))
    }

    /// First-boot setup: write the default config. Refuses to clobber an
    /// existing file.
    pub fn write_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            exn::bail!(ErrorKind::Config("config file already exists"));
        }
        let config = Self::default();
        let raw = serde_json::to_string_pretty(&config).or_raise(|| ErrorKind::Config("unserializable defaults"))?;
        std::fs::write(path, raw).or_raise(|| ErrorKind::Io)?;
        Ok(config)
    }

    /// Where the action log database lives.
    pub fn actions_db_path(&self) -> PathBuf {
        self.metadata_path.join("cuemark.db")
    }

    /// Default tracing filter derived from `log_level`.
    pub fn env_filter(&self) -> String {
        let level = &self.log_level;
        format!("cuemark_service={level},cuemark_engine={level},cuemark_media={level},cuemark_actions={level}")
    }
}
