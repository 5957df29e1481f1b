//! Persistence for settings and the mute table.
//!
//! Both documents are small JSON files; every save rewrites the whole file.

use crate::Settings;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Coin -> mute expiry, as persisted.
pub type MuteTable = BTreeMap<String, DateTime<Utc>>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub trait SettingsStore: Send + Sync {
    fn load_settings(&self) -> Result<Settings, StoreError>;
    fn save_settings(&self, settings: &Settings) -> Result<(), StoreError>;
}

pub trait MuteStore: Send + Sync {
    fn load_mutes(&self) -> Result<MuteTable, StoreError>;
    fn save_mutes(&self, mutes: &MuteTable) -> Result<(), StoreError>;
}

/// `settings.json` and `muted_coins.json` in one data directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub const SETTINGS_FILE: &'static str = "settings.json";
    pub const MUTES_FILE: &'static str = "muted_coins.json";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T, StoreError> {
        let path = self.dir.join(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} not found, using defaults", path.display());
                return Ok(T::default());
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_str(&text).map_err(|source| StoreError::Json { path, source })
    }

    /// Write through a temp file so a crash never leaves half a document.
    fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| StoreError::Io { path, source }
        };

        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;

        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{}.tmp", name));
        let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&tmp, json).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_err(&path))?;
        Ok(())
    }
}

impl SettingsStore for JsonFileStore {
    /// Out-of-range values are replaced by defaults on load.
    fn load_settings(&self) -> Result<Settings, StoreError> {
        let mut settings: Settings = self.read(Self::SETTINGS_FILE)?;
        settings.sanitize();
        Ok(settings)
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        self.write(Self::SETTINGS_FILE, settings)
    }
}

impl MuteStore for JsonFileStore {
    fn load_mutes(&self) -> Result<MuteTable, StoreError> {
        self.read(Self::MUTES_FILE)
    }

    fn save_mutes(&self, mutes: &MuteTable) -> Result<(), StoreError> {
        self.write(Self::MUTES_FILE, mutes)
    }
}
