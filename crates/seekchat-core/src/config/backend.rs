use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::constants::storage;
use crate::error::{ChatError, Result};

/// A named group of string settings, as a host key-value store holds them.
pub type SettingsGroup = BTreeMap<String, String>;

/// Durable storage for settings groups, provided by the host.
pub trait SettingsBackend: Send + Sync {
    /// Read a group. A group that was never written is empty, not an error.
    fn read_group(&self, group: &str) -> Result<SettingsGroup>;

    /// Replace a group with `values`.
    fn write_group(&self, group: &str, values: &SettingsGroup) -> Result<()>;
}

/// Settings kept in a TOML file, one table per group.
pub struct TomlFileBackend {
    path: PathBuf,
}

impl TomlFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(storage::APP_DIR)
            .join(storage::SETTINGS_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<BTreeMap<String, SettingsGroup>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| {
            ChatError::Settings(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ChatError::Settings(format!("Failed to parse {}: {}", self.path.display(), e))
        })
    }
}

impl SettingsBackend for TomlFileBackend {
    fn read_group(&self, group: &str) -> Result<SettingsGroup> {
        let mut document = self.read_document()?;
        Ok(document.remove(group).unwrap_or_default())
    }

    fn write_group(&self, group: &str, values: &SettingsGroup) -> Result<()> {
        let mut document = match self.read_document() {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!("Replacing unreadable settings file: {}", e);
                BTreeMap::new()
            }
        };
        document.insert(group.to_string(), values.clone());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(&document)
            .map_err(|e| ChatError::Settings(e.to_string()))?;

        let tmp_path = self.path.with_extension("toml.tmp");
        fs::write(&tmp_path, content).map_err(|e| {
            ChatError::Settings(format!("Failed to write temporary settings file: {}", e))
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            ChatError::Settings(format!("Failed to rename settings file: {}", e))
        })?;
        Ok(())
    }
}

/// In-memory settings storage. Clones share the same groups, so a second
/// store built from a clone sees what the first one saved.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    groups: Arc<Mutex<BTreeMap<String, SettingsGroup>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsBackend for MemoryBackend {
    fn read_group(&self, group: &str) -> Result<SettingsGroup> {
        let groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(groups.get(group).cloned().unwrap_or_default())
    }

    fn write_group(&self, group: &str, values: &SettingsGroup) -> Result<()> {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        groups.insert(group.to_string(), values.clone());
        Ok(())
    }
}
