use crate::error::{FerryError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level plugin configuration stored as TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FerryConfig {
    #[serde(default)]
    pub ferry: FerrySettings,
    #[serde(default = "AsyncActionConfig::backup_defaults")]
    pub backup_action: AsyncActionConfig,
    #[serde(default = "AsyncActionConfig::restore_defaults")]
    pub restore_action: AsyncActionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FerrySettings {
    /// SQLite database holding side records and other durable resources.
    #[serde(default = "default_record_db_path")]
    pub record_db_path: String,
    /// Root directory of the file-backed object store.
    #[serde(default = "default_object_store_root")]
    pub object_store_root: String,
}

impl Default for FerrySettings {
    fn default() -> Self {
        Self {
            record_db_path: default_record_db_path(),
            object_store_root: default_object_store_root(),
        }
    }
}

fn default_record_db_path() -> String {
    "records.db".to_string()
}

fn default_object_store_root() -> String {
    "/tmp/backups".to_string()
}

/// Directive annotation keys read and written by a v2 (async) item action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncActionConfig {
    /// Duration of the simulated operation. Item value overrides the parent's.
    pub duration_annotation: String,
    /// `"true"` on the item requests a tracked side record.
    pub additional_update_annotation: String,
    /// Counter on the side record, bumped on every progress poll.
    pub progress_annotation: String,
    /// Written on the item with the side record's name.
    pub record_annotation: String,
    /// Label put on every side record this action creates.
    pub record_label: String,
}

impl AsyncActionConfig {
    pub fn backup_defaults() -> Self {
        Self::with_prefix("example.io/example-bia")
    }

    pub fn restore_defaults() -> Self {
        Self::with_prefix("example.io/example-ria")
    }

    fn with_prefix(prefix: &str) -> Self {
        Self {
            duration_annotation: format!("{prefix}-operation-duration"),
            additional_update_annotation: format!("{prefix}-additional-update"),
            progress_annotation: format!("{prefix}-progress"),
            record_annotation: format!("{prefix}-secret"),
            record_label: prefix.to_string(),
        }
    }
}

impl FerryConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FerryError::ConfigNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| FerryError::TomlDe(e.to_string()))
    }

    /// Load config if the file exists, otherwise fall back to defaults rooted at `base_dir`.
    pub fn load_or_default(base_dir: &Path) -> Result<Self> {
        let path = Self::default_path(base_dir);
        if path.exists() {
            Self::load(&path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default_config(base_dir))
        }
    }

    /// Save config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| FerryError::TomlSer(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn default_config(base_dir: &Path) -> Self {
        Self {
            ferry: FerrySettings {
                record_db_path: base_dir.join("records.db").display().to_string(),
                object_store_root: default_object_store_root(),
            },
            backup_action: AsyncActionConfig::backup_defaults(),
            restore_action: AsyncActionConfig::restore_defaults(),
        }
    }

    /// Resolve the config file path: `<base_dir>/ferry.toml`
    pub fn default_path(base_dir: &Path) -> PathBuf {
        base_dir.join("ferry.toml")
    }

    /// Resolve the default config directory: `~/.ferry`
    pub fn default_base_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|h| h.join(".ferry"))
            .ok_or_else(|| FerryError::Config("Cannot determine home directory".to_string()))
    }
}

impl Default for FerryConfig {
    fn default() -> Self {
        Self {
            ferry: FerrySettings::default(),
            backup_action: AsyncActionConfig::backup_defaults(),
            restore_action: AsyncActionConfig::restore_defaults(),
        }
    }
}
