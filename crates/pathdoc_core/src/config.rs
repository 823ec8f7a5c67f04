//! Core runtime configuration.
//!
//! # Responsibility
//! - Describe where the database lives and how logging starts.
//! - Load settings from a JSON file and overlay `PATHDOC_*` variables.
//!
//! # Invariants
//! - Missing file fields fall back to [`CoreConfig::default`].
//! - Environment values win over file values.

use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const ENV_DB_PATH: &str = "PATHDOC_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "PATHDOC_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "PATHDOC_LOG_DIR";

const DEFAULT_DB_FILE: &str = "pathdoc.sqlite3";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "invalid config `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}

/// Settings for opening the store and starting logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// SQLite database file; `None` keeps everything in memory.
    pub db_path: Option<PathBuf>,
    pub log_level: String,
    /// Absolute log directory; `None` leaves logging off.
    pub log_dir: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: Some(PathBuf::from(DEFAULT_DB_FILE)),
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl CoreConfig {
    /// Reads a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlays `PATHDOC_*` process variables.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlays values from `lookup`; empty values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(db_path) = lookup(ENV_DB_PATH) {
            self.db_path = (db_path != ":memory:").then(|| PathBuf::from(db_path));
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(log_dir) = lookup(ENV_LOG_DIR) {
            self.log_dir = Some(PathBuf::from(log_dir));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{CoreConfig, ConfigError, ENV_DB_PATH, ENV_LOG_DIR, ENV_LOG_LEVEL};
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn file_fields_fall_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "log_level": "warn" }}"#).unwrap();

        let config = CoreConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.db_path, CoreConfig::default().db_path);
        assert_eq!(config.log_dir, None);
    }

    #[test]
    fn invalid_json_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = CoreConfig::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn overrides_win_and_memory_marker_clears_db_path() {
        let vars: HashMap<&str, &str> = [
            (ENV_DB_PATH, ":memory:"),
            (ENV_LOG_LEVEL, "trace"),
            (ENV_LOG_DIR, "/var/log/pathdoc"),
        ]
        .into_iter()
        .collect();

        let config =
            CoreConfig::default().with_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.db_path, None);
        assert_eq!(config.log_level, "trace");
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/pathdoc")));
    }

    #[test]
    fn blank_override_is_ignored() {
        let config = CoreConfig::default().with_overrides(|key| {
            (key == ENV_LOG_LEVEL).then(|| "   ".to_string())
        });
        assert_eq!(config, CoreConfig::default());
    }
}
