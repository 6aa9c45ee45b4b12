//! AutoTweak Configuration
//!
//! Configuration lives in /etc/autotweak/config.toml, or wherever
//! `$AUTOTWEAK_CONFIG` points. Every field has a default, so a missing
//! file or a missing section is never an error.

use crate::backup_store::DEFAULT_BACKUP_SUFFIX;
use crate::host::DEFAULT_SYSFS_ROOT;
use crate::journal::DEFAULT_JOURNAL_PATH;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// System configuration file
pub const SYSTEM_CONFIG_PATH: &str = "/etc/autotweak/config.toml";

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "AUTOTWEAK_CONFIG";

/// Default log directory
pub const DEFAULT_LOG_DIR: &str = "/var/log/autotweak";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Journal settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default = "default_journal_path")]
    pub path: PathBuf,
}

fn default_journal_path() -> PathBuf {
    PathBuf::from(DEFAULT_JOURNAL_PATH)
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: default_journal_path(),
        }
    }
}

/// Backup settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Appended to a config file's path to name its backup
    #[serde(default = "default_backup_suffix")]
    pub suffix: String,
}

fn default_backup_suffix() -> String {
    DEFAULT_BACKUP_SUFFIX.to_string()
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            suffix: default_backup_suffix(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_DIR)
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
        }
    }
}

/// Where live system state is found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from(DEFAULT_SYSFS_ROOT)
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            sysfs_root: default_sysfs_root(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoTweakConfig {
    #[serde(default)]
    pub journal: JournalConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub system: SystemConfig,
}

impl AutoTweakConfig {
    /// Config file location, honouring `$AUTOTWEAK_CONFIG`
    pub fn config_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(SYSTEM_CONFIG_PATH))
    }

    /// Load configuration, falling back to defaults on any problem
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    /// Load configuration from `path`
    ///
    /// A missing file yields the defaults; unreadable or malformed ones are errors.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
