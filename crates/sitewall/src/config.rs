//! sitewall Configuration
//!
//! Loaded from TOML; every field has a default, so a missing file or a
//! partial file is fine.
//!
//! ```toml
//! storage_path = "/home/me/.local/share/sitewall/storage.json"
//!
//! [extension]
//! id = "sitewall"
//! blocked_page = "/blocked.html"
//!
//! [rules]
//! priority = 1
//! max_rules = 5000
//!
//! [logging]
//! level = "info"
//! ```

use serde::{Deserialize, Serialize};
use sitewall_core::{BLOCKED_PAGE_PATH, DEFAULT_RULE_PRIORITY, EXTENSION_SCHEME, ExtensionOrigin, SyncConfig};
use sitewall_network::{MAX_DYNAMIC_RULES, RuleSetConfig};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "sitewall";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    /// Extension id, the host part of bundled page URLs
    pub id: String,
    pub scheme: String,
    /// Extension path of the page blocked navigations land on
    pub blocked_page: String,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            id: APP_DIR.to_string(),
            scheme: EXTENSION_SCHEME.to_string(),
            blocked_page: BLOCKED_PAGE_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub priority: u32,
    pub max_rules: usize,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            priority: DEFAULT_RULE_PRIORITY,
            max_rules: MAX_DYNAMIC_RULES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` wins when set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage_path: PathBuf,
    pub extension: ExtensionConfig,
    pub rules: RulesConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            extension: ExtensionConfig::default(),
            rules: RulesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("storage.json")
}

/// `<config dir>/sitewall/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

impl Config {
    /// Load from an explicit path (must exist) or the default path (optional)
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_toml_file(&path)?,
                None => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Load from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rules.priority == 0 {
            return Err(ConfigError::Invalid("rules.priority must be at least 1".into()));
        }
        if self.rules.max_rules == 0 {
            return Err(ConfigError::Invalid("rules.max_rules must be at least 1".into()));
        }
        if !self.extension.blocked_page.starts_with('/') {
            return Err(ConfigError::Invalid(
                "extension.blocked_page must start with '/'".into(),
            ));
        }
        if self.extension.id.is_empty() || self.extension.scheme.is_empty() {
            return Err(ConfigError::Invalid(
                "extension.id and extension.scheme must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn origin(&self) -> ExtensionOrigin {
        ExtensionOrigin {
            scheme: self.extension.scheme.clone(),
            id: self.extension.id.clone(),
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            priority: self.rules.priority,
            blocked_page: self.extension.blocked_page.clone(),
        }
    }

    pub fn rule_set_config(&self) -> RuleSetConfig {
        RuleSetConfig {
            max_rules: self.rules.max_rules,
        }
    }
}
