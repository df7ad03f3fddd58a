//! Bridge configuration
//!
//! Defaults, `HOSTBRIDGE_*` environment overrides and optional TOML files
//! for the reflection cache, the future table and the callback registry.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Class and member lookup
    pub lookup: LookupConfig,

    /// Future table
    pub futures: FuturesConfig,

    /// Completion callbacks
    pub callbacks: CallbacksConfig,
}

impl BridgeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source using the environment
    /// variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        config.apply(&lookup);
        config
    }

    /// Load configuration from TOML file
    #[cfg(feature = "toml-config")]
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from TOML file (stub when toml feature is disabled)
    #[cfg(not(feature = "toml-config"))]
    pub fn from_file(_path: &PathBuf) -> anyhow::Result<Self> {
        anyhow::bail!("TOML support not enabled. Enable the 'toml-config' feature.")
    }

    /// Save configuration to TOML file
    #[cfg(feature = "toml-config")]
    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Save configuration to TOML file (stub when toml feature is disabled)
    #[cfg(not(feature = "toml-config"))]
    pub fn save_to_file(&self, _path: &PathBuf) -> anyhow::Result<()> {
        anyhow::bail!("TOML support not enabled. Enable the 'toml-config' feature.")
    }

    /// Merge with environment variables (env vars take precedence)
    pub fn merge_with_env(mut self) -> Self {
        self.apply(&|key| std::env::var(key).ok());
        self
    }

    /// File (if any) merged with the environment.
    pub fn load(config_file: Option<&PathBuf>) -> anyhow::Result<Self> {
        let config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.merge_with_env())
    }

    fn apply(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        self.lookup.apply(lookup);
        self.futures.apply(lookup);
        self.callbacks.apply(lookup);
    }
}

/// Lookup configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Log every member resolution at debug level
    pub log_members: bool,

    /// Fall back to definition blobs when a type is not on the lookup path
    pub search_definition_blobs: bool,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            log_members: false,
            search_definition_blobs: true,
        }
    }
}

impl LookupConfig {
    fn apply(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("HOSTBRIDGE_LOG_MEMBERS") {
            self.log_members = val.parse().unwrap_or(true);
        }

        if let Some(val) = lookup("HOSTBRIDGE_SEARCH_DEFINITION_BLOBS") {
            self.search_definition_blobs = val.parse().unwrap_or(true);
        }
    }
}

/// Future table configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuturesConfig {
    /// Timeout for blocking waits (0 = wait forever)
    pub default_wait_timeout_ms: u64,

    /// Remember the most recent future per function index
    pub keep_last_results: bool,
}

impl Default for FuturesConfig {
    fn default() -> Self {
        Self {
            default_wait_timeout_ms: 0,
            keep_last_results: true,
        }
    }
}

impl FuturesConfig {
    /// `None` when waits are unbounded.
    pub fn wait_timeout(&self) -> Option<Duration> {
        (self.default_wait_timeout_ms > 0)
            .then(|| Duration::from_millis(self.default_wait_timeout_ms))
    }

    fn apply(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("HOSTBRIDGE_WAIT_TIMEOUT_MS") {
            self.default_wait_timeout_ms = val.parse().unwrap_or(0);
        }

        if let Some(val) = lookup("HOSTBRIDGE_KEEP_LAST_RESULTS") {
            self.keep_last_results = val.parse().unwrap_or(true);
        }
    }
}

/// Callback registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbacksConfig {
    /// API identifier used when a call site does not name one
    pub default_api_identifier: String,

    /// Cancel every pending completion on the last terminate
    pub cancel_on_terminate: bool,
}

impl Default for CallbacksConfig {
    fn default() -> Self {
        Self {
            default_api_identifier: "app".to_owned(),
            cancel_on_terminate: true,
        }
    }
}

impl CallbacksConfig {
    fn apply(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("HOSTBRIDGE_DEFAULT_API")
            && !val.is_empty()
        {
            self.default_api_identifier = val;
        }

        if let Some(val) = lookup("HOSTBRIDGE_CANCEL_ON_TERMINATE") {
            self.cancel_on_terminate = val.parse().unwrap_or(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_owned())
        }
    }

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert!(!config.lookup.log_members);
        assert!(config.lookup.search_definition_blobs);
        assert!(config.futures.keep_last_results);
        assert_eq!(config.futures.wait_timeout(), None);
        assert_eq!(config.callbacks.default_api_identifier, "app");
        assert!(config.callbacks.cancel_on_terminate);
    }

    #[test]
    fn test_lookup_overrides() {
        let config = BridgeConfig::from_lookup(vars(&[
            ("HOSTBRIDGE_LOG_MEMBERS", "true"),
            ("HOSTBRIDGE_SEARCH_DEFINITION_BLOBS", "false"),
            ("HOSTBRIDGE_WAIT_TIMEOUT_MS", "250"),
            ("HOSTBRIDGE_DEFAULT_API", "storage"),
            ("HOSTBRIDGE_CANCEL_ON_TERMINATE", "false"),
        ]));
        assert!(config.lookup.log_members);
        assert!(!config.lookup.search_definition_blobs);
        assert_eq!(
            config.futures.wait_timeout(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.callbacks.default_api_identifier, "storage");
        assert!(!config.callbacks.cancel_on_terminate);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let config = BridgeConfig::from_lookup(vars(&[
            ("HOSTBRIDGE_LOG_MEMBERS", "yes"),
            ("HOSTBRIDGE_WAIT_TIMEOUT_MS", "soon"),
            ("HOSTBRIDGE_DEFAULT_API", ""),
        ]));
        assert!(config.lookup.log_members);
        assert_eq!(config.futures.default_wait_timeout_ms, 0);
        assert_eq!(config.callbacks.default_api_identifier, "app");
    }

    #[test]
    #[cfg(feature = "toml-config")]
    fn test_config_serialization() {
        let mut config = BridgeConfig::default();
        config.futures.default_wait_timeout_ms = 1500;
        let toml = toml::to_string(&config).unwrap();
        let deserialized: BridgeConfig = toml::from_str(&toml).unwrap();
        assert_eq!(config, deserialized);

        let partial: BridgeConfig = toml::from_str("[lookup]\nlog_members = true\n").unwrap();
        assert!(partial.lookup.log_members);
        assert!(partial.futures.keep_last_results);
    }

    #[test]
    #[cfg(not(feature = "toml-config"))]
    fn test_file_loading_needs_feature() {
        let path = PathBuf::from("hostbridge.toml");
        assert!(BridgeConfig::from_file(&path).is_err());
        assert!(BridgeConfig::default().save_to_file(&path).is_err());
    }
}
