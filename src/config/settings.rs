//! Application settings loading from config.toml
//!
//! Every section is optional; missing keys fall back to the defaults below.
//! The staging cache settings are handed to the cache at construction rather
//! than read from globals.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    /// Database URL; `DATABASE_URL` takes precedence
    pub database_url: Option<String>,
    /// Staging cache settings
    #[serde(default)]
    pub staging: StagingConfig,
    /// Planning dialogue settings
    #[serde(default)]
    pub dss: DssConfig,
}

/// Settings for the staging cache
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StagingConfig {
    /// Whether a cache backend is configured; `false` selects the no-op store
    pub enabled: bool,
    /// Lifetime of a staging record in seconds
    pub ttl_secs: u64,
    /// Prefix of every staging key
    pub key_prefix: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3 * 60 * 60,
            key_prefix: "dss:staging".to_string(),
        }
    }
}

impl StagingConfig {
    /// Record lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Settings for the planning dialogue
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DssConfig {
    /// Share of monthly income devoted to debt when a preview does not say
    pub default_debt_allocation_pct: f64,
    /// Simulation horizon for debt payoff
    pub max_payoff_months: u32,
}

impl Default for DssConfig {
    fn default() -> Self {
        Self {
            default_debt_allocation_pct: 0.2,
            max_payoff_months: 600,
        }
    }
}

/// Loads settings from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read or the TOML is invalid.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    parse_config(&contents)
}

/// Parses settings from TOML text.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads settings from ./config.toml, or defaults when the file does not exist.
pub fn load_default_config() -> Result<AppConfig> {
    let path = Path::new("config.toml");
    if path.exists() {
        load_config(path)
    } else {
        info!("No config.toml found, using default settings.");
        Ok(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            database_url = "sqlite::memory:"

            [staging]
            enabled = false
            ttl_secs = 60
            key_prefix = "test:staging"

            [dss]
            default_debt_allocation_pct = 0.3
            max_payoff_months = 120
        "#;

        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.database_url.as_deref(), Some("sqlite::memory:"));
        assert!(!config.staging.enabled);
        assert_eq!(config.staging.ttl(), Duration::from_secs(60));
        assert_eq!(config.staging.key_prefix, "test:staging");
        assert_eq!(config.dss.default_debt_allocation_pct, 0.3);
        assert_eq!(config.dss.max_payoff_months, 120);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = parse_config("").unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.staging, StagingConfig::default());
        assert_eq!(config.staging.ttl_secs, 10_800);
        assert_eq!(config.dss.default_debt_allocation_pct, 0.2);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = parse_config("[staging]\nttl_secs = 5\n").unwrap();
        assert!(config.staging.enabled);
        assert_eq!(config.staging.ttl_secs, 5);
        assert_eq!(config.staging.key_prefix, "dss:staging");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = parse_config("[staging\n");
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
