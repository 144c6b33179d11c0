//! Component connection configuration.
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! address = "localhost:5347"
//! name = "bot.example.com"
//! shared_secret = "s3cr3t"
//! log_traffic = false
//! ```
//!
//! or from the `WADDLE_COMPONENT_*` environment variables.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ComponentError, Result};

/// Environment variable holding the server's component address.
pub const ENV_ADDRESS: &str = "WADDLE_COMPONENT_ADDRESS";
/// Environment variable holding the component name.
pub const ENV_NAME: &str = "WADDLE_COMPONENT_NAME";
/// Environment variable holding the shared secret.
pub const ENV_SECRET: &str = "WADDLE_COMPONENT_SECRET";
/// Environment variable enabling traffic logging (`1` or `true`).
pub const ENV_LOG_TRAFFIC: &str = "WADDLE_COMPONENT_LOG_TRAFFIC";

/// Settings for one component connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Server's component listener (`host:port`)
    pub address: String,
    /// Name the component authenticates as (e.g. `bot.example.com`)
    pub name: String,
    /// Secret shared with the server
    #[serde(skip_serializing)]
    pub shared_secret: String,
    /// Trace raw XML in both directions
    #[serde(default)]
    pub log_traffic: bool,
}

impl fmt::Debug for ComponentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentConfig")
            .field("address", &self.address)
            .field("name", &self.name)
            .field("shared_secret", &"[REDACTED]")
            .field("log_traffic", &self.log_traffic)
            .finish()
    }
}

impl ComponentConfig {
    pub fn new(
        address: impl Into<String>,
        name: impl Into<String>,
        shared_secret: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            shared_secret: shared_secret.into(),
            log_traffic: false,
        }
    }

    /// Enable or disable raw traffic tracing.
    pub fn with_traffic_log(mut self, enabled: bool) -> Self {
        self.log_traffic = enabled;
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| ComponentError::config(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ComponentError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loaded component configuration");
        Self::from_toml_str(&text)
    }

    /// Load from the `WADDLE_COMPONENT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ComponentError::config(format!("{key} is not set")))
        };

        let config = Self {
            address: required(ENV_ADDRESS)?,
            name: required(ENV_NAME)?,
            shared_secret: required(ENV_SECRET)?,
            log_traffic: lookup(ENV_LOG_TRAFFIC)
                .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that every required setting is present.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(ComponentError::config("address must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(ComponentError::config("name must not be empty"));
        }
        if self.shared_secret.is_empty() {
            return Err(ComponentError::config("shared_secret must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_toml() {
        let config = ComponentConfig::from_toml_str(
            r#"
            address = "localhost:5347"
            name = "bot.example.com"
            shared_secret = "s3cr3t"
            "#,
        )
        .unwrap();

        assert_eq!(config.address, "localhost:5347");
        assert_eq!(config.name, "bot.example.com");
        assert_eq!(config.shared_secret, "s3cr3t");
        assert!(!config.log_traffic);
    }

    #[test]
    fn test_missing_field() {
        let result = ComponentConfig::from_toml_str(r#"address = "localhost:5347""#);
        assert!(matches!(result, Err(ComponentError::Config(_))));
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        let config = ComponentConfig::new("localhost:5347", "bot.example.com", "");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ComponentConfig::new("localhost:5347", "bot.example.com", "s3cr3t");
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn test_secret_is_not_serialized() {
        let config = ComponentConfig::new("localhost:5347", "bot.example.com", "s3cr3t");
        let encoded = toml::to_string(&config).unwrap();
        assert!(!encoded.contains("s3cr3t"));
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_ADDRESS, "localhost:5347"),
            (ENV_NAME, "bot.example.com"),
            (ENV_SECRET, "s3cr3t"),
            (ENV_LOG_TRAFFIC, "true"),
        ]);
        let config = ComponentConfig::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.name, "bot.example.com");
        assert!(config.log_traffic);

        let result = ComponentConfig::from_lookup(|key| {
            (key != ENV_SECRET).then(|| "value".to_string())
        });
        assert!(matches!(result, Err(ComponentError::Config(msg)) if msg.contains(ENV_SECRET)));
    }
}
