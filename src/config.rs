//! Configuration management for Tollgate.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TollgateError};
use crate::ratelimit::LimiterSettings;

/// Prefix of environment variables overriding file settings,
/// e.g. `TOLLGATE__LIMITER__RATE=10`.
const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for a Tollgate client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Bucket configuration
    #[serde(default)]
    pub limiter: LimiterSection,

    /// Shared store configuration
    #[serde(default)]
    pub store: StoreSection,
}

/// Bucket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterSection {
    /// Name of the shared bucket
    #[serde(default = "default_identity")]
    pub identity: String,

    /// Tokens added per second
    #[serde(default = "default_rate")]
    pub rate: f64,

    /// Maximum bucket capacity
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for LimiterSection {
    fn default() -> Self {
        Self {
            identity: default_identity(),
            rate: default_rate(),
            burst: default_burst(),
        }
    }
}

fn default_identity() -> String {
    "default".to_string()
}

fn default_rate() -> f64 {
    5.0
}

fn default_burst() -> u32 {
    12
}

/// Shared store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSection {
    /// Redis connection URL; the in-memory store is used when unset
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl LimiterSection {
    /// Get the rate and burst as limiter settings.
    pub fn settings(&self) -> LimiterSettings {
        LimiterSettings {
            rate: self.rate,
            burst: self.burst,
        }
    }
}

impl TollgateConfig {
    /// Load configuration from an optional file, then `TOLLGATE__*`
    /// environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path, "Loading configuration file");
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: TollgateConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TollgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TollgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration before a limiter is built from it.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.identity.is_empty() {
            return Err(TollgateError::Config(
                "limiter.identity must not be empty".to_string(),
            ));
        }
        self.limiter.settings().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TollgateConfig::default();
        assert_eq!(config.limiter.identity, "default");
        assert_eq!(config.limiter.rate, 5.0);
        assert_eq!(config.limiter.burst, 12);
        assert!(config.store.redis_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
limiter:
  identity: checkout
  rate: 0.5
  burst: 60
store:
  redis_url: redis://127.0.0.1:6379
"#;
        let config = TollgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.identity, "checkout");
        assert_eq!(config.limiter.rate, 0.5);
        assert_eq!(config.limiter.burst, 60);
        assert_eq!(
            config.store.redis_url.as_deref(),
            Some("redis://127.0.0.1:6379")
        );
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = TollgateConfig::from_yaml("limiter:\n  identity: api\n").unwrap();
        assert_eq!(config.limiter.identity, "api");
        assert_eq!(config.limiter.rate, 5.0);
        assert_eq!(config.limiter.burst, 12);
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let err = TollgateConfig::from_yaml("limiter:\n  rate: 0\n").unwrap_err();
        assert!(matches!(err, TollgateError::InvalidLimit(_)));

        let err = TollgateConfig::from_yaml("limiter:\n  burst: 0\n").unwrap_err();
        assert!(matches!(err, TollgateError::InvalidLimit(_)));

        let err = TollgateConfig::from_yaml("limiter:\n  identity: \"\"\n").unwrap_err();
        assert!(matches!(err, TollgateError::Config(_)));
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        let err = TollgateConfig::from_yaml("limiter: [").unwrap_err();
        assert!(matches!(err, TollgateError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("tollgate-{}.yaml", std::process::id()));
        std::fs::write(&path, "limiter:\n  identity: files\n  rate: 2.5\n  burst: 7\n").unwrap();

        let config = TollgateConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.limiter.identity, "files");
        assert_eq!(config.limiter.rate, 2.5);
        assert_eq!(config.limiter.burst, 7);
    }
}
