use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::transport::WireFormat;

/// Errors loading a worker configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Worker configuration. Every key is optional in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Framing used by the stdio transport.
    pub format: WireFormat,
    /// Number of recent job durations kept for latency stats.
    pub latency_window: usize,
    /// Log a stats line every this many jobs (0 disables).
    pub log_every: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            format: WireFormat::Json,
            latency_window: 64,
            log_every: 100,
        }
    }
}

impl WorkerConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.latency_window == 0 {
            return Err(ConfigError::Invalid(
                "latency_window must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.format, WireFormat::Json);
        assert_eq!(config.latency_window, 64);
        assert_eq!(config.log_every, 100);
    }

    #[test]
    fn missing_keys_take_defaults() {
        let config = WorkerConfig::from_yaml_str("format: cbor\n").unwrap();
        assert_eq!(config.format, WireFormat::Cbor);
        assert_eq!(config.latency_window, 64);
    }

    #[test]
    fn full_config_parses() {
        let config =
            WorkerConfig::from_yaml_str("format: json\nlatency_window: 8\nlog_every: 0\n").unwrap();
        assert_eq!(
            config,
            WorkerConfig {
                format: WireFormat::Json,
                latency_window: 8,
                log_every: 0,
            }
        );
    }

    #[test]
    fn zero_window_rejected() {
        assert!(matches!(
            WorkerConfig::from_yaml_str("latency_window: 0\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn unknown_format_rejected() {
        assert!(matches!(
            WorkerConfig::from_yaml_str("format: xml\n"),
            Err(ConfigError::Yaml(_))
        ));
    }
}
