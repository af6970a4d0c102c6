//! Configuration file loading for duelbox
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};

use crate::config::{Config, ConfigError};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.execution_timeout_seconds <= 0.0 {
            return Err(ConfigError::Invalid(
                "execution_timeout_seconds must be positive".to_string(),
            ));
        }
        if self.memory_limit_bytes == 0 {
            return Err(ConfigError::Invalid(
                "memory_limit_bytes must be positive".to_string(),
            ));
        }
        if self.max_code_length_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_code_length_bytes must be positive".to_string(),
            ));
        }
        if self.max_concurrent_executions == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_executions must be at least 1".to_string(),
            ));
        }
        if self.rating_tolerance < 0 {
            return Err(ConfigError::Invalid(
                "rating_tolerance cannot be negative".to_string(),
            ));
        }

        for (id, challenge) in &self.challenges {
            if challenge.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "challenge '{id}' has empty name"
                )));
            }
            if challenge.tests.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "challenge '{id}' has no test cases"
                )));
            }
        }

        Ok(())
    }
}
