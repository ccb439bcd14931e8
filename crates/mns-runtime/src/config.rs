//! Client configuration loading.
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. `config/mns.{yaml,toml,json}` relative to the working directory, if present
//! 2. An explicit file passed to [`MnsConfig::load`], which must exist
//! 3. Environment variables prefixed `MNS__`, e.g. `MNS__ACCESS_KEY_SECRET`

use crate::error::ConfigurationError;
use crate::signer::SharedSecret;
use serde::Deserialize;
use std::path::Path;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

const DEFAULT_CONFIG_FILE: &str = "config/mns";
const ENV_PREFIX: &str = "MNS";

/// Connection settings for the message-queue service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MnsConfig {
    /// Service endpoint URL, passed through to the transport adapter
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub access_key_id: String,

    /// Shared secret used to sign envelopes
    #[serde(default)]
    pub access_key_secret: SharedSecret,
}

impl MnsConfig {
    /// Load configuration from the layered sources.
    ///
    /// A missing default file is fine. A missing explicit file, a malformed
    /// file or a value of the wrong type is an error.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = ::config::Config::builder()
            .add_source(::config::File::with_name(DEFAULT_CONFIG_FILE).required(false));

        if let Some(path) = explicit_path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })
    }

    /// Check that the configuration can sign envelopes
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.access_key_secret.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "access_key_secret".to_string(),
            });
        }

        if !self.endpoint.is_empty()
            && !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://"))
        {
            return Err(ConfigurationError::Invalid {
                message: format!("endpoint must be an http(s) URL, got '{}'", self.endpoint),
            });
        }

        Ok(())
    }
}
