//! Error types for registry configuration.

use std::path::PathBuf;

use thiserror::Error;
use transporter_core::TransportError;

/// Errors loading a registry configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid JSON for a registry.
    #[error("invalid registry configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<ConfigError> for TransportError {
    fn from(error: ConfigError) -> Self {
        TransportError::SetupRequired(error.to_string())
    }
}
