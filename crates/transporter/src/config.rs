//! Registry configuration.
//!
//! A registry is configured with a list of entries, each naming a backend
//! and the settings to build it with:
//!
//! ```json
//! {
//!     "transporters": [
//!         {
//!             "tag": "mirror",
//!             "transporter": "memory",
//!             "initd": { "inline_updates": true },
//!             "out_bands": ["meta", "ostate"]
//!         }
//!     ]
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use transporter_core::Document;

use crate::error::ConfigError;

/// Constructor used when an entry names none.
pub const DEFAULT_MAKE: &str = "make";

fn default_make() -> String {
    DEFAULT_MAKE.to_string()
}

/// How to build one Transporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// The name the entry is looked up by.
    pub tag: String,

    /// The registered backend to build it with.
    pub transporter: String,

    /// Which of the backend's constructors to call.
    #[serde(default = "default_make")]
    pub make: String,

    /// Connection hook run before the constructor, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect: Option<String>,

    /// Backend settings.
    #[serde(default)]
    pub initd: Document,

    /// Bands that may be written through the Transporter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_bands: Option<Vec<String>>,

    /// Bands that may be read through the Transporter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_bands: Option<Vec<String>>,
}

impl RegistryEntry {
    pub fn new(tag: impl Into<String>, transporter: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            transporter: transporter.into(),
            make: default_make(),
            connect: None,
            initd: Document::new(),
            in_bands: None,
            out_bands: None,
        }
    }

    pub fn with_make(mut self, make: impl Into<String>) -> Self {
        self.make = make.into();
        self
    }

    pub fn with_connect(mut self, connect: impl Into<String>) -> Self {
        self.connect = Some(connect.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.initd.insert(key.into(), value.into());
        self
    }

    pub fn with_in_bands<I, S>(mut self, bands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.in_bands = Some(bands.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_out_bands<I, S>(mut self, bands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.out_bands = Some(bands.into_iter().map(Into::into).collect());
        self
    }

    /// True if the entry limits the bands it exchanges.
    pub fn is_restricted(&self) -> bool {
        self.in_bands.is_some() || self.out_bands.is_some()
    }
}

/// The built-in entries, consulted after any configured ones.
///
/// - `core`: an in-memory Transporter
/// - `persist`: the file-system backend under `.iotdb/things`, exposing
///   every canonical band but accepting writes to `meta` and `ostate` only
pub fn default_entries() -> Vec<RegistryEntry> {
    vec![
        RegistryEntry::new("core", "memory"),
        RegistryEntry::new("persist", "fs")
            .with_setting("prefix", ".iotdb/things")
            .with_out_bands(["meta", "model", "connection", "istate", "ostate"])
            .with_in_bands(["meta", "ostate"]),
    ]
}

/// Configured registry entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub transporters: Vec<RegistryEntry>,
}

impl RegistryConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}
