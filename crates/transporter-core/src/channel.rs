//! Channel codec: `(id, band)` keys to flat paths and back.
//!
//! Path-oriented backends (filesystem, MQTT topics, REST URLs) address
//! records as `prefix/id/band`. [`channel`] builds such a path and
//! [`unchannel`] parses one. Segments pass through a pluggable
//! [`SegmentCodec`] in both directions; the default is the identity.
//!
//! Runs of `/` collapse to one in both directions, so `a//b` and `a/b`
//! name the same channel.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

const SEPARATOR: char = '/';

/// Per-segment transform applied when building and parsing channels.
pub trait SegmentCodec: Send + Sync {
    fn encode(&self, segment: &str) -> String;
    fn decode(&self, segment: &str) -> String;
}

/// Leaves segments untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl SegmentCodec for Identity {
    fn encode(&self, segment: &str) -> String {
        segment.to_string()
    }

    fn decode(&self, segment: &str) -> String {
        segment.to_string()
    }
}

/// A codec built from a pair of functions.
pub struct FnCodec<E, D> {
    encode: E,
    decode: D,
}

impl<E, D> SegmentCodec for FnCodec<E, D>
where
    E: Fn(&str) -> String + Send + Sync,
    D: Fn(&str) -> String + Send + Sync,
{
    fn encode(&self, segment: &str) -> String {
        (self.encode)(segment)
    }

    fn decode(&self, segment: &str) -> String {
        (self.decode)(segment)
    }
}

fn identity_codec() -> Arc<dyn SegmentCodec> {
    Arc::new(Identity)
}

/// How a backend lays records out in its path namespace.
#[derive(Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Leading path shared by every channel.
    #[serde(default)]
    pub prefix: String,

    /// When set, every Thing has exactly this one band and channels stop at
    /// the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flat_band: Option<String>,

    /// Treat segments starting with `.` as invisible when parsing.
    #[serde(default)]
    pub skip_hidden: bool,

    #[serde(skip, default = "identity_codec")]
    codec: Arc<dyn SegmentCodec>,
}

impl ChannelConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn with_flat_band(mut self, band: impl Into<String>) -> Self {
        self.flat_band = Some(band.into());
        self
    }

    pub fn with_skip_hidden(mut self, skip_hidden: bool) -> Self {
        self.skip_hidden = skip_hidden;
        self
    }

    pub fn with_codec(mut self, codec: impl SegmentCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Use a pair of functions as the segment codec.
    pub fn with_fns<E, D>(self, encode: E, decode: D) -> Self
    where
        E: Fn(&str) -> String + Send + Sync + 'static,
        D: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.with_codec(FnCodec { encode, decode })
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            flat_band: None,
            skip_hidden: false,
            codec: identity_codec(),
        }
    }
}

impl fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("prefix", &self.prefix)
            .field("flat_band", &self.flat_band)
            .field("skip_hidden", &self.skip_hidden)
            .finish_non_exhaustive()
    }
}

/// The record key recovered from a channel. Both fields empty means the
/// path named no record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelKey {
    pub id: Option<String>,
    pub band: Option<String>,
}

impl ChannelKey {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.band.is_none()
    }
}

/// Build the channel for a record key.
///
/// A `band` without an `id` is ignored, producing the prefix alone.
pub fn channel(config: &ChannelConfig, id: Option<&str>, band: Option<&str>) -> String {
    let mut path = config.prefix.clone();

    if let Some(id) = id.filter(|id| !id.is_empty()) {
        path = join(&path, &config.codec.encode(id));

        if let Some(band) = band.filter(|band| !band.is_empty()) {
            if config.flat_band.is_none() {
                path = join(&path, &config.codec.encode(band));
            }
        }
    }

    collapse_separators(&path)
}

/// Parse a channel back into its record key.
///
/// Paths outside the prefix, the bare prefix, and paths with more than two
/// segments below it all yield an empty key.
pub fn unchannel(config: &ChannelConfig, path: &str) -> ChannelKey {
    let path = collapse_separators(path);
    let mut prefix = collapse_separators(&config.prefix);
    if prefix.len() > 1 && prefix.ends_with(SEPARATOR) {
        prefix.pop();
    }

    let Some(rest) = path.strip_prefix(prefix.as_str()) else {
        return ChannelKey::default();
    };

    // "/path" must not match "/pathology"
    let on_boundary = prefix.is_empty()
        || prefix.ends_with(SEPARATOR)
        || rest.is_empty()
        || rest.starts_with(SEPARATOR);
    if !on_boundary {
        return ChannelKey::default();
    }

    let segments: Vec<String> = rest
        .split(SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .map(|segment| config.codec.decode(segment))
        .collect();

    if segments.iter().any(String::is_empty) {
        return ChannelKey::default();
    }
    if config.skip_hidden && segments.iter().any(|segment| segment.starts_with('.')) {
        return ChannelKey::default();
    }

    let mut segments = segments.into_iter();
    match (segments.next(), segments.next(), segments.next()) {
        (Some(id), None, None) => ChannelKey {
            id: Some(id),
            band: config.flat_band.clone(),
        },
        (Some(id), Some(band), None) => ChannelKey {
            id: Some(id),
            band: Some(config.flat_band.clone().unwrap_or(band)),
        },
        _ => ChannelKey::default(),
    }
}

fn join(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{base}{SEPARATOR}{segment}")
    }
}

fn collapse_separators(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len());
    let mut previous_was_separator = false;

    for c in path.chars() {
        let is_separator = c == SEPARATOR;
        if !(is_separator && previous_was_separator) {
            collapsed.push(c);
        }
        previous_was_separator = is_separator;
    }

    collapsed
}
