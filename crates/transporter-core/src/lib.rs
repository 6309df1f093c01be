//! # Transporter Core
//!
//! Pure primitives shared by every Transporter: record types, the error
//! taxonomy, argument validation, stream helpers, and the channel codec.
//!
//! This crate contains no I/O and no backends. It is the vocabulary the
//! other crates speak.
//!
//! ## Key Types
//!
//! - [`Request`] - Dictionary-shaped input accepted by every operation
//! - [`Record`] - One band of one Thing, with or without a value
//! - [`ThingRef`] - Discovery event naming a Thing
//! - [`Thing`] - All bands of a Thing merged into one document
//! - [`TransportError`] - Typed failure categories with status codes
//! - [`RecordStream`] - Lazy, cancellable stream of results
//!
//! ## Channels
//!
//! Path-oriented backends map `(id, band)` onto a flat path namespace with
//! [`channel`] and back with [`unchannel`]. See the [`channel`](mod@channel)
//! module.

pub mod channel;
pub mod error;
pub mod stream;
pub mod types;
pub mod validation;

pub use channel::{channel, unchannel, ChannelConfig, ChannelKey, FnCodec, Identity, SegmentCodec};
pub use error::{Result, TransportError};
pub use stream::{fail, first, not_implemented, single, until_first_error, RecordStream};
pub use types::{
    document_timestamp, permit_all, Bands, Document, Filter, Record, RecordCheck, Request,
    Subject, Thing, ThingRef, CANONICAL_BANDS, TIMESTAMP_KEY,
};
