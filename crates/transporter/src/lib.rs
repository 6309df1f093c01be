//! # Transporter
//!
//! One record-stream interface over any backend that stores IoT Things.
//!
//! ## Overview
//!
//! A Thing is an entity identified by an `id`, its data split into named
//! bands (`meta`, `model`, `istate`, `ostate`, `connection`). Every
//! backend is reached through the same [`Transporter`] handle: seven
//! operations, each returning a lazy, cancellable stream of results.
//!
//! - **Contract**: [`Transporter`], derived `one`/`all` via [`TransporterExt`]
//! - **Channels**: [`channel`] and [`unchannel`] map `(id, band)` to flat paths
//! - **Access**: [`Access`] filters reads and refuses writes without touching
//!   the wrapped handle
//! - **Sync**: [`bind`] wires two Transporters together once, [`monitor`]
//!   keeps one replicating into another
//! - **Registry**: [`Registry`] builds Transporters from tagged entries
//!
//! ## Usage
//!
//! ```rust,no_run
//! use futures::TryStreamExt;
//! use serde_json::json;
//! use transporter::{bind, BindingRules, Registry, Request, TransporterExt};
//!
//! async fn example() -> transporter::Result<()> {
//!     let registry = Registry::default();
//!     let primary = registry.create("core").await?;
//!     let secondary = registry.create("core").await?;
//!
//!     let binding = bind(primary.clone(), secondary, BindingRules::default())?;
//!
//!     primary
//!         .put(Request::for_band("lamp", "ostate").value(json!({ "on": true })))?
//!         .try_collect::<Vec<_>>()
//!         .await?;
//!
//!     let things: Vec<_> = binding.secondary().all(Request::new())?.try_collect().await?;
//!     println!("{} things", things.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `transporter::core` - Record types, errors, streams, channel codec
//! - `transporter::store` - The Transporter contract and the memory backend
//! - `transporter::access` - The access decorator and band policies
//! - `transporter::sync` - `bind` and `monitor`

pub mod config;
pub mod error;
pub mod registry;

// Re-export component crates
pub use transporter_access as access;
pub use transporter_core as core;
pub use transporter_store as store;
pub use transporter_sync as sync;

// Re-export main types for convenience
pub use config::{default_entries, RegistryConfig, RegistryEntry};
pub use error::ConfigError;
pub use registry::{Connector, Context, MakeFn, Registry};

pub use transporter_access::{Access, AccessPolicy, BandGrants, BandScope, Restrict};
pub use transporter_core::{
    channel, unchannel, Bands, ChannelConfig, Document, Record, RecordStream, Request, Result,
    Thing, ThingRef, TransportError,
};
pub use transporter_store::{
    memory, Backend, MemoryBackend, SharedTransporter, Transport, Transporter, TransporterExt,
};
pub use transporter_sync::{
    bind, monitor, BandSelection, Binding, BindingRules, Monitor, MonitorOptions,
};
