//! # Transporter Sync
//!
//! Keeps two Transporters in step.
//!
//! ## Overview
//!
//! - [`bind`] wires a secondary Transporter to a primary one once, per
//!   band and per mode: relay updates, redirect reads and discovery, copy
//!   existing Things across.
//! - [`monitor`] replicates everything a source produces into a
//!   destination and settles version conflicts by handing the newer value
//!   back to the older side.
//!
//! Both run their relays as tokio tasks owned by the returned handle.
//! Dropping the handle, or calling `shutdown`, tears every relay down at
//! once. Relay errors never escape: they are logged and the relay moves on
//! to the next record.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use transporter_store::memory;
//! use transporter_sync::{bind, BindingRules};
//!
//! async fn example() -> transporter_core::Result<()> {
//!     let (primary, secondary) = (memory(), memory());
//!     let binding = bind(primary, secondary, BindingRules::default())?;
//!
//!     // Reads through the bound handle are served by the primary
//!     let _mirror = binding.secondary();
//!
//!     binding.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Subscribe first**: every input stream is opened before `bind` or
//!   `monitor` returns, so nothing written afterwards is missed
//! - **No ordering across relays**: a record may be written twice (copy,
//!   then live update); puts of identical input are idempotent
//! - **Single hop**: a conflict is resolved by one write back, never merged

pub mod bind;
pub mod monitor;

pub use bind::{bind, BandSelection, Binding, BindingRules, BoundTransporter};
pub use monitor::{monitor, Monitor, MonitorOptions};
