//! # Transporter Store
//!
//! The backend-neutral record-stream contract. Callers hold a
//! [`Transporter`]; backends implement the [`Backend`] primitives and get
//! argument validation, the single-error guarantee, and the derived
//! operations for free by being wrapped in a [`Transport`].
//!
//! ## Key Types
//!
//! - [`Backend`] - The primitive layer; unimplemented primitives fail with `NotImplemented`
//! - [`Transporter`] - The capability handle every layer speaks
//! - [`Transport`] - Validating Transporter over any backend
//! - [`TransporterExt`] - `one` and `all`, derived from the primitives
//! - [`MemoryBackend`] - In-memory backend for the `core` transporter and tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use futures::TryStreamExt;
//! use serde_json::json;
//! use transporter_core::Request;
//! use transporter_store::{memory, Transporter, TransporterExt};
//!
//! async fn example() -> transporter_core::Result<()> {
//!     let transport = memory();
//!
//!     transport
//!         .put(Request::for_band("lamp", "ostate").value(json!({ "on": true })))?
//!         .try_collect::<Vec<_>>()
//!         .await?;
//!
//!     let things: Vec<_> = transport.all(Request::new())?.try_collect().await?;
//!     assert_eq!(things.len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Lazy**: nothing happens until a returned stream is polled
//! - **Independent**: every poll-loop is its own subscription, nothing is replayed
//! - **Cancellable**: dropping a stream stops the work behind it

pub mod base;
pub mod memory;
pub mod traits;

pub use base::{Transport, Unimplemented, UseRules, Using};
pub use memory::{memory, MemoryBackend};
pub use traits::{Backend, SharedTransporter, Transporter, TransporterExt};
