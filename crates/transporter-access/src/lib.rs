//! # Transporter Access
//!
//! Read/write authorization around any Transporter.
//!
//! ## Overview
//!
//! [`Access`] wraps a Transporter with two predicates. Discovery and change
//! streams are filtered element by element; `get` and `bands` are checked
//! against the read predicate and `put`/`delete` against the write
//! predicate before anything reaches the wrapped handle. A violation turns
//! into an immediately failing stream.
//!
//! Wrapping never touches the wrapped handle: other holders of it keep
//! seeing the unrestricted Transporter.
//!
//! ## Policies
//!
//! - [`BandGrants`] - Per-user readable and writable bands
//! - [`Restrict`] - Limit reads to `out_bands` and writes to `in_bands`
//!
//! ## Usage
//!
//! ```rust
//! use transporter_access::{Access, BandGrants, BandScope};
//! use transporter_store::memory;
//!
//! let grants = BandGrants::new()
//!     .grant_read("alice", BandScope::All)
//!     .grant_write("alice", BandScope::only(["ostate"]));
//!
//! let guarded = Access::with_policy(memory(), grants).into_shared();
//! ```

pub mod access;
pub mod grant;

pub use access::{Access, AccessPolicy};
pub use grant::{BandGrants, BandScope, Grant, Restrict};
