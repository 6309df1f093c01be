//! # Transporter Testkit
//!
//! Testing utilities for Transporters.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: paired memory Transporters, seeding and reading helpers,
//!   and polling for values that arrive asynchronously
//! - **Generators**: Proptest strategies for channel segments, prefixes,
//!   documents and version markers
//! - **Testers**: drain a stream while logging every item through `tracing`
//! - **Counting**: a Transporter that records which operations reached it
//!
//! ## Test Fixtures
//!
//! ```rust
//! use serde_json::json;
//! use transporter_testkit::{read, seed, TestFixture};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let fixture = TestFixture::new();
//! seed(&fixture.primary, "lamp", "meta", json!({ "name": "Lamp" })).await;
//! assert!(read(&fixture.primary, "lamp", "meta").await.is_some());
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use transporter_core::{channel, unchannel, ChannelConfig};
//! use transporter_testkit::generators::{prefix, segment};
//!
//! proptest! {
//!     #[test]
//!     fn roundtrip(prefix in prefix(), id in segment(), band in segment()) {
//!         let config = ChannelConfig::new(prefix);
//!         let key = unchannel(&config, &channel(&config, Some(id.as_str()), Some(band.as_str())));
//!         prop_assert_eq!(key.id, Some(id));
//!     }
//! }
//! ```

pub mod counting;
pub mod fixtures;
pub mod generators;
pub mod testers;

pub use counting::CountingTransporter;
pub use fixtures::{await_value, eventually, read, sample_value, seed, stamped, TestFixture};

/// Route `tracing` output to the test harness.
///
/// Honours `RUST_LOG`. Safe to call from every test; only the first call
/// installs a subscriber.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
