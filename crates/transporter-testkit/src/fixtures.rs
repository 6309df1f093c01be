//! Test fixtures and helpers.
//!
//! Common setup code for unit and integration tests.

use std::future::Future;
use std::time::Duration;

use serde_json::{json, Value};
use transporter_core::{first, Document, Request, TIMESTAMP_KEY};
use transporter_store::{memory, SharedTransporter};

/// How often [`eventually`] and [`await_value`] poll.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How many times they poll before giving up.
pub const POLL_ATTEMPTS: usize = 200;

/// Two independent in-memory Transporters.
pub struct TestFixture {
    pub primary: SharedTransporter,
    pub secondary: SharedTransporter,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            primary: memory(),
            secondary: memory(),
        }
    }

    /// Seed the primary with one sample Thing per name, `meta` and `ostate`
    /// bands filled in.
    pub async fn with_things(names: &[&str]) -> Self {
        let fixture = Self::new();
        for name in names {
            seed(&fixture.primary, name, "meta", sample_value(name)).await;
            seed(&fixture.primary, name, "ostate", json!({ "on": false })).await;
        }
        fixture
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A small `meta` document.
pub fn sample_value(name: &str) -> Value {
    json!({
        "schema:name": name,
        "iot:facet": ["iot-facet:lighting"],
    })
}

/// `value` with an `@timestamp` version marker.
pub fn stamped(mut value: Value, timestamp: &str) -> Value {
    if let Some(document) = value.as_object_mut() {
        document.insert(TIMESTAMP_KEY.to_string(), Value::from(timestamp));
    }
    value
}

/// Put one band and wait for the write to be accepted.
///
/// # Panics
///
/// If the put is refused.
pub async fn seed(transport: &SharedTransporter, id: &str, band: &str, value: Value) {
    let request = Request::for_band(id, band).value(value);
    first(transport.put(request).expect("valid put"))
        .await
        .expect("put failed");
}

/// Read one band's value; `None` when absent.
///
/// # Panics
///
/// If the get fails.
pub async fn read(transport: &SharedTransporter, id: &str, band: &str) -> Option<Document> {
    first(transport.get(Request::for_band(id, band)).expect("valid get"))
        .await
        .expect("get failed")
        .and_then(|record| record.value)
}

/// Poll `condition` until it holds. Returns false if it never did.
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..POLL_ATTEMPTS {
        if condition().await {
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    false
}

/// Poll until a band has a value, for writes made by background relays.
pub async fn await_value(transport: &SharedTransporter, id: &str, band: &str) -> Option<Document> {
    for _ in 0..POLL_ATTEMPTS {
        if let Some(value) = read(transport, id, band).await {
            return Some(value);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    None
}
