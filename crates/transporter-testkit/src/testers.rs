//! Drain Transporter streams while logging every item.
//!
//! Each `log_*` function consumes a stream, logs one `tracing` event per
//! item (`info`), one for the error if any (`warn`) and one for the end,
//! then hands back what it collected. The canned operations below fill in
//! a sample Thing for whatever the request leaves out.

use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use serde_json::{json, Value};
use transporter_core::{Bands, Record, RecordStream, Request, Result, Thing, ThingRef};
use transporter_store::{SharedTransporter, TransporterExt};

/// The Thing the canned operations address by default.
pub const SAMPLE_ID: &str = "MyThingID";

/// The band the canned operations address by default.
pub const SAMPLE_BAND: &str = "meta";

async fn drain<T, F>(what: &str, mut stream: RecordStream<T>, describe: F) -> Result<Vec<T>>
where
    T: Send + 'static,
    F: Fn(&T) -> String,
{
    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(item) => {
                tracing::info!(what, "+ {}", describe(&item));
                items.push(item);
            }
            Err(error) => {
                tracing::warn!(what, code = error.code(), "# {error}");
                return Err(error);
            }
        }
    }
    tracing::info!(what, "+ <end>");
    Ok(items)
}

/// Log whole items.
pub async fn log_raw<T>(what: &str, stream: RecordStream<T>) -> Result<Vec<T>>
where
    T: Debug + Send + 'static,
{
    drain(what, stream, |item| format!("{item:?}")).await
}

/// Log discovered ids.
pub async fn log_ids(what: &str, stream: RecordStream<ThingRef>) -> Result<Vec<ThingRef>> {
    drain(what, stream, |thing| thing.id.clone()).await
}

/// Log `id/band` for every band of every descriptor.
pub async fn log_bands(what: &str, stream: RecordStream<Bands>) -> Result<Vec<Bands>> {
    drain(what, stream, |bands| {
        bands
            .bands
            .iter()
            .map(|band| format!("{}/{}", bands.id, band))
            .collect::<Vec<_>>()
            .join(" ")
    })
    .await
}

/// Log `id/band/value`.
pub async fn log_values(what: &str, stream: RecordStream<Record>) -> Result<Vec<Record>> {
    drain(what, stream, |record| {
        let value = record
            .value
            .as_ref()
            .map(|value| Value::Object(value.clone()).to_string())
            .unwrap_or_else(|| "null".to_string());
        format!("{}/{}/{}", record.id, record.band, value)
    })
    .await
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

fn with_sample_key(mut request: Request) -> Request {
    request.id.get_or_insert_with(|| SAMPLE_ID.to_string());
    request.band.get_or_insert_with(|| SAMPLE_BAND.to_string());
    request
}

/// Put, defaulting to a sample person in `MyThingID/meta`.
pub async fn put(
    transport: &SharedTransporter,
    request: Request,
    tag: Option<&str>,
) -> Result<Vec<Record>> {
    let mut request = with_sample_key(request);
    request.value.get_or_insert_with(|| {
        json!({
            "first": "David",
            "last": "Smith",
            "now": now_millis(),
        })
    });
    log_values(tag.unwrap_or("put"), transport.put(request)?).await
}

/// Get, defaulting to `MyThingID/meta`.
pub async fn get(
    transport: &SharedTransporter,
    request: Request,
    tag: Option<&str>,
) -> Result<Vec<Record>> {
    log_values(tag.unwrap_or("get"), transport.get(with_sample_key(request))?).await
}

pub async fn list(transport: &SharedTransporter) -> Result<Vec<ThingRef>> {
    log_ids("list", transport.list(Request::new())?).await
}

/// Bands, defaulting to `MyThingID`.
pub async fn bands(
    transport: &SharedTransporter,
    mut request: Request,
    tag: Option<&str>,
) -> Result<Vec<Bands>> {
    request.id.get_or_insert_with(|| SAMPLE_ID.to_string());
    log_bands(tag.unwrap_or("bands"), transport.bands(request)?).await
}

/// Log the first `limit` change events. `updated` never ends on its own.
pub async fn updated(
    transport: &SharedTransporter,
    request: Request,
    tag: Option<&str>,
    limit: usize,
) -> Result<Vec<Record>> {
    let events = transport.updated(request)?.take(limit).boxed();
    log_values(tag.unwrap_or("updated"), events).await
}

pub async fn all(
    transport: &SharedTransporter,
    request: Request,
    tag: Option<&str>,
) -> Result<Vec<Thing>> {
    log_raw(tag.unwrap_or("all"), transport.all(request)?).await
}
