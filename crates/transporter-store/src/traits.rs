//! The Transporter contract.
//!
//! A [`Backend`] supplies the seven primitive operations over already
//! validated input. A [`Transporter`] is the handle callers hold: it
//! accepts raw [`Request`]s, validates them eagerly, and hands back lazy
//! [`RecordStream`]s. [`TransporterExt`] derives `one` and `all` from the
//! primitives for every shared handle.

use std::sync::Arc;

use futures::future;
use futures::stream::{StreamExt, TryStreamExt};
use transporter_core::stream::first;
use transporter_core::{
    not_implemented, single, until_first_error, Bands, Filter, Record, RecordStream, Request,
    Result, Thing, ThingRef, TransportError,
};

/// How many per-id lookups `all` keeps in flight.
const ALL_CONCURRENCY: usize = 16;

/// The primitive layer a concrete backend implements.
///
/// Input has already been validated: `get` records carry no value, `put`
/// records always carry one. Every primitive left unimplemented fails each
/// subscriber with `NotImplemented`, so partial backends are fine.
///
/// Returned streams must not start work until polled.
pub trait Backend: Send + Sync + 'static {
    /// Every known id, then completion.
    fn list(&self, filter: Filter) -> RecordStream<ThingRef> {
        let _ = filter;
        not_implemented("list")
    }

    /// Ids as they first appear. Never completes on its own.
    fn added(&self, filter: Filter) -> RecordStream<ThingRef> {
        let _ = filter;
        not_implemented("added")
    }

    /// One event per band change, optionally with the new value inline.
    /// Never completes on its own.
    fn updated(&self, filter: Filter) -> RecordStream<Record> {
        let _ = filter;
        not_implemented("updated")
    }

    /// At most one record; `value: None` when there is no content.
    fn get(&self, key: Record) -> RecordStream<Record> {
        let _ = key;
        not_implemented("get")
    }

    /// Store the record; yields the accepted record once on success.
    fn put(&self, record: Record) -> RecordStream<Record> {
        let _ = record;
        not_implemented("put")
    }

    /// The bands of one Thing.
    fn bands(&self, thing: ThingRef) -> RecordStream<Bands> {
        let _ = thing;
        not_implemented("bands")
    }

    /// Remove every band of a Thing; yields the removed id once on success.
    fn delete(&self, thing: ThingRef) -> RecordStream<ThingRef> {
        let _ = thing;
        not_implemented("delete")
    }
}

/// The record-stream capability handle.
///
/// Malformed input fails synchronously with `Invalid` before any stream
/// exists. Everything else is reported on the stream. Decorators implement
/// this trait by wrapping another handle, never by mutating it.
pub trait Transporter: Send + Sync {
    /// Enumerate all known ids. `id`, `band` and `value` are ignored.
    fn list(&self, filter: Request) -> Result<RecordStream<ThingRef>>;

    /// Ids as they appear. `id`, `band` and `value` are ignored.
    fn added(&self, filter: Request) -> Result<RecordStream<ThingRef>>;

    /// Band change events. `value` is ignored.
    fn updated(&self, filter: Request) -> Result<RecordStream<Record>>;

    /// Read one band. Requires `id` and `band`.
    fn get(&self, request: Request) -> Result<RecordStream<Record>>;

    /// Write one band. Requires `id`, `band` and a mapping `value`.
    fn put(&self, request: Request) -> Result<RecordStream<Record>>;

    /// Describe the bands of a Thing. Requires `id`.
    fn bands(&self, request: Request) -> Result<RecordStream<Bands>>;

    /// Remove a Thing. Requires `id`.
    fn delete(&self, request: Request) -> Result<RecordStream<ThingRef>>;
}

/// A Transporter handle shared across tasks.
pub type SharedTransporter = Arc<dyn Transporter>;

/// Operations derived from the primitives.
pub trait TransporterExt {
    /// Fetch every band of one Thing concurrently and merge them.
    ///
    /// Yields exactly one [`Thing`] or the first error; never a partial
    /// document.
    fn one(&self, request: Request) -> Result<RecordStream<Thing>>;

    /// `list`, then `one` for every id. Stops at the first error.
    fn all(&self, filter: Request) -> Result<RecordStream<Thing>>;
}

impl<T: Transporter + ?Sized + 'static> TransporterExt for Arc<T> {
    fn one(&self, request: Request) -> Result<RecordStream<Thing>> {
        let bands = self.bands(request.clone())?;
        let handle = Arc::clone(self);
        let id = request.id.unwrap_or_default();
        let user = request.user;

        Ok(single(fetch_thing(handle, bands, id, user)))
    }

    fn all(&self, filter: Request) -> Result<RecordStream<Thing>> {
        let list = self.list(filter)?;
        let handle = Arc::clone(self);

        let things = list
            .map(move |item| {
                let handle = Arc::clone(&handle);
                async move {
                    let thing = item?;
                    let id = thing.id.clone();
                    first(handle.one(thing.into())?)
                        .await?
                        .ok_or_else(|| TransportError::internal(format!("one: no result for {id}")))
                }
            })
            .buffer_unordered(ALL_CONCURRENCY);

        Ok(until_first_error(things.boxed()))
    }
}

async fn fetch_thing<T: Transporter + ?Sized>(
    handle: Arc<T>,
    bands: RecordStream<Bands>,
    id: String,
    user: Option<String>,
) -> Result<Thing> {
    let descriptors: Vec<Bands> = bands.try_collect().await?;

    let gets = descriptors
        .iter()
        .flat_map(|descriptor| descriptor.bands.iter())
        .map(|band| {
            let request = Request::for_band(id.clone(), band.clone()).maybe_user(user.clone());
            let handle = Arc::clone(&handle);
            async move { first(handle.get(request)?).await }
        });

    // try_join_all drops the remaining gets as soon as one fails
    let records = future::try_join_all(gets).await?;

    let mut thing = Thing::new(id);
    for record in records.into_iter().flatten() {
        if let Some(value) = record.value {
            thing.bands.insert(record.band, value);
        }
    }

    Ok(thing)
}
