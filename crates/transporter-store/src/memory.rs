//! In-memory implementation of the Backend trait.
//!
//! Keeps every Thing in a map and announces changes on a broadcast
//! channel. It backs the `core` registry entry and most tests. Nothing is
//! persisted; all data is lost when the last handle is dropped.

use std::collections::BTreeMap;
use std::future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use transporter_core::{
    document_timestamp, single, Bands, Document, Filter, Record, RecordStream, Result, ThingRef,
    TransportError,
};

use crate::base::Transport;
use crate::traits::{Backend, SharedTransporter};

/// Buffered change events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
enum Event {
    Added(String),
    Updated(Record),
}

type Things = BTreeMap<String, BTreeMap<String, Document>>;

struct MemoryState {
    things: RwLock<Things>,
    events: broadcast::Sender<Event>,
}

impl MemoryState {
    fn read(&self) -> Result<RwLockReadGuard<'_, Things>> {
        self.things
            .read()
            .map_err(|_| TransportError::internal("memory backend lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Things>> {
        self.things
            .write()
            .map_err(|_| TransportError::internal("memory backend lock poisoned"))
    }

    fn ids(&self) -> Result<Vec<String>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    fn load(&self, mut key: Record) -> Result<Record> {
        key.value = self
            .read()?
            .get(&key.id)
            .and_then(|bands| bands.get(&key.band))
            .cloned();
        Ok(key)
    }

    fn store(&self, record: Record, inline_updates: bool) -> Result<Record> {
        let Some(value) = record.value.clone() else {
            return Err(TransportError::invalid("put: 'value' is required"));
        };

        let is_new = {
            let mut things = self.write()?;

            let stored = things
                .get(&record.id)
                .and_then(|bands| bands.get(&record.band))
                .and_then(document_timestamp);
            if let (Some(stored), Some(incoming)) = (stored, record.timestamp()) {
                if stored > incoming {
                    return Err(TransportError::VersionConflict(format!(
                        "{}/{}: stored {} is newer than {}",
                        record.id, record.band, stored, incoming
                    )));
                }
            }

            let is_new = !things.contains_key(&record.id);
            things
                .entry(record.id.clone())
                .or_default()
                .insert(record.band.clone(), value);
            is_new
        };

        if is_new {
            self.publish(Event::Added(record.id.clone()));
        }
        let mut event = record.clone();
        if !inline_updates {
            event.value = None;
        }
        self.publish(Event::Updated(event));

        Ok(record)
    }

    /// Returns how many subscribers saw the event.
    fn publish(&self, event: Event) -> usize {
        match self.events.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::trace!("memory: no subscribers for event");
                0
            }
        }
    }

    fn bands(&self, thing: ThingRef) -> Result<Bands> {
        let things = self.read()?;
        let bands = things
            .get(&thing.id)
            .ok_or_else(|| TransportError::not_found(thing.id.clone()))?;

        Ok(Bands {
            id: thing.id,
            bands: bands.keys().cloned().collect(),
        })
    }

    fn remove(&self, thing: ThingRef) -> Result<ThingRef> {
        match self.write()?.remove(&thing.id) {
            Some(_) => Ok(thing),
            None => Err(TransportError::not_found(thing.id)),
        }
    }
}

/// In-memory backend.
///
/// Documents carrying an `@timestamp` marker are protected against stale
/// writes: a `put` older than the stored marker fails with
/// `VersionConflict`.
///
/// Subscriptions to `added` and `updated` register with the broadcast
/// channel when the stream is built, so events between building the stream
/// and first polling it are buffered rather than lost.
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<MemoryState>,
    inline_updates: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(MemoryState {
                things: RwLock::new(BTreeMap::new()),
                events,
            }),
            inline_updates: false,
        }
    }

    /// Carry the new value on `updated` events instead of just the key.
    pub fn with_inline_updates(mut self) -> Self {
        self.inline_updates = true;
        self
    }

    /// Number of Things currently stored.
    pub fn len(&self) -> usize {
        self.state.read().map(|things| things.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn subscribe(&self) -> BroadcastStream<Event> {
        BroadcastStream::new(self.state.events.subscribe())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn list(&self, filter: Filter) -> RecordStream<ThingRef> {
        let state = Arc::clone(&self.state);
        let user = filter.user;

        single(async move { state.ids() })
            .map_ok(move |ids| {
                let user = user.clone();
                stream::iter(ids.into_iter().map(move |id| {
                    Ok(ThingRef {
                        id,
                        user: user.clone(),
                    })
                }))
            })
            .try_flatten()
            .boxed()
    }

    fn added(&self, filter: Filter) -> RecordStream<ThingRef> {
        let user = filter.user;

        self.subscribe()
            .filter_map(move |event| {
                let item = match event {
                    Ok(Event::Added(id)) => Some(Ok(ThingRef {
                        id,
                        user: user.clone(),
                    })),
                    Ok(Event::Updated(_)) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "added: subscriber lagged");
                        None
                    }
                };
                future::ready(item)
            })
            .boxed()
    }

    fn updated(&self, filter: Filter) -> RecordStream<Record> {
        self.subscribe()
            .filter_map(move |event| {
                let item = match event {
                    Ok(Event::Updated(record)) if filter.matches(&record) => Some(Ok(record)),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "updated: subscriber lagged");
                        None
                    }
                };
                future::ready(item)
            })
            .boxed()
    }

    fn get(&self, key: Record) -> RecordStream<Record> {
        let state = Arc::clone(&self.state);
        single(async move { state.load(key) })
    }

    fn put(&self, record: Record) -> RecordStream<Record> {
        let state = Arc::clone(&self.state);
        let inline_updates = self.inline_updates;
        single(async move { state.store(record, inline_updates) })
    }

    fn bands(&self, thing: ThingRef) -> RecordStream<Bands> {
        let state = Arc::clone(&self.state);
        single(async move { state.bands(thing) })
    }

    fn delete(&self, thing: ThingRef) -> RecordStream<ThingRef> {
        let state = Arc::clone(&self.state);
        single(async move { state.remove(thing) })
    }
}

/// A fresh in-memory Transporter.
pub fn memory() -> SharedTransporter {
    Transport::shared(MemoryBackend::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{Transporter, TransporterExt};
    use serde_json::json;
    use transporter_core::stream::first;
    use transporter_core::{Request, TIMESTAMP_KEY};

    fn put_request(id: &str, band: &str, value: serde_json::Value) -> Request {
        Request::for_band(id, band).value(value)
    }

    #[tokio::test]
    async fn test_memory_put_get() {
        let transport = memory();

        let stored = first(
            transport
                .put(put_request("lamp", "meta", json!({ "name": "Lamp" })))
                .unwrap(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stored.id, "lamp");

        let record = first(transport.get(Request::for_band("lamp", "meta")).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.value.unwrap().get("name"), Some(&json!("Lamp")));
    }

    #[tokio::test]
    async fn test_memory_get_missing_is_absent_not_error() {
        let transport = memory();

        let record = first(transport.get(Request::for_band("ghost", "meta")).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.id, "ghost");
        assert!(record.value.is_none());
    }

    #[tokio::test]
    async fn test_memory_bands_missing_is_not_found() {
        let transport = memory();

        let result = first(transport.bands(Request::for_thing("ghost")).unwrap()).await;
        assert!(matches!(result, Err(TransportError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_memory_list_and_delete() {
        let transport = memory();
        for id in ["a", "b"] {
            first(transport.put(put_request(id, "meta", json!({}))).unwrap())
                .await
                .unwrap();
        }

        let ids: Vec<String> = transport
            .list(Request::new())
            .unwrap()
            .map_ok(|thing| thing.id)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

        first(transport.delete(Request::for_thing("a")).unwrap())
            .await
            .unwrap();
        let ids: Vec<ThingRef> = transport
            .list(Request::new())
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids, vec![ThingRef::new("b")]);
    }

    #[tokio::test]
    async fn test_memory_rejects_stale_timestamp() {
        let transport = memory();

        first(
            transport
                .put(put_request(
                    "a",
                    "ostate",
                    json!({ TIMESTAMP_KEY: "2016-08-02T00:00:00Z", "on": true }),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

        let stale = first(
            transport
                .put(put_request(
                    "a",
                    "ostate",
                    json!({ TIMESTAMP_KEY: "2016-08-01T00:00:00Z", "on": false }),
                ))
                .unwrap(),
        )
        .await;
        assert!(matches!(stale, Err(TransportError::VersionConflict(_))));

        let same = first(
            transport
                .put(put_request(
                    "a",
                    "ostate",
                    json!({ TIMESTAMP_KEY: "2016-08-02T00:00:00Z", "on": true }),
                ))
                .unwrap(),
        )
        .await;
        assert!(same.is_ok());
    }

    #[tokio::test]
    async fn test_memory_added_and_updated_events() {
        let transport = memory();
        let mut added = transport.added(Request::new()).unwrap();
        let mut updated = transport.updated(Request::new().band("meta")).unwrap();

        first(transport.put(put_request("a", "ostate", json!({}))).unwrap())
            .await
            .unwrap();
        first(transport.put(put_request("a", "meta", json!({ "x": 1 }))).unwrap())
            .await
            .unwrap();

        let thing = added.try_next().await.unwrap().unwrap();
        assert_eq!(thing.id, "a");

        let record = updated.try_next().await.unwrap().unwrap();
        assert_eq!(record.band, "meta");
        assert!(record.value.is_none());
    }

    #[tokio::test]
    async fn test_memory_inline_updates() {
        let transport = Transport::shared(MemoryBackend::new().with_inline_updates());
        let mut updated = transport.updated(Request::new()).unwrap();

        first(transport.put(put_request("a", "meta", json!({ "x": 1 }))).unwrap())
            .await
            .unwrap();

        let record = updated.try_next().await.unwrap().unwrap();
        assert_eq!(record.value.unwrap().get("x"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_one_merges_bands() {
        let transport = memory();
        first(transport.put(put_request("a", "meta", json!({ "name": "A" }))).unwrap())
            .await
            .unwrap();
        first(transport.put(put_request("a", "ostate", json!({ "on": true }))).unwrap())
            .await
            .unwrap();

        let thing = first(transport.one(Request::for_thing("a")).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(thing.id, "a");
        assert_eq!(thing.bands.len(), 2);
        assert_eq!(thing.band("ostate").unwrap().get("on"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_one_propagates_error() {
        let transport = memory();
        let result = first(transport.one(Request::for_thing("ghost")).unwrap()).await;
        assert!(matches!(result, Err(TransportError::NotFound(_))));

        assert!(matches!(
            transport.one(Request::new()),
            Err(TransportError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_all_yields_every_thing() {
        let transport = memory();
        for id in ["a", "b", "c"] {
            first(transport.put(put_request(id, "meta", json!({ "id": id }))).unwrap())
                .await
                .unwrap();
        }

        let mut ids: Vec<String> = transport
            .all(Request::new())
            .unwrap()
            .map_ok(|thing| thing.id)
            .try_collect()
            .await
            .unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_events_without_subscribers_are_dropped() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.state.publish(Event::Added("a".into())), 0);

        let feed = backend.subscribe();
        assert_eq!(backend.state.publish(Event::Added("a".into())), 1);
        drop(feed);

        // Storing still succeeds with nobody listening
        let transport = Transport::new(backend.clone());
        let stored = first(transport.put(put_request("b", "meta", json!({}))).unwrap())
            .await
            .unwrap();
        assert!(stored.is_some());
        assert_eq!(backend.len(), 1);
    }
}
