//! A Transporter that counts the calls reaching it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use transporter_core::{Bands, Record, RecordStream, Request, Result, ThingRef};
use transporter_store::{SharedTransporter, Transporter};

/// Wraps a Transporter and counts every operation called on it.
///
/// Put it underneath a decorator to check what the decorator let through.
pub struct CountingTransporter {
    inner: SharedTransporter,
    calls: Mutex<BTreeMap<&'static str, usize>>,
}

impl CountingTransporter {
    pub fn new(inner: SharedTransporter) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: Mutex::new(BTreeMap::new()),
        })
    }

    /// How often `operation` was called.
    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(operation).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.values().sum())
            .unwrap_or(0)
    }

    fn count(&self, operation: &'static str) {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(operation).or_default() += 1;
        }
    }
}

impl Transporter for CountingTransporter {
    fn list(&self, filter: Request) -> Result<RecordStream<ThingRef>> {
        self.count("list");
        self.inner.list(filter)
    }

    fn added(&self, filter: Request) -> Result<RecordStream<ThingRef>> {
        self.count("added");
        self.inner.added(filter)
    }

    fn updated(&self, filter: Request) -> Result<RecordStream<Record>> {
        self.count("updated");
        self.inner.updated(filter)
    }

    fn get(&self, request: Request) -> Result<RecordStream<Record>> {
        self.count("get");
        self.inner.get(request)
    }

    fn put(&self, request: Request) -> Result<RecordStream<Record>> {
        self.count("put");
        self.inner.put(request)
    }

    fn bands(&self, request: Request) -> Result<RecordStream<Bands>> {
        self.count("bands");
        self.inner.bands(request)
    }

    fn delete(&self, request: Request) -> Result<RecordStream<ThingRef>> {
        self.count("delete");
        self.inner.delete(request)
    }
}
