//! The default Transporter: validate, then forward to a [`Backend`].

use std::sync::Arc;

use transporter_core::validation::{
    validate_discovery, validate_get, validate_put, validate_thing, validate_updated,
};
use transporter_core::{
    until_first_error, Bands, Filter, Record, RecordStream, Request, Result, ThingRef,
};

use crate::traits::{Backend, SharedTransporter, Transporter};

/// A Transporter backed by a pluggable primitive layer.
///
/// Arguments are validated before the backend is called. Every backend
/// stream is cut off after its first error, so callers see at most one.
pub struct Transport<B: Backend> {
    backend: B,
}

impl<B: Backend> Transport<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Build a shareable handle.
    pub fn shared(backend: B) -> SharedTransporter {
        Arc::new(Self::new(backend))
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Serve the primitives `rules` selects from `source`'s backend instead
    /// of this one. Validation still happens here.
    pub fn using<S: Backend>(self, source: S, rules: UseRules) -> Transport<Using<B, S>> {
        Transport::new(Using {
            local: self.backend,
            source,
            rules,
        })
    }
}

impl<B: Backend> Transporter for Transport<B> {
    fn list(&self, filter: Request) -> Result<RecordStream<ThingRef>> {
        let filter = validate_discovery(filter);
        Ok(until_first_error(self.backend.list(filter)))
    }

    fn added(&self, filter: Request) -> Result<RecordStream<ThingRef>> {
        let filter = validate_discovery(filter);
        Ok(until_first_error(self.backend.added(filter)))
    }

    fn updated(&self, filter: Request) -> Result<RecordStream<Record>> {
        let filter = validate_updated(filter)?;
        Ok(until_first_error(self.backend.updated(filter)))
    }

    fn get(&self, request: Request) -> Result<RecordStream<Record>> {
        let key = validate_get(request)?;
        tracing::trace!(id = %key.id, band = %key.band, "get");
        Ok(until_first_error(self.backend.get(key)))
    }

    fn put(&self, request: Request) -> Result<RecordStream<Record>> {
        let record = validate_put(request)?;
        tracing::trace!(id = %record.id, band = %record.band, "put");
        Ok(until_first_error(self.backend.put(record)))
    }

    fn bands(&self, request: Request) -> Result<RecordStream<Bands>> {
        let thing = validate_thing("bands", request)?;
        Ok(until_first_error(self.backend.bands(thing)))
    }

    fn delete(&self, request: Request) -> Result<RecordStream<ThingRef>> {
        let thing = validate_thing("delete", request)?;
        tracing::trace!(id = %thing.id, "delete");
        Ok(until_first_error(self.backend.delete(thing)))
    }
}

/// A backend with no primitives at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unimplemented;

impl Backend for Unimplemented {}

/// Which primitives [`Transport::using`] takes from the source.
///
/// Everything is taken unless switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UseRules {
    pub list: bool,
    pub added: bool,
    pub updated: bool,
    pub get: bool,
    pub put: bool,
    pub bands: bool,
    pub delete: bool,
}

impl Default for UseRules {
    fn default() -> Self {
        Self {
            list: true,
            added: true,
            updated: true,
            get: true,
            put: true,
            bands: true,
            delete: true,
        }
    }
}

impl UseRules {
    /// Nothing taken from the source.
    pub fn none() -> Self {
        Self {
            list: false,
            added: false,
            updated: false,
            get: false,
            put: false,
            bands: false,
            delete: false,
        }
    }
}

/// A backend that routes each primitive to one of two backends.
pub struct Using<L, S> {
    local: L,
    source: S,
    rules: UseRules,
}

impl<L: Backend, S: Backend> Using<L, S> {
    pub fn rules(&self) -> UseRules {
        self.rules
    }

    fn pick(&self, from_source: bool) -> &dyn Backend {
        if from_source {
            &self.source
        } else {
            &self.local
        }
    }
}

impl<L: Backend, S: Backend> Backend for Using<L, S> {
    fn list(&self, filter: Filter) -> RecordStream<ThingRef> {
        self.pick(self.rules.list).list(filter)
    }

    fn added(&self, filter: Filter) -> RecordStream<ThingRef> {
        self.pick(self.rules.added).added(filter)
    }

    fn updated(&self, filter: Filter) -> RecordStream<Record> {
        self.pick(self.rules.updated).updated(filter)
    }

    fn get(&self, key: Record) -> RecordStream<Record> {
        self.pick(self.rules.get).get(key)
    }

    fn put(&self, record: Record) -> RecordStream<Record> {
        self.pick(self.rules.put).put(record)
    }

    fn bands(&self, thing: ThingRef) -> RecordStream<Bands> {
        self.pick(self.rules.bands).bands(thing)
    }

    fn delete(&self, thing: ThingRef) -> RecordStream<ThingRef> {
        self.pick(self.rules.delete).delete(thing)
    }
}
