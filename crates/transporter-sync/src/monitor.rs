//! Continuous one-way replication with conflict reconciliation.

use std::sync::Arc;

use futures::future;
use futures::stream::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::Instrument;
use transporter_core::{
    first, permit_all, Record, RecordCheck, RecordStream, Request, Result, Subject, Thing,
    ThingRef,
};
use transporter_store::{SharedTransporter, TransporterExt};

/// Things resolved at the same time from the `all` and `added` inputs.
const MONITOR_CONCURRENCY: usize = 8;

/// Which inputs a monitor follows, and what it lets through.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorOptions {
    /// Replicate everything the source holds right now.
    pub all: bool,

    /// Replicate Things as the source adds them.
    pub added: bool,

    /// Replicate band changes.
    pub updated: bool,

    /// Records from the source failing this are skipped.
    #[serde(skip, default = "permit_all")]
    pub check_source: RecordCheck,

    /// Conflicting destination records failing this are not written back.
    #[serde(skip, default = "permit_all")]
    pub check_destination: RecordCheck,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            all: true,
            added: true,
            updated: true,
            check_source: permit_all(),
            check_destination: permit_all(),
        }
    }
}

impl std::fmt::Debug for MonitorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorOptions")
            .field("all", &self.all)
            .field("added", &self.added)
            .field("updated", &self.updated)
            .finish_non_exhaustive()
    }
}

impl MonitorOptions {
    pub fn check_source<F>(mut self, check: F) -> Self
    where
        F: Fn(&Subject<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.check_source = Arc::new(check);
        self
    }

    pub fn check_destination<F>(mut self, check: F) -> Self
    where
        F: Fn(&Subject<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.check_destination = Arc::new(check);
        self
    }
}

/// A running monitor. Dropping it stops every input.
pub struct Monitor {
    tasks: JoinSet<()>,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("inputs", &self.tasks.len())
            .finish()
    }
}

impl Monitor {
    /// Number of inputs being followed.
    pub fn inputs(&self) -> usize {
        self.tasks.len()
    }

    /// Stop every input and wait for them to finish.
    pub async fn shutdown(mut self) {
        self.tasks.shutdown().await;
    }
}

/// Shared by every input of one monitor.
struct Replicator {
    destination: SharedTransporter,
    source: SharedTransporter,
    check_source: RecordCheck,
    check_destination: RecordCheck,
}

impl Replicator {
    /// Write one record into the destination. Never fails: a version
    /// conflict sends the destination's value back to the source, anything
    /// else is logged.
    async fn put_band(&self, record: Record) {
        if let Err(error) = (self.check_source)(&record.subject()) {
            tracing::trace!(id = %record.id, band = %record.band, %error, "source record rejected");
            return;
        }

        match put(&self.destination, &record).await {
            Ok(()) => {}
            Err(error) if error.is_conflict() => {
                if let Err(error) = self.reconcile(&record).await {
                    tracing::debug!(
                        id = %record.id,
                        band = %record.band,
                        %error,
                        "reconcile failed"
                    );
                }
            }
            Err(error) => {
                tracing::info!(
                    id = %record.id,
                    band = %record.band,
                    %error,
                    "(usually) ignorable error"
                );
            }
        }
    }

    /// The destination is newer: make the source adopt its value.
    async fn reconcile(&self, record: &Record) -> Result<()> {
        if let Err(error) = (self.check_destination)(&record.subject()) {
            tracing::trace!(
                id = %record.id,
                band = %record.band,
                %error,
                "destination record rejected"
            );
            return Ok(());
        }

        let key = Request::for_band(record.id.clone(), record.band.clone())
            .maybe_user(record.user.clone());
        let Some(current) = first(self.destination.get(key)?).await? else {
            return Ok(());
        };
        if !current.has_value() {
            return Ok(());
        }

        tracing::info!(
            id = %record.id,
            band = %record.band,
            "version conflict, writing destination value back to source"
        );
        put(&self.source, &current).await
    }

    async fn put_thing(&self, thing: Thing) {
        for record in thing.records() {
            self.put_band(record).await;
        }
    }

    /// Resolve each id into a whole Thing and replicate it. One id failing
    /// to resolve is logged and does not stop the rest.
    async fn follow_things(self: Arc<Self>, input: &'static str, ids: RecordStream<ThingRef>) {
        ids.for_each_concurrent(MONITOR_CONCURRENCY, |item| {
            let this = Arc::clone(&self);
            async move {
                let thing = match item {
                    Ok(thing) => thing,
                    Err(error) => {
                        tracing::debug!(input, %error, "stream failed");
                        return;
                    }
                };
                let id = thing.id.clone();
                match this.resolve_thing(thing).await {
                    Ok(Some(thing)) => this.put_thing(thing).await,
                    Ok(None) => {}
                    Err(error) => tracing::debug!(input, %id, %error, "could not resolve thing"),
                }
            }
        })
        .await;
    }

    async fn resolve_thing(&self, thing: ThingRef) -> Result<Option<Thing>> {
        first(self.source.one(thing.into())?).await
    }

    async fn follow_updated(self: Arc<Self>, mut updated: RecordStream<Record>) {
        while let Some(item) = updated.next().await {
            let record = match item {
                Ok(record) => record,
                Err(error) => {
                    tracing::debug!(%error, "updated: stream failed");
                    return;
                }
            };
            if (self.check_source)(&record.subject()).is_err() {
                continue;
            }

            match self.resolve_record(record).await {
                Ok(Some(record)) => self.put_band(record).await,
                Ok(None) => {}
                Err(error) => tracing::debug!(%error, "updated: could not resolve value"),
            }
        }
    }

    async fn resolve_record(&self, record: Record) -> Result<Option<Record>> {
        if record.has_value() {
            return Ok(Some(record));
        }
        let current = first(self.source.get(Request::from(&record))?).await?;
        Ok(current.filter(Record::has_value))
    }
}

async fn put(transport: &SharedTransporter, record: &Record) -> Result<()> {
    transport
        .put(record.into())?
        .try_for_each(|_| future::ok(()))
        .await
}

/// Replicate `source` into `destination` until the returned handle is
/// dropped or shut down.
///
/// Input subscriptions are opened before this returns; failing to open one
/// is the only error reported. Must be called inside a tokio runtime.
pub fn monitor(
    destination: SharedTransporter,
    source: SharedTransporter,
    options: MonitorOptions,
) -> Result<Monitor> {
    let replicator = Arc::new(Replicator {
        destination,
        source: Arc::clone(&source),
        check_source: options.check_source,
        check_destination: options.check_destination,
    });
    let mut tasks = JoinSet::new();

    if options.all {
        let ids = source.list(Request::new())?;
        let input = Arc::clone(&replicator).follow_things("all", ids);
        tasks.spawn(input.instrument(tracing::debug_span!("monitor", input = "all")));
    }

    if options.added {
        let added = source.added(Request::new())?;
        let input = Arc::clone(&replicator).follow_things("added", added);
        tasks.spawn(input.instrument(tracing::debug_span!("monitor", input = "added")));
    }

    if options.updated {
        let updated = source.updated(Request::new())?;
        let input = Arc::clone(&replicator).follow_updated(updated);
        tasks.spawn(input.instrument(tracing::debug_span!("monitor", input = "updated")));
    }

    Ok(Monitor { tasks })
}
