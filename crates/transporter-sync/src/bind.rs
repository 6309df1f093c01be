//! One-time wiring of a secondary Transporter to a primary one.
//!
//! [`BindingRules`] name, per mode, the bands the mode applies to:
//!
//! - `update`: primary's band changes are written into the secondary
//! - `updated`: secondary's band changes are written back into the primary
//! - `get`: secondary reads of these bands are served by the primary,
//!   reads of any other band fail with `NotFound`
//! - `list`, `added`: secondary discovery (and `bands`) is served by the
//!   primary; band-independent
//! - `copy`: every Thing the primary has, and every Thing it adds later, is
//!   copied band by band into the secondary
//!
//! Relay errors are logged and dropped. Errors on redirected calls reach
//! the caller of the bound handle.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future;
use futures::stream::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::Instrument;
use transporter_core::validation::validate_get;
use transporter_core::{
    fail, first, Bands, Record, RecordStream, Request, Result, ThingRef, TransportError,
};
use transporter_store::{SharedTransporter, Transporter};

/// Things copied at the same time by the `copy` relay.
const COPY_CONCURRENCY: usize = 8;

/// Bands a binding covers unless told otherwise.
pub const DEFAULT_BANDS: [&str; 4] = ["istate", "ostate", "model", "meta"];

/// Which bands one mode applies to.
///
/// `true` means every configured band, `false` or an empty list means none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BandSelection {
    Toggle(bool),
    Bands(Vec<String>),
}

impl BandSelection {
    pub fn only<I, S>(bands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BandSelection::Bands(bands.into_iter().map(Into::into).collect())
    }

    /// The selected bands, given the binding's configured ones.
    pub fn resolve(&self, configured: &[String]) -> BTreeSet<String> {
        match self {
            BandSelection::Toggle(true) => configured.iter().cloned().collect(),
            BandSelection::Toggle(false) => BTreeSet::new(),
            BandSelection::Bands(bands) => bands.iter().cloned().collect(),
        }
    }

    /// For band-independent modes.
    pub fn is_enabled(&self) -> bool {
        match self {
            BandSelection::Toggle(enabled) => *enabled,
            BandSelection::Bands(bands) => !bands.is_empty(),
        }
    }
}

impl From<bool> for BandSelection {
    fn from(enabled: bool) -> Self {
        BandSelection::Toggle(enabled)
    }
}

impl From<Vec<String>> for BandSelection {
    fn from(bands: Vec<String>) -> Self {
        BandSelection::Bands(bands)
    }
}

/// What a binding does.
///
/// Defaults: `update`, `get`, `list`, `added` and `copy` on, `updated` off
/// (it lets the mirror mutate its source).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingRules {
    /// The bands `true` stands for.
    pub bands: Vec<String>,

    /// Passed along on the subscriptions the binding opens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    pub update: BandSelection,
    pub updated: BandSelection,
    pub get: BandSelection,
    pub list: BandSelection,
    pub added: BandSelection,
    pub copy: BandSelection,
}

impl Default for BindingRules {
    fn default() -> Self {
        Self {
            bands: DEFAULT_BANDS.iter().map(|band| band.to_string()).collect(),
            user: None,
            update: true.into(),
            updated: false.into(),
            get: true.into(),
            list: true.into(),
            added: true.into(),
            copy: true.into(),
        }
    }
}

impl BindingRules {
    /// Every mode switched off: a binding that does nothing.
    pub fn none() -> Self {
        Self {
            update: false.into(),
            get: false.into(),
            list: false.into(),
            added: false.into(),
            copy: false.into(),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    fn filter(&self) -> Request {
        Request::new().maybe_user(self.user.clone())
    }
}

/// A live binding.
///
/// Owns the relay tasks; dropping it aborts all of them.
pub struct Binding {
    secondary: SharedTransporter,
    tasks: JoinSet<()>,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("relays", &self.tasks.len())
            .finish()
    }
}

impl Binding {
    /// The secondary as seen through the binding's redirections.
    pub fn secondary(&self) -> SharedTransporter {
        Arc::clone(&self.secondary)
    }

    /// Number of relays started.
    pub fn relays(&self) -> usize {
        self.tasks.len()
    }

    /// Abort every relay and wait for them to stop.
    pub async fn shutdown(mut self) {
        self.tasks.shutdown().await;
    }
}

/// Bind `secondary` to `primary` according to `rules`.
///
/// All relay subscriptions are opened before this returns. Fails only if
/// one of them cannot be opened, in which case nothing keeps running.
/// Must be called inside a tokio runtime.
pub fn bind(
    primary: SharedTransporter,
    secondary: SharedTransporter,
    rules: BindingRules,
) -> Result<Binding> {
    let update = rules.update.resolve(&rules.bands);
    let updated = rules.updated.resolve(&rules.bands);
    let copy = rules.copy.resolve(&rules.bands);
    let mut tasks = JoinSet::new();

    if !update.is_empty() {
        let events = primary.updated(rules.filter())?;
        let relay = relay_updates(events, Arc::clone(&primary), Arc::clone(&secondary), update);
        tasks.spawn(relay.instrument(tracing::debug_span!("bind", relay = "update")));
    }

    if !updated.is_empty() {
        let events = secondary.updated(rules.filter())?;
        let relay = relay_updates(events, Arc::clone(&secondary), Arc::clone(&primary), updated);
        tasks.spawn(relay.instrument(tracing::debug_span!("bind", relay = "updated")));
    }

    if !copy.is_empty() {
        let existing = primary.list(rules.filter())?;
        let added = primary.added(rules.filter())?;
        let relay = copy_things(
            existing.chain(added).boxed(),
            Arc::clone(&primary),
            Arc::clone(&secondary),
            copy,
        );
        tasks.spawn(relay.instrument(tracing::debug_span!("bind", relay = "copy")));
    }

    let bound = BoundTransporter {
        get: rules.get.resolve(&rules.bands),
        list: rules.list.is_enabled(),
        added: rules.added.is_enabled(),
        primary,
        secondary,
    };

    Ok(Binding {
        secondary: Arc::new(bound),
        tasks,
    })
}

async fn relay_updates(
    mut events: RecordStream<Record>,
    from: SharedTransporter,
    to: SharedTransporter,
    bands: BTreeSet<String>,
) {
    while let Some(event) = events.next().await {
        let record = match event {
            Ok(record) => record,
            Err(error) => {
                tracing::debug!(%error, "update stream failed");
                return;
            }
        };
        if !bands.contains(&record.band) {
            continue;
        }

        if let Err(error) = relay_record(&from, &to, record).await {
            tracing::debug!(%error, "(usually) ignorable relay error");
        }
    }
}

/// Forward one change event, fetching its value first if it came without.
async fn relay_record(
    from: &SharedTransporter,
    to: &SharedTransporter,
    record: Record,
) -> Result<()> {
    let record = if record.has_value() {
        record
    } else {
        match first(from.get(Request::from(&record))?).await? {
            Some(current) if current.has_value() => current,
            _ => return Ok(()),
        }
    };

    put_record(to, record).await
}

async fn put_record(to: &SharedTransporter, record: Record) -> Result<()> {
    to.put(record.into())?
        .try_for_each(|_| future::ok(()))
        .await
}

async fn copy_things(
    things: RecordStream<ThingRef>,
    from: SharedTransporter,
    to: SharedTransporter,
    bands: BTreeSet<String>,
) {
    let bands = Arc::new(bands);

    things
        .for_each_concurrent(COPY_CONCURRENCY, |item| {
            let (from, to, bands) = (Arc::clone(&from), Arc::clone(&to), Arc::clone(&bands));
            async move {
                match item {
                    Ok(thing) => copy_thing(&from, &to, &bands, thing).await,
                    Err(error) => tracing::debug!(%error, "copy: discovery failed"),
                }
            }
        })
        .await;
}

async fn copy_thing(
    from: &SharedTransporter,
    to: &SharedTransporter,
    bands: &BTreeSet<String>,
    thing: ThingRef,
) {
    let gets = bands.iter().map(|band| {
        let request =
            Request::for_band(thing.id.clone(), band.clone()).maybe_user(thing.user.clone());
        let from = Arc::clone(from);
        async move { first(from.get(request)?).await }
    });

    // first failed get cancels the rest, then every present value is written
    let copied = async {
        let records = future::try_join_all(gets).await?;
        let puts = records
            .into_iter()
            .flatten()
            .filter(Record::has_value)
            .map(|record| put_record(to, record));
        future::try_join_all(puts).await
    };

    if let Err(error) = copied.await {
        tracing::debug!(id = %thing.id, %error, "copy: (usually) ignorable error");
    }
}

/// The secondary side of a [`Binding`].
///
/// Writes and change events always belong to the secondary; reads and
/// discovery go wherever the rules send them.
pub struct BoundTransporter {
    primary: SharedTransporter,
    secondary: SharedTransporter,
    get: BTreeSet<String>,
    list: bool,
    added: bool,
}

impl BoundTransporter {
    fn discovery(&self, redirected: bool) -> &SharedTransporter {
        if redirected {
            &self.primary
        } else {
            &self.secondary
        }
    }
}

impl Transporter for BoundTransporter {
    fn list(&self, filter: Request) -> Result<RecordStream<ThingRef>> {
        self.discovery(self.list).list(filter)
    }

    fn added(&self, filter: Request) -> Result<RecordStream<ThingRef>> {
        self.discovery(self.added).added(filter)
    }

    fn updated(&self, filter: Request) -> Result<RecordStream<Record>> {
        self.secondary.updated(filter)
    }

    fn get(&self, request: Request) -> Result<RecordStream<Record>> {
        if self.get.is_empty() {
            return self.secondary.get(request);
        }

        let key = validate_get(request.clone())?;
        if self.get.contains(&key.band) {
            self.primary.get(request)
        } else {
            Ok(fail(TransportError::not_found(format!(
                "{}/{}",
                key.id, key.band
            ))))
        }
    }

    fn put(&self, request: Request) -> Result<RecordStream<Record>> {
        self.secondary.put(request)
    }

    fn bands(&self, request: Request) -> Result<RecordStream<Bands>> {
        self.discovery(self.list).bands(request)
    }

    fn delete(&self, request: Request) -> Result<RecordStream<ThingRef>> {
        self.secondary.delete(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use transporter_store::memory;
    use transporter_testkit::{await_value, read, seed};

    /// Long enough for a relay that is going to fire to have fired.
    const QUIET: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_update_flows_primary_to_secondary_only() {
        let (a, b) = (memory(), memory());
        let rules = BindingRules {
            update: true.into(),
            updated: false.into(),
            copy: true.into(),
            ..BindingRules::default()
        };
        let _binding = bind(Arc::clone(&a), Arc::clone(&b), rules).unwrap();

        seed(&a, "x", "meta", json!({ "name": "from a" })).await;
        assert_eq!(
            await_value(&b, "x", "meta").await,
            json!({ "name": "from a" }).as_object().cloned()
        );

        seed(&b, "y", "meta", json!({ "name": "from b" })).await;
        tokio::time::sleep(QUIET).await;
        assert_eq!(read(&a, "y", "meta").await, None);
    }

    #[tokio::test]
    async fn test_update_respects_band_list() {
        let (a, b) = (memory(), memory());
        let rules = BindingRules {
            update: BandSelection::only(["ostate"]),
            copy: false.into(),
            ..BindingRules::default()
        };
        let _binding = bind(Arc::clone(&a), Arc::clone(&b), rules).unwrap();

        seed(&a, "x", "meta", json!({ "name": "lamp" })).await;
        seed(&a, "x", "ostate", json!({ "on": true })).await;

        assert!(await_value(&b, "x", "ostate").await.is_some());
        assert_eq!(read(&b, "x", "meta").await, None);
    }

    #[tokio::test]
    async fn test_updated_flows_back_when_enabled() {
        let (a, b) = (memory(), memory());
        let rules = BindingRules {
            update: false.into(),
            updated: BandSelection::only(["ostate"]),
            copy: false.into(),
            ..BindingRules::default()
        };
        let _binding = bind(Arc::clone(&a), Arc::clone(&b), rules).unwrap();

        seed(&b, "x", "ostate", json!({ "on": false })).await;
        assert!(await_value(&a, "x", "ostate").await.is_some());
    }

    #[tokio::test]
    async fn test_copy_sweeps_existing_and_added() {
        let (a, b) = (memory(), memory());
        seed(&a, "old", "meta", json!({ "name": "old" })).await;
        seed(&a, "old", "connection", json!({ "up": true })).await;

        let rules = BindingRules {
            update: false.into(),
            ..BindingRules::default()
        };
        let _binding = bind(Arc::clone(&a), Arc::clone(&b), rules).unwrap();
        seed(&a, "new", "model", json!({ "kind": "lamp" })).await;

        assert!(await_value(&b, "old", "meta").await.is_some());
        assert!(await_value(&b, "new", "model").await.is_some());
        // not one of the configured bands
        assert_eq!(read(&b, "old", "connection").await, None);
    }

    #[tokio::test]
    async fn test_bound_get_redirects_or_refuses() {
        let (a, b) = (memory(), memory());
        seed(&a, "x", "meta", json!({ "side": "a" })).await;
        seed(&b, "x", "meta", json!({ "side": "b" })).await;
        seed(&b, "x", "connection", json!({ "side": "b" })).await;

        let rules = BindingRules {
            update: false.into(),
            copy: false.into(),
            ..BindingRules::default()
        };
        let binding = bind(Arc::clone(&a), Arc::clone(&b), rules).unwrap();
        let bound = binding.secondary();

        let record = first(bound.get(Request::for_band("x", "meta")).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.value, json!({ "side": "a" }).as_object().cloned());

        let refused = first(bound.get(Request::for_band("x", "connection")).unwrap()).await;
        assert!(matches!(refused, Err(TransportError::NotFound(_))));

        assert!(matches!(
            bound.get(Request::for_thing("x")),
            Err(TransportError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_get_disabled_reads_secondary() {
        let (a, b) = (memory(), memory());
        seed(&b, "x", "connection", json!({ "side": "b" })).await;

        let binding = bind(a, Arc::clone(&b), BindingRules::none()).unwrap();
        assert_eq!(binding.relays(), 0);

        let record = first(binding.secondary().get(Request::for_band("x", "connection")).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(record.has_value());
    }

    #[tokio::test]
    async fn test_discovery_and_writes_are_routed() {
        let (a, b) = (memory(), memory());
        seed(&a, "only-in-a", "meta", json!({})).await;

        let binding = bind(Arc::clone(&a), Arc::clone(&b), BindingRules::none().with_user("alice"))
            .unwrap();
        let ids: Vec<ThingRef> = binding
            .secondary()
            .list(Request::new())
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(ids.is_empty());

        let rules = BindingRules {
            update: false.into(),
            copy: false.into(),
            ..BindingRules::default()
        };
        let binding = bind(Arc::clone(&a), Arc::clone(&b), rules).unwrap();
        let bound = binding.secondary();

        let ids: Vec<String> = bound
            .list(Request::new())
            .unwrap()
            .map_ok(|thing| thing.id)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids, vec!["only-in-a"]);

        let bands = first(bound.bands(Request::for_thing("only-in-a")).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bands.bands, vec!["meta"]);

        first(
            bound
                .put(Request::for_band("written", "meta").value(json!({ "to": "b" })))
                .unwrap(),
        )
        .await
        .unwrap();
        assert!(read(&b, "written", "meta").await.is_some());
        assert_eq!(read(&a, "written", "meta").await, None);
    }

    #[tokio::test]
    async fn test_shutdown_stops_relays() {
        let (a, b) = (memory(), memory());
        let binding = bind(Arc::clone(&a), Arc::clone(&b), BindingRules::default()).unwrap();
        assert_eq!(binding.relays(), 2);

        binding.shutdown().await;

        seed(&a, "late", "meta", json!({})).await;
        tokio::time::sleep(QUIET).await;
        assert_eq!(read(&b, "late", "meta").await, None);
    }

    #[test]
    fn test_rules_from_json() {
        let rules: BindingRules = serde_json::from_value(json!({
            "user": "alice",
            "update": ["ostate"],
            "copy": false,
        }))
        .unwrap();

        assert_eq!(rules.user.as_deref(), Some("alice"));
        assert_eq!(rules.update, BandSelection::only(["ostate"]));
        assert_eq!(rules.copy, BandSelection::Toggle(false));
        assert_eq!(rules.updated, BandSelection::Toggle(false));
        assert_eq!(rules.bands.len(), DEFAULT_BANDS.len());
    }

    #[test]
    fn test_selection_resolve() {
        let configured = vec!["meta".to_string(), "ostate".to_string()];
        assert_eq!(BandSelection::Toggle(true).resolve(&configured).len(), 2);
        assert!(BandSelection::Toggle(false).resolve(&configured).is_empty());
        assert!(BandSelection::only(["model"]).resolve(&configured).contains("model"));
        assert!(!BandSelection::Bands(vec![]).is_enabled());
    }
}
