//! End-to-end scenarios across the contract, codec, access, and sync layers.

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use proptest::prelude::*;
use serde_json::json;

use transporter::core::first;
use transporter::{
    bind, channel, memory, monitor, unchannel, Access, BandGrants, BandScope, BindingRules,
    ChannelConfig, MonitorOptions, Request, SharedTransporter, TransportError, Transporter,
    TransporterExt,
};
use transporter_testkit::generators::{prefix, segment};
use transporter_testkit::{
    await_value, eventually, init_test_logging, read, sample_value, seed, stamped,
    CountingTransporter, TestFixture,
};

const QUIET: Duration = Duration::from_millis(50);

#[test]
fn channel_scenario() {
    let config = ChannelConfig::new("/path");

    let path = channel(&config, Some("the-id"), Some("the-band"));
    assert_eq!(path, "/path/the-id/the-band");

    let key = unchannel(&config, &path);
    assert_eq!(key.id.as_deref(), Some("the-id"));
    assert_eq!(key.band.as_deref(), Some("the-band"));
}

proptest! {
    #[test]
    fn channel_roundtrip(prefix in prefix(), id in segment(), band in segment()) {
        let config = ChannelConfig::new(prefix);
        let key = unchannel(&config, &channel(&config, Some(id.as_str()), Some(band.as_str())));
        prop_assert_eq!(key.id, Some(id));
        prop_assert_eq!(key.band, Some(band));
    }

    #[test]
    fn channel_roundtrip_flat_band(prefix in prefix(), id in segment()) {
        let config = ChannelConfig::new(prefix).with_flat_band("ostate");
        let key = unchannel(&config, &channel(&config, Some(id.as_str()), Some("ignored")));
        prop_assert_eq!(key.id, Some(id));
        prop_assert_eq!(key.band.as_deref(), Some("ostate"));
    }
}

#[tokio::test]
async fn malformed_input_fails_before_subscription() {
    let transport = memory();

    assert!(matches!(
        transport.bands(Request::new()),
        Err(TransportError::Invalid(_))
    ));
    assert!(matches!(
        transport.get(Request::new().id("a")),
        Err(TransportError::Invalid(_))
    ));
    assert!(matches!(
        transport.put(Request::for_band("a", "meta")),
        Err(TransportError::Invalid(_))
    ));
    assert!(matches!(
        transport.put(Request::for_band("a", "meta").value("text")),
        Err(TransportError::Invalid(_))
    ));
}

#[tokio::test]
async fn repeated_puts_are_idempotent() {
    let transport = memory();
    let value = stamped(sample_value("Lamp"), "2016-08-01T00:00:00.000Z");

    seed(&transport, "lamp", "meta", value.clone()).await;
    let once = read(&transport, "lamp", "meta").await;

    for _ in 0..3 {
        seed(&transport, "lamp", "meta", value.clone()).await;
    }
    assert_eq!(read(&transport, "lamp", "meta").await, once);
    assert_eq!(once, value.as_object().cloned());
}

#[tokio::test]
async fn refused_writes_never_reach_the_backend() {
    let counting = CountingTransporter::new(memory());
    let inner: SharedTransporter = counting.clone();
    let guarded = Access::new(inner)
        .check_write(|_| Err(TransportError::NotAuthorized("read only".into())))
        .into_shared();

    for id in ["a", "b", "c"] {
        let result = first(
            guarded
                .put(Request::for_band(id, "meta").value(json!({})))
                .unwrap(),
        )
        .await;
        assert!(matches!(result, Err(TransportError::NotAuthorized(_))));
    }
    assert_eq!(counting.calls("put"), 0);
}

#[tokio::test]
async fn band_grants_per_user() {
    let inner = memory();
    seed(&inner, "lamp", "meta", sample_value("Lamp")).await;
    seed(&inner, "lamp", "ostate", json!({ "on": false })).await;

    let grants = BandGrants::new()
        .grant_read("alice", BandScope::All)
        .grant_write("alice", BandScope::only(["ostate"]))
        .grant_read("bob", BandScope::only(["meta"]));
    let guarded = Access::with_policy(Arc::clone(&inner), grants).into_shared();

    let as_bob = Request::for_thing("lamp").user("bob");
    let thing = first(guarded.one(as_bob).unwrap()).await.unwrap().unwrap();
    assert_eq!(thing.bands.keys().collect::<Vec<_>>(), vec!["meta"]);

    let alice_write = Request::for_band("lamp", "ostate")
        .user("alice")
        .value(json!({ "on": true }));
    first(guarded.put(alice_write).unwrap()).await.unwrap();

    let bob_write = Request::for_band("lamp", "ostate")
        .user("bob")
        .value(json!({ "on": false }));
    let refused = first(guarded.put(bob_write).unwrap()).await;
    assert!(matches!(refused, Err(TransportError::NotAuthorized(_))));

    let anonymous = first(guarded.get(Request::for_band("lamp", "meta")).unwrap()).await;
    assert!(matches!(anonymous, Err(TransportError::NotAuthorized(_))));

    assert_eq!(read(&inner, "lamp", "ostate").await, json!({ "on": true }).as_object().cloned());
}

#[tokio::test]
async fn bind_scenario() {
    init_test_logging();
    let fixture = TestFixture::new();
    let (a, b) = (&fixture.primary, &fixture.secondary);

    let rules = BindingRules {
        update: true.into(),
        updated: false.into(),
        copy: true.into(),
        ..BindingRules::default()
    };
    let _binding = bind(Arc::clone(a), Arc::clone(b), rules).unwrap();

    seed(a, "x", "meta", json!({ "name": "written to a" })).await;
    assert_eq!(
        await_value(b, "x", "meta").await,
        json!({ "name": "written to a" }).as_object().cloned()
    );

    seed(b, "y", "meta", json!({ "name": "written to b" })).await;
    tokio::time::sleep(QUIET).await;
    assert_eq!(read(a, "y", "meta").await, None);
}

#[tokio::test]
async fn bound_secondary_serves_primary_things() {
    let fixture = TestFixture::with_things(&["lamp", "fan"]).await;
    let binding = bind(
        Arc::clone(&fixture.primary),
        Arc::clone(&fixture.secondary),
        BindingRules::default(),
    )
    .unwrap();

    let mut ids: Vec<String> = binding
        .secondary()
        .all(Request::new())
        .unwrap()
        .map_ok(|thing| thing.id)
        .try_collect()
        .await
        .unwrap();
    ids.sort();
    assert_eq!(ids, vec!["fan", "lamp"]);

    // copy fills the raw secondary too
    assert!(await_value(&fixture.secondary, "fan", "ostate").await.is_some());
}

#[tokio::test]
async fn monitor_reconciles_version_conflicts() {
    let fixture = TestFixture::new();
    let (src, dest) = (Arc::clone(&fixture.primary), Arc::clone(&fixture.secondary));

    let newer = stamped(json!({ "on": true }), "2016-08-02T00:00:00.000Z");
    seed(&dest, "lamp", "ostate", newer.clone()).await;

    let _monitor = monitor(Arc::clone(&dest), Arc::clone(&src), MonitorOptions::default()).unwrap();

    // a stale write on the source loses to the destination's value
    seed(
        &src,
        "lamp",
        "ostate",
        stamped(json!({ "on": false }), "2016-08-01T00:00:00.000Z"),
    )
    .await;

    let expected = newer.as_object().cloned();
    let converged = eventually(|| {
        let src = Arc::clone(&src);
        let expected = expected.clone();
        async move { read(&src, "lamp", "ostate").await == expected }
    })
    .await;
    assert!(converged);
    assert_eq!(read(&dest, "lamp", "ostate").await, expected);
}
