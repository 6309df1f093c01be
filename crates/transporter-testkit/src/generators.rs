//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::Value;

use transporter_core::{Document, CANONICAL_BANDS};

/// A channel segment: non-empty, no separators.
pub fn segment() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_.:-]{1,16}"
}

/// A channel prefix: empty, root, relative or absolute, with or without
/// trailing and doubled separators.
pub fn prefix() -> impl Strategy<Value = String> {
    "(/?[a-z]{1,6}){0,3}/{0,2}"
}

/// One of the well-known bands, or any other segment.
pub fn band() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => prop::sample::select(CANONICAL_BANDS.to_vec()).prop_map(String::from),
        1 => segment(),
    ]
}

/// A flat JSON value.
pub fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z ]{0,12}".prop_map(Value::from),
        Just(Value::Null),
    ]
}

/// A small document of scalar fields.
pub fn document() -> impl Strategy<Value = Document> {
    prop::collection::btree_map("[a-z][a-z0-9_]{0,7}", scalar(), 0..6)
        .prop_map(|fields| fields.into_iter().collect())
}

/// An `@timestamp` style version marker. Later dates sort later.
pub fn timestamp() -> impl Strategy<Value = String> {
    (2000u32..2100, 1u32..=12, 1u32..=28, 0u32..24).prop_map(|(year, month, day, hour)| {
        format!("{year:04}-{month:02}-{day:02}T{hour:02}:00:00.000Z")
    })
}
