//! Record types flowing through Transporters.
//!
//! Input to every operation is a dictionary-shaped [`Request`]; validation
//! turns it into one of the typed shapes below before a backend sees it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A structured mapping of named fields. The schema is up to the backend.
pub type Document = serde_json::Map<String, Value>;

/// Key holding a document's version marker.
pub const TIMESTAMP_KEY: &str = "@timestamp";

/// The well-known bands of a Thing.
pub const CANONICAL_BANDS: [&str; 5] = ["meta", "model", "istate", "ostate", "connection"];

/// The version marker of a document, if it carries one.
pub fn document_timestamp(document: &Document) -> Option<&str> {
    document.get(TIMESTAMP_KEY).and_then(Value::as_str)
}

/// Dictionary-shaped input accepted by every Transporter operation.
///
/// Which fields are required depends on the operation; validation strips
/// the fields an operation ignores. Unknown keys are kept in `params`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(flatten)]
    pub params: Document,
}

impl Request {
    /// An empty request, suitable as a discovery filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// A request addressing a whole Thing.
    pub fn for_thing(id: impl Into<String>) -> Self {
        Self::new().id(id)
    }

    /// A request addressing one band of a Thing.
    pub fn for_band(id: impl Into<String>, band: impl Into<String>) -> Self {
        Self::new().id(id).band(band)
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn band(mut self, band: impl Into<String>) -> Self {
        self.band = Some(band.into());
        self
    }

    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn maybe_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    /// Attach an extra backend-specific parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn subject(&self) -> Subject<'_> {
        Subject {
            id: self.id.as_deref(),
            band: self.band.as_deref(),
            user: self.user.as_deref(),
            value: self.value.as_ref().and_then(Value::as_object),
        }
    }
}

impl From<ThingRef> for Request {
    fn from(thing: ThingRef) -> Self {
        Request::for_thing(thing.id).maybe_user(thing.user)
    }
}

impl From<&ThingRef> for Request {
    fn from(thing: &ThingRef) -> Self {
        thing.clone().into()
    }
}

impl From<Record> for Request {
    fn from(record: Record) -> Self {
        let mut request = Request::for_band(record.id, record.band).maybe_user(record.user);
        request.value = record.value.map(Value::Object);
        request
    }
}

impl From<&Record> for Request {
    fn from(record: &Record) -> Self {
        record.clone().into()
    }
}

/// Discovery event: a Thing exists (or just appeared).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThingRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ThingRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user: None,
        }
    }

    pub fn subject(&self) -> Subject<'_> {
        Subject {
            id: Some(self.id.as_str()),
            band: None,
            user: self.user.as_deref(),
            value: None,
        }
    }
}

/// One band of one Thing.
///
/// `value: None` means "exists but has no content", which is distinct from
/// an error on the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub band: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Record {
    pub fn new(id: impl Into<String>, band: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            band: band.into(),
            value: None,
            user: None,
        }
    }

    pub fn with_value(mut self, value: Document) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// The version marker carried by the value, if any.
    pub fn timestamp(&self) -> Option<&str> {
        self.value.as_ref().and_then(document_timestamp)
    }

    pub fn subject(&self) -> Subject<'_> {
        Subject {
            id: Some(self.id.as_str()),
            band: Some(self.band.as_str()),
            user: self.user.as_deref(),
            value: self.value.as_ref(),
        }
    }
}

/// The bands a Thing currently has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bands {
    pub id: String,
    pub bands: Vec<String>,
}

/// Every band of a Thing merged into one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thing {
    pub id: String,
    pub bands: BTreeMap<String, Document>,
}

impl Thing {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bands: BTreeMap::new(),
        }
    }

    pub fn band(&self, band: &str) -> Option<&Document> {
        self.bands.get(band)
    }

    /// Split back into per-band records.
    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        self.bands
            .iter()
            .map(|(band, value)| {
                Record::new(self.id.clone(), band.clone()).with_value(value.clone())
            })
    }
}

/// A validated discovery filter.
///
/// `list` and `added` always carry `id: None, band: None`; `updated` may
/// narrow to one id and/or band.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(flatten)]
    pub params: Document,
}

impl Filter {
    pub fn matches(&self, record: &Record) -> bool {
        self.id.as_deref().map_or(true, |id| id == record.id)
            && self.band.as_deref().map_or(true, |band| band == record.band)
    }
}

/// Borrowed view of any record-shaped value, handed to predicates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Subject<'a> {
    pub id: Option<&'a str>,
    pub band: Option<&'a str>,
    pub user: Option<&'a str>,
    pub value: Option<&'a Document>,
}

/// A predicate over records: `Ok(())` permits, `Err` names the violation.
pub type RecordCheck = Arc<dyn Fn(&Subject<'_>) -> Result<()> + Send + Sync>;

/// A check that permits everything.
pub fn permit_all() -> RecordCheck {
    Arc::new(|_| Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_from_json_keeps_extra_params() {
        let request: Request = serde_json::from_value(json!({
            "id": "thing-1",
            "band": "meta",
            "limit": 10,
        }))
        .unwrap();

        assert_eq!(request.id.as_deref(), Some("thing-1"));
        assert_eq!(request.band.as_deref(), Some("meta"));
        assert_eq!(request.params.get("limit"), Some(&json!(10)));
    }

    #[test]
    fn test_record_into_request() {
        let mut value = Document::new();
        value.insert("name".into(), json!("lamp"));
        let record = Record::new("thing-1", "meta")
            .with_value(value)
            .with_user(Some("alice".into()));

        let request = Request::from(&record);
        assert_eq!(request.id.as_deref(), Some("thing-1"));
        assert_eq!(request.user.as_deref(), Some("alice"));
        assert_eq!(request.value, Some(json!({ "name": "lamp" })));
    }

    #[test]
    fn test_record_timestamp() {
        let mut value = Document::new();
        value.insert(TIMESTAMP_KEY.into(), json!("2016-08-01T00:00:00.000Z"));
        let record = Record::new("a", "ostate").with_value(value);
        assert_eq!(record.timestamp(), Some("2016-08-01T00:00:00.000Z"));
        assert_eq!(Record::new("a", "ostate").timestamp(), None);
    }

    #[test]
    fn test_filter_matches() {
        let filter = Filter {
            band: Some("meta".into()),
            ..Filter::default()
        };
        assert!(filter.matches(&Record::new("a", "meta")));
        assert!(!filter.matches(&Record::new("a", "ostate")));
        assert!(Filter::default().matches(&Record::new("b", "model")));
    }

    #[test]
    fn test_request_subject_ignores_scalar_value() {
        let request = Request::for_band("a", "meta").value(json!(3));
        assert!(request.subject().value.is_none());
    }

    #[test]
    fn test_thing_records() {
        let mut thing = Thing::new("a");
        thing.bands.insert("meta".into(), Document::new());
        thing.bands.insert("ostate".into(), Document::new());

        let bands: Vec<String> = thing.records().map(|r| r.band).collect();
        assert_eq!(bands, vec!["meta".to_string(), "ostate".to_string()]);
    }
}
