//! The access-checking decorator.

use std::future;
use std::sync::Arc;

use futures::stream::{StreamExt, TryStreamExt};
use transporter_core::validation::{validate_get, validate_put, validate_thing};
use transporter_core::{
    fail, permit_all, Bands, Record, RecordCheck, RecordStream, Request, Result, Subject, ThingRef,
};
use transporter_store::{SharedTransporter, Transporter};

/// A source of read and write decisions.
///
/// Both checks permit by default.
pub trait AccessPolicy: Send + Sync {
    fn check_read(&self, subject: &Subject<'_>) -> Result<()> {
        let _ = subject;
        Ok(())
    }

    fn check_write(&self, subject: &Subject<'_>) -> Result<()> {
        let _ = subject;
        Ok(())
    }
}

/// A Transporter that authorizes every call before delegating.
///
/// Malformed requests fail with `Invalid` before any check runs.
pub struct Access {
    inner: SharedTransporter,
    check_read: RecordCheck,
    check_write: RecordCheck,
}

impl Access {
    /// Wrap `inner`, permitting everything until checks are installed.
    pub fn new(inner: SharedTransporter) -> Self {
        Self {
            inner,
            check_read: permit_all(),
            check_write: permit_all(),
        }
    }

    /// Wrap `inner` with both checks taken from `policy`.
    pub fn with_policy(inner: SharedTransporter, policy: impl AccessPolicy + 'static) -> Self {
        let policy = Arc::new(policy);
        let reader = Arc::clone(&policy);

        Self::new(inner)
            .check_read(move |subject| reader.check_read(subject))
            .check_write(move |subject| policy.check_write(subject))
    }

    pub fn check_read<F>(mut self, check: F) -> Self
    where
        F: Fn(&Subject<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.check_read = Arc::new(check);
        self
    }

    pub fn check_write<F>(mut self, check: F) -> Self
    where
        F: Fn(&Subject<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.check_write = Arc::new(check);
        self
    }

    pub fn into_shared(self) -> SharedTransporter {
        Arc::new(self)
    }

    fn readable<T, F>(&self, stream: RecordStream<T>, subject: F) -> RecordStream<T>
    where
        T: Send + 'static,
        F: Fn(&T) -> Subject<'_> + Send + Sync + 'static,
    {
        let check = Arc::clone(&self.check_read);
        stream
            .try_filter(move |item| {
                let allowed = check(&subject(item)).is_ok();
                if !allowed {
                    tracing::trace!("access: dropped unreadable item");
                }
                future::ready(allowed)
            })
            .boxed()
    }
}

impl Transporter for Access {
    fn list(&self, filter: Request) -> Result<RecordStream<ThingRef>> {
        let stream = self.inner.list(filter)?;
        Ok(self.readable(stream, ThingRef::subject))
    }

    fn added(&self, filter: Request) -> Result<RecordStream<ThingRef>> {
        let stream = self.inner.added(filter)?;
        Ok(self.readable(stream, ThingRef::subject))
    }

    fn updated(&self, filter: Request) -> Result<RecordStream<Record>> {
        let stream = self.inner.updated(filter)?;
        Ok(self.readable(stream, Record::subject))
    }

    fn get(&self, request: Request) -> Result<RecordStream<Record>> {
        let key = validate_get(request.clone())?;
        if let Err(error) = (self.check_read)(&key.subject()) {
            return Ok(fail(error));
        }
        self.inner.get(request)
    }

    fn put(&self, request: Request) -> Result<RecordStream<Record>> {
        let record = validate_put(request.clone())?;
        if let Err(error) = (self.check_write)(&record.subject()) {
            return Ok(fail(error));
        }
        self.inner.put(request)
    }

    fn bands(&self, request: Request) -> Result<RecordStream<Bands>> {
        let thing = validate_thing("bands", request.clone())?;
        if let Err(error) = (self.check_read)(&thing.subject()) {
            return Ok(fail(error));
        }

        // Only report bands the caller could go on to read
        let check = Arc::clone(&self.check_read);
        let user = request.user.clone();
        let stream = self.inner.bands(request)?.map_ok(move |mut descriptor| {
            let id = descriptor.id.clone();
            descriptor.bands.retain(|band| {
                check(&Subject {
                    id: Some(id.as_str()),
                    band: Some(band.as_str()),
                    user: user.as_deref(),
                    value: None,
                })
                .is_ok()
            });
            descriptor
        });
        Ok(stream.boxed())
    }

    fn delete(&self, request: Request) -> Result<RecordStream<ThingRef>> {
        let thing = validate_thing("delete", request.clone())?;
        if let Err(error) = (self.check_write)(&thing.subject()) {
            return Ok(fail(error));
        }
        self.inner.delete(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use transporter_core::stream::first;
    use transporter_core::{single, TransportError};
    use transporter_store::{memory, Backend, Transport};

    #[derive(Default)]
    struct CountingPuts {
        puts: Arc<AtomicUsize>,
    }

    impl Backend for CountingPuts {
        fn put(&self, record: Record) -> RecordStream<Record> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            single(async move { Ok(record) })
        }
    }

    fn deny(subject: &Subject<'_>) -> Result<()> {
        Err(TransportError::NotAuthorized(
            subject.id.unwrap_or("-").to_string(),
        ))
    }

    async fn seed(transport: &SharedTransporter, id: &str, band: &str) {
        first(
            transport
                .put(Request::for_band(id, band).value(json!({ "v": 1 })))
                .unwrap(),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_denied_put_never_reaches_backend() {
        let puts = Arc::new(AtomicUsize::new(0));
        let inner = Transport::shared(CountingPuts {
            puts: Arc::clone(&puts),
        });
        let guarded = Access::new(inner).check_write(deny).into_shared();

        for _ in 0..3 {
            let result = first(
                guarded
                    .put(Request::for_band("a", "meta").value(json!({})))
                    .unwrap(),
            )
            .await;
            assert!(matches!(result, Err(TransportError::NotAuthorized(_))));
        }
        assert_eq!(puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_permitted_put_reaches_backend() {
        let puts = Arc::new(AtomicUsize::new(0));
        let inner = Transport::shared(CountingPuts {
            puts: Arc::clone(&puts),
        });
        let guarded = Access::new(inner).into_shared();

        first(
            guarded
                .put(Request::for_band("a", "meta").value(json!({})))
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_list_filters_unreadable_ids() {
        let inner = memory();
        for id in ["public-1", "secret-1", "public-2"] {
            seed(&inner, id, "meta").await;
        }

        let guarded = Access::new(Arc::clone(&inner))
            .check_read(|subject| match subject.id {
                Some(id) if id.starts_with("secret") => deny(subject),
                _ => Ok(()),
            })
            .into_shared();

        let ids: Vec<String> = guarded
            .list(Request::new())
            .unwrap()
            .map_ok(|thing| thing.id)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids, vec!["public-1", "public-2"]);

        // The wrapped handle is untouched
        let all: Vec<ThingRef> = inner.list(Request::new()).unwrap().try_collect().await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_get_and_bands_check_read() {
        let inner = memory();
        seed(&inner, "a", "meta").await;

        let guarded = Access::new(inner).check_read(deny).into_shared();

        let get = first(guarded.get(Request::for_band("a", "meta")).unwrap()).await;
        assert!(matches!(get, Err(TransportError::NotAuthorized(_))));

        let bands = first(guarded.bands(Request::for_thing("a")).unwrap()).await;
        assert!(matches!(bands, Err(TransportError::NotAuthorized(_))));
    }

    #[tokio::test]
    async fn test_updated_filters_by_band() {
        let inner = memory();
        let guarded = Access::new(Arc::clone(&inner))
            .check_read(|subject| match subject.band {
                Some("meta") => Ok(()),
                _ => deny(subject),
            })
            .into_shared();
        let mut updated = guarded.updated(Request::new()).unwrap();

        seed(&inner, "a", "ostate").await;
        seed(&inner, "a", "meta").await;

        let record = updated.try_next().await.unwrap().unwrap();
        assert_eq!(record.band, "meta");
    }

    #[tokio::test]
    async fn test_bands_hide_unreadable_bands() {
        use transporter_store::TransporterExt;

        let inner = memory();
        seed(&inner, "a", "meta").await;
        seed(&inner, "a", "ostate").await;

        let guarded = Access::new(inner)
            .check_read(|subject| match subject.band {
                Some("ostate") => deny(subject),
                _ => Ok(()),
            })
            .into_shared();

        let bands = first(guarded.bands(Request::for_thing("a")).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bands.bands, vec!["meta"]);

        let thing = first(guarded.one(Request::for_thing("a")).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(thing.band("meta").is_some());
        assert!(thing.band("ostate").is_none());
    }

    #[tokio::test]
    async fn test_delete_checks_write() {
        let inner = memory();
        seed(&inner, "a", "meta").await;

        let guarded = Access::new(Arc::clone(&inner)).check_write(deny).into_shared();
        let result = first(guarded.delete(Request::for_thing("a")).unwrap()).await;
        assert!(matches!(result, Err(TransportError::NotAuthorized(_))));

        let bands = first(inner.bands(Request::for_thing("a")).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bands.bands, vec!["meta"]);
    }

    #[test]
    fn test_malformed_requests_are_invalid_before_checks() {
        let guarded = Access::new(memory())
            .check_read(deny)
            .check_write(deny)
            .into_shared();

        assert!(matches!(
            guarded.get(Request::for_thing("a")),
            Err(TransportError::Invalid(_))
        ));
        assert!(matches!(
            guarded.put(Request::for_band("a", "meta")),
            Err(TransportError::Invalid(_))
        ));
        assert!(matches!(
            guarded.bands(Request::new()),
            Err(TransportError::Invalid(_))
        ));
        assert!(matches!(
            guarded.delete(Request::new()),
            Err(TransportError::Invalid(_))
        ));
    }
}
