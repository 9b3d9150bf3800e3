//! Ingestion and registration pipeline
//!
//! Wires the snapshot source, the store, the notification dispatcher and
//! the view invalidation hook together.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::RegistrationOutcome;
use crate::notify::{select_kind, Notification, NotificationDispatcher, NotificationKind};
use crate::scraper::SnapshotSource;
use crate::store::ProductStore;

/// Hook fired after a successful upsert so readers drop stale aggregates
///
/// Fire-and-forget: implementations log their own failures, the pipeline
/// never sees them.
pub trait ViewInvalidator: Send + Sync {
    fn invalidate(&self, product_id: i64);
}

/// Default invalidator: no external view cache, just log the signal
pub struct LogInvalidator;

impl ViewInvalidator for LogInvalidator {
    fn invalidate(&self, product_id: i64) {
        log::debug!("Invalidated views for product {}", product_id);
    }
}

/// Counters for one sweep over all tracked products
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Products whose fresh observation was persisted
    pub ingested: usize,
    /// Products the source returned nothing for
    pub skipped: usize,
    /// Notifications dispatched to subscriber sets
    pub notified: usize,
    /// Products whose observation, persistence or dispatch failed
    pub failed: usize,
}

/// The price tracking pipeline
pub struct Tracker {
    store: ProductStore,
    source: Arc<dyn SnapshotSource>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    invalidator: Arc<dyn ViewInvalidator>,
}

impl Tracker {
    pub fn new(
        store: ProductStore,
        source: Arc<dyn SnapshotSource>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            source,
            dispatcher,
            invalidator: Arc::new(LogInvalidator),
        }
    }

    /// Replace the default invalidation hook
    pub fn with_invalidator(mut self, invalidator: Arc<dyn ViewInvalidator>) -> Self {
        self.invalidator = invalidator;
        self
    }

    /// Handle to the underlying store, for read-facing callers
    pub fn store(&self) -> &ProductStore {
        &self.store
    }

    /// Observe `url` once and fold the result into the store
    ///
    /// An absent snapshot is a no-op. A store failure is wrapped with the
    /// URL and surfaced; it must never fail silently.
    pub async fn ingest(&self, url: &str) -> Result<()> {
        let Some(snapshot) = self.source.fetch(url).await? else {
            log::info!("Nothing to ingest for {}", url);
            return Ok(());
        };

        let persisted = self
            .store
            .ingest_snapshot(&snapshot)
            .map_err(|e| Error::Ingest {
                url: url.to_string(),
                source: Box::new(e),
            })?;

        if let Some(id) = persisted.id {
            self.invalidator.invalidate(id);
        }
        log::info!(
            "Ingested {} at {} {} ({} points)",
            persisted.url,
            persisted.current_price,
            persisted.currency,
            persisted.price_history.len()
        );
        Ok(())
    }

    /// Register `email` against a product, sending the one-time welcome
    ///
    /// The welcome is dispatched only on a fresh registration, after the
    /// subscription committed; a failed dispatch surfaces as
    /// [`Error::Notification`] but leaves the subscription in place.
    pub async fn register(&self, product_id: i64, email: &str) -> Result<RegistrationOutcome> {
        let outcome = self.store.add_subscriber(product_id, email)?;

        if outcome == RegistrationOutcome::Added {
            if let Some(product) = self.store.find_by_id(product_id)? {
                let notification = Notification::new(NotificationKind::Welcome, &product);
                let recipients = vec![email.to_string()];
                self.dispatcher.dispatch(&notification, &recipients).await?;
            }
        }

        Ok(outcome)
    }

    /// Re-observe every tracked product and notify subscribers of
    /// interesting changes
    ///
    /// Per-product failures are logged and counted; the sweep continues.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let products = self.store.find_all()?;
        let mut report = SweepReport::default();

        for previous in products {
            let snapshot = match self.source.fetch(&previous.url).await {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    log::error!("Failed to observe {}: {}", previous.url, e);
                    report.failed += 1;
                    continue;
                }
            };

            let updated = match self.store.ingest_snapshot(&snapshot) {
                Ok(updated) => updated,
                Err(e) => {
                    log::error!("Failed to persist observation for {}: {}", previous.url, e);
                    report.failed += 1;
                    continue;
                }
            };
            if let Some(id) = updated.id {
                self.invalidator.invalidate(id);
            }
            report.ingested += 1;

            let Some(kind) = select_kind(&previous, &updated) else {
                continue;
            };
            if updated.subscribers.is_empty() {
                continue;
            }

            let recipients: Vec<String> = updated
                .subscribers
                .iter()
                .map(|s| s.email.clone())
                .collect();
            let notification = Notification::new(kind, &updated);
            match self.dispatcher.dispatch(&notification, &recipients).await {
                Ok(()) => report.notified += 1,
                Err(e) => {
                    log::error!(
                        "Failed to notify {} subscriber(s) of {}: {}",
                        recipients.len(),
                        updated.url,
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "Sweep complete: {} ingested, {} skipped, {} notified, {} failed",
            report.ingested,
            report.skipped,
            report.notified,
            report.failed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{make_test_snapshot, Snapshot};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Source serving canned snapshots keyed by URL
    #[derive(Default)]
    struct FixedSource {
        snapshots: Mutex<HashMap<String, Snapshot>>,
    }

    impl FixedSource {
        fn set(&self, snapshot: Snapshot) {
            self.snapshots
                .lock()
                .unwrap()
                .insert(snapshot.url.clone(), snapshot);
        }
    }

    #[async_trait]
    impl SnapshotSource for FixedSource {
        async fn fetch(&self, url: &str) -> Result<Option<Snapshot>> {
            Ok(self.snapshots.lock().unwrap().get(url).cloned())
        }
    }

    /// Dispatcher that records every dispatch instead of delivering
    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<(NotificationKind, Vec<String>)>>,
    }

    impl RecordingDispatcher {
        fn sent(&self) -> Vec<(NotificationKind, Vec<String>)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationDispatcher for RecordingDispatcher {
        async fn dispatch(
            &self,
            notification: &Notification,
            recipients: &[String],
        ) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((notification.kind, recipients.to_vec()));
            Ok(())
        }
    }

    /// Dispatcher that always fails
    struct FailingDispatcher;

    #[async_trait]
    impl NotificationDispatcher for FailingDispatcher {
        async fn dispatch(&self, _: &Notification, _: &[String]) -> Result<()> {
            Err(Error::Notification("endpoint unreachable".to_string()))
        }
    }

    /// Invalidator that records the ids it was fired for
    #[derive(Default)]
    struct RecordingInvalidator {
        ids: Mutex<Vec<i64>>,
    }

    impl ViewInvalidator for RecordingInvalidator {
        fn invalidate(&self, product_id: i64) {
            self.ids.lock().unwrap().push(product_id);
        }
    }

    fn test_tracker() -> (Tracker, Arc<FixedSource>, Arc<RecordingDispatcher>) {
        let source = Arc::new(FixedSource::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let tracker = Tracker::new(
            ProductStore::open_in_memory().unwrap(),
            Arc::clone(&source) as Arc<dyn SnapshotSource>,
            Arc::clone(&dispatcher) as Arc<dyn NotificationDispatcher>,
        );
        (tracker, source, dispatcher)
    }

    #[tokio::test]
    async fn ingest_persists_observation_and_invalidates() {
        let (tracker, source, _) = test_tracker();
        let invalidator = Arc::new(RecordingInvalidator::default());
        let tracker = tracker.with_invalidator(Arc::clone(&invalidator) as Arc<dyn ViewInvalidator>);

        source.set(make_test_snapshot("https://shop.example/item/1", 100.0));
        tracker.ingest("https://shop.example/item/1").await.unwrap();

        let product = tracker
            .store()
            .find_by_url("https://shop.example/item/1")
            .unwrap()
            .unwrap();
        assert_eq!(product.price_history.len(), 1);
        assert_eq!(invalidator.ids.lock().unwrap().as_slice(), &[1]);
    }

    #[tokio::test]
    async fn ingest_absent_snapshot_is_silent_noop() {
        let (tracker, _, _) = test_tracker();

        tracker.ingest("https://shop.example/unknown").await.unwrap();

        assert!(tracker.store().find_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn register_sends_welcome_exactly_once() {
        let (tracker, source, dispatcher) = test_tracker();
        source.set(make_test_snapshot("https://shop.example/item/1", 100.0));
        tracker.ingest("https://shop.example/item/1").await.unwrap();
        let id = tracker
            .store()
            .find_by_url("https://shop.example/item/1")
            .unwrap()
            .unwrap()
            .id
            .unwrap();

        let first = tracker.register(id, "a@x.com").await.unwrap();
        let second = tracker.register(id, "a@x.com").await.unwrap();

        assert_eq!(first, RegistrationOutcome::Added);
        assert_eq!(second, RegistrationOutcome::AlreadyPresent);
        assert_eq!(
            dispatcher.sent(),
            vec![(NotificationKind::Welcome, vec!["a@x.com".to_string()])]
        );
    }

    #[tokio::test]
    async fn register_unknown_product_is_not_found() {
        let (tracker, _, dispatcher) = test_tracker();

        let outcome = tracker.register(999, "a@x.com").await.unwrap();

        assert_eq!(outcome, RegistrationOutcome::NotFound);
        assert!(dispatcher.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_welcome_keeps_the_subscription() {
        let source = Arc::new(FixedSource::default());
        let tracker = Tracker::new(
            ProductStore::open_in_memory().unwrap(),
            Arc::clone(&source) as Arc<dyn SnapshotSource>,
            Arc::new(FailingDispatcher),
        );
        source.set(make_test_snapshot("https://shop.example/item/1", 100.0));
        tracker.ingest("https://shop.example/item/1").await.unwrap();
        let id = tracker
            .store()
            .find_by_url("https://shop.example/item/1")
            .unwrap()
            .unwrap()
            .id
            .unwrap();

        let result = tracker.register(id, "a@x.com").await;

        assert!(matches!(result, Err(Error::Notification(_))));
        let product = tracker.store().find_by_id(id).unwrap().unwrap();
        assert_eq!(product.subscribers.len(), 1);
    }

    #[tokio::test]
    async fn sweep_notifies_subscribers_of_new_low() {
        let (tracker, source, dispatcher) = test_tracker();
        let url = "https://shop.example/item/1";
        source.set(make_test_snapshot(url, 100.0));
        tracker.ingest(url).await.unwrap();
        let id = tracker.store().find_by_url(url).unwrap().unwrap().id.unwrap();
        tracker.register(id, "a@x.com").await.unwrap();

        source.set(make_test_snapshot(url, 80.0));
        let report = tracker.sweep().await.unwrap();

        assert_eq!(report.ingested, 1);
        assert_eq!(report.notified, 1);
        assert_eq!(report.failed, 0);
        let sent = dispatcher.sent();
        assert_eq!(sent.len(), 2); // welcome + price drop
        assert_eq!(
            sent[1],
            (NotificationKind::LowestPrice, vec!["a@x.com".to_string()])
        );
        let product = tracker.store().find_by_url(url).unwrap().unwrap();
        assert_eq!(product.price_history.len(), 2);
    }

    #[tokio::test]
    async fn sweep_without_subscribers_stays_quiet() {
        let (tracker, source, dispatcher) = test_tracker();
        let url = "https://shop.example/item/1";
        source.set(make_test_snapshot(url, 100.0));
        tracker.ingest(url).await.unwrap();

        source.set(make_test_snapshot(url, 80.0));
        let report = tracker.sweep().await.unwrap();

        assert_eq!(report.ingested, 1);
        assert_eq!(report.notified, 0);
        assert!(dispatcher.sent().is_empty());
    }

    #[tokio::test]
    async fn sweep_skips_products_the_source_lost() {
        let (tracker, source, _) = test_tracker();
        let url = "https://shop.example/item/1";
        source.set(make_test_snapshot(url, 100.0));
        tracker.ingest(url).await.unwrap();

        source.snapshots.lock().unwrap().clear();
        let report = tracker.sweep().await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.ingested, 0);
        let product = tracker.store().find_by_url(url).unwrap().unwrap();
        assert_eq!(product.price_history.len(), 1);
    }
}
