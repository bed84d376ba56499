use crate::clock::SharedClock;
use crate::error::{AppError, Result};
use crate::metrics::{Metric, MetricsRegistry, QUOTA_CONFLICTS_TOTAL};
use crate::models::{CounterBody, CounterDocument, Counters};
use crate::quota::ConflictRetryPolicy;
use crate::settings::SettingsHandle;
use crate::state::{ensure_collection, DocumentStore, VersionedDocument};
use chrono::{Datelike, NaiveDate};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::instrument;

/// Per-day send counters persisted as versioned documents
pub struct CounterStore {
    store: Arc<dyn DocumentStore>,
    collection: String,
    clock: SharedClock,
    settings: SettingsHandle,
    metrics: Option<Arc<MetricsRegistry>>,
    ready: AtomicBool,
}

impl CounterStore {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        clock: SharedClock,
        settings: SettingsHandle,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            clock,
            settings,
            metrics: None,
            ready: AtomicBool::new(false),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the counters collection if needed
    pub async fn ensure_collection(&self) -> Result<()> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        ensure_collection(self.store.as_ref(), &self.collection).await?;
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Whether the collection exists, without creating it
    async fn collection_ready(&self) -> Result<bool> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(true);
        }
        let exists = self.store.collection_exists(&self.collection).await?;
        if exists {
            self.ready.store(true, Ordering::Release);
        }
        Ok(exists)
    }

    fn decode(doc: VersionedDocument) -> Result<CounterDocument> {
        let body: CounterBody = serde_json::from_value(doc.body)?;
        Ok(CounterDocument {
            day: body.day,
            counters: body.counters,
            token: Some(doc.token),
        })
    }

    /// Counters for one day; a zero placeholder if nothing was recorded
    pub async fn get_day(&self, day: NaiveDate) -> Result<CounterDocument> {
        if !self.collection_ready().await? {
            return Ok(CounterDocument::absent(day));
        }

        match self
            .store
            .get(&self.collection, &CounterDocument::day_key(day))
            .await?
        {
            Some(doc) => Self::decode(doc),
            None => Ok(CounterDocument::absent(day)),
        }
    }

    /// Stored day documents within `[from, to]`, in day order
    pub async fn range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<CounterDocument>> {
        if from > to || !self.collection_ready().await? {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = from
            .iter_days()
            .take_while(|day| *day <= to)
            .map(CounterDocument::day_key)
            .collect();

        self.store
            .get_many(&self.collection, &ids)
            .await?
            .into_iter()
            .map(Self::decode)
            .collect()
    }

    /// Sum of all day counters from the first of the current month to today
    pub async fn month_to_date(&self) -> Result<Counters> {
        let today = self.clock.today();
        let first = today.with_day(1).unwrap_or(today);
        let days = self.range(first, today).await?;
        Ok(days.into_iter().map(|doc| doc.counters).sum())
    }

    /// Add `delta` to today's counters.
    ///
    /// Read-modify-write conditioned on the token that was read. Conflicts and
    /// documents that vanish between read and write restart from the read,
    /// with backoff up to the configured bound, after which
    /// `ConcurrencyConflict` is returned. Returns today's new totals.
    #[instrument(skip(self), fields(collection = %self.collection))]
    pub async fn increment(&self, delta: Counters) -> Result<Counters> {
        self.ensure_collection().await?;

        let day = self.clock.today();
        let id = CounterDocument::day_key(day);
        let policy = ConflictRetryPolicy::from_settings(&self.settings.snapshot());
        let mut attempt = 0u32;

        loop {
            let current = self.get_day(day).await?;
            let next = current.counters + delta;
            let body = serde_json::to_value(CounterBody { day, counters: next })?;

            let written = match current.token {
                None => self.store.create(&self.collection, &id, body).await,
                Some(token) => self.store.update(&self.collection, &id, body, token).await,
            };

            match written {
                Ok(_) => {
                    tracing::debug!(day = %id, attempt, ?next, "Usage counters updated");
                    return Ok(next);
                }
                // A document deleted after the read surfaces as NotFound; the
                // next read sees it absent and recreates it
                Err(AppError::ConcurrencyConflict(_))
                | Err(AppError::AlreadyExists(_))
                | Err(AppError::NotFound(_)) => {
                    attempt += 1;
                    if !policy.should_retry(attempt) {
                        QUOTA_CONFLICTS_TOTAL.with_label_values(&["exhausted"]).inc();
                        tracing::warn!(day = %id, attempt, "Usage counter retries exhausted");
                        return Err(AppError::ConcurrencyConflict(format!(
                            "Counter {} still conflicting after {} retries",
                            id,
                            policy.max_retries()
                        )));
                    }

                    QUOTA_CONFLICTS_TOTAL.with_label_values(&["retried"]).inc();
                    if let Some(metrics) = &self.metrics {
                        metrics.increment(Metric::QuotaConflictRetries);
                    }
                    let delay = policy.delay(attempt);
                    tracing::debug!(day = %id, attempt, delay_ms = delay.as_millis() as u64, "Usage counter conflict, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::state::InMemoryDocumentStore;
    use chrono::{TimeZone, Utc};

    fn counter_store(clock: &ManualClock) -> CounterStore {
        CounterStore::new(
            Arc::new(InMemoryDocumentStore::new()),
            "usage",
            Arc::new(clock.clone()),
            SettingsHandle::default(),
        )
    }

    fn clock_at(day: u32) -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2026, 4, day, 10, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_reads_before_any_write_are_zero() {
        let clock = clock_at(3);
        let store = counter_store(&clock);

        assert!(store.month_to_date().await.unwrap().is_zero());
        let today = store.get_day(clock.today()).await.unwrap();
        assert!(today.token.is_none());
    }

    #[tokio::test]
    async fn test_increment_creates_then_updates() {
        let clock = clock_at(3);
        let store = counter_store(&clock);

        store.increment(Counters::new(2, 2, 0)).await.unwrap();
        let total = store.increment(Counters::new(1, 0, 1)).await.unwrap();

        assert_eq!(total, Counters::new(3, 2, 1));
        let doc = store.get_day(clock.today()).await.unwrap();
        assert!(doc.token.is_some());
        assert_eq!(doc.counters, total);
    }

    #[tokio::test]
    async fn test_month_to_date_spans_days_but_not_months() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 31, 23, 0, 0).unwrap());
        let store = counter_store(&clock);
        store.increment(Counters::new(5, 5, 0)).await.unwrap();

        // April 1st: March usage no longer counts
        clock.advance(std::time::Duration::from_secs(2 * 3600));
        store.increment(Counters::new(1, 1, 0)).await.unwrap();
        clock.advance(std::time::Duration::from_secs(24 * 3600));
        store.increment(Counters::new(2, 1, 1)).await.unwrap();

        assert_eq!(store.month_to_date().await.unwrap(), Counters::new(3, 2, 1));
    }
}
