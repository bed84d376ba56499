use crate::error::Result;
use crate::metrics::QUOTA_MONTHLY_USAGE;
use crate::models::Counters;
use crate::quota::CounterStore;
use crate::settings::SettingsHandle;
use std::sync::Arc;
use tracing::instrument;

/// Admission control and usage recording against the monthly send limit.
///
/// The check and the increment are separate operations: concurrent
/// dispatches may each pass the check and together overshoot the limit.
pub struct QuotaAccountant {
    counters: Arc<CounterStore>,
    settings: SettingsHandle,
}

impl QuotaAccountant {
    pub fn new(counters: Arc<CounterStore>, settings: SettingsHandle) -> Self {
        Self { counters, settings }
    }

    pub async fn ensure_collection(&self) -> Result<()> {
        self.counters.ensure_collection().await
    }

    /// True iff month-to-date successes plus `pending` stay within the limit
    #[instrument(skip(self))]
    pub async fn is_available(&self, pending: u64) -> Result<bool> {
        let limit = self.settings.snapshot().monthly_send_limit;
        let used = self.counters.month_to_date().await?.success_count;
        let available = used.saturating_add(pending) <= limit;

        tracing::debug!(used, pending, limit, available, "Quota check");
        Ok(available)
    }

    /// Record observed send counts for today
    pub async fn increment(&self, delta: Counters) -> Result<()> {
        if delta.is_zero() {
            return Ok(());
        }
        self.counters.increment(delta).await?;
        Ok(())
    }

    /// Month-to-date usage totals
    pub async fn monthly_usage(&self) -> Result<Counters> {
        let usage = self.counters.month_to_date().await?;

        QUOTA_MONTHLY_USAGE
            .with_label_values(&["request"])
            .set(usage.request_count as f64);
        QUOTA_MONTHLY_USAGE
            .with_label_values(&["success"])
            .set(usage.success_count as f64);
        QUOTA_MONTHLY_USAGE
            .with_label_values(&["failure"])
            .set(usage.failure_count as f64);

        Ok(usage)
    }

    pub fn monthly_limit(&self) -> u64 {
        self.settings.snapshot().monthly_send_limit
    }
}
