use crate::channels::ChannelRegistry;
use crate::error::{AppError, Result};
use crate::metrics::{Metric, MetricsRegistry, DISPATCH_DURATION_SECONDS, DISPATCH_REQUESTS_TOTAL};
use crate::models::{Counters, DispatchRequest, DispatchResponse, RecipientResult};
use crate::quota::QuotaAccountant;
use futures::future::join_all;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Sends a message to every recipient of a request, at most once each.
///
/// The quota is checked up front for the whole recipient list; sends then run
/// concurrently and the observed counts are recorded afterwards. One
/// recipient failing never affects the others.
pub struct DispatchCoordinator {
    accountant: Arc<QuotaAccountant>,
    registry: Arc<ChannelRegistry>,
    metrics: Arc<MetricsRegistry>,
}

impl DispatchCoordinator {
    pub fn new(
        accountant: Arc<QuotaAccountant>,
        registry: Arc<ChannelRegistry>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            accountant,
            registry,
            metrics,
        }
    }

    pub fn accountant(&self) -> &QuotaAccountant {
        &self.accountant
    }

    #[instrument(
        skip(self, request),
        fields(ref_tag = %request.ref_tag, recipients = request.recipients.len())
    )]
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchResponse> {
        let start = Instant::now();
        self.metrics.increment(Metric::DispatchTotal);
        self.metrics.increment(Metric::DispatchIntervalCount);

        let outcome = self.fan_out(request).await;

        let label = match &outcome {
            Ok(_) => "sent",
            Err(AppError::QuotaExceeded(_)) => "quota_exceeded",
            Err(AppError::Validation(_)) => "invalid",
            Err(_) => "error",
        };
        DISPATCH_REQUESTS_TOTAL.with_label_values(&[label]).inc();
        DISPATCH_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());

        outcome
    }

    async fn fan_out(&self, request: DispatchRequest) -> Result<DispatchResponse> {
        let DispatchRequest {
            ref_tag,
            recipients,
            message,
        } = request;

        if recipients.is_empty() {
            self.metrics.increment(Metric::DispatchValidationError);
            return Err(AppError::Validation(
                "Dispatch request has no recipients".to_string(),
            ));
        }

        let pending = recipients.len() as u64;
        if !self.accountant.is_available(pending).await? {
            self.metrics.increment(Metric::DispatchQuotaExceeded);
            tracing::warn!(
                ref_tag = %ref_tag,
                pending,
                limit = self.accountant.monthly_limit(),
                "Monthly send quota exhausted, nothing sent"
            );
            return Err(AppError::QuotaExceeded(format!(
                "Sending to {} recipients would exceed the monthly limit of {}",
                pending,
                self.accountant.monthly_limit()
            )));
        }
        self.metrics.add(Metric::DispatchRecipients, pending);

        let message = Arc::new(message);
        let handles: Vec<_> = recipients
            .iter()
            .cloned()
            .map(|destination| {
                let registry = Arc::clone(&self.registry);
                let message = Arc::clone(&message);
                let ref_tag = ref_tag.clone();
                tokio::spawn(async move {
                    registry.deliver(&ref_tag, &destination, &message).await
                })
            })
            .collect();

        let results: Vec<RecipientResult> = join_all(handles)
            .await
            .into_iter()
            .zip(&recipients)
            .map(|(joined, destination)| match joined {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => RecipientResult::new(
                    destination.address(),
                    StatusCode::INTERNAL_SERVER_ERROR,
                    e.to_string(),
                ),
                Err(e) => {
                    self.metrics.record_send(destination.kind(), false);
                    tracing::error!(
                        ref_tag = %ref_tag,
                        recipient = destination.address(),
                        error = %e,
                        "Delivery task failed"
                    );
                    RecipientResult::new(
                        destination.address(),
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Delivery task failed",
                    )
                }
            })
            .collect();

        let response = DispatchResponse { ref_tag, results };
        let usage = Counters::new(
            pending,
            response.success_count() as u64,
            response.failure_count() as u64,
        );

        if let Err(e) = self.accountant.increment(usage).await {
            // Messages already went out; report them regardless
            self.metrics.increment(Metric::DispatchUsageIncrementFailed);
            tracing::error!(
                ref_tag = %response.ref_tag,
                error = %e,
                ?usage,
                "Failed to record usage after dispatch"
            );
        }

        tracing::info!(
            ref_tag = %response.ref_tag,
            status = response.overall_status().as_u16(),
            successes = usage.success_count,
            failures = usage.failure_count,
            "Dispatch completed"
        );

        Ok(response)
    }
}
