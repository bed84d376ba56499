//! Delivery and operational metrics.
//!
//! Two layers live here:
//! - [`MetricsRegistry`]: fixed set of named in-process counters, some of them
//!   time-bucketed [`RollingCounter`]s, read back with `collect()`
//! - Prometheus statics for process-level exposition via [`gather_metrics`]
//!
//! # Example
//! ```no_run
//! use notification_dispatcher::metrics::NOTIFICATIONS_TOTAL;
//!
//! NOTIFICATIONS_TOTAL
//!     .with_label_values(&["slack", "success"])
//!     .inc();
//! ```

mod registry;
mod rolling;

pub use registry::{Metric, MetricKind, MetricsRegistry};
pub use rolling::RollingCounter;

use lazy_static::lazy_static;
use prometheus::{CounterVec, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// Dispatch requests by outcome
    ///
    /// Labels: outcome (sent, quota_exceeded, invalid)
    pub static ref DISPATCH_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("dispatch_requests_total", "Total number of dispatch requests")
            .namespace("notification_dispatcher"),
        &["outcome"]
    ).expect("Failed to create DISPATCH_REQUESTS_TOTAL metric");

    /// End-to-end dispatch duration in seconds
    pub static ref DISPATCH_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "dispatch_duration_seconds",
            "End-to-end dispatch duration in seconds"
        )
        .namespace("notification_dispatcher")
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
    ).expect("Failed to create DISPATCH_DURATION_SECONDS metric");

    // ============================================================================
    // Notification Metrics
    // ============================================================================

    /// Total number of notifications sent
    ///
    /// Labels: channel, status
    pub static ref NOTIFICATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("notifications_total", "Total number of notifications sent")
            .namespace("notification_dispatcher"),
        &["channel", "status"]
    ).expect("Failed to create NOTIFICATIONS_TOTAL metric");

    /// Notification delivery duration in seconds
    ///
    /// Labels: channel
    pub static ref NOTIFICATION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "notification_duration_seconds",
            "Notification delivery duration in seconds"
        )
        .namespace("notification_dispatcher")
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["channel"]
    ).expect("Failed to create NOTIFICATION_DURATION_SECONDS metric");

    // ============================================================================
    // Quota Metrics
    // ============================================================================

    /// Usage counter write conflicts that were retried
    pub static ref QUOTA_CONFLICTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("quota_conflicts_total", "Usage counter write conflicts")
            .namespace("notification_dispatcher"),
        &["outcome"]
    ).expect("Failed to create QUOTA_CONFLICTS_TOTAL metric");

    /// Month-to-date successful sends as last observed
    ///
    /// Labels: counter (request, success, failure)
    pub static ref QUOTA_MONTHLY_USAGE: GaugeVec = GaugeVec::new(
        Opts::new("quota_monthly_usage", "Month-to-date send counters")
            .namespace("notification_dispatcher"),
        &["counter"]
    ).expect("Failed to create QUOTA_MONTHLY_USAGE metric");

    // ============================================================================
    // Storage Metrics
    // ============================================================================

    /// Total number of storage operations
    ///
    /// Labels: operation, backend
    pub static ref STORAGE_OPERATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("storage_operations_total", "Total number of storage operations")
            .namespace("notification_dispatcher"),
        &["operation", "backend"]
    ).expect("Failed to create STORAGE_OPERATIONS_TOTAL metric");

    /// Storage operation duration in seconds
    ///
    /// Labels: operation, backend
    pub static ref STORAGE_OPERATION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "storage_operation_duration_seconds",
            "Storage operation duration in seconds"
        )
        .namespace("notification_dispatcher")
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["operation", "backend"]
    ).expect("Failed to create STORAGE_OPERATION_DURATION_SECONDS metric");

    // ============================================================================
    // System Metrics
    // ============================================================================

    /// Application build info
    ///
    /// Labels: version
    pub static ref BUILD_INFO: GaugeVec = GaugeVec::new(
        Opts::new("build_info", "Application build information")
            .namespace("notification_dispatcher"),
        &["version"]
    ).expect("Failed to create BUILD_INFO metric");
}

/// Register all metrics with the Prometheus registry.
///
/// Call once at startup; a second call fails with `AlreadyReg`.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(DISPATCH_REQUESTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(DISPATCH_DURATION_SECONDS.clone()))?;

    PROMETHEUS_REGISTRY.register(Box::new(NOTIFICATIONS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(NOTIFICATION_DURATION_SECONDS.clone()))?;

    PROMETHEUS_REGISTRY.register(Box::new(QUOTA_CONFLICTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(QUOTA_MONTHLY_USAGE.clone()))?;

    PROMETHEUS_REGISTRY.register(Box::new(STORAGE_OPERATIONS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(STORAGE_OPERATION_DURATION_SECONDS.clone()))?;

    PROMETHEUS_REGISTRY.register(Box::new(BUILD_INFO.clone()))?;

    BUILD_INFO
        .with_label_values(&[env!("CARGO_PKG_VERSION")])
        .set(1.0);

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Generate Prometheus text format metrics
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_counter() {
        NOTIFICATIONS_TOTAL
            .with_label_values(&["webhook", "success"])
            .inc();

        let value = NOTIFICATIONS_TOTAL
            .with_label_values(&["webhook", "success"])
            .get();
        assert!(value >= 1.0);
    }

    #[test]
    fn test_gather_metrics() {
        // Registration may already have happened in another test
        let _ = init_metrics();
        BUILD_INFO
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1.0);

        let metrics = gather_metrics();
        assert!(metrics.contains("notification_dispatcher_build_info"));
    }
}
