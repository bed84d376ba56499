//! Named in-process counters.
//!
//! Every [`Metric`] has a dotted name and is backed by either a monotonic
//! counter or a [`RollingCounter`]. These are independent of the persisted
//! quota counters.

use crate::clock::SharedClock;
use crate::metrics::RollingCounter;
use crate::models::ChannelKind;
use crate::settings::SettingsHandle;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use strum::IntoEnumIterator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    DispatchTotal,
    DispatchIntervalCount,
    DispatchRecipients,
    DispatchQuotaExceeded,
    DispatchValidationError,
    DispatchUsageIncrementFailed,
    ChannelSuccess(ChannelKind),
    ChannelFailure(ChannelKind),
    ChannelIntervalCount(ChannelKind),
    QuotaConflictRetries,
    ConfigCreate,
    ConfigUpdate,
    ConfigDelete,
    ConfigConflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Basic,
    Rolling,
}

impl Metric {
    /// The complete metric set
    pub fn all() -> Vec<Metric> {
        let mut metrics = vec![
            Metric::DispatchTotal,
            Metric::DispatchIntervalCount,
            Metric::DispatchRecipients,
            Metric::DispatchQuotaExceeded,
            Metric::DispatchValidationError,
            Metric::DispatchUsageIncrementFailed,
            Metric::QuotaConflictRetries,
            Metric::ConfigCreate,
            Metric::ConfigUpdate,
            Metric::ConfigDelete,
            Metric::ConfigConflict,
        ];
        for kind in ChannelKind::iter() {
            metrics.push(Metric::ChannelSuccess(kind));
            metrics.push(Metric::ChannelFailure(kind));
            metrics.push(Metric::ChannelIntervalCount(kind));
        }
        metrics
    }

    pub fn name(&self) -> String {
        match self {
            Metric::DispatchTotal => "notifications.dispatch.total".to_string(),
            Metric::DispatchIntervalCount => "notifications.dispatch.interval_count".to_string(),
            Metric::DispatchRecipients => "notifications.dispatch.recipients".to_string(),
            Metric::DispatchQuotaExceeded => "notifications.dispatch.quota_exceeded".to_string(),
            Metric::DispatchValidationError => {
                "notifications.dispatch.validation_error".to_string()
            }
            Metric::DispatchUsageIncrementFailed => {
                "notifications.dispatch.usage_increment_failed".to_string()
            }
            Metric::ChannelSuccess(kind) => format!("notifications.channel.{}.success", kind),
            Metric::ChannelFailure(kind) => format!("notifications.channel.{}.failure", kind),
            Metric::ChannelIntervalCount(kind) => {
                format!("notifications.channel.{}.interval_count", kind)
            }
            Metric::QuotaConflictRetries => "notifications.quota.conflict_retries".to_string(),
            Metric::ConfigCreate => "notifications.config.create".to_string(),
            Metric::ConfigUpdate => "notifications.config.update".to_string(),
            Metric::ConfigDelete => "notifications.config.delete".to_string(),
            Metric::ConfigConflict => "notifications.config.conflict".to_string(),
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::DispatchIntervalCount | Metric::ChannelIntervalCount(_) => MetricKind::Rolling,
            _ => MetricKind::Basic,
        }
    }
}

enum MetricCounter {
    Basic(AtomicU64),
    Rolling(RollingCounter),
}

impl MetricCounter {
    fn add(&self, n: u64) {
        match self {
            MetricCounter::Basic(counter) => {
                counter.fetch_add(n, Ordering::Relaxed);
            }
            MetricCounter::Rolling(counter) => counter.add(n),
        }
    }

    fn value(&self) -> u64 {
        match self {
            MetricCounter::Basic(counter) => counter.load(Ordering::Relaxed),
            MetricCounter::Rolling(counter) => counter.value(),
        }
    }

    fn reset(&self) {
        match self {
            MetricCounter::Basic(counter) => counter.store(0, Ordering::Relaxed),
            MetricCounter::Rolling(counter) => counter.reset(),
        }
    }
}

/// Fixed registry holding one counter per [`Metric`]
pub struct MetricsRegistry {
    counters: HashMap<Metric, MetricCounter>,
}

impl MetricsRegistry {
    /// Rolling counters follow interval and window changes in `settings`
    pub fn new(clock: SharedClock, settings: SettingsHandle, trim_factor: usize) -> Self {
        let counters = Metric::all()
            .into_iter()
            .map(|metric| {
                let counter = match metric.kind() {
                    MetricKind::Basic => MetricCounter::Basic(AtomicU64::new(0)),
                    MetricKind::Rolling => MetricCounter::Rolling(RollingCounter::new(
                        clock.clone(),
                        settings.clone(),
                        trim_factor,
                    )),
                };
                (metric, counter)
            })
            .collect();

        Self { counters }
    }

    pub fn increment(&self, metric: Metric) {
        self.add(metric, 1);
    }

    pub fn add(&self, metric: Metric, n: u64) {
        if let Some(counter) = self.counters.get(&metric) {
            counter.add(n);
        }
    }

    pub fn value(&self, metric: Metric) -> u64 {
        self.counters.get(&metric).map_or(0, MetricCounter::value)
    }

    /// Record one channel send outcome
    pub fn record_send(&self, kind: ChannelKind, success: bool) {
        if success {
            self.increment(Metric::ChannelSuccess(kind));
        } else {
            self.increment(Metric::ChannelFailure(kind));
        }
        self.increment(Metric::ChannelIntervalCount(kind));
    }

    pub fn reset(&self) {
        self.counters.values().for_each(MetricCounter::reset);
    }

    /// Flat name -> value snapshot
    pub fn collect(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|(metric, counter)| (metric.name(), counter.value()))
            .collect()
    }

    /// Snapshot nested by splitting names on `.`
    pub fn collect_nested(&self) -> Value {
        let mut root = Map::new();
        for (name, value) in self.collect() {
            let mut segments: Vec<&str> = name.split('.').collect();
            let leaf = match segments.pop() {
                Some(leaf) => leaf,
                None => continue,
            };

            let mut node = &mut root;
            for segment in segments {
                node = match node
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new()))
                {
                    Value::Object(map) => map,
                    _ => unreachable!("metric name {} nests under a leaf", name),
                };
            }
            node.insert(leaf.to_string(), Value::from(value));
        }
        Value::Object(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use std::time::Duration;

    fn registry() -> (MetricsRegistry, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap());
        let registry = MetricsRegistry::new(Arc::new(clock.clone()), SettingsHandle::default(), 2);
        (registry, clock)
    }

    #[test]
    fn test_names_are_unique() {
        let names: std::collections::HashSet<_> = Metric::all().iter().map(Metric::name).collect();
        assert_eq!(names.len(), Metric::all().len());

        // No name may be a path prefix of another
        for a in &names {
            for b in &names {
                assert!(!b.starts_with(&format!("{}.", a)), "{} nests under {}", b, a);
            }
        }
    }

    #[test]
    fn test_collect_flat() {
        let (registry, _clock) = registry();
        registry.add(Metric::DispatchTotal, 3);
        registry.record_send(ChannelKind::Slack, true);
        registry.record_send(ChannelKind::Slack, false);

        let snapshot = registry.collect();
        assert_eq!(snapshot["notifications.dispatch.total"], 3);
        assert_eq!(snapshot["notifications.channel.slack.success"], 1);
        assert_eq!(snapshot["notifications.channel.slack.failure"], 1);
        assert_eq!(snapshot.len(), Metric::all().len());
    }

    #[test]
    fn test_rolling_metric_reports_last_interval() {
        let (registry, clock) = registry();
        registry.increment(Metric::DispatchIntervalCount);
        assert_eq!(registry.value(Metric::DispatchIntervalCount), 0);

        clock.advance(Duration::from_secs(60));
        assert_eq!(registry.value(Metric::DispatchIntervalCount), 1);
    }

    #[test]
    fn test_collect_nested() {
        let (registry, _clock) = registry();
        registry.increment(Metric::ConfigCreate);

        let nested = registry.collect_nested();
        assert_eq!(nested["notifications"]["config"]["create"], 1);
        assert_eq!(nested["notifications"]["channel"]["sns"]["success"], 0);
    }
}
