use chrono::{TimeZone, Utc};
use notification_dispatcher::{
    clock::ManualClock,
    metrics::{Metric, MetricsRegistry, RollingCounter},
    settings::{ClusterOverrides, DispatchSettings, SettingsHandle},
};
use std::sync::Arc;
use std::time::Duration;

fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap())
}

fn minute_buckets(window_secs: u64) -> SettingsHandle {
    SettingsHandle::new(DispatchSettings {
        bucket_interval_secs: 60,
        rolling_window_secs: window_secs,
        ..Default::default()
    })
}

/// Test the add, read, advance, read sequence for one-minute buckets
#[test]
fn test_value_reflects_previous_interval_only() {
    let clock = clock();
    let counter = RollingCounter::new(Arc::new(clock.clone()), minute_buckets(3_600), 2);

    counter.add(5);
    assert_eq!(counter.value(), 0);

    clock.advance(Duration::from_secs(60));
    counter.add(3);
    assert_eq!(counter.value(), 5);

    clock.advance(Duration::from_secs(60));
    assert_eq!(counter.value(), 3);
}

/// Test concurrent writers within one interval
#[test]
fn test_concurrent_adds_are_not_lost() {
    let clock = clock();
    let counter = Arc::new(RollingCounter::new(Arc::new(clock.clone()), minute_buckets(600), 2));

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let counter = counter.clone();
            std::thread::spawn(move || {
                for _ in 0..1_000 {
                    counter.increment();
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    clock.advance(Duration::from_secs(60));
    assert_eq!(counter.value(), 8_000);
}

/// Test that the registry snapshot exposes rolling and basic metrics together
#[test]
fn test_registry_snapshot() {
    let clock = clock();
    let registry = MetricsRegistry::new(Arc::new(clock.clone()), SettingsHandle::default(), 2);

    registry.add(Metric::DispatchIntervalCount, 4);
    registry.add(Metric::DispatchTotal, 4);
    clock.advance(Duration::from_secs(60));

    let snapshot = registry.collect();
    assert_eq!(snapshot["notifications.dispatch.interval_count"], 4);
    assert_eq!(snapshot["notifications.dispatch.total"], 4);

    registry.reset();
    assert!(registry.collect().values().all(|v| *v == 0));
}

/// Test that a running registry picks up a new bucket interval
#[test]
fn test_registry_follows_interval_override() {
    let clock = clock();
    let settings = SettingsHandle::default();
    let registry = MetricsRegistry::new(Arc::new(clock.clone()), settings.clone(), 2);

    registry.add(Metric::DispatchIntervalCount, 9);
    clock.advance(Duration::from_secs(30));
    assert_eq!(registry.value(Metric::DispatchIntervalCount), 0);

    settings.apply_cluster_overrides(ClusterOverrides {
        bucket_interval_secs: Some(30),
        ..Default::default()
    });
    registry.add(Metric::DispatchIntervalCount, 2);
    clock.advance(Duration::from_secs(30));

    assert_eq!(registry.value(Metric::DispatchIntervalCount), 2);
    assert_eq!(registry.value(Metric::DispatchTotal), 0);
}
