//! Shared fixtures for the integration tests

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use notification_dispatcher::{
    channels::ChannelRegistry,
    clock::ManualClock,
    config::Config,
    dispatch::DispatchCoordinator,
    metrics::MetricsRegistry,
    quota::{CounterStore, QuotaAccountant},
    settings::{ClusterOverrides, SettingsHandle},
    state::{DocumentStore, InMemoryDocumentStore},
};
use std::collections::HashMap;
use std::sync::Arc;

pub struct Harness {
    pub config: Config,
    pub settings: SettingsHandle,
    pub clock: ManualClock,
    pub store: Arc<dyn DocumentStore>,
    pub metrics: Arc<MetricsRegistry>,
    pub accountant: Arc<QuotaAccountant>,
    pub coordinator: DispatchCoordinator,
}

/// Wire a coordinator over an in-memory store with the given monthly limit
pub fn harness(limit: u64, configure: impl FnOnce(&mut Config)) -> Harness {
    let mut config = Config::from_defaults().unwrap();
    configure(&mut config);

    let settings = SettingsHandle::from_config(&config);
    settings.apply_cluster_overrides(ClusterOverrides {
        monthly_send_limit: Some(limit),
        ..Default::default()
    });

    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 7, 14, 12, 0, 0).unwrap());
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let metrics = Arc::new(MetricsRegistry::new(
        Arc::new(clock.clone()),
        settings.clone(),
        2,
    ));

    let counters = CounterStore::new(
        store.clone(),
        "usage",
        Arc::new(clock.clone()),
        settings.clone(),
    )
    .with_metrics(metrics.clone());
    let accountant = Arc::new(QuotaAccountant::new(Arc::new(counters), settings.clone()));

    let registry = ChannelRegistry::new(
        &config,
        settings.clone(),
        metrics.clone(),
        Arc::new(clock.clone()),
    )
    .unwrap();
    let coordinator =
        DispatchCoordinator::new(accountant.clone(), Arc::new(registry), metrics.clone());

    Harness {
        config,
        settings,
        clock,
        store,
        metrics,
        accountant,
        coordinator,
    }
}

/// Parse Prometheus exposition text into metric name -> lines
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics = HashMap::new();
    let mut current_metric = String::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with("# HELP") || line.starts_with("# TYPE") {
            if let Some(name) = line.split_whitespace().nth(2) {
                current_metric = name.to_string();
                metrics
                    .entry(current_metric.clone())
                    .or_insert_with(Vec::new)
                    .push(line.to_string());
            }
        } else if !line.starts_with('#') && !current_metric.is_empty() {
            metrics
                .entry(current_metric.clone())
                .or_insert_with(Vec::new)
                .push(line.to_string());
        }
    }

    metrics
}
