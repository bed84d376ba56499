//! Runtime settings shared by the dispatch components.
//!
//! Values loaded from the configuration file form the node scope. Cluster-scope
//! overrides can be applied at runtime and take precedence; every component
//! reads a fresh [`DispatchSettings`] snapshot per call, so updates apply
//! without a restart.

use crate::config::Config;
use crate::models::ChannelKind;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Effective settings snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchSettings {
    pub monthly_send_limit: u64,
    pub email_size_limit_bytes: usize,
    pub operation_timeout: Duration,
    pub rolling_window_secs: u64,
    pub bucket_interval_secs: u64,
    pub max_conflict_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub allowed_types: Vec<ChannelKind>,
    pub host_deny_list: Vec<String>,
}

impl DispatchSettings {
    /// Node-scope settings from the loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            monthly_send_limit: config.quota.monthly_send_limit,
            email_size_limit_bytes: config.dispatch.email_size_limit_bytes,
            operation_timeout: Duration::from_millis(config.dispatch.operation_timeout_ms),
            rolling_window_secs: config.metrics.rolling_window_secs,
            bucket_interval_secs: config.metrics.bucket_interval_secs,
            max_conflict_retries: config.quota.max_conflict_retries,
            initial_backoff: Duration::from_millis(config.quota.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.quota.max_backoff_ms),
            allowed_types: config.dispatch.allowed_types.clone(),
            host_deny_list: config.dispatch.host_deny_list.clone(),
        }
    }

    pub fn is_allowed(&self, kind: ChannelKind) -> bool {
        self.allowed_types.contains(&kind)
    }

    pub fn is_host_denied(&self, host: &str) -> bool {
        self.host_deny_list
            .iter()
            .any(|denied| denied.eq_ignore_ascii_case(host))
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            monthly_send_limit: 10_000,
            email_size_limit_bytes: 10_000_000,
            operation_timeout: Duration::from_secs(5),
            rolling_window_secs: 3_600,
            bucket_interval_secs: 60,
            max_conflict_retries: 10,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
            allowed_types: ChannelKind::all(),
            host_deny_list: Vec::new(),
        }
    }
}

/// Cluster-scope overrides; `None` falls back to the node value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterOverrides {
    pub monthly_send_limit: Option<u64>,
    pub email_size_limit_bytes: Option<usize>,
    pub operation_timeout: Option<Duration>,
    pub rolling_window_secs: Option<u64>,
    pub bucket_interval_secs: Option<u64>,
    pub max_conflict_retries: Option<u32>,
    pub initial_backoff: Option<Duration>,
    pub max_backoff: Option<Duration>,
    pub allowed_types: Option<Vec<ChannelKind>>,
    pub host_deny_list: Option<Vec<String>>,
}

impl ClusterOverrides {
    fn apply(&self, node: &DispatchSettings) -> DispatchSettings {
        DispatchSettings {
            monthly_send_limit: self.monthly_send_limit.unwrap_or(node.monthly_send_limit),
            email_size_limit_bytes: self
                .email_size_limit_bytes
                .unwrap_or(node.email_size_limit_bytes),
            operation_timeout: self.operation_timeout.unwrap_or(node.operation_timeout),
            rolling_window_secs: self.rolling_window_secs.unwrap_or(node.rolling_window_secs),
            bucket_interval_secs: self
                .bucket_interval_secs
                .unwrap_or(node.bucket_interval_secs),
            max_conflict_retries: self
                .max_conflict_retries
                .unwrap_or(node.max_conflict_retries),
            initial_backoff: self.initial_backoff.unwrap_or(node.initial_backoff),
            max_backoff: self.max_backoff.unwrap_or(node.max_backoff),
            allowed_types: self
                .allowed_types
                .clone()
                .unwrap_or_else(|| node.allowed_types.clone()),
            host_deny_list: self
                .host_deny_list
                .clone()
                .unwrap_or_else(|| node.host_deny_list.clone()),
        }
    }
}

struct SettingsState {
    node: DispatchSettings,
    cluster: ClusterOverrides,
    effective: DispatchSettings,
}

/// Shared, dynamically updatable settings
#[derive(Clone)]
pub struct SettingsHandle {
    inner: Arc<RwLock<SettingsState>>,
}

impl SettingsHandle {
    pub fn new(node: DispatchSettings) -> Self {
        let cluster = ClusterOverrides::default();
        let effective = cluster.apply(&node);
        Self {
            inner: Arc::new(RwLock::new(SettingsState {
                node,
                cluster,
                effective,
            })),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(DispatchSettings::from_config(config))
    }

    /// Current effective settings
    pub fn snapshot(&self) -> DispatchSettings {
        self.inner.read().effective.clone()
    }

    /// Read from the current effective settings without cloning them
    pub fn read<R>(&self, f: impl FnOnce(&DispatchSettings) -> R) -> R {
        f(&self.inner.read().effective)
    }

    /// Replace the cluster-scope overrides
    pub fn apply_cluster_overrides(&self, overrides: ClusterOverrides) {
        let mut state = self.inner.write();
        state.effective = overrides.apply(&state.node);
        state.cluster = overrides;
        tracing::info!(settings = ?state.effective, "Cluster settings updated");
    }

    /// Replace the node-scope settings, keeping cluster overrides on top
    pub fn update_node(&self, node: DispatchSettings) {
        let mut state = self.inner.write();
        state.effective = state.cluster.apply(&node);
        state.node = node;
    }

    pub fn cluster_overrides(&self) -> ClusterOverrides {
        self.inner.read().cluster.clone()
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(DispatchSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::ConflictRetryPolicy;

    #[test]
    fn test_cluster_overrides_take_precedence() {
        let handle = SettingsHandle::default();
        assert_eq!(handle.snapshot().monthly_send_limit, 10_000);

        handle.apply_cluster_overrides(ClusterOverrides {
            monthly_send_limit: Some(5),
            ..Default::default()
        });

        let settings = handle.snapshot();
        assert_eq!(settings.monthly_send_limit, 5);
        assert_eq!(settings.email_size_limit_bytes, 10_000_000);
    }

    #[test]
    fn test_node_update_keeps_cluster_overrides() {
        let handle = SettingsHandle::default();
        handle.apply_cluster_overrides(ClusterOverrides {
            email_size_limit_bytes: Some(1_024),
            ..Default::default()
        });

        handle.update_node(DispatchSettings {
            monthly_send_limit: 42,
            email_size_limit_bytes: 99,
            ..Default::default()
        });

        let settings = handle.snapshot();
        assert_eq!(settings.monthly_send_limit, 42);
        assert_eq!(settings.email_size_limit_bytes, 1_024);
    }

    #[test]
    fn test_backoff_overrides() {
        let handle = SettingsHandle::default();
        handle.apply_cluster_overrides(ClusterOverrides {
            initial_backoff: Some(Duration::from_millis(250)),
            ..Default::default()
        });

        let settings = handle.snapshot();
        assert_eq!(settings.initial_backoff, Duration::from_millis(250));
        assert_eq!(settings.max_backoff, Duration::from_secs(1));

        let policy = ConflictRetryPolicy::from_settings(&settings).without_jitter();
        assert_eq!(policy.delay(1), Duration::from_millis(250));
        assert_eq!(policy.delay(10), Duration::from_secs(1));
    }

    #[test]
    fn test_host_deny_list_is_case_insensitive() {
        let settings = DispatchSettings {
            host_deny_list: vec!["Internal.Example.com".to_string()],
            ..Default::default()
        };
        assert!(settings.is_host_denied("internal.example.com"));
        assert!(!settings.is_host_denied("hooks.slack.com"));
    }
}
