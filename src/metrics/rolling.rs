use crate::clock::SharedClock;
use crate::settings::SettingsHandle;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Counter bucketed by fixed time intervals.
///
/// `value()` reports the last completed interval, never the one still
/// filling up. Interval and window come from the shared settings on every
/// call; when the interval changes the existing buckets no longer line up
/// with the new keys and are dropped.
pub struct RollingCounter {
    buckets: DashMap<i64, AtomicU64>,
    clock: SharedClock,
    settings: SettingsHandle,
    interval_secs: AtomicI64,
    trim_factor: usize,
}

#[derive(Debug, Clone, Copy)]
struct Geometry {
    interval_secs: i64,
    window_secs: i64,
}

impl Geometry {
    fn steady_state_buckets(&self) -> usize {
        (self.window_secs / self.interval_secs) as usize
    }
}

impl RollingCounter {
    pub fn new(clock: SharedClock, settings: SettingsHandle, trim_factor: usize) -> Self {
        let counter = Self {
            buckets: DashMap::new(),
            clock,
            settings,
            interval_secs: AtomicI64::new(0),
            trim_factor: trim_factor.max(1),
        };
        counter.geometry();
        counter
    }

    /// Current interval and window, clearing buckets keyed by a stale interval
    fn geometry(&self) -> Geometry {
        let (interval, window) = self
            .settings
            .read(|s| (s.bucket_interval_secs, s.rolling_window_secs));
        let interval_secs = interval.max(1) as i64;
        let geometry = Geometry {
            interval_secs,
            window_secs: (window as i64).max(interval_secs),
        };

        let previous = self.interval_secs.swap(interval_secs, Ordering::AcqRel);
        if previous != 0 && previous != interval_secs {
            self.buckets.clear();
            tracing::debug!(
                from_secs = previous,
                to_secs = interval_secs,
                "Rolling counter interval changed, buckets cleared"
            );
        }
        geometry
    }

    fn current_key(&self, geometry: Geometry) -> i64 {
        self.clock.now().timestamp().div_euclid(geometry.interval_secs)
    }

    pub fn increment(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        let geometry = self.geometry();
        let key = self.current_key(geometry);
        // Entry guard must drop before len() takes the other shard locks
        self.buckets
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(n, Ordering::Relaxed);

        if self.buckets.len() > self.trim_factor * geometry.steady_state_buckets() {
            self.trim(key, geometry);
        }
    }

    fn trim(&self, current: i64, geometry: Geometry) {
        let oldest = current - geometry.steady_state_buckets() as i64;
        self.buckets.retain(|key, _| *key >= oldest);
    }

    /// Value of the interval immediately preceding now
    pub fn value(&self) -> u64 {
        let geometry = self.geometry();
        let previous = self.current_key(geometry) - 1;
        self.buckets
            .get(&previous)
            .map(|bucket| bucket.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn reset(&self) {
        self.buckets.clear();
    }

    pub(crate) fn live_buckets(&self) -> usize {
        self.buckets.len()
    }
}
