//! Call counters by method and by consumer.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::bus::{unix_now, Event};

/// Point-in-time copy of one counter mapping.
pub type Snapshot = HashMap<String, u64>;

/// Counter values, or a delta between two points in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stat {
    /// Seconds since the Unix epoch: last update for live counters,
    /// computation time for a delta.
    pub timestamp: i64,
    /// Count per fully-qualified method name.
    pub by_method: HashMap<String, u64>,
    /// Count per consumer name.
    pub by_consumer: HashMap<String, u64>,
}

/// Both counter mappings captured under one lock acquisition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub by_method: Snapshot,
    pub by_consumer: Snapshot,
}

/// Thread-safe, monotonically increasing call counters.
///
/// Increments and snapshots go through the same lock, so a snapshot never
/// observes half of an update and no increment is lost.
///
/// ## Example
///
/// ```
/// use event_relay::stats::Counters;
///
/// let counters = Counters::new();
/// let before = counters.snapshot();
///
/// counters.increment_method("/relay.Biz/Add");
/// counters.increment_consumer("svc");
///
/// let delta = counters.delta(&before.by_consumer, &before.by_method);
/// assert_eq!(delta.by_method["/relay.Biz/Add"], 1);
/// assert_eq!(delta.by_consumer["svc"], 1);
/// ```
#[derive(Debug, Default)]
pub struct Counters {
    inner: RwLock<Stat>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    // The guarded maps are only ever touched by single inserts/adds, so a
    // poisoned lock still holds consistent data.
    fn read(&self) -> RwLockReadGuard<'_, Stat> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Stat> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the last-update time to now.
    pub fn touch(&self) {
        self.write().timestamp = unix_now();
    }

    pub fn increment_method(&self, name: &str) {
        bump(&mut self.write().by_method, name);
    }

    pub fn increment_consumer(&self, name: &str) {
        bump(&mut self.write().by_consumer, name);
    }

    /// Fold one event in: touch, then count its method and consumer.
    pub fn record(&self, event: &Event) {
        let mut stat = self.write();
        stat.timestamp = unix_now();
        bump(&mut stat.by_method, &event.method);
        bump(&mut stat.by_consumer, &event.consumer);
    }

    /// Independent copy of the by-method mapping.
    pub fn snapshot_methods(&self) -> Snapshot {
        self.read().by_method.clone()
    }

    /// Independent copy of the by-consumer mapping.
    pub fn snapshot_consumers(&self) -> Snapshot {
        self.read().by_consumer.clone()
    }

    /// Copy of both mappings taken together.
    pub fn snapshot(&self) -> CounterSnapshot {
        let stat = self.read();
        CounterSnapshot {
            by_method: stat.by_method.clone(),
            by_consumer: stat.by_consumer.clone(),
        }
    }

    /// Last-update time, 0 if nothing has been recorded.
    pub fn last_update(&self) -> i64 {
        self.read().timestamp
    }

    /// Current value for `method`.
    pub fn method_count(&self, method: &str) -> u64 {
        self.read().by_method.get(method).copied().unwrap_or(0)
    }

    /// Current value for `consumer`.
    pub fn consumer_count(&self, consumer: &str) -> u64 {
        self.read().by_consumer.get(consumer).copied().unwrap_or(0)
    }

    /// Per-key growth since the given snapshots, stamped with the current time.
    ///
    /// Keys missing from a snapshot count from zero; keys that did not grow
    /// are left out.
    pub fn delta(&self, prev_consumers: &Snapshot, prev_methods: &Snapshot) -> Stat {
        let stat = self.read();
        Stat {
            timestamp: unix_now(),
            by_method: diff(&stat.by_method, prev_methods),
            by_consumer: diff(&stat.by_consumer, prev_consumers),
        }
    }

    /// Delta since `prev`, then move `prev` to the current values.
    ///
    /// Both steps share one read lock, so every increment lands in exactly
    /// one of two consecutive deltas.
    pub fn advance(&self, prev: &mut CounterSnapshot) -> Stat {
        let stat = self.read();
        let delta = Stat {
            timestamp: unix_now(),
            by_method: diff(&stat.by_method, &prev.by_method),
            by_consumer: diff(&stat.by_consumer, &prev.by_consumer),
        };
        prev.by_method.clone_from(&stat.by_method);
        prev.by_consumer.clone_from(&stat.by_consumer);
        delta
    }
}

fn bump(map: &mut HashMap<String, u64>, key: &str) {
    match map.get_mut(key) {
        Some(count) => *count += 1,
        None => {
            map.insert(key.to_string(), 1);
        }
    }
}

fn diff(current: &HashMap<String, u64>, previous: &Snapshot) -> HashMap<String, u64> {
    current
        .iter()
        .filter_map(|(key, &now)| {
            let before = previous.get(key).copied().unwrap_or(0);
            let grown = now.saturating_sub(before);
            (grown > 0).then(|| (key.clone(), grown))
        })
        .collect()
}
