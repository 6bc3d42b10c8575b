//! The record emitted for every inbound call.

use std::time::{SystemTime, UNIX_EPOCH};

/// One RPC invocation, as seen by log subscribers and the counters.
///
/// Events are created once per call and never mutated; every subscriber
/// receives its own clone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Fully-qualified method name (e.g. `/relay.Biz/Add`).
    pub method: String,
    /// Caller identity taken from the `consumer` metadata.
    pub consumer: String,
    /// Caller network address.
    pub host: String,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(
        method: impl Into<String>,
        consumer: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: unix_now(),
            method: method.into(),
            consumer: consumer.into(),
            host: host.into(),
        }
    }
}

/// Current time as whole seconds since the Unix epoch.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
