//! Call statistics.
//!
//! [`Counters`] is written by the drain task (and by `Statistics` calls for
//! their own invocation) and read by any number of statistics streams, which
//! turn it into periodic [`Stat`] deltas.

mod counters;

pub use counters::{CounterSnapshot, Counters, Snapshot, Stat};
