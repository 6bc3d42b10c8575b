//! Admin operations: live call log and periodic statistics.
//!
//! Both are server-streaming. Opening a stream does all the checks and
//! bookkeeping up front and hands back a stream object; the transport then
//! drives `run` with a sink for the caller's side of the stream.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::context::Context;
use super::error::ServiceError;
use super::session::Session;
use super::{LOGGING, STATISTICS};
use crate::bus::{Event, Subscription};
use crate::stats::{CounterSnapshot, Stat};

/// Why a server stream stopped. None of these are errors for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The subscriber queue was closed by bus teardown.
    Closed,
    /// The caller went away.
    Disconnected,
    /// The process-wide shutdown signal fired.
    Shutdown,
}

/// `Logging` and `Statistics`.
#[derive(Clone)]
pub struct AdminService {
    context: Context,
}

impl AdminService {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    /// Open a live log of every call.
    ///
    /// The opening call is itself broadcast first, so observers already
    /// attached see the new one arrive. Each stream gets its own subscriber
    /// id, so one consumer may hold several.
    pub async fn logging(&self, session: &Session) -> Result<LogStream, ServiceError> {
        self.context.authorize(LOGGING, session)?;
        let host = session.require_host()?;

        let event = Event::new(LOGGING, session.consumer(), host);
        self.context.announce(&event).await?;

        let subscriber_id = format!("{}-{}", session.consumer(), rand::random::<u64>());
        let subscription = self.context.bus().subscribe(subscriber_id).await?;
        info!(consumer = %session.consumer(), subscriber = %subscription.id(), "log stream opened");

        Ok(LogStream {
            subscription,
            context: self.context.clone(),
        })
    }

    /// Open a stream of counter deltas, one every `interval_seconds`.
    ///
    /// The opening call is broadcast and counted before the first snapshot
    /// is taken, so it shows up in other streams but not in this one.
    pub async fn statistics(
        &self,
        session: &Session,
        interval_seconds: u64,
    ) -> Result<StatStream, ServiceError> {
        self.context.authorize(STATISTICS, session)?;
        if interval_seconds == 0 {
            return Err(ServiceError::invalid_argument(
                "interval must be at least one second",
            ));
        }
        let period = Duration::from_secs(interval_seconds);
        let first_tick = Instant::now()
            .checked_add(period)
            .ok_or_else(|| ServiceError::invalid_argument("interval is too large"))?;
        let host = session.require_host()?;

        let event = Event::new(STATISTICS, session.consumer(), host);
        self.context.announce(&event).await?;
        self.context.counters().record(&event);

        let snapshot = self.context.counters().snapshot();
        info!(consumer = %session.consumer(), interval_seconds, "statistics stream opened");

        Ok(StatStream {
            first_tick,
            period,
            snapshot,
            context: self.context.clone(),
        })
    }
}

/// An open `Logging` stream.
///
/// Dropping it, including when `run` returns, unregisters the subscriber.
pub struct LogStream {
    subscription: Subscription,
    context: Context,
}

impl LogStream {
    /// The subscriber id backing this stream.
    pub fn subscriber_id(&self) -> &str {
        self.subscription.id()
    }

    /// Forward events to `sink` until the queue closes, the caller goes
    /// away, or shutdown is signalled.
    pub async fn run(mut self, sink: mpsc::Sender<Event>) -> StreamEnd {
        let shutdown = self.context.shutdown().clone();
        let end = loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break StreamEnd::Shutdown,
                _ = sink.closed() => break StreamEnd::Disconnected,
                next = self.subscription.recv() => next,
            };
            let Some(event) = next else {
                break StreamEnd::Closed;
            };
            tokio::select! {
                _ = shutdown.cancelled() => break StreamEnd::Shutdown,
                sent = sink.send(event) => {
                    if sent.is_err() {
                        break StreamEnd::Disconnected;
                    }
                }
            }
        };
        debug!(subscriber = %self.subscription.id(), ?end, "log stream ended");
        end
    }
}

/// An open `Statistics` stream.
pub struct StatStream {
    first_tick: Instant,
    period: Duration,
    snapshot: CounterSnapshot,
    context: Context,
}

impl StatStream {
    /// Send a delta to `sink` every period until the caller goes away or
    /// shutdown is signalled. The first delta arrives one period after
    /// the stream was opened.
    pub async fn run(mut self, sink: mpsc::Sender<Stat>) -> StreamEnd {
        let shutdown = self.context.shutdown().clone();
        let mut ticker = time::interval_at(self.first_tick, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let end = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break StreamEnd::Shutdown,
                _ = sink.closed() => break StreamEnd::Disconnected,
                _ = ticker.tick() => {}
            }
            let delta = self.context.counters().advance(&mut self.snapshot);
            tokio::select! {
                _ = shutdown.cancelled() => break StreamEnd::Shutdown,
                sent = sink.send(delta) => {
                    if sent.is_err() {
                        break StreamEnd::Disconnected;
                    }
                }
            }
        };
        debug!(?end, "statistics stream ended");
        end
    }
}
