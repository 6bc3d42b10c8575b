//! Service lifecycle: the internal event queue and its drain task.
//!
//! ```text
//!  Biz calls ──emit──▶ [ bounded event queue ] ──▶ drain task
//!                                                   ├─▶ EventBus::broadcast
//!                                                   └─▶ Counters::record
//!
//!  shutdown.cancel() ──▶ drain task: close queue, close_all, clear
//! ```
//!
//! The drain task is the only consumer of the queue, so events reach the
//! bus and the counters in the order they were emitted.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::admin::AdminService;
use super::biz::BizService;
use super::context::Context;
use crate::acl::AccessPolicy;
use crate::bus::{Event, EventBus};
use crate::stats::Counters;

/// Default capacity of the internal event queue.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 5;

/// Owner of the drain task. Running until `shutdown` is cancelled, then
/// stopped for good.
///
/// ## Example
///
/// ```ignore
/// let shutdown = CancellationToken::new();
/// let supervisor = Supervisor::start(policy, EventBus::new(), DEFAULT_EVENT_QUEUE_CAPACITY, shutdown.clone());
///
/// supervisor.biz().add(&session).await?;
///
/// shutdown.cancel();
/// supervisor.stopped().await;
/// ```
pub struct Supervisor {
    context: Context,
    drain: JoinHandle<()>,
}

impl Supervisor {
    /// Open the event queue and spawn the drain task. Must be called from
    /// within a Tokio runtime.
    pub fn start(
        policy: AccessPolicy,
        bus: EventBus,
        queue_capacity: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let (events, queue) = mpsc::channel(queue_capacity.max(1));
        let counters = Arc::new(Counters::new());
        let context = Context::new(
            Arc::new(policy),
            bus.clone(),
            Arc::clone(&counters),
            events,
            shutdown.clone(),
        );

        let drain = tokio::spawn(drain(queue, bus, counters, shutdown));
        info!(queue_capacity, "event drain started");

        Self { context, drain }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn admin(&self) -> AdminService {
        AdminService::new(self.context.clone())
    }

    pub fn biz(&self) -> BizService {
        BizService::new(self.context.clone())
    }

    /// Wait for the drain task to finish teardown.
    pub async fn stopped(self) {
        let _ = self.drain.await;
    }
}

async fn drain(
    mut queue: mpsc::Receiver<Event>,
    bus: EventBus,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            next = queue.recv() => match next {
                Some(event) => {
                    // A stalled subscriber must not hold off teardown.
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = bus.broadcast(&event) => counters.record(&event),
                    }
                }
                None => break,
            },
        }
    }

    // Senders still waiting on a full queue fail from here on.
    queue.close();
    bus.close_all().await;
    bus.clear().await;
    info!("event drain stopped");
}
