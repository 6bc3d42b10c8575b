//! Shared state behind every service operation.
//!
//! Carries the access policy, the event bus, the counters, the sending side
//! of the internal event queue, and the process-wide shutdown signal. Admin
//! and Biz operations reach everything they need through the context.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::error::ServiceError;
use super::session::Session;
use crate::acl::AccessPolicy;
use crate::bus::{Event, EventBus};
use crate::stats::Counters;

/// Handles shared by all operations. Cheap to clone.
#[derive(Clone)]
pub struct Context {
    policy: Arc<AccessPolicy>,
    bus: EventBus,
    counters: Arc<Counters>,
    events: mpsc::Sender<Event>,
    shutdown: CancellationToken,
}

impl Context {
    pub(crate) fn new(
        policy: Arc<AccessPolicy>,
        bus: EventBus,
        counters: Arc<Counters>,
        events: mpsc::Sender<Event>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            policy,
            bus,
            counters,
            events,
            shutdown,
        }
    }

    /// Fail with `PermissionDenied` unless the caller may invoke `method`.
    pub fn authorize(&self, method: &str, session: &Session) -> Result<(), ServiceError> {
        if self.policy.authorize(method, session.consumer()) {
            Ok(())
        } else {
            warn!(consumer = %session.consumer(), method, "access denied");
            Err(ServiceError::permission_denied("access denied"))
        }
    }

    /// Hand an event to the drain task.
    ///
    /// Waits while the internal queue is full; fails once it has been closed.
    pub async fn emit(&self, event: Event) -> Result<(), ServiceError> {
        self.events.send(event).await.map_err(|dropped| {
            warn!(method = %dropped.0.method, "event queue closed, event dropped");
            ServiceError::unavailable("service is shutting down")
        })
    }

    /// Broadcast a streaming call's own event straight to the bus.
    ///
    /// Gives up with `Unavailable` if shutdown fires while a subscriber
    /// queue is full.
    pub async fn announce(&self, event: &Event) -> Result<(), ServiceError> {
        tokio::select! {
            _ = self.shutdown.cancelled() => {
                Err(ServiceError::unavailable("service is shutting down"))
            }
            _ = self.bus.broadcast(event) => Ok(()),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }
}
