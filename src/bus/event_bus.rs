//! Subscriber pool: one bounded delivery queue per registered subscriber.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use super::event::Event;
use super::subscriber::Subscription;

/// Default capacity of each subscriber queue.
///
/// A single slot keeps delivery close to a direct hand-off: the broadcaster
/// runs at most one event ahead of each reader.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1;

/// Reasons a subscribe request is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// A subscriber with this id is already registered.
    #[error("subscriber already registered: {0}")]
    DuplicateSubscriber(String),
    /// The pool has been torn down.
    #[error("event bus closed")]
    Closed,
}

/// One registered subscriber queue. `sender` is `None` once closed.
struct Registration {
    serial: u64,
    sender: Option<mpsc::Sender<Event>>,
}

#[derive(Default)]
struct PoolState {
    queues: HashMap<String, Registration>,
    next_serial: u64,
    closed: bool,
}

/// Fan-out pool mapping subscriber ids to delivery queues.
///
/// Cheap to clone; all clones share the same registrations.
///
/// ## Backpressure
///
/// `broadcast` performs a blocking send into each queue in turn while
/// holding the read lock over the registrations. A subscriber that stops
/// reading without dropping its [`Subscription`] stalls delivery to every
/// subscriber after it, and holds off `subscribe`/`unsubscribe`/`clear`
/// until it reads again or goes away. Events are never dropped to work
/// around a slow reader.
///
/// ## Example
///
/// ```
/// use event_relay::bus::{Event, EventBus};
///
/// # tokio_test_block_on(async {
/// let bus = EventBus::with_capacity(4);
/// let mut sub = bus.subscribe("admin-1").await.unwrap();
///
/// bus.broadcast(&Event::new("/relay.Biz/Add", "svc", "127.0.0.1:1")).await;
/// assert_eq!(sub.recv().await.unwrap().method, "/relay.Biz/Add");
///
/// // A second registration under the same id is rejected.
/// assert!(bus.subscribe("admin-1").await.is_err());
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct EventBus {
    state: Arc<RwLock<PoolState>>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a pool whose subscriber queues hold [`DEFAULT_SUBSCRIBER_CAPACITY`] events.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Create a pool with the given per-subscriber queue capacity (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(PoolState::default())),
            capacity: capacity.max(1),
        }
    }

    /// Register a subscriber queue under `id`.
    ///
    /// Lookup and insert happen under one write lock, so at most one
    /// registration per id can exist. Dropping the returned
    /// [`Subscription`] unregisters it.
    pub async fn subscribe(&self, id: impl Into<String>) -> Result<Subscription, BusError> {
        let id = id.into();
        let mut state = self.state.write().await;
        if state.closed {
            return Err(BusError::Closed);
        }

        let serial = state.next_serial;
        match state.queues.entry(id.clone()) {
            Entry::Occupied(_) => {
                debug!(subscriber = %id, "duplicate subscriber rejected");
                Err(BusError::DuplicateSubscriber(id))
            }
            Entry::Vacant(slot) => {
                let (sender, receiver) = mpsc::channel(self.capacity);
                slot.insert(Registration {
                    serial,
                    sender: Some(sender),
                });
                state.next_serial += 1;
                debug!(subscriber = %id, serial, "subscriber registered");
                Ok(Subscription::new(id, serial, receiver, self.clone()))
            }
        }
    }

    /// Remove the registration for `id`. Unknown ids are ignored.
    pub async fn unsubscribe(&self, id: &str) {
        let mut state = self.state.write().await;
        if state.queues.remove(id).is_some() {
            debug!(subscriber = %id, "subscriber removed");
        }
    }

    /// Deliver a copy of `event` to every registered, open queue.
    ///
    /// Returns the number of queues that accepted the event. Queues whose
    /// reader has gone away are skipped.
    pub async fn broadcast(&self, event: &Event) -> usize {
        let state = self.state.read().await;
        let mut delivered = 0;
        for (id, registration) in state.queues.iter() {
            let Some(sender) = &registration.sender else {
                continue;
            };
            match sender.send(event.clone()).await {
                Ok(()) => delivered += 1,
                Err(_) => debug!(subscriber = %id, "subscriber queue closed, skipping"),
            }
        }
        debug!(method = %event.method, delivered, "event broadcast");
        delivered
    }

    /// Close every subscriber queue, keeping the registrations.
    ///
    /// Readers drain what is already queued and then observe end-of-stream.
    /// The pool is marked closed: every later `subscribe` is rejected.
    pub async fn close_all(&self) {
        let mut state = self.state.write().await;
        state.closed = true;
        for registration in state.queues.values_mut() {
            registration.sender = None;
        }
        debug!(subscribers = state.queues.len(), "all subscriber queues closed");
    }

    /// Remove every registration.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.queues.clear();
        debug!("all subscribers removed");
    }

    /// Number of registered subscribers.
    pub async fn len(&self) -> usize {
        self.state.read().await.queues.len()
    }

    /// Whether no subscriber is registered.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.queues.is_empty()
    }

    /// Whether a subscriber with `id` is registered.
    pub async fn contains(&self, id: &str) -> bool {
        self.state.read().await.queues.contains_key(id)
    }

    /// Whether `close_all` has run.
    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    /// Remove `id` only while it still refers to registration `serial`.
    ///
    /// Called from `Subscription::drop`, so it must not block: if the lock is
    /// busy the removal is finished on the runtime instead.
    pub(crate) fn release(&self, id: String, serial: u64) {
        if let Ok(mut state) = self.state.try_write() {
            remove_if_current(&mut state, &id, serial);
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let state = Arc::clone(&self.state);
                handle.spawn(async move {
                    let mut state = state.write().await;
                    remove_if_current(&mut state, &id, serial);
                });
            }
            Err(_) => debug!(subscriber = %id, "no runtime to finish subscriber release"),
        }
    }
}

fn remove_if_current(state: &mut PoolState, id: &str, serial: u64) {
    let current = state
        .queues
        .get(id)
        .is_some_and(|registration| registration.serial == serial);
    if current {
        state.queues.remove(id);
        debug!(subscriber = %id, "subscriber released");
    }
}
