//! Receiving side of an [`EventBus`] registration.

use tokio::sync::mpsc;

use super::event::Event;
use super::event_bus::EventBus;

/// A registered subscriber queue.
///
/// When dropped, the queue is closed (unblocking any broadcast waiting on
/// it) and the registration is removed from the pool.
pub struct Subscription {
    id: String,
    serial: u64,
    receiver: mpsc::Receiver<Event>,
    bus: EventBus,
}

impl Subscription {
    pub(crate) fn new(
        id: String,
        serial: u64,
        receiver: mpsc::Receiver<Event>,
        bus: EventBus,
    ) -> Self {
        Self {
            id,
            serial,
            receiver,
            bus,
        }
    }

    /// The subscriber id this queue is registered under.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the queue has been closed by the pool and every
    /// queued event has been read.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.receiver.close();
        self.bus.release(std::mem::take(&mut self.id), self.serial);
    }
}
