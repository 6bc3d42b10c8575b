//! Event bus - fan-out of call events to log subscribers
//!
//! Every inbound call produces an [`Event`]. The [`EventBus`] keeps one
//! bounded queue per subscriber and copies each broadcast event into all of
//! them.
//!
//! ## Architecture
//!
//! ```text
//!   drain task / streaming calls
//!              │ broadcast(&event)
//!              ▼
//! ┌─────────────────────────────────────────┐
//! │ EventBus                                │
//! │  RwLock<HashMap<id, queue>>             │
//! │  subscribe / unsubscribe / close_all /  │
//! │  clear                                  │
//! └─────────────────────────────────────────┘
//!        │             │              │
//!        ▼             ▼              ▼
//!  Subscription   Subscription   Subscription
//!   (Logging)      (Logging)      (Logging)
//! ```
//!
//! A [`Subscription`] removes its own registration when dropped, so a log
//! stream that ends for any reason does not leave a queue behind.

mod event;
mod event_bus;
mod subscriber;

pub use event::{unix_now, Event};
pub use event_bus::{BusError, EventBus, DEFAULT_SUBSCRIBER_CAPACITY};
pub use subscriber::Subscription;
