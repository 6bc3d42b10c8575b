//! microsvc: the Admin and Biz call surface.
//!
//! Every call is authorized against the [`AccessPolicy`](crate::acl::AccessPolicy)
//! using the caller's [`Session`]. Authorized calls become events:
//!
//! - Biz calls (`Check`, `Add`, `Test`, …) are handed to the internal event
//!   queue; the drain task broadcasts them and folds them into the counters.
//! - `Logging` opens a live stream of every event broadcast after it.
//! - `Statistics` opens a stream of counter deltas, one per interval.
//!
//! ## Quick Start
//!
//! ```ignore
//! use event_relay::acl::AccessPolicy;
//! use event_relay::bus::EventBus;
//! use event_relay::microsvc::{Session, Supervisor, DEFAULT_EVENT_QUEUE_CAPACITY};
//! use tokio_util::sync::CancellationToken;
//!
//! let shutdown = CancellationToken::new();
//! let policy = AccessPolicy::from_json(r#"{"svc1": ["/relay.Biz/*"]}"#)?;
//! let supervisor = Supervisor::start(policy, EventBus::new(), DEFAULT_EVENT_QUEUE_CAPACITY, shutdown.clone());
//!
//! // Direct dispatch
//! supervisor.biz().add(&Session::new("svc1", "127.0.0.1:5000")).await?;
//!
//! // gRPC transport (requires "grpc" feature)
//! // microsvc::start_microservice(shutdown, "127.0.0.1:8082", acl_json).await?;
//! ```

mod admin;
mod biz;
mod context;
mod error;
mod lifecycle;
mod session;

pub use admin::{AdminService, LogStream, StatStream, StreamEnd};
pub use biz::BizService;
pub use context::Context;
pub use error::{ErrorKind, ServiceError};
pub use lifecycle::{Supervisor, DEFAULT_EVENT_QUEUE_CAPACITY};
pub use session::{Session, CONSUMER_KEY};

// gRPC transport (requires "grpc" feature)
#[cfg(feature = "grpc")]
pub mod grpc;
#[cfg(feature = "grpc")]
pub use grpc::{serve, start_microservice, MicroserviceHandle, StartError};

/// Route prefix of the Biz service.
pub const BIZ_SERVICE: &str = "/relay.Biz";

/// Fully-qualified name of the `Logging` operation.
pub const LOGGING: &str = "/relay.Admin/Logging";

/// Fully-qualified name of the `Statistics` operation.
pub const STATISTICS: &str = "/relay.Admin/Statistics";

/// Fully-qualified name of a Biz operation, e.g. `Add` → `/relay.Biz/Add`.
pub fn biz_method(name: &str) -> String {
    format!("{}/{}", BIZ_SERVICE, name)
}
