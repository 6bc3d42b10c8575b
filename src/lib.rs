pub mod acl;
pub mod bus;
pub mod config;
pub mod microsvc;
pub mod stats;

pub use acl::{AccessPolicy, AclError};
pub use bus::{BusError, Event, EventBus, Subscription};
pub use config::{load_config, Config, ConfigError};
pub use microsvc::{
    AdminService, BizService, ErrorKind, ServiceError, Session, StreamEnd, Supervisor,
};
pub use stats::{CounterSnapshot, Counters, Snapshot, Stat};

#[cfg(feature = "grpc")]
pub use microsvc::{start_microservice, MicroserviceHandle, StartError};

// Re-export the cancellation token used to stop a running service
pub use tokio_util::sync::CancellationToken;
