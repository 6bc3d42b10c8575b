//! gRPC transport: exposes the Admin and Biz operations over tonic.
//!
//! Requires the `grpc` feature. Uses tonic for the gRPC server and prost
//! for message serialization (standard protobuf wire format, no `.proto` file).
//!
//! ## RPCs
//!
//! - `/relay.Admin/Logging`: server stream of `EventMessage`.
//! - `/relay.Admin/Statistics`: server stream of `StatMessage`, one per interval.
//! - `/relay.Biz/Check`, `/relay.Biz/Add`, `/relay.Biz/Test`: unary, `Nothing` in and out.
//!
//! Every call must carry exactly one `consumer` metadata value.
//!
//! ## Example
//!
//! ```ignore
//! use tokio_util::sync::CancellationToken;
//!
//! let shutdown = CancellationToken::new();
//! let handle = event_relay::microsvc::start_microservice(
//!     shutdown.clone(),
//!     "127.0.0.1:8082",
//!     r#"{"svc1": ["/relay.Biz/*"]}"#,
//! )
//! .await?;
//!
//! // ...
//! shutdown.cancel();
//! handle.stopped().await?;
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::Pin;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::info;

use super::admin::AdminService;
use super::biz::BizService;
use super::context::Context;
use super::error::ServiceError;
use super::lifecycle::{Supervisor, DEFAULT_EVENT_QUEUE_CAPACITY};
use super::session::{Session, CONSUMER_KEY};
use crate::acl::{AccessPolicy, AclError};
use crate::bus::{Event, EventBus};
use crate::stats::Stat;

/// Buffer between a stream's run loop and the tonic response body.
const RESPONSE_BUFFER: usize = 16;

// ---------------------------------------------------------------------------
// Message types (prost, standard protobuf wire format)
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct Nothing {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct EventMessage {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(string, tag = "2")]
    pub consumer: String,
    #[prost(string, tag = "3")]
    pub method: String,
    #[prost(string, tag = "4")]
    pub host: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StatMessage {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(map = "string, uint64", tag = "2")]
    pub by_method: HashMap<String, u64>,
    #[prost(map = "string, uint64", tag = "3")]
    pub by_consumer: HashMap<String, u64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StatInterval {
    #[prost(uint64, tag = "1")]
    pub interval_seconds: u64,
}

impl From<Event> for EventMessage {
    fn from(event: Event) -> Self {
        Self {
            timestamp: event.timestamp,
            consumer: event.consumer,
            method: event.method,
            host: event.host,
        }
    }
}

impl From<Stat> for StatMessage {
    fn from(stat: Stat) -> Self {
        Self {
            timestamp: stat.timestamp,
            by_method: stat.by_method,
            by_consumer: stat.by_consumer,
        }
    }
}

// ---------------------------------------------------------------------------
// Generated service traits + servers/clients
// ---------------------------------------------------------------------------

include!(concat!(env!("OUT_DIR"), "/relay.Admin.rs"));
include!(concat!(env!("OUT_DIR"), "/relay.Biz.rs"));

pub use admin_client::AdminClient;
pub use admin_server::{Admin, AdminServer};
pub use biz_client::BizClient;
pub use biz_server::{Biz, BizServer};

// ---------------------------------------------------------------------------
// Handler implementations
// ---------------------------------------------------------------------------

type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

/// gRPC handler wrapping an `AdminService`.
pub struct AdminHandler {
    service: AdminService,
}

impl AdminHandler {
    pub fn new(service: AdminService) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl Admin for AdminHandler {
    type LoggingStream = ResponseStream<EventMessage>;
    type StatisticsStream = ResponseStream<StatMessage>;

    async fn logging(
        &self,
        request: Request<Nothing>,
    ) -> Result<Response<Self::LoggingStream>, Status> {
        let session = session_from_request(&request)?;
        let stream = self.service.logging(&session).await?;

        let (sink, events) = mpsc::channel(RESPONSE_BUFFER);
        tokio::spawn(stream.run(sink));

        let body = ReceiverStream::new(events).map(|event| Ok(EventMessage::from(event)));
        Ok(Response::new(Box::pin(body)))
    }

    async fn statistics(
        &self,
        request: Request<StatInterval>,
    ) -> Result<Response<Self::StatisticsStream>, Status> {
        let session = session_from_request(&request)?;
        let interval = request.get_ref().interval_seconds;
        let stream = self.service.statistics(&session, interval).await?;

        let (sink, stats) = mpsc::channel(RESPONSE_BUFFER);
        tokio::spawn(stream.run(sink));

        let body = ReceiverStream::new(stats).map(|stat| Ok(StatMessage::from(stat)));
        Ok(Response::new(Box::pin(body)))
    }
}

/// gRPC handler wrapping a `BizService`.
pub struct BizHandler {
    service: BizService,
}

impl BizHandler {
    pub fn new(service: BizService) -> Self {
        Self { service }
    }

    async fn call(&self, request: Request<Nothing>, name: &str) -> Result<Response<Nothing>, Status> {
        let session = session_from_request(&request)?;
        self.service.invoke(&session, name).await?;
        Ok(Response::new(Nothing {}))
    }
}

#[tonic::async_trait]
impl Biz for BizHandler {
    async fn check(&self, request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        self.call(request, "Check").await
    }

    async fn add(&self, request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        self.call(request, "Add").await
    }

    async fn test(&self, request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        self.call(request, "Test").await
    }
}

// ---------------------------------------------------------------------------
// Session building
// ---------------------------------------------------------------------------

/// Resolve the caller from `consumer` metadata and the connection's peer address.
fn session_from_request<T>(request: &Request<T>) -> Result<Session, ServiceError> {
    let consumers = request
        .metadata()
        .get_all(CONSUMER_KEY)
        .iter()
        .map(|value| value.to_str().map(str::to_string))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ServiceError::unauthenticated("incorrect consumer metadata"))?;
    let host = request.remote_addr().map(|addr| addr.to_string());
    Session::resolve(consumers, host)
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

/// Errors that stop the microservice from starting.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Acl(#[from] AclError),

    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}

/// A running microservice.
pub struct MicroserviceHandle {
    local_addr: SocketAddr,
    supervisor: Supervisor,
    server: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl MicroserviceHandle {
    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared state, for inspecting counters and subscribers.
    pub fn context(&self) -> &Context {
        self.supervisor.context()
    }

    /// Wait until the drain task has torn down the bus and the listener has stopped.
    pub async fn stopped(self) -> Result<(), tonic::transport::Error> {
        self.supervisor.stopped().await;
        match self.server.await {
            Ok(result) => result,
            Err(_) => Ok(()),
        }
    }
}

/// Parse `acl` and start serving on `addr` until `shutdown` is cancelled.
pub async fn start_microservice(
    shutdown: CancellationToken,
    addr: &str,
    acl: &str,
) -> Result<MicroserviceHandle, StartError> {
    let policy = AccessPolicy::from_json(acl)?;
    serve(shutdown, addr, policy, DEFAULT_EVENT_QUEUE_CAPACITY).await
}

/// Start serving `policy` on `addr` with the given internal queue capacity.
pub async fn serve(
    shutdown: CancellationToken,
    addr: &str,
    policy: AccessPolicy,
    queue_capacity: usize,
) -> Result<MicroserviceHandle, StartError> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    let supervisor = Supervisor::start(policy, EventBus::new(), queue_capacity, shutdown.clone());
    let admin = AdminServer::new(AdminHandler::new(supervisor.admin()));
    let biz = BizServer::new(BizHandler::new(supervisor.biz()));

    let server = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(admin)
            .add_service(biz)
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                shutdown.cancelled().await
            })
            .await
    });
    info!(%local_addr, "microservice listening");

    Ok(MicroserviceHandle {
        local_addr,
        supervisor,
        server,
    })
}
