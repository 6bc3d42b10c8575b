//! gRPC transport integration tests.
//!
//! Starts the microservice on an ephemeral port and exercises it with the
//! generated clients.

use std::time::Duration;

use event_relay::microsvc::grpc::{AdminClient, BizClient, Nothing, StatInterval};
use event_relay::microsvc::{start_microservice, MicroserviceHandle, CONSUMER_KEY};
use event_relay::CancellationToken;
use tonic::transport::Channel;
use tonic::{Code, Request};

use crate::support::{ACL, WAIT};

/// Bind to port 0 and return the running service with a connected channel.
async fn start_server(shutdown: &CancellationToken) -> (MicroserviceHandle, Channel) {
    let handle = start_microservice(shutdown.clone(), "127.0.0.1:0", ACL)
        .await
        .unwrap();
    let endpoint = format!("http://{}", handle.local_addr());
    let channel = Channel::from_shared(endpoint).unwrap().connect().await.unwrap();
    (handle, channel)
}

/// A request carrying `consumer` metadata.
fn as_consumer<T>(message: T, consumer: &str) -> Request<T> {
    let mut request = Request::new(message);
    request
        .metadata_mut()
        .insert(CONSUMER_KEY, consumer.parse().unwrap());
    request
}

async fn wait_for_method(handle: &MicroserviceHandle, method: &str, expected: u64) {
    tokio::time::timeout(WAIT, async {
        while handle.context().counters().method_count(method) < expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for counters");
}

#[tokio::test]
async fn biz_call_is_counted() {
    let shutdown = CancellationToken::new();
    let (handle, channel) = start_server(&shutdown).await;
    let mut biz = BizClient::new(channel);

    biz.add(as_consumer(Nothing {}, "svc1")).await.unwrap();
    wait_for_method(&handle, "/relay.Biz/Add", 1).await;
    assert_eq!(handle.context().counters().consumer_count("svc1"), 1);

    shutdown.cancel();
    handle.stopped().await.unwrap();
}

#[tokio::test]
async fn missing_consumer_is_unauthenticated() {
    let shutdown = CancellationToken::new();
    let (handle, channel) = start_server(&shutdown).await;
    let mut biz = BizClient::new(channel);

    let status = biz.check(Request::new(Nothing {})).await.unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    let mut request = as_consumer(Nothing {}, "svc1");
    request
        .metadata_mut()
        .append(CONSUMER_KEY, "svc2".parse().unwrap());
    let status = biz.check(request).await.unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    shutdown.cancel();
    handle.stopped().await.unwrap();
}

#[tokio::test]
async fn calls_outside_the_acl_are_denied() {
    let shutdown = CancellationToken::new();
    let (handle, channel) = start_server(&shutdown).await;
    let mut biz = BizClient::new(channel.clone());
    let mut admin = AdminClient::new(channel);

    let status = biz.test(as_consumer(Nothing {}, "biz_user")).await.unwrap_err();
    assert_eq!(status.code(), Code::PermissionDenied);

    let status = admin
        .logging(as_consumer(Nothing {}, "svc1"))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::PermissionDenied);
    assert_eq!(handle.context().counters().consumer_count("svc1"), 0);

    shutdown.cancel();
    handle.stopped().await.unwrap();
}

#[tokio::test]
async fn logging_streams_biz_calls_with_peer_address() {
    let shutdown = CancellationToken::new();
    let (handle, channel) = start_server(&shutdown).await;
    let mut admin = AdminClient::new(channel.clone());
    let mut biz = BizClient::new(channel);

    let mut log = admin
        .logging(as_consumer(Nothing {}, "logger"))
        .await
        .unwrap()
        .into_inner();

    biz.check(as_consumer(Nothing {}, "biz_user")).await.unwrap();
    biz.add(as_consumer(Nothing {}, "biz_admin")).await.unwrap();

    let first = tokio::time::timeout(WAIT, log.message())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(first.method, "/relay.Biz/Check");
    assert_eq!(first.consumer, "biz_user");
    assert!(first.host.starts_with("127.0.0.1:"));
    assert!(first.timestamp > 0);

    let second = tokio::time::timeout(WAIT, log.message())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(second.method, "/relay.Biz/Add");
    assert_eq!(second.consumer, "biz_admin");

    shutdown.cancel();
    handle.stopped().await.unwrap();
}

#[tokio::test]
async fn statistics_streams_deltas() {
    let shutdown = CancellationToken::new();
    let (handle, channel) = start_server(&shutdown).await;
    let mut admin = AdminClient::new(channel.clone());
    let mut biz = BizClient::new(channel);

    let mut stats = admin
        .statistics(as_consumer(StatInterval { interval_seconds: 1 }, "stat"))
        .await
        .unwrap()
        .into_inner();

    biz.add(as_consumer(Nothing {}, "svc1")).await.unwrap();
    biz.add(as_consumer(Nothing {}, "svc1")).await.unwrap();
    wait_for_method(&handle, "/relay.Biz/Add", 2).await;

    let stat = tokio::time::timeout(WAIT, stats.message())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(stat.by_method.get("/relay.Biz/Add"), Some(&2));
    assert_eq!(stat.by_consumer.get("svc1"), Some(&2));
    assert!(!stat.by_method.contains_key("/relay.Admin/Statistics"));

    shutdown.cancel();
    handle.stopped().await.unwrap();
}

#[tokio::test]
async fn statistics_rejects_zero_interval() {
    let shutdown = CancellationToken::new();
    let (handle, channel) = start_server(&shutdown).await;
    let mut admin = AdminClient::new(channel);

    let status = admin
        .statistics(as_consumer(StatInterval { interval_seconds: 0 }, "stat"))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    shutdown.cancel();
    handle.stopped().await.unwrap();
}

#[tokio::test]
async fn shutdown_ends_open_streams() {
    let shutdown = CancellationToken::new();
    let (handle, channel) = start_server(&shutdown).await;
    let mut admin = AdminClient::new(channel);

    let mut log = admin
        .logging(as_consumer(Nothing {}, "logger"))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(handle.context().bus().len().await, 1);

    let bus = handle.context().bus().clone();
    shutdown.cancel();

    let end = tokio::time::timeout(WAIT, log.message()).await.unwrap();
    assert!(matches!(end, Ok(None)));

    tokio::time::timeout(WAIT, handle.stopped())
        .await
        .unwrap()
        .unwrap();
    assert!(bus.is_empty().await);
}
