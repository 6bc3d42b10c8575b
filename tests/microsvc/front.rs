//! In-process tests of the Admin and Biz operations, without a transport.

use std::collections::HashMap;

use event_relay::microsvc::{ErrorKind, Session, StreamEnd, LOGGING, STATISTICS};
use event_relay::CancellationToken;
use tokio::sync::mpsc;

use crate::support::{methods, next, session, start, wait_for_count};

#[tokio::test]
async fn biz_call_counts_method_and_consumer() {
    let shutdown = CancellationToken::new();
    let supervisor = start(&shutdown);

    supervisor.biz().add(&session("svc1")).await.unwrap();
    wait_for_count(&supervisor, "svc1", 1).await;

    let counters = supervisor.context().counters();
    assert_eq!(counters.method_count("/relay.Biz/Add"), 1);
    assert_eq!(counters.consumer_count("svc1"), 1);

    // svc1 has no Admin rights: denied, and nothing is counted.
    let err = supervisor.admin().logging(&session("svc1")).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    let err = supervisor
        .admin()
        .statistics(&session("svc1"), 1)
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    assert_eq!(counters.consumer_count("svc1"), 1);
    assert_eq!(counters.method_count(STATISTICS), 0);
    assert_eq!(counters.method_count(LOGGING), 0);

    shutdown.cancel();
    supervisor.stopped().await;
}

#[tokio::test]
async fn biz_denied_outside_acl() {
    let shutdown = CancellationToken::new();
    let supervisor = start(&shutdown);

    let err = supervisor.biz().test(&session("biz_user")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let err = supervisor.biz().check(&session("stranger")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    // Any named method under the wildcard works.
    supervisor
        .biz()
        .invoke(&session("biz_admin"), "Custom")
        .await
        .unwrap();
    wait_for_count(&supervisor, "biz_admin", 1).await;
    assert_eq!(
        supervisor.context().counters().method_count("/relay.Biz/Custom"),
        1
    );

    shutdown.cancel();
    supervisor.stopped().await;
}

#[tokio::test]
async fn biz_call_without_peer_address_is_not_logged() {
    let shutdown = CancellationToken::new();
    let supervisor = start(&shutdown);

    let anonymous_host = Session::resolve(["svc1"], None).unwrap();
    supervisor.biz().check(&anonymous_host).await.unwrap();
    supervisor.biz().add(&session("svc1")).await.unwrap();

    wait_for_count(&supervisor, "svc1", 1).await;
    let counters = supervisor.context().counters();
    assert_eq!(counters.method_count("/relay.Biz/Check"), 0);
    assert_eq!(counters.method_count("/relay.Biz/Add"), 1);

    shutdown.cancel();
    supervisor.stopped().await;
}

#[tokio::test]
async fn logging_streams_every_later_call() {
    let shutdown = CancellationToken::new();
    let supervisor = start(&shutdown);

    let stream = supervisor.admin().logging(&session("logger")).await.unwrap();
    let (sink, mut log) = mpsc::channel(16);
    let run = tokio::spawn(stream.run(sink));

    let biz = supervisor.biz();
    biz.check(&session("biz_user")).await.unwrap();
    biz.add(&session("biz_user")).await.unwrap();
    biz.test(&session("biz_admin")).await.unwrap();

    let mut events = Vec::new();
    for _ in 0..3 {
        events.push(next(&mut log).await.unwrap());
    }
    assert_eq!(
        methods(&events),
        ["/relay.Biz/Check", "/relay.Biz/Add", "/relay.Biz/Test"]
    );
    assert_eq!(events[2].consumer, "biz_admin");
    assert_eq!(events[0].host, "127.0.0.1:40000");

    shutdown.cancel();
    assert!(matches!(run.await.unwrap(), StreamEnd::Shutdown | StreamEnd::Closed));
    supervisor.stopped().await;
}

#[tokio::test]
async fn opening_a_stream_is_announced_to_existing_observers() {
    let shutdown = CancellationToken::new();
    let supervisor = start(&shutdown);
    let admin = supervisor.admin();

    let first = admin.logging(&session("logger")).await.unwrap();
    let (sink, mut log) = mpsc::channel(16);
    tokio::spawn(first.run(sink));

    // A second observer for the same consumer gets its own subscriber id.
    let second = admin.logging(&session("logger")).await.unwrap();
    let announced = next(&mut log).await.unwrap();
    assert_eq!(announced.method, LOGGING);
    assert_eq!(announced.consumer, "logger");
    assert_eq!(supervisor.context().bus().len().await, 2);

    // Statistics calls are announced too, and counted immediately.
    let _stats = admin.statistics(&session("stat"), 1).await.unwrap();
    let announced = next(&mut log).await.unwrap();
    assert_eq!(announced.method, STATISTICS);
    assert_eq!(announced.consumer, "stat");
    assert_eq!(supervisor.context().counters().method_count(STATISTICS), 1);

    drop(second);
    shutdown.cancel();
    supervisor.stopped().await;
}

#[tokio::test]
async fn closing_the_caller_side_unregisters_the_subscriber() {
    let shutdown = CancellationToken::new();
    let supervisor = start(&shutdown);

    let stream = supervisor.admin().logging(&session("logger")).await.unwrap();
    let id = stream.subscriber_id().to_string();
    assert!(id.starts_with("logger-"));
    assert!(supervisor.context().bus().contains(&id).await);

    let (sink, log) = mpsc::channel(16);
    let run = tokio::spawn(stream.run(sink));
    drop(log);

    assert_eq!(run.await.unwrap(), StreamEnd::Disconnected);
    assert!(!supervisor.context().bus().contains(&id).await);

    shutdown.cancel();
    supervisor.stopped().await;
}

#[tokio::test]
async fn streams_need_a_peer_address() {
    let shutdown = CancellationToken::new();
    let supervisor = start(&shutdown);

    let no_host = Session::resolve(["logger"], None).unwrap();
    let err = supervisor.admin().logging(&no_host).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Internal);

    shutdown.cancel();
    supervisor.stopped().await;
}

#[tokio::test]
async fn statistics_rejects_zero_interval() {
    let shutdown = CancellationToken::new();
    let supervisor = start(&shutdown);

    let err = supervisor
        .admin()
        .statistics(&session("stat"), 0)
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    shutdown.cancel();
    supervisor.stopped().await;
}

#[tokio::test]
async fn statistics_rejects_interval_past_the_clock_range() {
    let shutdown = CancellationToken::new();
    let supervisor = start(&shutdown);

    let stream = supervisor.admin().logging(&session("logger")).await.unwrap();
    let (sink, mut log) = mpsc::channel(16);
    tokio::spawn(stream.run(sink));

    let err = supervisor
        .admin()
        .statistics(&session("stat"), u64::MAX)
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    // Rejected before the call was announced or counted.
    assert_eq!(supervisor.context().counters().method_count(STATISTICS), 0);
    supervisor.biz().add(&session("biz_user")).await.unwrap();
    assert_eq!(next(&mut log).await.unwrap().method, "/relay.Biz/Add");

    shutdown.cancel();
    supervisor.stopped().await;
}

#[tokio::test(start_paused = true)]
async fn statistics_streams_deltas_per_interval() {
    let shutdown = CancellationToken::new();
    let supervisor = start(&shutdown);

    let stream = supervisor
        .admin()
        .statistics(&session("stat"), 2)
        .await
        .unwrap();
    let (sink, mut stats) = mpsc::channel(4);
    let run = tokio::spawn(stream.run(sink));

    let biz = supervisor.biz();
    biz.check(&session("biz_user")).await.unwrap();
    biz.add(&session("biz_user")).await.unwrap();
    biz.test(&session("biz_admin")).await.unwrap();
    wait_for_count(&supervisor, "biz_admin", 1).await;

    let first = next(&mut stats).await.unwrap();
    assert_eq!(
        first.by_method,
        HashMap::from([
            ("/relay.Biz/Check".to_string(), 1),
            ("/relay.Biz/Add".to_string(), 1),
            ("/relay.Biz/Test".to_string(), 1),
        ])
    );
    assert_eq!(
        first.by_consumer,
        HashMap::from([("biz_user".to_string(), 2), ("biz_admin".to_string(), 1)])
    );

    // Nothing happened since: the next delta is empty.
    let second = next(&mut stats).await.unwrap();
    assert!(second.by_method.is_empty());
    assert!(second.by_consumer.is_empty());

    biz.add(&session("biz_user")).await.unwrap();
    let third = next(&mut stats).await.unwrap();
    assert_eq!(third.by_method, HashMap::from([("/relay.Biz/Add".to_string(), 1)]));

    shutdown.cancel();
    assert_eq!(run.await.unwrap(), StreamEnd::Shutdown);
    supervisor.stopped().await;
}

#[tokio::test(start_paused = true)]
async fn statistics_stops_when_caller_leaves() {
    let shutdown = CancellationToken::new();
    let supervisor = start(&shutdown);

    let stream = supervisor
        .admin()
        .statistics(&session("stat"), 1)
        .await
        .unwrap();
    let (sink, stats) = mpsc::channel(4);
    drop(stats);

    assert_eq!(stream.run(sink).await, StreamEnd::Disconnected);

    shutdown.cancel();
    supervisor.stopped().await;
}
