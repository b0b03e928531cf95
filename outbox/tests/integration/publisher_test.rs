use std::time::Duration;

use outbox::concurrency::shutdown::create_shutdown_channel;
use outbox::delivery::memory::MemoryDelivery;
use outbox::drain::DrainStop;
use outbox::error::{ErrorKind, OutboxError};
use outbox::publisher::Publisher;
use outbox::store::memory::MemoryOutboxStore;
use outbox::test_utils::delivery::GatedDelivery;
use outbox_config::shared::ShutdownMode;
use outbox_telemetry::tracing::init_test_tracing;
use serde_json::json;
use tokio::time::timeout;

use crate::common::{parse_batch, test_settings, wait_until};

fn shutdown_cause() -> OutboxError {
    OutboxError::from((ErrorKind::ShutdownRequested, "Shutdown requested by test"))
}

fn payloads(count: usize) -> Vec<String> {
    (0..count).map(|n| format!(r#"{{"n":{n}}}"#)).collect()
}

#[tokio::test]
async fn empty_outbox_tick_does_nothing() {
    init_test_tracing();
    let store = MemoryOutboxStore::new();
    let delivery = MemoryDelivery::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let publisher = Publisher::new(
        test_settings(10, ShutdownMode::FailFast),
        store.clone(),
        delivery.clone(),
        shutdown_rx,
    );

    let report = publisher.tick().await;

    assert_eq!(report.stop, DrainStop::Exhausted);
    assert_eq!(report.cycles, 1);
    assert_eq!(report.published, 0);
    assert_eq!(delivery.attempts().await, 0);
    assert_eq!(store.counters().deletes, 0);
    assert_eq!(store.counters().commits, 1);
}

#[tokio::test]
async fn rejected_batch_stays_and_is_retried() {
    init_test_tracing();
    let store = MemoryOutboxStore::new();
    let ids = store.insert_many(payloads(3));
    let delivery = MemoryDelivery::new();
    delivery.reject_next(500).await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let publisher = Publisher::new(
        test_settings(10, ShutdownMode::FailFast),
        store.clone(),
        delivery.clone(),
        shutdown_rx,
    );

    let report = publisher.tick().await;

    let DrainStop::CycleFailed(err) = report.stop else {
        panic!("expected the cycle to fail");
    };
    assert_eq!(err.kind(), ErrorKind::DeliveryRejected);
    assert_eq!(store.pending_ids(), ids);
    assert_eq!(store.locked_count(), 0);
    assert!(delivery.delivered().await.is_empty());

    let report = publisher.tick().await;

    assert_eq!(report.stop, DrainStop::Exhausted);
    assert_eq!(report.published, 3);
    assert!(store.is_empty());
    let bodies = delivery.delivered_bodies().await.unwrap();
    assert_eq!(bodies.len(), 1);
    assert_eq!(
        parse_batch(&bodies[0]),
        vec![json!({"n": 0}), json!({"n": 1}), json!({"n": 2})]
    );
}

#[tokio::test]
async fn transport_failure_keeps_rows() {
    init_test_tracing();
    let store = MemoryOutboxStore::new();
    let ids = store.insert_many(payloads(2));
    let delivery = MemoryDelivery::new();
    delivery.fail_next_transport().await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let publisher = Publisher::new(
        test_settings(10, ShutdownMode::FailFast),
        store.clone(),
        delivery.clone(),
        shutdown_rx,
    );

    let report = publisher.tick().await;

    assert!(matches!(
        report.stop,
        DrainStop::CycleFailed(ref err) if err.kind() == ErrorKind::DeliveryTransportFailed
    ));
    assert_eq!(store.pending_ids(), ids);
    assert_eq!(store.counters().rollbacks, 1);
}

#[tokio::test]
async fn failed_delete_redelivers_the_batch() {
    init_test_tracing();
    let store = MemoryOutboxStore::new();
    store.insert_many(payloads(2));
    store.fail_next_delete();
    let delivery = MemoryDelivery::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let publisher = Publisher::new(
        test_settings(10, ShutdownMode::FailFast),
        store.clone(),
        delivery.clone(),
        shutdown_rx,
    );

    let report = publisher.tick().await;
    assert!(matches!(
        report.stop,
        DrainStop::CycleFailed(ref err) if err.kind() == ErrorKind::StoreQueryFailed
    ));
    assert_eq!(store.len(), 2);

    publisher.tick().await;

    // The batch was accepted twice: delivery is at-least-once.
    let bodies = delivery.delivered_bodies().await.unwrap();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0], bodies[1]);
    assert!(store.is_empty());
}

#[tokio::test]
async fn begin_failure_is_retried_on_next_tick() {
    init_test_tracing();
    let store = MemoryOutboxStore::new();
    store.insert_many(payloads(1));
    store.fail_next_begin();
    let delivery = MemoryDelivery::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let publisher = Publisher::new(
        test_settings(10, ShutdownMode::FailFast),
        store.clone(),
        delivery.clone(),
        shutdown_rx,
    );

    let report = publisher.tick().await;
    assert!(matches!(
        report.stop,
        DrainStop::CycleFailed(ref err) if err.kind() == ErrorKind::TransactionBeginFailed
    ));
    assert_eq!(delivery.attempts().await, 0);

    let report = publisher.tick().await;
    assert_eq!(report.published, 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn delivered_batch_is_deleted() {
    init_test_tracing();
    let store = MemoryOutboxStore::new();
    store.insert_many(payloads(4));
    let delivery = MemoryDelivery::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let publisher = Publisher::new(
        test_settings(10, ShutdownMode::FailFast),
        store.clone(),
        delivery.clone(),
        shutdown_rx,
    );

    let report = publisher.tick().await;

    assert_eq!(report.published, 4);
    assert!(store.is_empty());
    assert_eq!(delivery.delivered().await[0].record_count(), 4);
}

#[tokio::test]
async fn batches_never_exceed_the_maximum_size() {
    init_test_tracing();
    let store = MemoryOutboxStore::new();
    store.insert_many(payloads(5));
    let delivery = MemoryDelivery::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let publisher = Publisher::new(
        test_settings(2, ShutdownMode::FailFast),
        store.clone(),
        delivery.clone(),
        shutdown_rx,
    );

    publisher.tick().await;

    let sizes: Vec<usize> = delivery
        .delivered()
        .await
        .iter()
        .map(|payload| payload.record_count())
        .collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[tokio::test]
async fn one_tick_drains_the_whole_outbox() {
    init_test_tracing();
    let max_batch_size = 4;
    let store = MemoryOutboxStore::new();
    store.insert_many(payloads(3 * max_batch_size));
    let delivery = MemoryDelivery::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let publisher = Publisher::new(
        test_settings(max_batch_size, ShutdownMode::FailFast),
        store.clone(),
        delivery.clone(),
        shutdown_rx,
    );

    let report = publisher.tick().await;

    assert!(store.is_empty());
    // Three publishing cycles and the empty one that ends the drain.
    assert_eq!(report.cycles, 4);
    assert_eq!(report.published, 12);
    assert_eq!(delivery.delivered().await.len(), 3);

    let elements: Vec<_> = delivery
        .delivered_bodies()
        .await
        .unwrap()
        .iter()
        .flat_map(|body| parse_batch(body))
        .collect();
    let expected: Vec<_> = (0..12).map(|n| json!({ "n": n })).collect();
    assert_eq!(elements, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn run_publishes_on_every_tick() {
    init_test_tracing();
    let store = MemoryOutboxStore::new();
    store.insert_many(payloads(3));
    let delivery = MemoryDelivery::new();
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let mut publisher = Publisher::new(
        test_settings(10, ShutdownMode::Graceful),
        store.clone(),
        delivery.clone(),
        shutdown_rx,
    );
    let handle = tokio::spawn(async move { publisher.run().await });

    wait_until(|| store.is_empty()).await;
    store.insert(r#"{"n":3}"#);
    wait_until(|| store.is_empty()).await;

    shutdown_tx.shutdown(shutdown_cause()).unwrap();
    let result = timeout(Duration::from_secs(5), handle)
        .await
        .expect("publisher did not stop")
        .unwrap();

    assert!(result.is_ok());
    assert_eq!(delivery.delivered().await.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn fail_fast_shutdown_abandons_the_in_flight_cycle() {
    init_test_tracing();
    let store = MemoryOutboxStore::new();
    let ids = store.insert_many(payloads(3));
    let delivery = GatedDelivery::new(MemoryDelivery::new());
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let mut publisher = Publisher::new(
        test_settings(10, ShutdownMode::FailFast),
        store.clone(),
        delivery.clone(),
        shutdown_rx,
    );
    let handle = tokio::spawn(async move { publisher.run().await });

    delivery.wait_until_entered().await;
    assert_eq!(store.locked_count(), 3);

    shutdown_tx.shutdown(shutdown_cause()).unwrap();
    let result = timeout(Duration::from_secs(5), handle)
        .await
        .expect("publisher did not stop while a cycle was in flight")
        .unwrap();

    assert_eq!(result.unwrap_err().kind(), ErrorKind::ShutdownRequested);
    assert_eq!(store.pending_ids(), ids);
    assert_eq!(store.locked_count(), 0);
    assert_eq!(store.counters().commits, 0);
    assert_eq!(delivery.inner().attempts().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn graceful_shutdown_finishes_the_in_flight_cycle() {
    init_test_tracing();
    let store = MemoryOutboxStore::new();
    let ids = store.insert_many(payloads(4));
    let delivery = GatedDelivery::new(MemoryDelivery::new());
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let mut publisher = Publisher::new(
        test_settings(2, ShutdownMode::Graceful),
        store.clone(),
        delivery.clone(),
        shutdown_rx,
    );
    let handle = tokio::spawn(async move { publisher.run().await });

    delivery.wait_until_entered().await;
    shutdown_tx.shutdown(shutdown_cause()).unwrap();
    delivery.open();

    let result = timeout(Duration::from_secs(5), handle)
        .await
        .expect("publisher did not stop")
        .unwrap();

    assert!(result.is_ok());
    // The first batch was committed, the second cycle never started.
    assert_eq!(store.pending_ids(), ids[2..]);
    assert_eq!(delivery.inner().delivered().await.len(), 1);
}

#[tokio::test]
async fn idle_fail_fast_publisher_stops_with_the_cause() {
    init_test_tracing();
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let mut publisher = Publisher::new(
        test_settings(10, ShutdownMode::FailFast),
        MemoryOutboxStore::new(),
        MemoryDelivery::new(),
        shutdown_rx,
    );
    shutdown_tx.shutdown(shutdown_cause()).unwrap();

    let result = timeout(Duration::from_secs(5), publisher.run())
        .await
        .expect("publisher did not stop");

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShutdownRequested);
    assert_eq!(err.description(), Some("Shutdown requested by test"));
    assert_eq!(publisher.store().counters().begins, 0);
}

#[tokio::test]
async fn publishers_in_one_process_are_independent() {
    init_test_tracing();
    let first_store = MemoryOutboxStore::new();
    let second_store = MemoryOutboxStore::new();
    first_store.insert_many(payloads(2));
    second_store.insert_many(payloads(5));
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let first = Publisher::new(
        test_settings(1, ShutdownMode::FailFast),
        first_store.clone(),
        MemoryDelivery::new(),
        shutdown_rx.clone(),
    );
    let second = Publisher::new(
        test_settings(5, ShutdownMode::FailFast),
        second_store.clone(),
        MemoryDelivery::new(),
        shutdown_rx,
    );

    let (first_report, second_report) = tokio::join!(first.tick(), second.tick());

    assert_eq!(first_report.cycles, 3);
    assert_eq!(second_report.cycles, 2);
    assert_eq!(first.delivery().delivered().await.len(), 2);
    assert_eq!(second.delivery().delivered().await.len(), 1);
}
