use outbox::concurrency::shutdown::create_shutdown_channel;
use outbox::delivery::memory::MemoryDelivery;
use outbox::drain::DrainStop;
use outbox::error::ErrorKind;
use outbox::failpoints::{DRAIN_CYCLE_BEFORE_DELETE_FP, DRAIN_CYCLE_BEFORE_DELIVERY_FP};
use outbox::publisher::{Publisher, PublisherSettings};
use outbox::store::memory::MemoryOutboxStore;
use outbox::test_utils::failpoints::OutboxFailScenario;
use outbox_telemetry::tracing::init_test_tracing;

fn create_publisher(
    store: &MemoryOutboxStore,
    delivery: &MemoryDelivery,
) -> Publisher<MemoryOutboxStore, MemoryDelivery> {
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let settings = PublisherSettings {
        max_batch_size: 10,
        ..PublisherSettings::default()
    };

    Publisher::new(settings, store.clone(), delivery.clone(), shutdown_rx)
}

#[tokio::test]
async fn error_before_delivery_keeps_rows_undelivered() {
    init_test_tracing();
    let _scenario = OutboxFailScenario::setup(&[(
        DRAIN_CYCLE_BEFORE_DELIVERY_FP,
        "return(collector unavailable)",
    )]);
    let store = MemoryOutboxStore::new();
    let ids = store.insert_many([r#"{"n":1}"#, r#"{"n":2}"#]);
    let delivery = MemoryDelivery::new();
    let publisher = create_publisher(&store, &delivery);

    let report = publisher.tick().await;

    let DrainStop::CycleFailed(err) = report.stop else {
        panic!("expected the cycle to fail");
    };
    assert_eq!(err.kind(), ErrorKind::InjectedFault);
    assert_eq!(err.detail(), Some("collector unavailable"));
    assert_eq!(store.pending_ids(), ids);
    assert_eq!(delivery.attempts().await, 0);
}

#[tokio::test]
async fn panic_before_delete_is_rolled_back() {
    init_test_tracing();
    let _scenario = OutboxFailScenario::setup(&[(DRAIN_CYCLE_BEFORE_DELETE_FP, "panic")]);
    let store = MemoryOutboxStore::new();
    let ids = store.insert_many([r#"{"n":1}"#]);
    let delivery = MemoryDelivery::new();
    let publisher = create_publisher(&store, &delivery);

    let report = publisher.tick().await;

    assert!(matches!(
        report.stop,
        DrainStop::CycleFailed(ref err) if err.kind() == ErrorKind::CyclePanic
    ));
    assert_eq!(store.pending_ids(), ids);
    assert_eq!(store.locked_count(), 0);
    assert_eq!(store.counters().rollbacks, 1);
    // The collector got the batch; the next cycle sends it again.
    assert_eq!(delivery.delivered().await.len(), 1);
}

#[tokio::test]
async fn error_before_delete_redelivers_after_recovery() {
    init_test_tracing();
    let store = MemoryOutboxStore::new();
    store.insert_many([r#"{"n":1}"#]);
    let delivery = MemoryDelivery::new();
    let publisher = create_publisher(&store, &delivery);

    {
        let _scenario = OutboxFailScenario::setup(&[(DRAIN_CYCLE_BEFORE_DELETE_FP, "return")]);
        let report = publisher.tick().await;
        assert!(matches!(report.stop, DrainStop::CycleFailed(_)));
    }

    let report = publisher.tick().await;

    assert_eq!(report.stop, DrainStop::Exhausted);
    assert!(store.is_empty());
    assert_eq!(delivery.delivered().await.len(), 2);
}
