use outbox::concurrency::shutdown::create_shutdown_channel;
use outbox::delivery::memory::MemoryDelivery;
use outbox::drain::DrainStop;
use outbox::error::ErrorKind;
use outbox::publisher::Publisher;
use outbox::store::postgres::PostgresOutboxStore;
use outbox::store::{OutboxStore, OutboxTransaction};
use outbox::test_utils::database::PgDatabase;
use outbox_config::shared::{LockMode, OutboxTableConfig, ShutdownMode};
use outbox_telemetry::tracing::init_test_tracing;
use serde_json::json;

use crate::common::{parse_batch, test_settings};

fn outbox_table(lock_mode: LockMode) -> OutboxTableConfig {
    OutboxTableConfig {
        schema: "outbox".to_string(),
        name: "persistence".to_string(),
        lock_mode,
        ordered: true,
        ..OutboxTableConfig::default()
    }
}

async fn setup(lock_mode: LockMode) -> (PgDatabase, OutboxTableConfig, PostgresOutboxStore) {
    let database = PgDatabase::new().await;
    let table = outbox_table(lock_mode);
    database.create_outbox_table(&table).await;

    let store = PostgresOutboxStore::connect(&database.store_config(&table))
        .await
        .unwrap();

    (database, table, store)
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_is_bounded_and_ordered() {
    init_test_tracing();
    let (database, table, store) = setup(LockMode::Wait).await;
    let ids = database
        .insert_payloads(&table, &[r#"{"n": 1}"#, r#"{"n": 2}"#, r#"{"n": 3}"#])
        .await;

    let mut transaction = store.begin().await.unwrap();
    let batch = transaction.fetch_locked(2).await.unwrap();
    transaction.rollback().await.unwrap();

    assert_eq!(batch.ids().collect::<Vec<_>>(), ids[..2]);
    assert_eq!(database.pending_ids(&table).await, ids);
}

#[tokio::test(flavor = "multi_thread")]
async fn deletes_apply_on_commit_only() {
    init_test_tracing();
    let (database, table, store) = setup(LockMode::Wait).await;
    let ids = database
        .insert_payloads(&table, &[r#"{"n": 1}"#, r#"{"n": 2}"#])
        .await;

    let mut transaction = store.begin().await.unwrap();
    transaction.fetch_locked(10).await.unwrap();
    assert_eq!(transaction.delete_by_ids(&ids).await.unwrap(), 2);
    transaction.rollback().await.unwrap();
    assert_eq!(database.pending_ids(&table).await, ids);

    let mut transaction = store.begin().await.unwrap();
    transaction.fetch_locked(10).await.unwrap();
    assert_eq!(transaction.delete_by_ids(&ids[..1]).await.unwrap(), 1);
    assert_eq!(transaction.delete_by_ids(&[]).await.unwrap(), 0);
    transaction.commit().await.unwrap();
    assert_eq!(database.pending_ids(&table).await, ids[1..]);
}

#[tokio::test(flavor = "multi_thread")]
async fn skip_locked_leaves_rows_to_their_holder() {
    init_test_tracing();
    let (database, table, store) = setup(LockMode::SkipLocked).await;
    let ids = database
        .insert_payloads(&table, &[r#"{"n": 1}"#, r#"{"n": 2}"#, r#"{"n": 3}"#])
        .await;

    let mut first = store.begin().await.unwrap();
    let first_batch = first.fetch_locked(2).await.unwrap();
    let mut second = store.begin().await.unwrap();
    let second_batch = second.fetch_locked(10).await.unwrap();

    assert_eq!(first_batch.ids().collect::<Vec<_>>(), ids[..2]);
    assert_eq!(second_batch.ids().collect::<Vec<_>>(), ids[2..]);

    first.rollback().await.unwrap();
    second.rollback().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn locked_rows_time_out_in_wait_mode() {
    init_test_tracing();
    let (database, table, store) = setup(LockMode::Wait).await;
    database.insert_payloads(&table, &[r#"{"n": 1}"#]).await;

    let mut holder = store.begin().await.unwrap();
    holder.fetch_locked(10).await.unwrap();

    let mut waiter = store.begin().await.unwrap();
    let err = waiter.fetch_locked(10).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StoreLockTimeout);
    holder.rollback().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn publisher_drains_a_postgres_outbox() {
    init_test_tracing();
    let (database, table, store) = setup(LockMode::Wait).await;
    let payloads: Vec<String> = (0..5).map(|n| format!(r#"{{"n": {n}}}"#)).collect();
    let payloads: Vec<&str> = payloads.iter().map(String::as_str).collect();
    database.insert_payloads(&table, &payloads).await;

    let delivery = MemoryDelivery::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let publisher = Publisher::new(
        test_settings(2, ShutdownMode::FailFast),
        store,
        delivery.clone(),
        shutdown_rx,
    );

    let report = publisher.tick().await;

    assert_eq!(report.stop, DrainStop::Exhausted);
    assert_eq!(report.published, 5);
    assert!(database.pending_ids(&table).await.is_empty());

    let elements: Vec<_> = delivery
        .delivered_bodies()
        .await
        .unwrap()
        .iter()
        .flat_map(|body| parse_batch(body))
        .collect();
    let expected: Vec<_> = (0..5).map(|n| json!({ "n": n })).collect();
    assert_eq!(elements, expected);
}
