use std::time::Duration;

use outbox::concurrency::shutdown::create_shutdown_channel;
use outbox::delivery::Delivery;
use outbox::delivery::http::HttpDelivery;
use outbox::delivery::memory::MemoryDelivery;
use outbox::error::ErrorKind;
use outbox::outbox_error;
use outbox::publisher::{Publisher, PublisherSettings};
use outbox::store::OutboxStore;
use outbox::store::postgres::PostgresOutboxStore;
use outbox_config::shared::{
    DeliveryConfig, OutboxTableConfig, PgConnectionConfig, PublisherConfig, SchedulerConfig,
};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

use crate::error::PublisherResult;

/// Starts the publisher with the provided configuration and runs it until shutdown.
///
/// Connects the outbox store, builds the configured delivery and drains the outbox on every
/// tick. Returns an error when a fail-fast shutdown interrupts the publisher.
pub async fn start_publisher_with_config(publisher_config: PublisherConfig) -> PublisherResult<()> {
    info!("starting outbox publisher service");

    log_config(&publisher_config);

    let settings = PublisherSettings::from_config(&publisher_config.publisher);
    let store = PostgresOutboxStore::connect(&publisher_config.store).await?;

    // Static dispatch per delivery, at the cost of a little repetition.
    match &publisher_config.delivery {
        DeliveryConfig::Memory => {
            let delivery = MemoryDelivery::new();
            start_publisher(settings, store, delivery).await?;
        }
        DeliveryConfig::Http { url, timeout_ms } => {
            let delivery = HttpDelivery::new(url, timeout_ms.map(Duration::from_millis))?;
            start_publisher(settings, store, delivery).await?;
        }
    }

    Ok(())
}

fn log_config(config: &PublisherConfig) {
    log_pg_connection_config(&config.store.connection);
    log_table_config(&config.store.table);
    log_scheduler_config(&config.publisher);
    log_delivery_config(&config.delivery);
}

fn log_pg_connection_config(config: &PgConnectionConfig) {
    debug!(
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = config.username,
        tls_enabled = config.tls.enabled,
        "outbox store connection config"
    );
}

fn log_table_config(config: &OutboxTableConfig) {
    debug!(
        schema = config.schema,
        table = config.name,
        id_column = config.id_column,
        payload_column = config.payload_column,
        lock_mode = ?config.lock_mode,
        ordered = config.ordered,
        "outbox table config"
    );
}

fn log_scheduler_config(config: &SchedulerConfig) {
    debug!(
        poll_interval_ms = config.poll_interval_ms,
        max_batch_size = config.batch.max_size,
        shutdown_mode = ?config.shutdown_mode,
        compression_level = config.compression_level,
        "publisher config"
    );
}

fn log_delivery_config(config: &DeliveryConfig) {
    match config {
        DeliveryConfig::Memory => debug!("using memory delivery"),
        DeliveryConfig::Http { url, timeout_ms } => {
            debug!(url, timeout_ms = ?timeout_ms, "using http delivery")
        }
    }
}

/// Runs a publisher until it stops, turning SIGTERM and SIGINT into a shutdown request.
#[tracing::instrument(skip_all)]
async fn start_publisher<S, D>(
    settings: PublisherSettings,
    store: S,
    delivery: D,
) -> PublisherResult<()>
where
    S: OutboxStore + Sync,
    D: Delivery + Sync,
{
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

    // SIGTERM is sent by the orchestrator before SIGKILL.
    let mut sigterm = signal(SignalKind::terminate())?;
    let shutdown_handle = tokio::spawn(async move {
        let cause = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("sigint (ctrl+c) received, shutting down publisher");
                "Received SIGINT"
            }
            _ = sigterm.recv() => {
                info!("sigterm received, shutting down publisher");
                "Received SIGTERM"
            }
        };

        if let Err(err) = shutdown_tx.shutdown(outbox_error!(ErrorKind::ShutdownRequested, cause)) {
            warn!(error = ?err, "failed to send shutdown signal");
        }
    });

    let mut publisher = Publisher::new(settings, store, delivery, shutdown_rx);
    let result = publisher.run().await;

    // The listener is still running when the publisher stopped on its own.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    result?;

    info!("outbox publisher stopped");

    Ok(())
}
