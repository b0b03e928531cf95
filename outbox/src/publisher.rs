//! Periodic scheduling of outbox drains.

use std::time::Duration;

use outbox_config::shared::{SchedulerConfig, ShutdownMode};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, instrument, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::delivery::Delivery;
use crate::drain::{DrainReport, drain_outbox};
use crate::encoding::PayloadEncoder;
use crate::error::{OutboxError, OutboxResult};
use crate::store::OutboxStore;

/// Settings of one [`Publisher`] instance.
#[derive(Debug, Clone, Copy)]
pub struct PublisherSettings {
    /// Time between two drain ticks.
    pub poll_interval: Duration,
    /// Maximum number of records fetched by one cycle.
    pub max_batch_size: usize,
    pub shutdown_mode: ShutdownMode,
    pub encoder: PayloadEncoder,
}

impl PublisherSettings {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_batch_size: config.batch.max_size,
            shutdown_mode: config.shutdown_mode,
            encoder: PayloadEncoder::new(config.compression_level),
        }
    }
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

/// Drains the outbox on every tick until shutdown.
///
/// Ticks never overlap: a tick that outlives the poll interval delays the next one instead of
/// queueing it. All state lives in the instance, so several publishers can run in one process.
#[derive(Debug)]
pub struct Publisher<S, D> {
    settings: PublisherSettings,
    store: S,
    delivery: D,
    shutdown_rx: ShutdownRx,
}

impl<S, D> Publisher<S, D>
where
    S: OutboxStore + Sync,
    D: Delivery + Sync,
{
    pub fn new(
        settings: PublisherSettings,
        store: S,
        delivery: D,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            settings,
            store,
            delivery,
            shutdown_rx,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn delivery(&self) -> &D {
        &self.delivery
    }

    /// Drains the outbox once, as a tick of [`Publisher::run`] does.
    ///
    /// In graceful mode the drain stops before the next cycle once shutdown is requested.
    pub async fn tick(&self) -> DrainReport {
        let stop = match self.settings.shutdown_mode {
            ShutdownMode::Graceful => Some(&self.shutdown_rx),
            ShutdownMode::FailFast => None,
        };

        drain_outbox(
            &self.store,
            &self.delivery,
            self.settings.encoder,
            self.settings.max_batch_size,
            stop,
        )
        .await
    }

    /// Runs until shutdown is requested.
    ///
    /// With [`ShutdownMode::FailFast`] an in-flight drain is abandoned, which rolls its
    /// transaction back, and the shutdown cause is returned as error. With
    /// [`ShutdownMode::Graceful`] the in-flight cycle completes and `Ok(())` is returned.
    #[instrument(
        name = "publisher",
        skip(self),
        fields(store = S::name(), delivery = D::name())
    )]
    pub async fn run(&mut self) -> OutboxResult<()> {
        let period = self.settings.poll_interval;
        info!(
            poll_interval_ms = period.as_millis() as u64,
            max_batch_size = self.settings.max_batch_size,
            shutdown_mode = ?self.settings.shutdown_mode,
            "starting outbox publisher"
        );

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                cause = self.shutdown_rx.wait_for_shutdown() => {
                    return self.stopped(cause, false);
                }
                _ = ticker.tick() => {}
            }

            let report = match self.settings.shutdown_mode {
                ShutdownMode::FailFast => {
                    tokio::select! {
                        biased;

                        cause = self.shutdown_rx.wait_for_shutdown() => {
                            return self.stopped(cause, true);
                        }
                        report = drain_outbox(
                            &self.store,
                            &self.delivery,
                            self.settings.encoder,
                            self.settings.max_batch_size,
                            None,
                        ) => report,
                    }
                }
                ShutdownMode::Graceful => self.tick().await,
            };

            debug!(
                cycles = report.cycles,
                published = report.published,
                "outbox tick finished"
            );
        }
    }

    fn stopped(&self, cause: OutboxError, in_flight: bool) -> OutboxResult<()> {
        match self.settings.shutdown_mode {
            ShutdownMode::FailFast => {
                warn!(in_flight, cause = %cause, "outbox publisher shutting down immediately");
                Err(cause)
            }
            ShutdownMode::Graceful => {
                info!(cause = %cause, "outbox publisher stopped");
                Ok(())
            }
        }
    }
}
