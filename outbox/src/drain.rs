//! Draining the outbox one transactional cycle at a time.

use tracing::{debug, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::delivery::Delivery;
use crate::encoding::PayloadEncoder;
use crate::error::{OutboxError, OutboxResult};
#[cfg(feature = "failpoints")]
use crate::failpoints::{
    DRAIN_CYCLE_BEFORE_DELETE_FP, DRAIN_CYCLE_BEFORE_DELIVERY_FP, outbox_fail_point,
};
use crate::store::{OutboxStore, OutboxTransaction};
use crate::transaction::{CycleTransaction, UnitOfWork, run_in_transaction};
use crate::types::RecordId;

/// What a successful cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No pending record was found; nothing was encoded, delivered or deleted.
    Empty,
    /// A batch was delivered and its rows deleted.
    Published { records: usize, deleted: u64 },
}

/// One fetch, encode, deliver and delete pass, run by [`run_in_transaction`].
///
/// Any failure after the fetch makes the cycle fail, which rolls back the deletes and releases
/// the row locks.
#[derive(Debug)]
pub struct DrainCycle<'a, D> {
    delivery: &'a D,
    encoder: PayloadEncoder,
}

impl<'a, D> DrainCycle<'a, D> {
    pub fn new(delivery: &'a D, encoder: PayloadEncoder) -> Self {
        Self { delivery, encoder }
    }
}

impl<T, D> UnitOfWork<T> for DrainCycle<'_, D>
where
    T: OutboxTransaction + Send,
    D: Delivery + Sync,
{
    type Output = CycleOutcome;

    async fn run(&mut self, transaction: &mut CycleTransaction<T>) -> OutboxResult<CycleOutcome> {
        let batch = transaction.fetch_locked().await?;
        if batch.is_empty() {
            return Ok(CycleOutcome::Empty);
        }

        let records = batch.len();
        let payload = self.encoder.encode(batch.payloads())?;
        debug!(
            records,
            uncompressed_bytes = payload.uncompressed_len(),
            compressed_bytes = payload.body().len(),
            "encoded outbox batch"
        );

        #[cfg(feature = "failpoints")]
        outbox_fail_point(DRAIN_CYCLE_BEFORE_DELIVERY_FP)?;

        self.delivery.deliver(&payload).await.into_result()?;

        #[cfg(feature = "failpoints")]
        outbox_fail_point(DRAIN_CYCLE_BEFORE_DELETE_FP)?;

        let ids: Vec<RecordId> = batch.ids().collect();
        let deleted = transaction.delete_by_ids(&ids).await?;
        if deleted != records as u64 {
            warn!(
                records,
                deleted, "deleted a different number of outbox rows than were delivered"
            );
        }

        Ok(CycleOutcome::Published { records, deleted })
    }
}

/// Why [`drain_outbox`] stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum DrainStop {
    /// A cycle found no pending record.
    Exhausted,
    /// A cycle failed and was rolled back. Its rows are retried on the next tick.
    CycleFailed(OutboxError),
    /// Shutdown was observed between two cycles.
    ShutdownRequested,
}

/// Summary of one [`drain_outbox`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct DrainReport {
    /// Number of cycles started, including the last empty or failed one.
    pub cycles: u64,
    /// Records delivered and deleted by committed cycles.
    pub published: u64,
    pub stop: DrainStop,
}

/// Runs drain cycles back to back until the outbox is empty or a cycle fails.
///
/// When `stop` is given, a requested shutdown is checked before every cycle and ends the drain
/// without starting a new one. Failures never escape: they end the drain and are reported in the
/// returned [`DrainReport`].
pub async fn drain_outbox<S, D>(
    store: &S,
    delivery: &D,
    encoder: PayloadEncoder,
    max_batch_size: usize,
    stop: Option<&ShutdownRx>,
) -> DrainReport
where
    S: OutboxStore + Sync,
    D: Delivery + Sync,
{
    let mut cycle = DrainCycle::new(delivery, encoder);
    let mut cycles = 0;
    let mut published = 0;

    let stop = loop {
        if stop.is_some_and(ShutdownRx::is_shutdown) {
            break DrainStop::ShutdownRequested;
        }

        cycles += 1;
        match run_in_transaction(store, max_batch_size, &mut cycle).await {
            Ok(CycleOutcome::Empty) => break DrainStop::Exhausted,
            Ok(CycleOutcome::Published { records, deleted }) => {
                published += deleted;
                debug!(cycle = cycles, records, deleted, "published outbox batch");
            }
            Err(err) => break DrainStop::CycleFailed(err),
        }
    };

    match &stop {
        DrainStop::CycleFailed(err) => {
            warn!(
                store = S::name(),
                delivery = D::name(),
                cycles,
                published,
                error = %err,
                "outbox drain stopped after a failed cycle"
            );
        }
        _ if published > 0 => {
            info!(
                store = S::name(),
                delivery = D::name(),
                cycles,
                published,
                "drained outbox"
            );
        }
        _ => {}
    }

    DrainReport {
        cycles,
        published,
        stop,
    }
}
