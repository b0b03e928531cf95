use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::delivery::base::{Delivery, DeliveryOutcome};
use crate::encoding::{EncodedPayload, decode_payload};
use crate::error::{ErrorKind, OutboxError, OutboxResult};

#[derive(Debug, Default)]
struct Inner {
    delivered: Vec<EncodedPayload>,
    attempts: u64,
    scripted: VecDeque<DeliveryOutcome>,
}

/// Delivery that keeps accepted batches in memory.
///
/// Outcomes can be scripted ahead of time; once the script is exhausted every attempt succeeds.
/// Only successful attempts are recorded as delivered.
#[derive(Debug, Clone, Default)]
pub struct MemoryDelivery {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the outcome of a future attempt.
    pub async fn push_outcome(&self, outcome: DeliveryOutcome) {
        self.inner.lock().await.scripted.push_back(outcome);
    }

    pub async fn reject_next(&self, status: u16) {
        self.push_outcome(DeliveryOutcome::RemoteRejected { status })
            .await;
    }

    pub async fn fail_next_transport(&self) {
        self.push_outcome(DeliveryOutcome::TransportFailure(OutboxError::from((
            ErrorKind::DeliveryTransportFailed,
            "Simulated transport failure",
        ))))
        .await;
    }

    pub async fn delivered(&self) -> Vec<EncodedPayload> {
        self.inner.lock().await.delivered.clone()
    }

    /// Returns the JSON text of every accepted batch, in delivery order.
    pub async fn delivered_bodies(&self) -> OutboxResult<Vec<String>> {
        let inner = self.inner.lock().await;
        inner
            .delivered
            .iter()
            .map(|payload| decode_payload(payload.body()))
            .collect()
    }

    pub async fn attempts(&self) -> u64 {
        self.inner.lock().await.attempts
    }
}

impl Delivery for MemoryDelivery {
    fn name() -> &'static str {
        "memory"
    }

    async fn deliver(&self, payload: &EncodedPayload) -> DeliveryOutcome {
        let mut inner = self.inner.lock().await;
        inner.attempts += 1;

        let outcome = inner
            .scripted
            .pop_front()
            .unwrap_or(DeliveryOutcome::Success);

        if outcome.is_success() {
            info!(
                records = payload.record_count(),
                bytes = payload.body().len(),
                "outbox batch kept in memory"
            );
            inner.delivered.push(payload.clone());
        }

        outcome
    }
}
