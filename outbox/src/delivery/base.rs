use std::future::Future;

use crate::encoding::EncodedPayload;
use crate::error::{ErrorKind, OutboxError, OutboxResult};
use crate::outbox_error;

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// The collector accepted the batch.
    Success,
    /// The collector answered with a status other than `200 OK`.
    RemoteRejected { status: u16 },
    /// No answer was received.
    TransportFailure(OutboxError),
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success)
    }

    /// Converts every outcome but [`DeliveryOutcome::Success`] into an error.
    #[track_caller]
    pub fn into_result(self) -> OutboxResult<()> {
        match self {
            DeliveryOutcome::Success => Ok(()),
            DeliveryOutcome::RemoteRejected { status } => Err(outbox_error!(
                ErrorKind::DeliveryRejected,
                "Collector rejected the outbox batch",
                format!("collector answered with status {status}")
            )),
            DeliveryOutcome::TransportFailure(err) => Err(err),
        }
    }
}

/// Sends an encoded batch somewhere and reports whether it was accepted.
///
/// Implementations never retry; the batch stays in the outbox and is picked up by a later cycle.
pub trait Delivery {
    /// Returns the name of the delivery, used in logs.
    fn name() -> &'static str;

    fn deliver(&self, payload: &EncodedPayload) -> impl Future<Output = DeliveryOutcome> + Send;
}
