use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::time::timeout;

use crate::delivery::{Delivery, DeliveryOutcome};
use crate::encoding::EncodedPayload;

/// Default time a test waits for a delivery to start.
pub const DEFAULT_ENTER_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivery that parks every attempt until the gate is opened, then forwards to `inner`.
///
/// Lets tests observe a cycle that is in flight, holding its transaction and row locks.
#[derive(Debug, Clone)]
pub struct GatedDelivery<D> {
    inner: D,
    entered: Arc<Notify>,
    gate: Arc<watch::Sender<bool>>,
}

impl<D> GatedDelivery<D> {
    pub fn new(inner: D) -> Self {
        let (gate, _) = watch::channel(false);

        Self {
            inner,
            entered: Arc::new(Notify::new()),
            gate: Arc::new(gate),
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Lets parked and future attempts through.
    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    /// Waits until an attempt reaches the gate.
    ///
    /// # Panics
    ///
    /// Panics if no attempt arrives within [`DEFAULT_ENTER_TIMEOUT`].
    pub async fn wait_until_entered(&self) {
        if timeout(DEFAULT_ENTER_TIMEOUT, self.entered.notified())
            .await
            .is_err()
        {
            panic!(
                "no delivery started within {DEFAULT_ENTER_TIMEOUT:?}, check that the publisher is ticking"
            );
        }
    }
}

impl<D> Delivery for GatedDelivery<D>
where
    D: Delivery + Sync,
{
    fn name() -> &'static str {
        D::name()
    }

    async fn deliver(&self, payload: &EncodedPayload) -> DeliveryOutcome {
        let mut gate = self.gate.subscribe();
        self.entered.notify_one();

        // The sender lives in `self`, so waiting cannot fail.
        let _ = gate.wait_for(|open| *open).await;

        self.inner.deliver(payload).await
    }
}
