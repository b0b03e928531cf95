//! Shutdown signal carrying its cause.
//!
//! The signal is a [`watch`] channel holding `None` until someone requests shutdown with an
//! [`OutboxError`] describing why. Every receiver observes the same cause.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::OutboxError;

/// Error returned when no receiver is left to observe a shutdown request.
pub type ShutdownSendError = watch::error::SendError<Option<OutboxError>>;

/// Sending half of the shutdown signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownTx(Arc<watch::Sender<Option<OutboxError>>>);

impl ShutdownTx {
    /// Requests shutdown with `cause`.
    ///
    /// Only the first request is kept; later ones are ignored so every receiver reports the
    /// same cause.
    pub fn shutdown(&self, cause: OutboxError) -> Result<(), ShutdownSendError> {
        if self.0.borrow().is_some() {
            return Ok(());
        }

        self.0.send(Some(cause))
    }

    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiving half of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<Option<OutboxError>>);

impl ShutdownRx {
    pub fn is_shutdown(&self) -> bool {
        self.0.borrow().is_some()
    }

    /// Returns the cause of the shutdown, if one was requested.
    pub fn cause(&self) -> Option<OutboxError> {
        self.0.borrow().clone()
    }

    /// Resolves with the cause once shutdown is requested.
    ///
    /// Resolves immediately if shutdown was already requested. Never resolves when every
    /// [`ShutdownTx`] was dropped without requesting it.
    pub async fn wait_for_shutdown(&mut self) -> OutboxError {
        let cause = match self.0.wait_for(Option::is_some).await {
            Ok(cause) => cause.clone(),
            Err(_) => None,
        };

        match cause {
            Some(cause) => cause,
            None => std::future::pending().await,
        }
    }
}

/// Creates a shutdown signal that has not fired yet.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(None);
    (ShutdownTx(Arc::new(tx)), ShutdownRx(rx))
}
