//! All-or-nothing execution of one drain cycle.
//!
//! [`run_in_transaction`] begins a store transaction, hands it to a [`UnitOfWork`] and commits
//! only when the work succeeds. Errors and panics roll back, so rows that were fetched but not
//! delivered stay in the outbox for a later cycle.

use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::bail;
use crate::error::{ErrorKind, OutboxError, OutboxResult};
use crate::outbox_error;
use crate::store::{OutboxStore, OutboxTransaction};
use crate::types::{Batch, RecordId};

/// Work executed inside one outbox transaction.
pub trait UnitOfWork<T: OutboxTransaction> {
    type Output;

    fn run(
        &mut self,
        transaction: &mut CycleTransaction<T>,
    ) -> impl Future<Output = OutboxResult<Self::Output>> + Send;
}

/// Store transaction handed to a [`UnitOfWork`].
///
/// Fetches are bounded by `max_rows` and deletes are restricted to the rows returned by the
/// latest fetch of the same transaction. Violations fail with [`ErrorKind::InvalidState`] and
/// nothing is deleted.
#[derive(Debug)]
pub struct CycleTransaction<T> {
    inner: T,
    max_rows: usize,
    last_fetched: Option<HashSet<RecordId>>,
}

impl<T> CycleTransaction<T>
where
    T: OutboxTransaction + Send,
{
    pub fn new(inner: T, max_rows: usize) -> Self {
        Self {
            inner,
            max_rows,
            last_fetched: None,
        }
    }

    /// Fetches and locks up to `max_rows` records.
    pub async fn fetch_locked(&mut self) -> OutboxResult<Batch> {
        self.last_fetched = None;
        let batch = self.inner.fetch_locked(self.max_rows).await?;

        if batch.len() > self.max_rows {
            bail!(
                ErrorKind::InvalidState,
                "Outbox store returned more rows than requested",
                format!("requested {}, got {}", self.max_rows, batch.len())
            );
        }

        self.last_fetched = Some(batch.ids().collect());

        Ok(batch)
    }

    /// Deletes records returned by the latest [`CycleTransaction::fetch_locked`].
    pub async fn delete_by_ids(&mut self, ids: &[RecordId]) -> OutboxResult<u64> {
        let Some(fetched) = &self.last_fetched else {
            bail!(
                ErrorKind::InvalidState,
                "Outbox records were deleted before being fetched"
            );
        };

        if let Some(id) = ids.iter().find(|id| !fetched.contains(id)) {
            bail!(
                ErrorKind::InvalidState,
                "Outbox record was not locked by this transaction",
                format!("record {id} was not returned by the latest fetch")
            );
        }

        self.inner.delete_by_ids(ids).await
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

/// Runs `work` in a new transaction of `store`, committing on success and rolling back on error
/// or panic.
///
/// Never panics. A failed rollback is reported together with the error that caused it.
pub async fn run_in_transaction<S, W>(
    store: &S,
    max_rows: usize,
    work: &mut W,
) -> OutboxResult<W::Output>
where
    S: OutboxStore,
    W: UnitOfWork<S::Transaction>,
{
    let transaction = match store.begin().await {
        Ok(transaction) => transaction,
        Err(err) => {
            warn!(store = S::name(), error = %err, "failed to begin outbox transaction");
            return Err(err);
        }
    };

    let mut transaction = CycleTransaction::new(transaction, max_rows);
    let result = match AssertUnwindSafe(work.run(&mut transaction))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(panic_error(panic)),
    };

    match result {
        Ok(output) => {
            if let Err(err) = transaction.into_inner().commit().await {
                warn!(store = S::name(), error = %err, "failed to commit outbox transaction");
                return Err(err);
            }

            debug!(store = S::name(), "committed outbox transaction");

            Ok(output)
        }
        Err(err) => {
            warn!(store = S::name(), error = %err, "outbox cycle failed, rolling back");

            if let Err(rollback_err) = transaction.into_inner().rollback().await {
                warn!(
                    store = S::name(),
                    error = %rollback_err,
                    "failed to roll back outbox transaction"
                );
                return Err(OutboxError::from(vec![err, rollback_err]));
            }

            Err(err)
        }
    }
}

fn panic_error(panic: Box<dyn Any + Send>) -> OutboxError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());

    outbox_error!(ErrorKind::CyclePanic, "Outbox cycle panicked", message)
}
