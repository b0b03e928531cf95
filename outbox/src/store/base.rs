use std::future::Future;

use crate::error::OutboxResult;
use crate::types::{Batch, RecordId};

/// Source of outbox records.
///
/// A store hands out transactions; everything a drain cycle reads or deletes happens inside one
/// of them, so the cycle's effects become visible only on commit.
pub trait OutboxStore {
    type Transaction: OutboxTransaction + Send;

    /// Returns the name of the store, used in logs.
    fn name() -> &'static str;

    /// Opens a new transaction.
    fn begin(&self) -> impl Future<Output = OutboxResult<Self::Transaction>> + Send;
}

/// Transaction scoped access to the outbox table.
///
/// Dropping a transaction without calling [`OutboxTransaction::commit`] or
/// [`OutboxTransaction::rollback`] abandons it: its locks are released and its deletes are
/// discarded.
pub trait OutboxTransaction {
    /// Selects up to `max_rows` pending records and locks them until the transaction ends.
    fn fetch_locked(&mut self, max_rows: usize)
    -> impl Future<Output = OutboxResult<Batch>> + Send;

    /// Deletes the given records and returns how many rows were removed.
    ///
    /// An empty `ids` slice issues nothing and returns `0`.
    fn delete_by_ids(&mut self, ids: &[RecordId]) -> impl Future<Output = OutboxResult<u64>> + Send;

    fn commit(self) -> impl Future<Output = OutboxResult<()>> + Send;

    fn rollback(self) -> impl Future<Output = OutboxResult<()>> + Send;
}
