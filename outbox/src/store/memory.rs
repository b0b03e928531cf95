use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, OutboxResult};
use crate::store::base::{OutboxStore, OutboxTransaction};
use crate::types::{Batch, PersistedRecord, RecordId};

/// Number of operations a [`MemoryOutboxStore`] served, for assertions in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounters {
    pub begins: u64,
    pub fetches: u64,
    pub deletes: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

#[derive(Debug, Default)]
struct Faults {
    begin: bool,
    fetch: bool,
    delete: bool,
    commit: bool,
    rollback: bool,
}

#[derive(Debug, Default)]
struct Inner {
    rows: BTreeMap<RecordId, String>,
    /// Row id to the transaction holding its lock.
    locks: HashMap<RecordId, u64>,
    next_row_id: i64,
    next_transaction_id: u64,
    counters: StoreCounters,
    faults: Faults,
}

impl Inner {
    fn release(&mut self, transaction_id: u64) {
        self.locks.retain(|_, holder| *holder != transaction_id);
    }
}

/// In-memory outbox store.
///
/// Behaves like the Postgres store with `FOR UPDATE SKIP LOCKED`: rows locked by a live
/// transaction are invisible to other transactions, and deletes only become visible on commit.
/// Every operation can be scripted to fail once.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutboxStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a record and returns its id. Ids are assigned in increasing order.
    pub fn insert(&self, payload: impl Into<String>) -> RecordId {
        let mut inner = self.lock();
        inner.next_row_id += 1;
        let id = RecordId::new(inner.next_row_id);
        inner.rows.insert(id, payload.into());

        id
    }

    pub fn insert_many<I, P>(&self, payloads: I) -> Vec<RecordId>
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        payloads
            .into_iter()
            .map(|payload| self.insert(payload))
            .collect()
    }

    /// Returns the ids of every committed row, locked or not.
    pub fn pending_ids(&self) -> Vec<RecordId> {
        self.lock().rows.keys().copied().collect()
    }

    pub fn pending_records(&self) -> Vec<PersistedRecord> {
        self.lock()
            .rows
            .iter()
            .map(|(id, payload)| PersistedRecord::new(*id, payload.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().rows.is_empty()
    }

    /// Returns the number of rows currently locked by open transactions.
    pub fn locked_count(&self) -> usize {
        self.lock().locks.len()
    }

    pub fn counters(&self) -> StoreCounters {
        self.lock().counters
    }

    pub fn fail_next_begin(&self) {
        self.lock().faults.begin = true;
    }

    pub fn fail_next_fetch(&self) {
        self.lock().faults.fetch = true;
    }

    pub fn fail_next_delete(&self) {
        self.lock().faults.delete = true;
    }

    /// The failed commit discards the transaction's deletes, as a failed `COMMIT` does.
    pub fn fail_next_commit(&self) {
        self.lock().faults.commit = true;
    }

    pub fn fail_next_rollback(&self) {
        self.lock().faults.rollback = true;
    }
}

impl OutboxStore for MemoryOutboxStore {
    type Transaction = MemoryOutboxTransaction;

    fn name() -> &'static str {
        "memory"
    }

    async fn begin(&self) -> OutboxResult<MemoryOutboxTransaction> {
        let mut inner = self.lock();
        inner.counters.begins += 1;

        if std::mem::take(&mut inner.faults.begin) {
            bail!(
                ErrorKind::TransactionBeginFailed,
                "Failed to begin outbox transaction",
                "injected begin failure"
            );
        }

        inner.next_transaction_id += 1;
        let id = inner.next_transaction_id;
        debug!(transaction_id = id, "began memory outbox transaction");

        Ok(MemoryOutboxTransaction {
            id,
            store: self.clone(),
            staged_deletes: BTreeSet::new(),
            finished: false,
        })
    }
}

/// Transaction of a [`MemoryOutboxStore`].
#[derive(Debug)]
pub struct MemoryOutboxTransaction {
    id: u64,
    store: MemoryOutboxStore,
    staged_deletes: BTreeSet<RecordId>,
    finished: bool,
}

impl OutboxTransaction for MemoryOutboxTransaction {
    async fn fetch_locked(&mut self, max_rows: usize) -> OutboxResult<Batch> {
        let mut inner = self.store.lock();
        inner.counters.fetches += 1;

        if std::mem::take(&mut inner.faults.fetch) {
            bail!(
                ErrorKind::StoreQueryFailed,
                "Failed to fetch outbox records",
                "injected fetch failure"
            );
        }

        let transaction_id = self.id;
        let records: Vec<PersistedRecord> = inner
            .rows
            .iter()
            .filter(|(id, _)| !self.staged_deletes.contains(id))
            .filter(|(id, _)| {
                inner
                    .locks
                    .get(id)
                    .is_none_or(|holder| *holder == transaction_id)
            })
            .take(max_rows)
            .map(|(id, payload)| PersistedRecord::new(*id, payload.clone()))
            .collect();

        for record in &records {
            inner.locks.insert(record.id, transaction_id);
        }

        Ok(Batch::new(records))
    }

    async fn delete_by_ids(&mut self, ids: &[RecordId]) -> OutboxResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut inner = self.store.lock();
        inner.counters.deletes += 1;

        if std::mem::take(&mut inner.faults.delete) {
            bail!(
                ErrorKind::StoreQueryFailed,
                "Failed to delete outbox records",
                "injected delete failure"
            );
        }

        let mut deleted = 0;
        for id in ids {
            let visible = inner.rows.contains_key(id) && !self.staged_deletes.contains(id);
            if visible && self.staged_deletes.insert(*id) {
                inner.locks.insert(*id, self.id);
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    async fn commit(mut self) -> OutboxResult<()> {
        self.finished = true;
        let mut inner = self.store.lock();
        inner.counters.commits += 1;
        inner.release(self.id);

        if std::mem::take(&mut inner.faults.commit) {
            bail!(
                ErrorKind::TransactionCommitFailed,
                "Failed to commit outbox transaction",
                "injected commit failure"
            );
        }

        for id in &self.staged_deletes {
            inner.rows.remove(id);
        }

        Ok(())
    }

    async fn rollback(mut self) -> OutboxResult<()> {
        self.finished = true;
        let mut inner = self.store.lock();
        inner.counters.rollbacks += 1;
        inner.release(self.id);

        if std::mem::take(&mut inner.faults.rollback) {
            bail!(
                ErrorKind::TransactionRollbackFailed,
                "Failed to roll back outbox transaction",
                "injected rollback failure"
            );
        }

        Ok(())
    }
}

impl Drop for MemoryOutboxTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.store.lock().release(self.id);
        }
    }
}
