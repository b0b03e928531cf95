use std::fmt;
use std::sync::Arc;

use outbox_config::shared::{
    IntoConnectOptions, LockMode, OUTBOX_PUBLISHER_OPTIONS, OutboxTableConfig, StoreConfig,
};
use pg_escape::quote_identifier;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row};
use tracing::{debug, info};

use crate::error::{ErrorKind, OutboxError, OutboxResult};
use crate::outbox_error;
use crate::store::base::{OutboxStore, OutboxTransaction};
use crate::types::{Batch, PersistedRecord, RecordId};

/// SQL statements for one outbox table, rendered once with quoted identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OutboxQueries {
    fetch_locked: String,
    delete_by_ids: String,
}

impl OutboxQueries {
    fn new(table: &OutboxTableConfig) -> Self {
        let schema = quote_identifier(&table.schema);
        let name = quote_identifier(&table.name);
        let id = quote_identifier(&table.id_column);
        let payload = quote_identifier(&table.payload_column);

        let order_by = if table.ordered {
            format!(" order by {id}")
        } else {
            String::new()
        };
        let lock = match table.lock_mode {
            LockMode::Wait => "for update",
            LockMode::SkipLocked => "for update skip locked",
        };

        Self {
            fetch_locked: format!(
                "select {id}::bigint as id, {payload}::text as payload from {schema}.{name}{order_by} limit $1 {lock}"
            ),
            delete_by_ids: format!("delete from {schema}.{name} where {id} = any($1)"),
        }
    }
}

/// Outbox store backed by a Postgres table.
#[derive(Debug, Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
    queries: Arc<OutboxQueries>,
}

impl PostgresOutboxStore {
    /// Wraps an existing pool.
    pub fn new(pool: PgPool, table: &OutboxTableConfig) -> Self {
        Self {
            pool,
            queries: Arc::new(OutboxQueries::new(table)),
        }
    }

    /// Connects a pool for `config`, applying the publisher session options.
    pub async fn connect(config: &StoreConfig) -> OutboxResult<Self> {
        let options = config.connection.with_db(Some(&OUTBOX_PUBLISHER_OPTIONS));

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|err| {
                outbox_error!(
                    ErrorKind::StoreConnectionFailed,
                    "Failed to connect to the outbox store",
                    format!(
                        "{}:{}/{}: {err}",
                        config.connection.host, config.connection.port, config.connection.name
                    ),
                    source: err
                )
            })?;

        info!(
            host = %config.connection.host,
            port = config.connection.port,
            database = %config.connection.name,
            schema = %config.table.schema,
            table = %config.table.name,
            "connected to outbox store"
        );

        Ok(Self::new(pool, &config.table))
    }
}

impl OutboxStore for PostgresOutboxStore {
    type Transaction = PostgresOutboxTransaction;

    fn name() -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> OutboxResult<PostgresOutboxTransaction> {
        let transaction = self.pool.begin().await.map_err(|err| {
            outbox_error!(
                ErrorKind::TransactionBeginFailed,
                "Failed to begin outbox transaction",
                err,
                source: err
            )
        })?;

        Ok(PostgresOutboxTransaction {
            transaction,
            queries: self.queries.clone(),
        })
    }
}

/// Open transaction on the outbox table. Dropping it rolls back.
pub struct PostgresOutboxTransaction {
    transaction: sqlx::Transaction<'static, Postgres>,
    queries: Arc<OutboxQueries>,
}

impl fmt::Debug for PostgresOutboxTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresOutboxTransaction")
            .field("queries", &self.queries)
            .finish_non_exhaustive()
    }
}

impl OutboxTransaction for PostgresOutboxTransaction {
    async fn fetch_locked(&mut self, max_rows: usize) -> OutboxResult<Batch> {
        let limit = i64::try_from(max_rows).unwrap_or(i64::MAX);

        let rows = sqlx::query(&self.queries.fetch_locked)
            .bind(limit)
            .fetch_all(&mut *self.transaction)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let payload: String = row.try_get("payload")?;
            records.push(PersistedRecord::new(RecordId::new(id), payload));
        }

        debug!(count = records.len(), "fetched locked outbox records");

        Ok(Batch::new(records))
    }

    async fn delete_by_ids(&mut self, ids: &[RecordId]) -> OutboxResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let ids: Vec<i64> = ids.iter().map(|id| id.into_inner()).collect();
        let result = sqlx::query(&self.queries.delete_by_ids)
            .bind(ids)
            .execute(&mut *self.transaction)
            .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self) -> OutboxResult<()> {
        self.transaction
            .commit()
            .await
            .map_err(|err| finish_error(ErrorKind::TransactionCommitFailed, err))
    }

    async fn rollback(self) -> OutboxResult<()> {
        self.transaction
            .rollback()
            .await
            .map_err(|err| finish_error(ErrorKind::TransactionRollbackFailed, err))
    }
}

#[track_caller]
fn finish_error(kind: ErrorKind, err: sqlx::Error) -> OutboxError {
    let description = match kind {
        ErrorKind::TransactionCommitFailed => "Failed to commit outbox transaction",
        _ => "Failed to roll back outbox transaction",
    };

    outbox_error!(kind, description, err, source: err)
}
