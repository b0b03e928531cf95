use outbox_config::shared::{
    IntoConnectOptions, OutboxTableConfig, PgConnectionConfig, StoreConfig, TlsConfig,
};
use pg_escape::quote_identifier;
use sqlx::{Connection, Executor, PgConnection, PgPool, Row};
use tokio::runtime::Handle;
use uuid::Uuid;

use crate::types::RecordId;

/// Connection settings of a fresh, uniquely named test database.
///
/// Read from the environment:
/// - `TESTS_DATABASE_HOST` (required)
/// - `TESTS_DATABASE_PORT` (required)
/// - `TESTS_DATABASE_USERNAME` (required)
/// - `TESTS_DATABASE_PASSWORD` (optional)
pub fn local_pg_connection_config() -> PgConnectionConfig {
    PgConnectionConfig {
        host: std::env::var("TESTS_DATABASE_HOST").expect("TESTS_DATABASE_HOST must be set"),
        port: std::env::var("TESTS_DATABASE_PORT")
            .expect("TESTS_DATABASE_PORT must be set")
            .parse()
            .expect("TESTS_DATABASE_PORT must be a valid port number"),
        name: Uuid::new_v4().to_string(),
        username: std::env::var("TESTS_DATABASE_USERNAME")
            .expect("TESTS_DATABASE_USERNAME must be set"),
        password: std::env::var("TESTS_DATABASE_PASSWORD")
            .ok()
            .map(Into::into),
        tls: TlsConfig::disabled(),
    }
}

/// A Postgres database created for one test and dropped with it.
///
/// Dropping requires a multi-threaded runtime, since cleanup blocks on the current runtime.
pub struct PgDatabase {
    pub config: PgConnectionConfig,
    pub pool: PgPool,
}

impl PgDatabase {
    /// Creates a new database named after a random uuid.
    ///
    /// # Panics
    ///
    /// Panics if the server is unreachable or the database cannot be created.
    pub async fn new() -> Self {
        let config = local_pg_connection_config();

        let mut connection = PgConnection::connect_with(&config.without_db(None))
            .await
            .expect("Failed to connect to Postgres");
        connection
            .execute(&*format!("create database {}", quote_identifier(&config.name)))
            .await
            .expect("Failed to create database");

        let pool = PgPool::connect_with(config.with_db(None))
            .await
            .expect("Failed to connect to the test database");

        Self { config, pool }
    }

    /// Store settings pointing at this database and `table`.
    pub fn store_config(&self, table: &OutboxTableConfig) -> StoreConfig {
        StoreConfig {
            connection: self.config.clone(),
            table: table.clone(),
            max_connections: 2,
        }
    }

    /// Creates the outbox table with a `bigserial` identifier and a `jsonb` payload.
    pub async fn create_outbox_table(&self, table: &OutboxTableConfig) {
        let schema = quote_identifier(&table.schema);
        self.pool
            .execute(&*format!("create schema if not exists {schema}"))
            .await
            .expect("Failed to create outbox schema");

        self.pool
            .execute(&*format!(
                "create table {schema}.{} ({} bigserial primary key, {} jsonb not null)",
                quote_identifier(&table.name),
                quote_identifier(&table.id_column),
                quote_identifier(&table.payload_column),
            ))
            .await
            .expect("Failed to create outbox table");
    }

    /// Inserts one row per payload and returns their ids in insertion order.
    pub async fn insert_payloads(
        &self,
        table: &OutboxTableConfig,
        payloads: &[&str],
    ) -> Vec<RecordId> {
        let query = format!(
            "insert into {}.{} ({}) values ($1::jsonb) returning {}",
            quote_identifier(&table.schema),
            quote_identifier(&table.name),
            quote_identifier(&table.payload_column),
            quote_identifier(&table.id_column),
        );

        let mut ids = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let row = sqlx::query(&query)
                .bind(*payload)
                .fetch_one(&self.pool)
                .await
                .expect("Failed to insert outbox row");
            ids.push(RecordId::new(row.get::<i64, _>(0)));
        }

        ids
    }

    /// Returns the ids of every row in the outbox table, ascending.
    pub async fn pending_ids(&self, table: &OutboxTableConfig) -> Vec<RecordId> {
        let id = quote_identifier(&table.id_column);
        let rows = sqlx::query(&format!(
            "select {id} from {}.{} order by {id}",
            quote_identifier(&table.schema),
            quote_identifier(&table.name),
        ))
        .fetch_all(&self.pool)
        .await
        .expect("Failed to read outbox rows");

        rows.iter()
            .map(|row| RecordId::new(row.get::<i64, _>(0)))
            .collect()
    }
}

/// Terminates remaining connections and drops the database. Errors are printed, not raised.
async fn drop_pg_database(config: &PgConnectionConfig) {
    let mut connection = match PgConnection::connect_with(&config.without_db(None)).await {
        Ok(connection) => connection,
        Err(err) => {
            eprintln!("warning: failed to connect to Postgres for cleanup: {err}");
            return;
        }
    };

    if let Err(err) = sqlx::query(
        "select pg_terminate_backend(pid) from pg_stat_activity where datname = $1 and pid <> pg_backend_pid()",
    )
    .bind(&config.name)
    .execute(&mut connection)
    .await
    {
        eprintln!(
            "warning: failed to terminate connections for database {}: {err}",
            config.name
        );
    }

    if let Err(err) = connection
        .execute(&*format!(
            "drop database if exists {}",
            quote_identifier(&config.name)
        ))
        .await
    {
        eprintln!("warning: failed to drop database {}: {err}", config.name);
    }
}

impl Drop for PgDatabase {
    fn drop(&mut self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tokio::task::block_in_place(|| {
                Handle::current().block_on(async {
                    self.pool.close().await;
                    drop_pg_database(&self.config).await;
                });
            });
        }));
    }
}
