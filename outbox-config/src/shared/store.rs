use serde::Deserialize;

use crate::shared::{PgConnectionConfig, ValidationError};

/// How a locked fetch treats rows already locked by another transaction.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// Plain `FOR UPDATE`: wait for the other transaction, bounded by the session `lock_timeout`.
    #[default]
    Wait,
    /// `FOR UPDATE SKIP LOCKED`: leave locked rows to their holder, so several publishers can
    /// drain the same table.
    SkipLocked,
}

/// Location and shape of the outbox table.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct OutboxTableConfig {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_table_name")]
    pub name: String,
    /// Integer identifier column.
    #[serde(default = "default_id_column")]
    pub id_column: String,
    /// Column holding the serialized event, read as text.
    #[serde(default = "default_payload_column")]
    pub payload_column: String,
    #[serde(default)]
    pub lock_mode: LockMode,
    /// Fetch rows in identifier order instead of whatever order the store returns.
    #[serde(default)]
    pub ordered: bool,
}

impl OutboxTableConfig {
    pub const DEFAULT_SCHEMA: &'static str = "public";
    pub const DEFAULT_NAME: &'static str = "persistence";
    pub const DEFAULT_ID_COLUMN: &'static str = "id";
    pub const DEFAULT_PAYLOAD_COLUMN: &'static str = "json";

    pub fn validate(&self) -> Result<(), ValidationError> {
        let identifiers = [
            ("store.table.schema", &self.schema),
            ("store.table.name", &self.name),
            ("store.table.id_column", &self.id_column),
            ("store.table.payload_column", &self.payload_column),
        ];

        for (field, value) in identifiers {
            if value.trim().is_empty() {
                return Err(ValidationError::invalid(field, "must not be empty"));
            }
        }

        Ok(())
    }
}

impl Default for OutboxTableConfig {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            name: default_table_name(),
            id_column: default_id_column(),
            payload_column: default_payload_column(),
            lock_mode: LockMode::default(),
            ordered: false,
        }
    }
}

fn default_schema() -> String {
    OutboxTableConfig::DEFAULT_SCHEMA.to_string()
}

fn default_table_name() -> String {
    OutboxTableConfig::DEFAULT_NAME.to_string()
}

fn default_id_column() -> String {
    OutboxTableConfig::DEFAULT_ID_COLUMN.to_string()
}

fn default_payload_column() -> String {
    OutboxTableConfig::DEFAULT_PAYLOAD_COLUMN.to_string()
}

/// Store section of the publisher configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct StoreConfig {
    pub connection: PgConnectionConfig,
    #[serde(default)]
    pub table: OutboxTableConfig,
    /// Size of the connection pool; a single publisher only ever uses one connection at a time.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl StoreConfig {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 1;

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.connection.tls.validate()?;
        self.table.validate()?;

        if self.max_connections == 0 {
            return Err(ValidationError::invalid(
                "store.max_connections",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

const fn default_max_connections() -> u32 {
    StoreConfig::DEFAULT_MAX_CONNECTIONS
}
