//! Configuration sections shared by the outbox library and the publisher service.

mod base;
mod batch;
mod connection;
mod delivery;
mod publisher;
mod store;

pub use base::ValidationError;
pub use batch::BatchConfig;
pub use connection::{
    IntoConnectOptions, OUTBOX_PUBLISHER_OPTIONS, PgConnectionConfig, PgConnectionOptions,
    TlsConfig,
};
pub use delivery::DeliveryConfig;
pub use publisher::{PublisherConfig, SchedulerConfig, ShutdownMode};
pub use store::{LockMode, OutboxTableConfig, StoreConfig};
