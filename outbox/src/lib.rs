//! Transactional outbox publisher.
//!
//! Producers write events into an outbox table in the same transaction as their own state. A
//! [`publisher::Publisher`] drains that table on a fixed interval: every cycle locks a bounded
//! batch, sends it gzip compressed to a collector and deletes the delivered rows, all inside one
//! store transaction. A cycle that fails at any step rolls back and leaves its rows for the next
//! one, which makes delivery at-least-once.
//!
//! The main seams are [`store::OutboxStore`] (Postgres or in-memory) and
//! [`delivery::Delivery`] (HTTP or in-memory).

pub mod concurrency;
pub mod delivery;
pub mod drain;
pub mod encoding;
pub mod error;
#[cfg(feature = "failpoints")]
pub mod failpoints;
mod macros;
pub mod publisher;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transaction;
pub mod types;
