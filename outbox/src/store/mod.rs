//! Access to the outbox table.

mod base;
pub mod memory;
pub mod postgres;

pub use base::{OutboxStore, OutboxTransaction};
