//! Destinations for encoded batches.

mod base;
pub mod http;
pub mod memory;

pub use base::{Delivery, DeliveryOutcome};
