//! Utilities for testing publishers.
//!
//! - [`database`] creates one throwaway Postgres database per test, holding an outbox table.
//! - [`delivery`] wraps a delivery so tests can hold a cycle in flight.
//! - [`failpoints`] configures fault injection for the duration of a test.

pub mod database;
pub mod delivery;
#[cfg(feature = "failpoints")]
pub mod failpoints;
