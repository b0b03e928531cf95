//! Telemetry setup shared by the publisher binary and the test suites.

pub mod tracing;
