//! Configuration for the outbox publisher.
//!
//! Holds the typed configuration sections shared by the library and the service binary, their
//! validation rules, and the layered loader that reads them from files and environment variables.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
