use serde::Deserialize;

use crate::Config;
use crate::shared::{BatchConfig, DeliveryConfig, StoreConfig, ValidationError};

/// What the publisher does with an in-flight cycle when shutdown is requested.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownMode {
    /// Abandon the in-flight cycle and stop with the shutdown cause as error.
    #[default]
    FailFast,
    /// Let the in-flight cycle finish, start no new one and stop cleanly.
    Graceful,
}

/// Scheduling and batching settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Milliseconds between two drain ticks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub shutdown_mode: ShutdownMode,
    /// Gzip level, from 0 (store only) to 9 (best compression).
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

impl SchedulerConfig {
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
    pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;
    pub const MAX_COMPRESSION_LEVEL: u32 = 9;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.poll_interval_ms == 0 {
            return Err(ValidationError::invalid(
                "publisher.poll_interval_ms",
                "must be greater than 0",
            ));
        }

        if self.compression_level > Self::MAX_COMPRESSION_LEVEL {
            return Err(ValidationError::invalid(
                "publisher.compression_level",
                "must be between 0 and 9",
            ));
        }

        self.batch.validate()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch: BatchConfig::default(),
            shutdown_mode: ShutdownMode::default(),
            compression_level: default_compression_level(),
        }
    }
}

const fn default_poll_interval_ms() -> u64 {
    SchedulerConfig::DEFAULT_POLL_INTERVAL_MS
}

const fn default_compression_level() -> u32 {
    SchedulerConfig::DEFAULT_COMPRESSION_LEVEL
}

/// Complete configuration of the publisher service.
///
/// Only deserialized. The store password is a [`secrecy::SecretString`], so the `Debug` output
/// is redacted.
#[derive(Clone, Debug, Deserialize)]
pub struct PublisherConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub publisher: SchedulerConfig,
    pub delivery: DeliveryConfig,
}

impl PublisherConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.store.validate()?;
        self.publisher.validate()?;
        self.delivery.validate()
    }
}

impl Config for PublisherConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}
