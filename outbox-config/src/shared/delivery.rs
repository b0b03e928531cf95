use serde::Deserialize;

use crate::shared::ValidationError;

/// Where drained batches are sent.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryConfig {
    /// Keeps delivered batches in process memory, for local runs.
    Memory,
    /// POSTs every batch to a collector endpoint.
    Http {
        url: String,
        /// Whole-request timeout in milliseconds. No timeout when absent.
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
}

impl DeliveryConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            DeliveryConfig::Memory => Ok(()),
            DeliveryConfig::Http { url, timeout_ms } => {
                if url.trim().is_empty() {
                    return Err(ValidationError::invalid(
                        "delivery.http.url",
                        "must not be empty",
                    ));
                }

                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ValidationError::invalid(
                        "delivery.http.url",
                        "must use the http or https scheme",
                    ));
                }

                if *timeout_ms == Some(0) {
                    return Err(ValidationError::invalid(
                        "delivery.http.timeout_ms",
                        "must be greater than 0",
                    ));
                }

                Ok(())
            }
        }
    }
}
