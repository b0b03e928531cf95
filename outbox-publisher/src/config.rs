use outbox_config::load_config;
use outbox_config::shared::PublisherConfig;

use crate::error::{PublisherError, PublisherResult};

/// Loads the layered publisher configuration and validates it.
pub fn load_publisher_config() -> PublisherResult<PublisherConfig> {
    let config = load_config::<PublisherConfig>().map_err(PublisherError::config)?;
    config.validate().map_err(PublisherError::config)?;

    Ok(config)
}
