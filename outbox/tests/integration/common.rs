use std::time::Duration;

use outbox::publisher::PublisherSettings;
use outbox_config::shared::ShutdownMode;
use serde_json::Value;

/// Settings with a short poll interval so `run` ticks quickly in tests.
pub fn test_settings(max_batch_size: usize, shutdown_mode: ShutdownMode) -> PublisherSettings {
    PublisherSettings {
        poll_interval: Duration::from_millis(20),
        max_batch_size,
        shutdown_mode,
        ..PublisherSettings::default()
    }
}

/// Parses a delivered body into its JSON elements.
pub fn parse_batch(body: &str) -> Vec<Value> {
    match serde_json::from_str(body).expect("delivered body is not JSON") {
        Value::Array(elements) => elements,
        other => panic!("delivered body is not a JSON array: {other}"),
    }
}

/// Polls `condition` every few milliseconds for up to five seconds.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within five seconds"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
