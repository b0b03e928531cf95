use std::time::Duration;

use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, warn};

use crate::delivery::base::{Delivery, DeliveryOutcome};
use crate::encoding::EncodedPayload;
use crate::error::{ErrorKind, OutboxError, OutboxResult};
use crate::outbox_error;

const CONTENT_TYPE_TEXT: &str = "text/plain";
const CONTENT_ENCODING_GZIP: &str = "gzip";

/// POSTs batches to a collector endpoint.
///
/// The body is the gzip payload, sent with `Content-Type: text/plain` and
/// `Content-Encoding: gzip`. Only `200 OK` counts as accepted; any other status, including other
/// 2xx codes, is a rejection.
#[derive(Debug, Clone)]
pub struct HttpDelivery {
    client: Client,
    url: Url,
}

impl HttpDelivery {
    /// Creates a delivery posting to `url`, aborting requests after `timeout` when set.
    pub fn new(url: &str, timeout: Option<Duration>) -> OutboxResult<Self> {
        let url = Url::parse(url).map_err(|err| {
            outbox_error!(
                ErrorKind::ConfigError,
                "Invalid collector url",
                format!("{url}: {err}"),
                source: err
            )
        })?;

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|err| {
            outbox_error!(
                ErrorKind::ConfigError,
                "Failed to build the http client",
                err,
                source: err
            )
        })?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Delivery for HttpDelivery {
    fn name() -> &'static str {
        "http"
    }

    async fn deliver(&self, payload: &EncodedPayload) -> DeliveryOutcome {
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, CONTENT_TYPE_TEXT)
            .header(CONTENT_ENCODING, CONTENT_ENCODING_GZIP)
            .body(payload.body().clone())
            .send()
            .await;

        match response {
            Ok(response) if response.status() == StatusCode::OK => {
                debug!(
                    url = %self.url,
                    records = payload.record_count(),
                    bytes = payload.body().len(),
                    "collector accepted outbox batch"
                );

                DeliveryOutcome::Success
            }
            Ok(response) => {
                let status = response.status().as_u16();
                warn!(url = %self.url, status, "collector rejected outbox batch");

                DeliveryOutcome::RemoteRejected { status }
            }
            Err(err) => {
                warn!(url = %self.url, error = %err, "outbox batch delivery failed");

                DeliveryOutcome::TransportFailure(OutboxError::from(err))
            }
        }
    }
}
