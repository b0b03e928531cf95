//! Wire format of a delivered batch: the payloads joined into a JSON array, gzip compressed.
//!
//! Payloads are written verbatim. They are expected to be JSON values already, and the encoder
//! never parses or re-serializes them.

use std::io::{Read, Write};

use bytes::Bytes;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{ErrorKind, OutboxResult};
use crate::outbox_error;

/// Gzip level used when none is configured.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// A compressed batch ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    body: Bytes,
    record_count: usize,
    uncompressed_len: usize,
}

impl EncodedPayload {
    /// Gzip bytes of the JSON array.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Size of the JSON array before compression.
    pub fn uncompressed_len(&self) -> usize {
        self.uncompressed_len
    }
}

/// Turns batches into [`EncodedPayload`]s.
#[derive(Debug, Clone, Copy)]
pub struct PayloadEncoder {
    level: Compression,
}

impl PayloadEncoder {
    /// Creates an encoder for the gzip `level`, capped at 9.
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(Compression::best().level())),
        }
    }

    pub fn level(&self) -> u32 {
        self.level.level()
    }

    /// Encodes `payloads` in iteration order as `[p1,p2,...]`. No payloads yields `[]`.
    pub fn encode<I, P>(&self, payloads: I) -> OutboxResult<EncodedPayload>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut encoder = GzEncoder::new(Vec::new(), self.level);
        let mut record_count = 0;
        let mut uncompressed_len = 0;

        let mut write = |bytes: &[u8]| -> OutboxResult<()> {
            uncompressed_len += bytes.len();
            encoder.write_all(bytes).map_err(|err| {
                outbox_error!(
                    ErrorKind::EncodingError,
                    "Failed to compress outbox batch",
                    err,
                    source: err
                )
            })
        };

        write(b"[")?;
        for payload in payloads {
            if record_count > 0 {
                write(b",")?;
            }
            write(payload.as_ref().as_bytes())?;
            record_count += 1;
        }
        write(b"]")?;

        let body = encoder.finish().map_err(|err| {
            outbox_error!(
                ErrorKind::EncodingError,
                "Failed to finish outbox batch compression",
                err,
                source: err
            )
        })?;

        Ok(EncodedPayload {
            body: Bytes::from(body),
            record_count,
            uncompressed_len,
        })
    }
}

impl Default for PayloadEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

/// Decompresses a body produced by [`PayloadEncoder::encode`] back into its JSON text.
pub fn decode_payload(body: &[u8]) -> OutboxResult<String> {
    let mut decoded = String::new();
    GzDecoder::new(body)
        .read_to_string(&mut decoded)
        .map_err(|err| {
            outbox_error!(
                ErrorKind::EncodingError,
                "Failed to decompress outbox batch",
                err,
                source: err
            )
        })?;

    Ok(decoded)
}
