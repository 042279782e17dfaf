//! Payload compression for push frames.
//!
//! Data frames from the push channel carry gzip-compressed responses; the
//! identity codec exists so tests and tooling can handle raw payloads the same way.

use std::io::{Read, Write};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};

use crate::protocol::ProtocolError;

/// Compression codec for push frame payloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PayloadCodec {
    /// No compression.
    Identity,
    /// Gzip, as used by the push channel (`compress=gzip`).
    #[default]
    Gzip,
}

impl PayloadCodec {
    /// Compresses a serialized payload.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::Identity => Ok(data.to_vec()),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder
                    .write_all(data)
                    .map_err(ProtocolError::Compression)?;
                encoder.finish().map_err(ProtocolError::Compression)
            }
        }
    }

    /// Inflates a payload received from the wire.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::Identity => Ok(data.to_vec()),
            Self::Gzip => {
                let mut decoder = GzDecoder::new(data);
                let mut output = Vec::new();
                decoder
                    .read_to_end(&mut output)
                    .map_err(ProtocolError::Decompression)?;
                Ok(output)
            }
        }
    }
}
