//! Protobuf codec for push-channel frames.
//!
//! Provides decoding of inbound [`PushFrame`]s and their gzip-compressed
//! [`Response`] payloads, and encoding of the acknowledgement frames the
//! client sends back.

use prost::Message;

use crate::protocol::{PayloadType, PushFrame, Response};
use crate::transport::PayloadCodec;

/// Why bytes are not a usable push frame envelope.
#[derive(thiserror::Error, Debug)]
pub enum FramingFault {
    /// Truncated bytes or not a protobuf message at all.
    #[error("{0}")]
    Malformed(#[source] prost::DecodeError),

    /// The envelope decoded but names a payload type this client does not know.
    #[error("unknown payload type {0:?}")]
    UnknownPayloadType(String),
}

/// Errors that can occur while encoding or decoding push-channel data.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    /// The bytes are not a valid push frame envelope.
    #[error("malformed push frame: {0}")]
    Framing(#[from] FramingFault),

    /// Gzip deflate of an outbound payload failed.
    #[error("payload compression failed: {0}")]
    Compression(#[source] std::io::Error),

    /// Gzip inflate of a data payload failed.
    #[error("payload decompression failed: {0}")]
    Decompression(#[source] std::io::Error),

    /// The inflated payload is not a valid response.
    #[error("malformed response: {0}")]
    Decode(#[source] prost::DecodeError),

    /// A typed sub-message payload could not be decoded.
    #[error("malformed {method} payload: {source}")]
    PayloadDecode {
        method: String,
        #[source]
        source: prost::DecodeError,
    },
}

/// Codec for the push-channel protocol.
///
/// Stateless; all methods are associated functions.
pub struct FrameCodec;

impl FrameCodec {
    /// Decodes the outer envelope of an inbound binary message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Framing`] when the bytes are truncated, do not
    /// form a protobuf message, or name an unrecognized payload type (including
    /// an empty frame).
    pub fn decode_frame(bytes: &[u8]) -> Result<PushFrame, ProtocolError> {
        let frame = PushFrame::decode(bytes).map_err(FramingFault::Malformed)?;
        if frame.kind().is_none() {
            return Err(FramingFault::UnknownPayloadType(frame.payload_type).into());
        }
        Ok(frame)
    }

    /// Inflates and decodes the payload of a data frame.
    pub fn decode_response(payload: &[u8]) -> Result<Response, ProtocolError> {
        let raw = PayloadCodec::Gzip.decode(payload)?;
        Response::decode(raw.as_slice()).map_err(ProtocolError::Decode)
    }

    /// Serializes the acknowledgement for frame `log_id`.
    pub fn encode_ack(log_id: u64, internal_ext: &str) -> Vec<u8> {
        PushFrame::ack(log_id, internal_ext).encode_to_vec()
    }

    /// Serializes any frame to its wire form.
    pub fn encode_frame(frame: &PushFrame) -> Vec<u8> {
        frame.encode_to_vec()
    }

    /// Compresses a response and wraps it in a data frame.
    pub fn encode_response(log_id: u64, response: &Response) -> Result<Vec<u8>, ProtocolError> {
        let payload = PayloadCodec::Gzip.encode(&response.encode_to_vec())?;
        let frame = PushFrame {
            seq_id: 0,
            log_id,
            payload_type: PayloadType::Data.as_wire().to_string(),
            payload,
        };
        Ok(Self::encode_frame(&frame))
    }
}
