//! Push-channel envelopes.
//!
//! The push channel carries protobuf-encoded [`PushFrame`]s. A data frame's
//! payload is a gzip-compressed [`Response`], which in turn carries an ordered
//! list of [`WrappedMessage`]s whose payloads are decoded per `method`.
//!
//! Only the fields this crate reads or writes are declared; prost skips the
//! rest of the upstream schema when decoding.

use prost::Message;

/// Wire value of `PushFrame.payload_type` for data frames.
pub const PAYLOAD_TYPE_DATA: &str = "msg";
/// Wire value of `PushFrame.payload_type` for acknowledgements.
pub const PAYLOAD_TYPE_ACK: &str = "ack";
/// Wire value of `PushFrame.payload_type` for heartbeats.
pub const PAYLOAD_TYPE_HEARTBEAT: &str = "hb";

/// Outer envelope of every binary message on the push channel.
///
/// ```text
/// message PushFrame {
///   uint64 seqId = 1;
///   uint64 logId = 2;
///   string payloadType = 7;
///   bytes payload = 8;
/// }
/// ```
#[derive(Clone, PartialEq, Message)]
pub struct PushFrame {
    #[prost(uint64, tag = "1")]
    pub seq_id: u64,
    /// Correlation id echoed back in the acknowledgement.
    #[prost(uint64, tag = "2")]
    pub log_id: u64,
    #[prost(string, tag = "7")]
    pub payload_type: String,
    /// Gzip-compressed [`Response`] for data frames, raw `internal_ext` for acks.
    #[prost(bytes = "vec", tag = "8")]
    pub payload: Vec<u8>,
}

/// Decompressed content of a data frame.
#[derive(Clone, PartialEq, Message)]
pub struct Response {
    #[prost(message, repeated, tag = "1")]
    pub messages_list: Vec<WrappedMessage>,
    #[prost(string, tag = "2")]
    pub cursor: String,
    /// Opaque string the client echoes back in the ack frame.
    #[prost(string, tag = "5")]
    pub internal_ext: String,
    #[prost(bool, tag = "9")]
    pub need_ack: bool,
}

/// A single typed sub-message inside a [`Response`].
#[derive(Clone, PartialEq, Message)]
pub struct WrappedMessage {
    /// Event type name, e.g. `WebcastChatMessage`.
    #[prost(string, tag = "1")]
    pub method: String,
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
    #[prost(int64, tag = "3")]
    pub msg_id: i64,
}

/// Decoded meaning of `PushFrame.payload_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    Data,
    Ack,
    Heartbeat,
}

impl PayloadType {
    /// Maps the wire string; `None` for values this client does not know.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            PAYLOAD_TYPE_DATA => Some(Self::Data),
            PAYLOAD_TYPE_ACK => Some(Self::Ack),
            PAYLOAD_TYPE_HEARTBEAT => Some(Self::Heartbeat),
            _ => None,
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Data => PAYLOAD_TYPE_DATA,
            Self::Ack => PAYLOAD_TYPE_ACK,
            Self::Heartbeat => PAYLOAD_TYPE_HEARTBEAT,
        }
    }
}

impl PushFrame {
    /// Builds the acknowledgement for a data frame that requested one.
    pub fn ack(log_id: u64, internal_ext: &str) -> Self {
        Self {
            seq_id: 0,
            log_id,
            payload_type: PayloadType::Ack.as_wire().to_string(),
            payload: internal_ext.as_bytes().to_vec(),
        }
    }

    pub fn kind(&self) -> Option<PayloadType> {
        PayloadType::from_wire(&self.payload_type)
    }
}
