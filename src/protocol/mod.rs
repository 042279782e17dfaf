//! Push-channel protocol implementation.
//!
//! This module provides the frame envelopes, typed sub-message payloads, and the
//! codec that turns raw WebSocket binary messages into decoded responses.

mod codec;
mod frame;
pub mod messages;

pub use codec::{FrameCodec, FramingFault, ProtocolError};
pub use frame::{
    PAYLOAD_TYPE_ACK, PAYLOAD_TYPE_DATA, PAYLOAD_TYPE_HEARTBEAT, PayloadType, PushFrame, Response,
    WrappedMessage,
};
