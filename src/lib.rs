//! Live-room event ingestion over the Douyin web push channel.
//!
//! This crate keeps one push connection per watched live room, decodes the
//! gzip-compressed protobuf frames it receives, and turns them into typed
//! [`LiveEvent`]s that are forwarded to downstream sinks and buffered for
//! polling.
//!
//! # Quick start
//!
//! ```rust
//! use webcast_live::protocol::{FrameCodec, PayloadType};
//!
//! let bytes = FrameCodec::encode_ack(42, "internal-ext");
//! let frame = FrameCodec::decode_frame(&bytes).unwrap();
//! assert_eq!(frame.kind(), Some(PayloadType::Ack));
//! assert_eq!(frame.payload, b"internal-ext");
//! ```
//!
//! For running rooms, build a [`Registry`] around a [`WebcastSessionFactory`]
//! and call [`Registry::start`] per live id.

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod protocol;
pub mod sink;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use connection::{
    Registry, ReconnectPolicy, Session, SessionControl, SessionOptions, SessionState,
    WebcastSessionFactory,
};
pub use error::LiveError;
pub use events::LiveEvent;
pub use protocol::{FrameCodec, ProtocolError};
