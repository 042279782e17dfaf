//! Transport abstraction for the push channel.
//!
//! A [`Transport`] is one open bidirectional connection carrying binary frames.
//! [`Connector`] performs everything needed to open one (cookie, room id,
//! signing, upgrade); the session drives both through these traits so the
//! reconnect loop can be exercised without a network.

mod payload_codec;
mod websocket;

pub use payload_codec::PayloadCodec;
pub use websocket::WsTransport;

use async_trait::async_trait;

use crate::error::LiveError;

#[async_trait]
pub trait Transport: Send {
    /// Sends one binary frame.
    async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), LiveError>;

    /// Sends the keep-alive control frame.
    async fn send_heartbeat(&mut self) -> Result<(), LiveError>;

    /// Waits for the next binary frame.
    ///
    /// Returns `None` once the remote side has closed the connection. Must be
    /// cancel-safe: the session polls it inside `tokio::select!`.
    async fn recv(&mut self) -> Option<Result<Vec<u8>, LiveError>>;

    /// Closes the connection; errors are not interesting at this point.
    async fn close(&mut self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Runs one full handshake and returns the open transport.
    async fn connect(&self) -> Result<Box<dyn Transport>, LiveError>;
}
