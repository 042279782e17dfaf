use thiserror::Error;

/// Errors that can occur while running live sessions.
#[derive(Error, Debug)]
pub enum LiveError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] crate::protocol::ProtocolError),

    #[error("Room resolution failed: {0}")]
    RoomResolution(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("No session for live id {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(#[from] envy::Error),
}
