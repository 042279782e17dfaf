//! WebSocket transport over `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use http::header::{COOKIE, USER_AGENT};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, client::IntoClientRequest},
};
use tracing::debug;
use url::Url;

use crate::error::LiveError;
use crate::transport::Transport;

/// Payload of the keep-alive ping.
const HEARTBEAT_PAYLOAD: &[u8] = b"heartbeat";

/// An open push-channel WebSocket.
pub struct WsTransport {
    ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl WsTransport {
    /// Performs the WebSocket upgrade with the session cookie and user agent.
    pub async fn open(url: &Url, cookie: &str, user_agent: &str) -> Result<Self, LiveError> {
        let mut request = url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(cookie).map_err(http::Error::from)?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).map_err(http::Error::from)?,
        );

        let (ws_stream, response) = connect_async(request).await?;
        debug!(status = %response.status(), "push channel upgraded");
        Ok(Self { ws_stream })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), LiveError> {
        self.ws_stream.send(Message::Binary(data)).await?;
        Ok(())
    }

    async fn send_heartbeat(&mut self) -> Result<(), LiveError> {
        self.ws_stream
            .send(Message::Ping(HEARTBEAT_PAYLOAD.to_vec()))
            .await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Vec<u8>, LiveError>> {
        loop {
            match self.ws_stream.next().await? {
                Ok(Message::Binary(data)) => return Some(Ok(data)),
                // Pongs for our heartbeat; tungstenite answers server pings itself.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Ok(Message::Text(text)) => {
                    debug!("ignoring text frame: {}", text);
                    continue;
                }
                Ok(Message::Frame(_)) => continue,
                Ok(Message::Close(close_frame)) => {
                    let reason = close_frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_default();
                    debug!("push channel closed by server: {}", reason);
                    return None;
                }
                Err(e) => return Some(Err(LiveError::WebSocket(e))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws_stream.close(None).await {
            debug!("close handshake failed: {}", e);
        }
    }
}
