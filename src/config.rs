use serde::Deserialize;
use std::time::Duration;

use crate::connection::handshake::DEFAULT_USER_AGENT;
use crate::connection::{HEARTBEAT_INTERVAL, ReconnectPolicy, SessionOptions};
use crate::error::LiveError;

/// Environment variable prefix, e.g. `WEBCAST_SIGNER_URL`.
pub const ENV_PREFIX: &str = "WEBCAST_";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub conversation_url: String,
    #[serde(default)]
    pub conversation_api_key: String,
    #[serde(default = "default_conversation_user")]
    pub conversation_user: String,

    pub storage_url: String,
    #[serde(default)]
    pub storage_api_key: String,
    #[serde(default = "default_source_tag")]
    pub storage_source_tag: String,

    /// Without it conversation ids are kept in process memory.
    #[serde(default)]
    pub redis_url: Option<String>,

    pub signer_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_forward_concurrency")]
    pub forward_concurrency: usize,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Delay between reconnect attempts; absent means reconnect immediately.
    #[serde(default)]
    pub reconnect_delay_ms: Option<u64>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_conversation_user() -> String {
    "douyinLive".to_string()
}

fn default_source_tag() -> String {
    "douyin".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_heartbeat_interval_secs() -> u64 {
    HEARTBEAT_INTERVAL.as_secs()
}

fn default_forward_concurrency() -> usize {
    5
}

fn default_event_buffer() -> usize {
    256
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Config {
    /// Load configuration from `WEBCAST_*` environment variables
    pub fn from_env() -> Result<Self, LiveError> {
        Ok(envy::prefixed(ENV_PREFIX).from_env()?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            reconnect: match self.reconnect_delay_ms {
                Some(ms) => ReconnectPolicy::Fixed(Duration::from_millis(ms)),
                None => ReconnectPolicy::Immediate,
            },
        }
    }
}
