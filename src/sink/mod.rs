//! Downstream collaborators: the conversational sink, the storage sink and the
//! key-value store that remembers per-user conversation ids.
//!
//! Everything here is consumed through traits so sessions can be wired to real
//! HTTP/Redis clients in production and to in-memory doubles in tests.

mod clients;
mod forwarder;
mod store;

pub use clients::{ConversationClient, StorageClient};
pub use forwarder::Forwarder;
pub use store::{MemoryStore, RedisStore};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::LiveError;

/// Key prefix under which conversation ids are stored.
pub const CONVERSATION_KEY_PREFIX: &str = "conversation:";

pub fn conversation_key(user_id: u64) -> String {
    format!("{CONVERSATION_KEY_PREFIX}{user_id}")
}

/// One forwarded event for the conversational endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRequest {
    pub user_id: Option<u64>,
    pub query: String,
    pub conversation_id: Option<String>,
}

/// One chat line for the storage endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRecord {
    pub live_id: String,
    pub user_id: u64,
    pub user_name: String,
    pub msg: String,
    #[serde(rename = "type")]
    pub source: String,
}

#[async_trait]
pub trait ConversationSink: Send + Sync {
    /// Sends the query; returns the conversation id the endpoint answered with, if any.
    async fn send(&self, request: ConversationRequest) -> Result<Option<String>, LiveError>;
}

#[async_trait]
pub trait StorageSink: Send + Sync {
    async fn store(&self, record: ChatRecord) -> Result<(), LiveError>;
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, LiveError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), LiveError>;
}
