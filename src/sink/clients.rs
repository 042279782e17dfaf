//! HTTP clients for the two downstream endpoints.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::error::LiveError;
use crate::sink::{ChatRecord, ConversationRequest, ConversationSink, StorageSink};

#[derive(Deserialize, Debug)]
struct ChatMessagesResponse {
    conversation_id: Option<String>,
}

/// Client for a chat-messages style conversational API.
///
/// Posts `{"inputs", "query", "response_mode", "conversation_id", "user"}` in
/// blocking mode and reads the conversation id from the answer.
#[derive(Clone)]
pub struct ConversationClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    user: String,
}

impl ConversationClient {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        user: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LiveError> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.into(),
            api_key: api_key.into(),
            user: user.into(),
        })
    }
}

#[async_trait]
impl ConversationSink for ConversationClient {
    async fn send(&self, request: ConversationRequest) -> Result<Option<String>, LiveError> {
        let body = json!({
            "inputs": {},
            "query": request.query,
            "response_mode": "blocking",
            "conversation_id": request.conversation_id,
            "user": self.user,
        });

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!("Conversation endpoint answered: {}", response.text().await?);
            return Err(LiveError::Sink(format!("conversation endpoint returned {status}")));
        }

        let raw: ChatMessagesResponse = response.json().await?;
        Ok(raw.conversation_id.filter(|id| !id.is_empty()))
    }
}

/// Client for the structured-storage endpoint (`/api/live_msg:create`).
#[derive(Clone)]
pub struct StorageClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl StorageClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LiveError> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            url: format!("{}/api/live_msg:create", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl StorageSink for StorageClient {
    async fn store(&self, record: ChatRecord) -> Result<(), LiveError> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&record)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(LiveError::Sink(format!("storage endpoint returned {status}")))
        }
    }
}
