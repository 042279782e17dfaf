//! Fire-and-forget delivery to the downstream sinks.
//!
//! Each forward runs as a detached task tracked by a [`TaskTracker`]; at most
//! `concurrency` outbound calls are in flight at once, the rest wait for a
//! permit. Failures are logged inside the task and never reach the caller.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::error::LiveError;
use crate::sink::{
    ChatRecord, ConversationRequest, ConversationSink, KvStore, StorageSink, conversation_key,
};

#[derive(Clone)]
pub struct Forwarder {
    conversation: Arc<dyn ConversationSink>,
    storage: Arc<dyn StorageSink>,
    store: Arc<dyn KvStore>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl Forwarder {
    pub fn new(
        conversation: Arc<dyn ConversationSink>,
        storage: Arc<dyn StorageSink>,
        store: Arc<dyn KvStore>,
        concurrency: usize,
    ) -> Self {
        Self {
            conversation,
            storage,
            store,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            tracker: TaskTracker::new(),
        }
    }

    /// Queues `query` for the conversational sink on behalf of `user_id`.
    pub fn conversation(&self, user_id: Option<u64>, query: String) {
        let conversation = self.conversation.clone();
        let store = self.store.clone();
        let permits = self.permits.clone();
        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            if let Err(e) = deliver_conversation(&*conversation, &*store, user_id, query).await {
                error!(?user_id, error = %e, "conversation forward failed");
            }
        });
    }

    /// Queues a chat line for the storage sink.
    pub fn storage(&self, record: ChatRecord) {
        let storage = self.storage.clone();
        let permits = self.permits.clone();
        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let user_id = record.user_id;
            if let Err(e) = storage.store(record).await {
                error!(user_id, error = %e, "storage forward failed");
            }
        });
    }

    /// Waits until every forward queued so far has finished.
    pub async fn idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

async fn deliver_conversation(
    conversation: &dyn ConversationSink,
    store: &dyn KvStore,
    user_id: Option<u64>,
    query: String,
) -> Result<(), LiveError> {
    let key = user_id.map(conversation_key);

    let previous = match &key {
        Some(key) => store.get(key).await.unwrap_or_else(|e| {
            warn!(key = %key, error = %e, "conversation id lookup failed");
            None
        }),
        None => None,
    };

    let returned = conversation
        .send(ConversationRequest {
            user_id,
            query,
            conversation_id: previous.clone(),
        })
        .await?;

    if let (Some(key), Some(new_id)) = (key, returned) {
        if previous.as_deref() != Some(new_id.as_str()) {
            if let Err(e) = store.set(&key, &new_id).await {
                warn!(key = %key, error = %e, "conversation id not persisted");
            } else {
                debug!(key = %key, conversation_id = %new_id, "conversation id updated");
            }
        }
    }
    Ok(())
}
