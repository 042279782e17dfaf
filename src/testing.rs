//! In-memory doubles for transports and downstream collaborators.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use prost::Message;

use crate::error::LiveError;
use crate::protocol::messages::{ChatMessage, ControlMessage, LikeMessage, User};
use crate::protocol::{FrameCodec, Response, WrappedMessage};
use crate::sink::{
    ChatRecord, ConversationRequest, ConversationSink, Forwarder, KvStore, MemoryStore, StorageSink,
};
use crate::transport::{Connector, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Binary(Vec<u8>),
    Heartbeat,
    Close,
}

pub struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Result<Vec<u8>, LiveError>>,
    sent: Arc<Mutex<Vec<Sent>>>,
    broken_writes: bool,
}

impl MockTransport {
    /// Every binary write fails as if the socket were gone.
    pub fn with_broken_writes(mut self) -> Self {
        self.broken_writes = true;
        self
    }
}

/// The server side of a [`MockTransport`].
#[derive(Clone)]
pub struct MockRemote {
    tx: mpsc::UnboundedSender<Result<Vec<u8>, LiveError>>,
    sent: Arc<Mutex<Vec<Sent>>>,
}

pub fn mock_pair() -> (MockTransport, MockRemote) {
    let (tx, inbound) = mpsc::unbounded_channel();
    let sent = Arc::new(Mutex::new(Vec::new()));
    (
        MockTransport {
            inbound,
            sent: sent.clone(),
            broken_writes: false,
        },
        MockRemote { tx, sent },
    )
}

impl MockRemote {
    pub fn push_raw(&self, bytes: Vec<u8>) {
        let _ = self.tx.send(Ok(bytes));
    }

    pub fn push(&self, log_id: u64, response: &Response) {
        self.push_raw(FrameCodec::encode_response(log_id, response).unwrap());
    }

    pub fn push_messages(&self, messages: Vec<WrappedMessage>) {
        self.push(
            0,
            &Response {
                messages_list: messages,
                ..Default::default()
            },
        );
    }

    pub fn fail(&self, reason: &str) {
        let _ = self.tx.send(Err(LiveError::Transport(reason.to_string())));
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn binaries(&self) -> Vec<Vec<u8>> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Binary(data) => Some(data),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), LiveError> {
        if self.broken_writes {
            return Err(LiveError::Transport("broken pipe".into()));
        }
        self.sent.lock().unwrap().push(Sent::Binary(data));
        Ok(())
    }

    async fn send_heartbeat(&mut self) -> Result<(), LiveError> {
        self.sent.lock().unwrap().push(Sent::Heartbeat);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Vec<u8>, LiveError>> {
        self.inbound.recv().await
    }

    async fn close(&mut self) {
        self.sent.lock().unwrap().push(Sent::Close);
    }
}

/// Hands out queued transports; once the queue is empty, `connect` hangs.
#[derive(Default)]
pub struct MockConnector {
    queue: Mutex<VecDeque<Result<MockTransport, LiveError>>>,
    connects: AtomicUsize,
    panic_on_connect: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn panicking() -> Self {
        Self {
            panic_on_connect: true,
            ..Self::default()
        }
    }

    pub fn then_transport(self, transport: MockTransport) -> Self {
        self.queue.lock().unwrap().push_back(Ok(transport));
        self
    }

    pub fn then_error(self, error: LiveError) -> Self {
        self.queue.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, LiveError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_connect {
            panic!("connector exploded");
        }
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(Ok(transport)) => Ok(Box::new(transport)),
            Some(Err(e)) => Err(e),
            None => std::future::pending().await,
        }
    }
}

#[async_trait]
impl<T: Connector + ?Sized> Connector for Arc<T> {
    async fn connect(&self) -> Result<Box<dyn Transport>, LiveError> {
        (**self).connect().await
    }
}

pub struct RecordingConversation {
    answer: Option<String>,
    fail: bool,
    requests: Mutex<Vec<ConversationRequest>>,
}

impl RecordingConversation {
    pub fn answering(answer: Option<&str>) -> Self {
        Self {
            answer: answer.map(str::to_string),
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::answering(None)
        }
    }

    pub fn requests(&self) -> Vec<ConversationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationSink for RecordingConversation {
    async fn send(&self, request: ConversationRequest) -> Result<Option<String>, LiveError> {
        self.requests.lock().unwrap().push(request);
        if self.fail {
            return Err(LiveError::Sink("conversation endpoint down".into()));
        }
        Ok(self.answer.clone())
    }
}

#[derive(Default)]
pub struct RecordingStorage {
    fail: bool,
    records: Mutex<Vec<ChatRecord>>,
}

impl RecordingStorage {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<ChatRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageSink for RecordingStorage {
    async fn store(&self, record: ChatRecord) -> Result<(), LiveError> {
        self.records.lock().unwrap().push(record);
        if self.fail {
            return Err(LiveError::Sink("storage endpoint down".into()));
        }
        Ok(())
    }
}

pub struct FailingStore;

#[async_trait]
impl KvStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, LiveError> {
        Err(LiveError::Store(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "store offline",
        ))))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), LiveError> {
        Err(LiveError::Store(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "store offline",
        ))))
    }
}

/// [`MemoryStore`] that counts writes.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    sets: AtomicUsize,
}

impl CountingStore {
    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KvStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, LiveError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), LiveError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value).await
    }
}

pub fn recording_forwarder() -> (
    Forwarder,
    Arc<RecordingConversation>,
    Arc<RecordingStorage>,
) {
    let conversation = Arc::new(RecordingConversation::answering(None));
    let storage = Arc::new(RecordingStorage::default());
    let forwarder = Forwarder::new(
        conversation.clone(),
        storage.clone(),
        Arc::new(MemoryStore::new()),
        4,
    );
    (forwarder, conversation, storage)
}

fn user(id: u64) -> Option<User> {
    Some(User {
        id,
        nick_name: format!("user{id}"),
        gender: 1,
    })
}

pub fn chat_message(user_id: u64, content: &str) -> WrappedMessage {
    WrappedMessage {
        method: "WebcastChatMessage".into(),
        payload: ChatMessage {
            common: None,
            user: user(user_id),
            content: content.into(),
        }
        .encode_to_vec(),
        msg_id: 0,
    }
}

pub fn like_message(user_id: u64, count: u64) -> WrappedMessage {
    WrappedMessage {
        method: "WebcastLikeMessage".into(),
        payload: LikeMessage {
            common: None,
            count,
            total: count,
            user: user(user_id),
        }
        .encode_to_vec(),
        msg_id: 0,
    }
}

pub fn control_message(status: i32) -> WrappedMessage {
    WrappedMessage {
        method: "WebcastControlMessage".into(),
        payload: ControlMessage {
            common: None,
            status,
        }
        .encode_to_vec(),
        msg_id: 0,
    }
}
