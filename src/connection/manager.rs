//! Registry of running sessions keyed by live id.
//!
//! Every session runs on its own tokio task, so one room's failures (even a
//! panic) never reach another room. The map behind a mutex is the only state
//! shared between control calls; it is never held across a session teardown.

use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::connection::{
    Session, SessionControl, SessionState, Signer, StateHandle, WebcastConnector,
};
use crate::error::LiveError;
use crate::events::{LiveEvent, MessageHandler};
use crate::sink::{ConversationSink, Forwarder, KvStore, StorageSink};

/// Builds a fresh, not yet running session for a live id.
pub trait SessionFactory: Send + Sync {
    fn create(&self, live_id: &str) -> (Session, SessionControl);
}

/// Wires sessions to the real push endpoint and the shared downstream clients.
pub struct WebcastSessionFactory {
    config: Config,
    signer: Arc<dyn Signer>,
    conversation: Arc<dyn ConversationSink>,
    storage: Arc<dyn StorageSink>,
    store: Arc<dyn KvStore>,
}

impl WebcastSessionFactory {
    pub fn new(
        config: Config,
        signer: Arc<dyn Signer>,
        conversation: Arc<dyn ConversationSink>,
        storage: Arc<dyn StorageSink>,
        store: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            config,
            signer,
            conversation,
            storage,
            store,
        }
    }
}

impl SessionFactory for WebcastSessionFactory {
    fn create(&self, live_id: &str) -> (Session, SessionControl) {
        let forwarder = Forwarder::new(
            self.conversation.clone(),
            self.storage.clone(),
            self.store.clone(),
            self.config.forward_concurrency,
        );
        let handler = MessageHandler::new(live_id, &self.config.storage_source_tag, forwarder);
        let connector = WebcastConnector::new(
            live_id,
            &self.config.user_agent,
            self.config.request_timeout(),
            self.signer.clone(),
        );
        Session::new(
            live_id,
            Box::new(connector),
            handler,
            self.config.session_options(),
            self.config.event_buffer,
        )
    }
}

struct Entry {
    control: SessionControl,
    task: JoinHandle<()>,
}

impl Entry {
    /// Stops the session and waits for its teardown to finish.
    async fn shut_down(self, live_id: &str) {
        self.control.stop();
        match self.task.await {
            Ok(()) => {}
            Err(e) if e.is_panic() => error!(live_id, "session task panicked"),
            Err(e) => warn!(live_id, error = %e, "session task cancelled"),
        }
    }

    /// True when the task is gone without the session reaching `Terminated`.
    async fn is_dead(&self) -> bool {
        self.task.is_finished() && self.control.state().get().await != SessionState::Terminated
    }
}

pub struct Registry {
    factory: Box<dyn SessionFactory>,
    sessions: Mutex<HashMap<String, Entry>>,
}

impl Registry {
    pub fn new(factory: impl SessionFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a session for `live_id`, stopping any existing one first.
    pub async fn start(&self, live_id: &str) -> StateHandle {
        let previous = self.sessions.lock().await.remove(live_id);
        if let Some(previous) = previous {
            info!(live_id, "restarting session");
            previous.shut_down(live_id).await;
        }

        let (mut session, control) = self.factory.create(live_id);
        let state = control.state().clone();
        let task = tokio::spawn(async move { session.run().await });
        info!(live_id, "session started");

        let displaced = self
            .sessions
            .lock()
            .await
            .insert(live_id.to_string(), Entry { control, task });
        if let Some(displaced) = displaced {
            displaced.shut_down(live_id).await;
        }
        state
    }

    /// Stops the session for `live_id` and waits for its teardown.
    pub async fn stop(&self, live_id: &str) -> Result<(), LiveError> {
        let entry = self
            .sessions
            .lock()
            .await
            .remove(live_id)
            .ok_or_else(|| LiveError::NotFound(live_id.to_string()))?;
        entry.shut_down(live_id).await;
        info!(live_id, "session stopped");
        Ok(())
    }

    /// Current state of the session, or `None` when there is none.
    ///
    /// A session whose task died without terminating is dropped from the
    /// registry and reported as absent.
    pub async fn status(&self, live_id: &str) -> Option<SessionState> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get(live_id)?;
        if entry.is_dead().await {
            error!(live_id, "session task died, removing");
            if let Some(dead) = sessions.remove(live_id) {
                if let Err(e) = dead.task.await {
                    warn!(live_id, error = %e, "session task failed");
                }
            }
            return None;
        }
        Some(entry.control.state().get().await)
    }

    /// Pops the oldest pending event of the session for `live_id`.
    pub async fn query(&self, live_id: &str) -> Result<Option<LiveEvent>, LiveError> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(live_id)
            .ok_or_else(|| LiveError::NotFound(live_id.to_string()))?;
        Ok(entry.control.next_event())
    }

    pub async fn live_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.sessions.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stops every session.
    pub async fn shutdown(&self) {
        let entries: Vec<_> = self.sessions.lock().await.drain().collect();
        info!(sessions = entries.len(), "shutting down registry");
        join_all(
            entries
                .into_iter()
                .map(|(live_id, entry)| async move { entry.shut_down(&live_id).await }),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SessionOptions;
    use crate::testing::{MockConnector, chat_message, mock_pair, recording_forwarder};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Hands out queued connectors, then ones that hang in the handshake.
    #[derive(Default)]
    struct TestFactory {
        connectors: std::sync::Mutex<VecDeque<MockConnector>>,
        created: Arc<AtomicUsize>,
    }

    impl TestFactory {
        fn with(connectors: Vec<MockConnector>) -> Self {
            Self {
                connectors: std::sync::Mutex::new(connectors.into()),
                ..Self::default()
            }
        }
    }

    impl SessionFactory for TestFactory {
        fn create(&self, live_id: &str) -> (Session, SessionControl) {
            self.created.fetch_add(1, Ordering::SeqCst);
            let connector = self
                .connectors
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default();
            let (forwarder, _, _) = recording_forwarder();
            let handler = MessageHandler::new(live_id, "douyin", forwarder);
            Session::new(
                live_id,
                Box::new(connector),
                handler,
                SessionOptions::default(),
                8,
            )
        }
    }

    async fn wait_for(registry: &Registry, live_id: &str, expected: SessionState) {
        for _ in 0..400 {
            if registry.status(live_id).await == Some(expected.clone()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{live_id} never reached {expected:?}");
    }

    #[tokio::test]
    async fn test_start_twice_restarts_session() {
        let factory = TestFactory::default();
        let created = factory.created.clone();
        let registry = Registry::new(factory);

        let first = registry.start("123").await;
        wait_for(&registry, "123", SessionState::Handshaking).await;
        let second = registry.start("123").await;

        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(first.get().await, SessionState::Terminated);
        assert_ne!(second.get().await, SessionState::Terminated);
        assert_eq!(registry.live_ids().await, vec!["123".to_string()]);

        registry.shutdown().await;
        assert_eq!(second.get().await, SessionState::Terminated);
        assert!(registry.live_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_unknown_session_is_not_found() {
        let registry = Registry::new(TestFactory::default());
        assert!(matches!(
            registry.stop("999").await,
            Err(LiveError::NotFound(id)) if id == "999"
        ));
        assert!(matches!(
            registry.query("999").await,
            Err(LiveError::NotFound(_))
        ));
        assert_eq!(registry.status("999").await, None);
    }

    #[tokio::test]
    async fn test_stop_waits_for_teardown() {
        let registry = Registry::new(TestFactory::default());
        let state = registry.start("1").await;
        wait_for(&registry, "1", SessionState::Handshaking).await;

        registry.stop("1").await.unwrap();
        assert_eq!(state.get().await, SessionState::Terminated);
        assert_eq!(registry.status("1").await, None);
        assert!(registry.stop("1").await.is_err());
    }

    #[tokio::test]
    async fn test_query_pops_pending_events() {
        let (transport, remote) = mock_pair();
        let registry = Registry::new(TestFactory::with(vec![
            MockConnector::new().then_transport(transport),
        ]));
        registry.start("7").await;
        remote.push_messages(vec![chat_message(1, "one"), chat_message(2, "two")]);

        let mut contents = Vec::new();
        for _ in 0..400 {
            if let Some(LiveEvent::Chat { content, .. }) = registry.query("7").await.unwrap() {
                contents.push(content);
            }
            if contents.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(contents, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(registry.query("7").await.unwrap(), None);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_session_is_isolated() {
        let registry = Registry::new(TestFactory::with(vec![
            MockConnector::panicking(),
            MockConnector::new(),
        ]));
        registry.start("bad").await;
        registry.start("good").await;

        for _ in 0..400 {
            if registry.status("bad").await.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(registry.status("bad").await, None);
        assert_eq!(registry.live_ids().await, vec!["good".to_string()]);
        wait_for(&registry, "good", SessionState::Handshaking).await;

        registry.shutdown().await;
    }
}
