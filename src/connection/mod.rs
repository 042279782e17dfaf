//! Live session management.
//!
//! A [`Session`] owns one push connection for one live room:
//! - running the handshake through its [`Connector`],
//! - acknowledging and dispatching inbound frames,
//! - sending heartbeats while connected,
//! - reconnecting after transport failures until stopped.
//!
//! All of this happens on a single task, so frame handling, heartbeats and the
//! stop signal never race on the transport.

pub mod bus;
pub mod handshake;
mod manager;

pub use bus::Dispatcher;
pub use handshake::{HttpSigner, Signer, WebcastConnector};
pub use manager::{Registry, SessionFactory, WebcastSessionFactory};

use std::sync::Arc;
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::error::LiveError;
use crate::events::{Flow, LiveEvent, MessageHandler};
use crate::protocol::{FrameCodec, PayloadType};
use crate::transport::{Connector, Transport};

/// Default interval between keep-alive frames.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Handshaking,
    Connected,
    /// `attempts` counts consecutive failed or lost connections.
    Reconnecting {
        attempts: u32,
    },
    Terminated,
}

/// What the session does between a lost connection and the next handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Reconnect right away, without limit.
    #[default]
    Immediate,
    /// Wait a fixed delay before every attempt.
    Fixed(Duration),
}

impl ReconnectPolicy {
    async fn pause(self) {
        match self {
            Self::Immediate => tokio::task::yield_now().await,
            Self::Fixed(delay) => tokio::time::sleep(delay).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Read access to a session's current state.
#[derive(Debug, Clone)]
pub struct StateHandle(Arc<RwLock<SessionState>>);

impl StateHandle {
    fn new() -> Self {
        Self(Arc::new(RwLock::new(SessionState::Disconnected)))
    }

    pub async fn get(&self) -> SessionState {
        self.0.read().await.clone()
    }

    async fn set(&self, state: SessionState) {
        *self.0.write().await = state;
    }
}

/// The controlling side of a [`Session`], kept by whoever spawned it.
pub struct SessionControl {
    shutdown_tx: broadcast::Sender<()>,
    state: StateHandle,
    events: mpsc::Receiver<LiveEvent>,
}

impl SessionControl {
    /// Asks the session to terminate. Observed at the next await point.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    /// Pops the oldest pending event, if any.
    pub fn next_event(&mut self) -> Option<LiveEvent> {
        self.events.try_recv().ok()
    }
}

enum Exit {
    Stopped,
    StreamEnded,
    Lost,
}

pub struct Session {
    live_id: String,
    connector: Box<dyn Connector>,
    dispatcher: Dispatcher,
    options: SessionOptions,
    state: StateHandle,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Session {
    /// Creates a session in the `Disconnected` state together with its control handle.
    ///
    /// `event_buffer` bounds the number of decoded events waiting to be
    /// fetched through [`SessionControl::next_event`].
    pub fn new(
        live_id: impl Into<String>,
        connector: Box<dyn Connector>,
        handler: MessageHandler,
        options: SessionOptions,
        event_buffer: usize,
    ) -> (Self, SessionControl) {
        let live_id = live_id.into();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (events_tx, events_rx) = mpsc::channel(event_buffer.max(1));
        let state = StateHandle::new();

        let session = Self {
            dispatcher: Dispatcher::new(live_id.clone(), handler, events_tx),
            live_id,
            connector,
            options,
            state: state.clone(),
            shutdown_rx,
        };
        let control = SessionControl {
            shutdown_tx,
            state,
            events: events_rx,
        };
        (session, control)
    }

    pub fn live_id(&self) -> &str {
        &self.live_id
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Runs the session until it is stopped or the stream ends.
    ///
    /// A terminated session never runs again; build a new one instead.
    pub async fn run(&mut self) {
        if self.state.get().await == SessionState::Terminated {
            warn!(live_id = %self.live_id, "session already terminated");
            return;
        }

        let mut attempts = 0u32;
        loop {
            self.state.set(SessionState::Handshaking).await;
            debug!(live_id = %self.live_id, attempts, "handshaking");

            let connected = tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => None,
                result = self.connector.connect() => Some(result),
            };

            let exit = match connected {
                None => Exit::Stopped,
                Some(Ok(transport)) => {
                    attempts = 0;
                    self.state.set(SessionState::Connected).await;
                    info!(live_id = %self.live_id, "connected");
                    self.drive(transport).await
                }
                Some(Err(e)) => {
                    warn!(live_id = %self.live_id, error = %e, "handshake failed");
                    Exit::Lost
                }
            };

            match exit {
                Exit::Stopped => {
                    info!(live_id = %self.live_id, "session stopped");
                    break;
                }
                Exit::StreamEnded => {
                    info!(live_id = %self.live_id, "stream ended");
                    break;
                }
                Exit::Lost => {
                    attempts = attempts.saturating_add(1);
                    self.state
                        .set(SessionState::Reconnecting { attempts })
                        .await;
                    warn!(live_id = %self.live_id, attempts, "connection lost, reconnecting");

                    let stopped = tokio::select! {
                        biased;
                        _ = self.shutdown_rx.recv() => true,
                        _ = self.options.reconnect.pause() => false,
                    };
                    if stopped {
                        info!(live_id = %self.live_id, "session stopped");
                        break;
                    }
                }
            }
        }

        self.dispatcher.reset();
        self.state.set(SessionState::Terminated).await;
    }

    /// Serves one open connection until it is lost, stopped or the stream ends.
    async fn drive(&mut self, mut transport: Box<dyn Transport>) -> Exit {
        let period = self.options.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => break Exit::Stopped,
                _ = heartbeat.tick() => {
                    match transport.send_heartbeat().await {
                        Ok(()) => trace!(live_id = %self.live_id, "heartbeat sent"),
                        Err(e) => warn!(live_id = %self.live_id, error = %e, "heartbeat failed"),
                    }
                }
                inbound = transport.recv() => match inbound {
                    Some(Ok(bytes)) => match self.on_frame(transport.as_mut(), &bytes).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::StreamEnded) => break Exit::StreamEnded,
                        Err(e) => {
                            warn!(live_id = %self.live_id, error = %e, "ack failed");
                            break Exit::Lost;
                        }
                    },
                    Some(Err(e)) => {
                        warn!(live_id = %self.live_id, error = %e, "transport error");
                        break Exit::Lost;
                    }
                    None => {
                        warn!(live_id = %self.live_id, "connection closed by server");
                        break Exit::Lost;
                    }
                },
            }
        };

        transport.close().await;
        exit
    }

    /// Handles one inbound frame.
    ///
    /// A failed ack write is a transport failure; it is reported after the
    /// response's messages were dispatched, unless the stream ended.
    async fn on_frame(
        &mut self,
        transport: &mut dyn Transport,
        bytes: &[u8],
    ) -> Result<Flow, LiveError> {
        let frame = match FrameCodec::decode_frame(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(live_id = %self.live_id, error = %e, "discarding frame");
                return Ok(Flow::Continue);
            }
        };
        if frame.kind() != Some(PayloadType::Data) {
            trace!(live_id = %self.live_id, payload_type = %frame.payload_type, "ignoring control frame");
            return Ok(Flow::Continue);
        }

        let response = match FrameCodec::decode_response(&frame.payload) {
            Ok(response) => response,
            Err(e) => {
                warn!(live_id = %self.live_id, log_id = frame.log_id, error = %e, "discarding response");
                return Ok(Flow::Continue);
            }
        };

        let acked = if response.need_ack {
            let ack = FrameCodec::encode_ack(frame.log_id, &response.internal_ext);
            transport.send_binary(ack).await
        } else {
            Ok(())
        };

        match self.dispatcher.dispatch_all(&response.messages_list) {
            Flow::StreamEnded => Ok(Flow::StreamEnded),
            Flow::Continue => acked.map(|()| Flow::Continue),
        }
    }
}
