//! Message dispatch for one session.
//!
//! This module routes every [`WrappedMessage`] of a response to the event layer:
//! - resolving `method` against the fixed [`Method`] table,
//! - decoding the typed payload,
//! - publishing the event to the session's pending-event buffer,
//! - running the forwarding rules of [`MessageHandler`].
//!
//! Unknown methods and malformed payloads are logged and skipped; they never
//! stop the remaining messages from being dispatched.

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::events::{Flow, LiveEvent, MessageHandler, Method};
use crate::protocol::WrappedMessage;

pub struct Dispatcher {
    live_id: String,
    handler: MessageHandler,
    events: mpsc::Sender<LiveEvent>,
}

impl Dispatcher {
    pub fn new(
        live_id: impl Into<String>,
        handler: MessageHandler,
        events: mpsc::Sender<LiveEvent>,
    ) -> Self {
        Self {
            live_id: live_id.into(),
            handler,
            events,
        }
    }

    pub fn handler(&self) -> &MessageHandler {
        &self.handler
    }

    /// Dispatches one message.
    pub fn dispatch(&mut self, message: &WrappedMessage) -> Flow {
        let Some(method) = Method::from_name(&message.method) else {
            trace!(live_id = %self.live_id, method = %message.method, "unhandled method");
            return Flow::Continue;
        };

        let event = match LiveEvent::decode(method, &message.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(live_id = %self.live_id, method = method.name(), error = %e, "dropping message");
                return Flow::Continue;
            }
        };

        let flow = self.handler.handle(&event);
        self.publish(event);
        flow
    }

    /// Dispatches a response's messages in order.
    ///
    /// Every message is dispatched even after one of them ended the stream.
    pub fn dispatch_all(&mut self, messages: &[WrappedMessage]) -> Flow {
        messages.iter().fold(Flow::Continue, |flow, message| {
            match self.dispatch(message) {
                Flow::StreamEnded => Flow::StreamEnded,
                Flow::Continue => flow,
            }
        })
    }

    /// Clears per-room state at teardown.
    pub fn reset(&mut self) {
        self.handler.reset();
    }

    fn publish(&self, event: LiveEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.events.try_send(event) {
            debug!(live_id = %self.live_id, method = event.method().name(), "event buffer full, dropping event");
        }
    }
}
