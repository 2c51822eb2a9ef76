//! In-process fake transport channel for coordinator tests
//!
//! [`FakeChannel`] implements [`EventChannel`] with plain in-memory state.
//! Tests drive it from the outside:
//!
//! - [`FakeChannel::emit`] pushes a decoded event to every subscriber.
//! - [`FakeChannel::emit_raw`] decodes a raw frame first and drops it with a
//!   warning on failure, mirroring the WebSocket channel.
//! - [`FakeChannel::set_state`] publishes a connection transition.
//! - [`FakeChannel::sent`] returns everything the code under test sent.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::error::{ChatSyncError, SyncResult};
use crate::transport::{ChannelEvent, ConnectionState, EventChannel, TransportEvent};

#[derive(Debug)]
pub struct FakeChannel {
    state: Mutex<ConnectionState>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChannelEvent>>>,
    sent: Mutex<Vec<TransportEvent>>,
}

impl Default for FakeChannel {
    fn default() -> Self {
        Self::new(ConnectionState::Connected)
    }
}

impl FakeChannel {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state: Mutex::new(state),
            subscribers: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn emit(&self, event: TransportEvent) {
        self.publish(ChannelEvent::Event(event));
    }

    pub fn emit_raw(&self, raw: &str) {
        match TransportEvent::decode(raw.as_bytes()) {
            Ok(event) => self.emit(event),
            Err(e) => tracing::warn!(error = %e, "fake channel dropping malformed frame"),
        }
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
        self.publish(ChannelEvent::State(state));
    }

    pub fn sent(&self) -> Vec<TransportEvent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    fn publish(&self, event: ChannelEvent) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[async_trait::async_trait]
impl EventChannel for FakeChannel {
    async fn send(&self, event: TransportEvent) -> SyncResult<()> {
        if *self.state.lock().unwrap() != ConnectionState::Connected {
            return Err(ChatSyncError::Transport("not connected".to_string()));
        }
        self.sent.lock().unwrap().push(event);
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }
}
