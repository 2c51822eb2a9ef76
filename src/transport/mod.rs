//! Transport channel abstraction
//!
//! This module defines the [`EventChannel`] trait that the sync coordinator
//! consumes. Concrete implementations live in submodules:
//!
//! - [`websocket::WebSocketChannel`] -- reconnecting WebSocket client built
//!   on `tokio-tungstenite`.
//! - [`fake::FakeChannel`] -- in-process fake used in tests (cfg(test)
//!   only).
//!
//! # Design
//!
//! A channel delivers two kinds of notification to each subscriber, in one
//! ordered stream: decoded [`TransportEvent`]s and [`ConnectionState`]
//! transitions. Keeping them in one stream lets a consumer see exactly where
//! a disconnect happened relative to the events around it.
//!
//! Delivery is best-effort while connected. The channel never replays
//! events missed during a disconnect and never queues sends: `send` fails
//! with [`crate::error::ChatSyncError::Transport`] while disconnected.

use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;

use crate::error::SyncResult;

pub mod event;
pub mod websocket;

#[cfg(test)]
pub mod fake;

pub use event::TransportEvent;
pub use websocket::WebSocketChannel;

/// Connection state of a transport channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// First connection attempt in progress
    Connecting,
    /// Handshake completed; events flow
    Connected,
    /// Connection closed; the channel may be retrying in the background
    Disconnected,
    /// A connection attempt failed; the channel keeps retrying
    Error,
}

/// One item of a subscriber's stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The connection state changed
    State(ConnectionState),
    /// A decoded inbound event
    Event(TransportEvent),
}

/// A reconnecting duplex event channel.
#[async_trait::async_trait]
pub trait EventChannel: Send + Sync + std::fmt::Debug {
    /// Send an event to the server.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ChatSyncError::Transport`] when the channel is
    /// not connected. The event is dropped, not queued.
    async fn send(&self, event: TransportEvent) -> SyncResult<()>;

    /// Start a new subscription.
    ///
    /// The receiver is unbounded and yields every event and state transition
    /// from the moment of subscription. Dropping it unsubscribes.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ChannelEvent>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;
}

/// Exponential reconnect backoff with a cap and jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before the first retry
    pub initial: Duration,
    /// Upper bound for any delay
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    /// Undithered delay for a retry attempt: `min(max, initial * 2^attempt)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use chatsync::transport::Backoff;
    ///
    /// let backoff = Backoff {
    ///     initial: Duration::from_millis(100),
    ///     max: Duration::from_millis(1000),
    /// };
    /// assert_eq!(backoff.ceiling(0), Duration::from_millis(100));
    /// assert_eq!(backoff.ceiling(3), Duration::from_millis(800));
    /// assert_eq!(backoff.ceiling(10), Duration::from_millis(1000));
    /// ```
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(20));
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Jittered delay for a retry attempt, uniformly drawn from
    /// `[ceiling / 2, ceiling]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        let millis = ceiling.as_millis() as u64;
        if millis < 2 {
            return ceiling;
        }
        Duration::from_millis(rand::rng().random_range(millis / 2..=millis))
    }
}
