//! Reconnecting WebSocket transport
//!
//! [`WebSocketChannel`] owns a background Tokio task that keeps one
//! WebSocket connection alive:
//!
//! - Every handshake carries `Authorization: Bearer <token>` when the token
//!   store has a token, so a token refreshed by the caller is used on the
//!   next reconnect.
//! - On an unexpected close or a failed attempt the task waits for a
//!   jittered exponential [`Backoff`] delay and retries until
//!   [`WebSocketChannel::close`] is called.
//! - Subscribers see each distinct [`ConnectionState`] once; repeated
//!   failures while already in `Error` are only logged.
//! - Text and binary frames are decoded as [`TransportEvent`] envelopes.
//!   Frames that fail to decode are logged and dropped; the connection and
//!   later frames are unaffected.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::TokenStore;
use crate::error::{ChatSyncError, SyncResult};
use crate::transport::{Backoff, ChannelEvent, ConnectionState, EventChannel, TransportEvent};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// WebSocket implementation of [`EventChannel`].
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use chatsync::auth::MemoryTokenStore;
/// use chatsync::transport::{Backoff, EventChannel, WebSocketChannel};
///
/// # #[tokio::main]
/// # async fn main() {
/// let tokens = Arc::new(MemoryTokenStore::with_token("secret"));
/// let channel = WebSocketChannel::connect(
///     url::Url::parse("wss://example.com/ws").unwrap(),
///     tokens,
///     Backoff::default(),
/// );
/// let mut events = channel.subscribe();
/// while let Some(event) = events.recv().await {
///     println!("{:?}", event);
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct WebSocketChannel {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug)]
struct Shared {
    /// Writer for the live connection; `None` while disconnected.
    outbound: Mutex<Option<mpsc::UnboundedSender<tungstenite::Message>>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChannelEvent>>>,
    state: Mutex<ConnectionState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn new() -> Self {
        Self {
            outbound: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            state: Mutex::new(ConnectionState::Disconnected),
        }
    }

    fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    fn set_state(&self, next: ConnectionState) {
        {
            let mut state = lock(&self.state);
            if *state == next {
                return;
            }
            tracing::debug!(from = ?*state, to = ?next, "transport state change");
            *state = next;
        }
        self.publish(ChannelEvent::State(next));
    }

    fn publish(&self, event: ChannelEvent) {
        lock(&self.subscribers).retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn deliver(&self, raw: &[u8]) {
        match TransportEvent::decode(raw) {
            Ok(event) => {
                tracing::trace!(kind = %event.kind(), "inbound event");
                self.publish(ChannelEvent::Event(event));
            }
            Err(e) => {
                tracing::warn!(error = %e, bytes = raw.len(), "dropping malformed frame");
            }
        }
    }
}

impl WebSocketChannel {
    /// Start connecting to `endpoint` in the background.
    ///
    /// Returns immediately; watch [`EventChannel::subscribe`] for the
    /// `Connected` transition. Must be called from within a Tokio runtime.
    pub fn connect(endpoint: Url, tokens: Arc<dyn TokenStore>, backoff: Backoff) -> Self {
        let shared = Arc::new(Shared::new());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_connection(
            endpoint,
            tokens,
            backoff,
            Arc::clone(&shared),
            cancel.clone(),
        ));
        Self {
            shared,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Stop reconnecting, close the connection, and wait for the background
    /// task to finish. Subscribers observe a final `Disconnected`.
    pub async fn close(&self) {
        self.cancel.cancel();
        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "transport task ended abnormally");
            }
        }
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait::async_trait]
impl EventChannel for WebSocketChannel {
    async fn send(&self, event: TransportEvent) -> SyncResult<()> {
        let text = event.encode()?;
        let outbound = lock(&self.shared.outbound);
        match outbound.as_ref() {
            Some(tx) => tx
                .send(tungstenite::Message::Text(text))
                .map_err(|_| ChatSyncError::Transport("connection closed".to_string())),
            None => Err(ChatSyncError::Transport("not connected".to_string())),
        }
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.shared.subscribers).push(tx);
        rx
    }

    fn state(&self) -> ConnectionState {
        self.shared.state()
    }
}

fn build_request(endpoint: &Url, tokens: &dyn TokenStore) -> SyncResult<Request> {
    let mut request = endpoint
        .as_str()
        .into_client_request()
        .map_err(|e| ChatSyncError::Config(format!("invalid transport endpoint: {}", e)))?;
    if let Some(token) = tokens.get_token() {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| ChatSyncError::Config(format!("invalid auth token: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}

async fn run_connection(
    endpoint: Url,
    tokens: Arc<dyn TokenStore>,
    backoff: Backoff,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    shared.set_state(ConnectionState::Connecting);

    loop {
        let request = match build_request(&endpoint, tokens.as_ref()) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(endpoint = %endpoint, error = %e, "cannot build handshake; giving up");
                shared.set_state(ConnectionState::Error);
                return;
            }
        };

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = tokio_tungstenite::connect_async(request) => result,
        };

        match connected {
            Ok((stream, _response)) => {
                attempt = 0;
                tracing::info!(endpoint = %endpoint, "transport connected");
                let (out_tx, out_rx) = mpsc::unbounded_channel();
                *lock(&shared.outbound) = Some(out_tx);
                shared.set_state(ConnectionState::Connected);

                run_session(stream, out_rx, &shared, &cancel).await;

                lock(&shared.outbound).take();
                shared.set_state(ConnectionState::Disconnected);
                if cancel.is_cancelled() {
                    break;
                }
                tracing::warn!(endpoint = %endpoint, "transport disconnected; reconnecting");
            }
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, attempt, error = %e, "transport connect failed");
                shared.set_state(ConnectionState::Error);
            }
        }

        let delay = backoff.delay(attempt);
        attempt = attempt.saturating_add(1);
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "transport retry scheduled");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    lock(&shared.outbound).take();
    shared.set_state(ConnectionState::Disconnected);
}

async fn run_session(
    stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<tungstenite::Message>,
    shared: &Shared,
    cancel: &CancellationToken,
) {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                let _ = write.send(tungstenite::Message::Close(None)).await;
                break;
            }

            Some(frame) = outbound.recv() => {
                if let Err(e) = write.send(frame).await {
                    tracing::warn!(error = %e, "transport write failed");
                    break;
                }
            }

            incoming = read.next() => match incoming {
                Some(Ok(tungstenite::Message::Text(text))) => shared.deliver(text.as_bytes()),
                Some(Ok(tungstenite::Message::Binary(data))) => shared.deliver(&data),
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    tracing::debug!(?frame, "server closed transport");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "transport read failed");
                    break;
                }
                None => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;

    #[test]
    fn test_build_request_adds_bearer_header() {
        let tokens = MemoryTokenStore::with_token("abc123");
        let request = build_request(&Url::parse("ws://localhost:9/ws").unwrap(), &tokens)
            .expect("request");
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer abc123"
        );
    }

    #[test]
    fn test_build_request_without_token_has_no_header() {
        let tokens = MemoryTokenStore::default();
        let request = build_request(&Url::parse("ws://localhost:9/ws").unwrap(), &tokens)
            .expect("request");
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_shared_state_dedupes_transitions() {
        let shared = Shared::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        lock(&shared.subscribers).push(tx);

        shared.set_state(ConnectionState::Error);
        shared.set_state(ConnectionState::Error);
        shared.set_state(ConnectionState::Connected);

        assert_eq!(
            rx.try_recv().unwrap(),
            ChannelEvent::State(ConnectionState::Error)
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ChannelEvent::State(ConnectionState::Connected)
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_malformed_frame_dropped_and_next_delivered() {
        let shared = Shared::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        lock(&shared.subscribers).push(tx);

        shared.deliver(b"{broken");
        shared.deliver(br#"{"type":"read","payload":{"conversationId":"c1","messageId":"m1"}}"#);

        match rx.try_recv().unwrap() {
            ChannelEvent::Event(TransportEvent::Read { message_id, .. }) => {
                assert_eq!(message_id, "m1")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let shared = Shared::new();
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&shared.subscribers).push(tx);
        drop(rx);
        shared.set_state(ConnectionState::Connected);
        assert!(lock(&shared.subscribers).is_empty());
    }

    #[tokio::test]
    async fn test_send_while_disconnected_fails() {
        let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::default());
        // Port 9 (discard) is expected to refuse connections.
        let channel = WebSocketChannel::connect(
            Url::parse("ws://127.0.0.1:9/ws").unwrap(),
            tokens,
            Backoff::default(),
        );
        let err = channel
            .send(TransportEvent::Read {
                conversation_id: "c1".into(),
                message_id: "m1".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChatSyncError::Transport(_)));
        channel.close().await;
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }
}
