//! Sync coordinator
//!
//! [`SyncCoordinator`] owns the [`ConversationStore`] and is its only writer.
//! It hydrates the store over REST, applies transport events while a
//! conversation session is open, performs optimistic sends, and back-fills
//! history after a reconnect.
//!
//! # Session lifecycle
//!
//! ```text
//! Idle --open--> Loading --fetch ok--> Live <--> Reconnecting
//!                   |                    |            |
//!                   +--fetch failed--> Idle <--close--+
//! ```
//!
//! - The transport subscription is taken before the initial fetch, so events
//!   that arrive while loading are queued and applied once the history is in
//!   the store.
//! - A `disconnected`/`error` transition moves `Live` to `Reconnecting`; the
//!   next `connected` transition re-fetches the conversation before going
//!   back to `Live`.
//! - Closing a session cancels its token while holding the store write lock,
//!   and every write checks the token under that lock, so nothing from a
//!   closed session reaches the store afterwards.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex, RwLock, RwLockReadGuard};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::ConversationApi;
use crate::error::{ChatSyncError, SyncResult};
use crate::model::{Conversation, ConversationDetail, Message, MessageStatus};
use crate::store::{AppendOutcome, ConversationStore, StoreChange};
use crate::transport::{ChannelEvent, ConnectionState, EventChannel, TransportEvent};

/// State of the conversation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No conversation open
    Idle,
    /// Fetching the conversation and its history
    Loading { conversation_id: String },
    /// Hydrated and applying live events
    Live { conversation_id: String },
    /// The channel dropped; waiting to reconnect and back-fill
    Reconnecting { conversation_id: String },
}

impl SessionState {
    /// The conversation this state refers to, if any.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Loading { conversation_id }
            | Self::Live { conversation_id }
            | Self::Reconnecting { conversation_id } => Some(conversation_id),
        }
    }
}

struct Session {
    generation: u64,
    conversation_id: String,
    token: CancellationToken,
    pump: Option<JoinHandle<()>>,
}

struct Inner {
    api: Arc<dyn ConversationApi>,
    channel: Arc<dyn EventChannel>,
    store: RwLock<ConversationStore>,
    state: watch::Sender<SessionState>,
    session: Mutex<Option<Session>>,
    generation: std::sync::atomic::AtomicU64,
    participant: String,
    root: CancellationToken,
}

/// Orchestrates REST hydration, live events, and optimistic sends.
///
/// # Examples
///
/// ```no_run
/// use std::collections::HashSet;
/// use std::sync::Arc;
/// use chatsync::coordinator::SyncCoordinator;
/// use chatsync::store::ConversationStore;
/// # use chatsync::api::ConversationApi;
/// # use chatsync::transport::EventChannel;
///
/// # async fn example(api: Arc<dyn ConversationApi>, channel: Arc<dyn EventChannel>)
/// #     -> chatsync::error::SyncResult<()> {
/// let coordinator = SyncCoordinator::new(api, channel, ConversationStore::default(), "me");
/// coordinator.open_conversation("c1").await?;
/// coordinator.send_message("hello").await?;
/// for message in coordinator.read().await.messages("c1") {
///     println!("{}: {}", message.id, message.content);
/// }
/// coordinator.close_conversation().await;
/// # Ok(())
/// # }
/// ```
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("state", &*self.inner.state.borrow())
            .field("participant", &self.inner.participant)
            .finish()
    }
}

impl SyncCoordinator {
    /// Create a coordinator.
    ///
    /// # Arguments
    ///
    /// * `api` - Conversation REST endpoints
    /// * `channel` - Live event channel
    /// * `store` - Initial store contents, usually empty
    /// * `participant` - Id reported in outbound typing events
    pub fn new(
        api: Arc<dyn ConversationApi>,
        channel: Arc<dyn EventChannel>,
        store: ConversationStore,
        participant: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            inner: Arc::new(Inner {
                api,
                channel,
                store: RwLock::new(store),
                state,
                session: Mutex::new(None),
                generation: std::sync::atomic::AtomicU64::new(0),
                participant: participant.into(),
                root: CancellationToken::new(),
            }),
        }
    }

    /// Read access to the store. Hold the guard briefly; writers wait on it.
    pub async fn read(&self) -> RwLockReadGuard<'_, ConversationStore> {
        self.inner.store.read().await
    }

    /// Subscribe to store change notifications.
    pub async fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.store.read().await.subscribe()
    }

    /// Observe session state transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Open a conversation: fetch it with its history, select it, and start
    /// applying live events.
    ///
    /// An already open session is closed first. On failure the session
    /// returns to `Idle` and the call may simply be repeated.
    ///
    /// # Errors
    ///
    /// Returns [`ChatSyncError::Load`] wrapping the request failure, or
    /// [`ChatSyncError::Cancelled`] if the session was closed while loading.
    pub async fn open_conversation(&self, conversation_id: &str) -> SyncResult<()> {
        self.close_conversation().await;

        let generation = self
            .inner
            .generation
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        let token = self.inner.root.child_token();
        let events = self.inner.channel.subscribe();

        {
            let mut session = self.inner.session.lock().await;
            *session = Some(Session {
                generation,
                conversation_id: conversation_id.to_string(),
                token: token.clone(),
                pump: None,
            });
        }
        self.inner.state.send_replace(SessionState::Loading {
            conversation_id: conversation_id.to_string(),
        });
        tracing::info!(conversation_id = %conversation_id, "opening conversation");

        let fetched = tokio::select! {
            _ = token.cancelled() => return Err(cancelled(conversation_id)),
            result = self.inner.api.get_conversation(conversation_id) => result,
        };

        let detail = match fetched {
            Ok(detail) => detail,
            Err(e) => {
                tracing::warn!(conversation_id = %conversation_id, error = %e, "conversation load failed");
                {
                    let _store = self.inner.store.write().await;
                    if token.is_cancelled() {
                        return Err(cancelled(conversation_id));
                    }
                    token.cancel();
                    self.inner.state.send_replace(SessionState::Idle);
                }
                self.forget_session(generation).await;
                return Err(ChatSyncError::Load {
                    conversation_id: conversation_id.to_string(),
                    source: Box::new(e),
                });
            }
        };

        {
            let mut store = self.inner.store.write().await;
            if token.is_cancelled() {
                return Err(cancelled(conversation_id));
            }
            apply_detail(&mut store, detail);
            store.select_conversation(conversation_id);
            let next = if self.inner.channel.state() == ConnectionState::Connected {
                SessionState::Live {
                    conversation_id: conversation_id.to_string(),
                }
            } else {
                SessionState::Reconnecting {
                    conversation_id: conversation_id.to_string(),
                }
            };
            tracing::debug!(conversation_id = %conversation_id, state = ?next, "conversation loaded");
            self.inner.state.send_replace(next);
        }

        let pump = tokio::spawn(pump_events(
            Arc::clone(&self.inner),
            conversation_id.to_string(),
            events,
            token,
        ));
        let mut session = self.inner.session.lock().await;
        match session.as_mut() {
            Some(current) if current.generation == generation => current.pump = Some(pump),
            _ => pump.abort(),
        }
        Ok(())
    }

    /// Close the open session, if any, and return to `Idle`.
    ///
    /// In-flight REST calls of the session are cancelled; messages still
    /// `sending` are marked `error` so they stay visible for retry.
    pub async fn close_conversation(&self) {
        let Some(session) = self.inner.session.lock().await.take() else {
            return;
        };
        {
            let mut store = self.inner.store.write().await;
            session.token.cancel();
            let failed = store.fail_in_flight(&session.conversation_id);
            if failed > 0 {
                tracing::warn!(
                    conversation_id = %session.conversation_id,
                    failed,
                    "closed with sends in flight"
                );
            }
            store.clear_selection();
            self.inner.state.send_replace(SessionState::Idle);
        }
        if let Some(pump) = session.pump {
            let _ = pump.await;
        }
        tracing::info!(conversation_id = %session.conversation_id, "conversation closed");
    }

    /// Send a message in the open conversation.
    ///
    /// A `sending` message appears in the store immediately. On success it is
    /// replaced by the server-confirmed message with status `sent`, which is
    /// returned. On failure it stays in the store with status `error`.
    ///
    /// # Errors
    ///
    /// [`ChatSyncError::NoActiveSession`] when no conversation is open, or
    /// the request error.
    pub async fn send_message(&self, content: &str) -> SyncResult<Message> {
        let (conversation_id, token) = self.active_session().await?;
        let correlation_id = Uuid::new_v4().to_string();
        let optimistic = Message::outgoing(&conversation_id, content, &correlation_id);
        let local_id = optimistic.id.clone();

        {
            let mut store = self.inner.store.write().await;
            if token.is_cancelled() {
                return Err(cancelled(&conversation_id));
            }
            store.append_message(optimistic);
        }
        tracing::debug!(conversation_id = %conversation_id, local_id = %local_id, "message queued");

        self.deliver(&conversation_id, &local_id, content, &correlation_id, &token)
            .await
    }

    /// Re-send a message that failed.
    ///
    /// Messages that are not in `error` status are returned unchanged.
    ///
    /// # Errors
    ///
    /// [`ChatSyncError::MessageNotFound`] when the id is not in the open
    /// conversation.
    pub async fn retry_message(&self, message_id: &str) -> SyncResult<Message> {
        let (conversation_id, token) = self.active_session().await?;

        let (content, correlation_id) = {
            let mut store = self.inner.store.write().await;
            if token.is_cancelled() {
                return Err(cancelled(&conversation_id));
            }
            let message = store
                .message(&conversation_id, message_id)
                .ok_or_else(|| ChatSyncError::MessageNotFound(message_id.to_string()))?;
            if message.status != MessageStatus::Error {
                return Ok(message.clone());
            }
            let content = message.content.clone();
            let correlation_id = message
                .correlation_id()
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            store.set_message_status(&conversation_id, message_id, MessageStatus::Sending);
            (content, correlation_id)
        };
        tracing::info!(conversation_id = %conversation_id, message_id, "retrying message");

        self.deliver(&conversation_id, message_id, &content, &correlation_id, &token)
            .await
    }

    /// Tell the other participants whether the local user is typing.
    ///
    /// # Errors
    ///
    /// [`ChatSyncError::Transport`] while the channel is down.
    pub async fn set_typing(&self, is_typing: bool) -> SyncResult<()> {
        let (conversation_id, _) = self.active_session().await?;
        self.inner
            .channel
            .send(TransportEvent::Typing {
                conversation_id,
                participant: self.inner.participant.clone(),
                is_typing,
            })
            .await
    }

    /// Tell the server the local user has read up to `message_id`.
    pub async fn mark_read(&self, message_id: &str) -> SyncResult<()> {
        let (conversation_id, _) = self.active_session().await?;
        self.inner
            .channel
            .send(TransportEvent::Read {
                conversation_id,
                message_id: message_id.to_string(),
            })
            .await
    }

    /// Fetch the conversation list and merge it into the store. Conversations
    /// missing from the response are kept. Returns the number fetched.
    pub async fn refresh_conversations(&self) -> SyncResult<usize> {
        let conversations = self.inner.api.list_conversations().await?;
        let count = conversations.len();
        let mut store = self.inner.store.write().await;
        for conversation in conversations {
            store.upsert_conversation(conversation);
        }
        tracing::debug!(count, "conversations refreshed");
        Ok(count)
    }

    /// Create a conversation on the server and add it to the store.
    pub async fn create_conversation(&self, title: Option<&str>) -> SyncResult<Conversation> {
        let conversation = self.inner.api.create_conversation(title).await?;
        self.inner
            .store
            .write()
            .await
            .upsert_conversation(conversation.clone());
        tracing::info!(conversation_id = %conversation.id, "conversation created");
        Ok(conversation)
    }

    /// Close the session and clear all stored data. Used on sign-out.
    pub async fn reset(&self) {
        self.close_conversation().await;
        self.inner.store.write().await.reset();
    }

    async fn active_session(&self) -> SyncResult<(String, CancellationToken)> {
        let session = self.inner.session.lock().await;
        match session.as_ref() {
            Some(s) if !s.token.is_cancelled() => Ok((s.conversation_id.clone(), s.token.clone())),
            _ => Err(ChatSyncError::NoActiveSession),
        }
    }

    async fn forget_session(&self, generation: u64) {
        let mut session = self.inner.session.lock().await;
        if session.as_ref().map(|s| s.generation) == Some(generation) {
            *session = None;
        }
    }

    async fn deliver(
        &self,
        conversation_id: &str,
        local_id: &str,
        content: &str,
        correlation_id: &str,
        token: &CancellationToken,
    ) -> SyncResult<Message> {
        let result = tokio::select! {
            _ = token.cancelled() => Err(cancelled(conversation_id)),
            result = self.inner.api.send_message(conversation_id, content, correlation_id) => result,
        };

        let mut store = self.inner.store.write().await;
        if token.is_cancelled() {
            return Err(cancelled(conversation_id));
        }
        match result {
            Ok(mut confirmed) => {
                confirmed.status = MessageStatus::Sent;
                store.reconcile(local_id, confirmed.clone());
                tracing::debug!(
                    conversation_id = %conversation_id,
                    local_id,
                    message_id = %confirmed.id,
                    "message confirmed"
                );
                Ok(confirmed)
            }
            Err(e) => {
                tracing::warn!(conversation_id = %conversation_id, local_id, error = %e, "send failed");
                store.set_message_status(conversation_id, local_id, MessageStatus::Error);
                Err(e)
            }
        }
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.inner.root.cancel();
    }
}

fn cancelled(conversation_id: &str) -> ChatSyncError {
    ChatSyncError::Cancelled(format!("session for {} closed", conversation_id))
}

fn apply_detail(store: &mut ConversationStore, detail: ConversationDetail) {
    let conversation_id = detail.conversation.id.clone();
    store.upsert_conversation(detail.conversation);
    for mut message in detail.messages {
        if message.conversation_id.is_empty() {
            message.conversation_id = conversation_id.clone();
        }
        store.append_message(message);
    }
}

/// Apply one inbound event. Returns the id of a conversation the store does
/// not know yet when a message for it had to be buffered.
fn apply_event(store: &mut ConversationStore, event: TransportEvent) -> Option<String> {
    match event {
        TransportEvent::Message { message, .. } => {
            let conversation_id = message.conversation_id.clone();
            match store.append_message(message) {
                AppendOutcome::Pending => return Some(conversation_id),
                AppendOutcome::Inserted | AppendOutcome::Replaced => {}
            }
        }
        TransportEvent::Typing {
            conversation_id,
            participant,
            is_typing,
        } => store.set_typing(&conversation_id, &participant, is_typing),
        TransportEvent::Read {
            conversation_id,
            message_id,
        } => store.mark_read(&conversation_id, &message_id),
        TransportEvent::Conversation { conversation } => store.upsert_conversation(conversation),
        TransportEvent::Unknown { kind, .. } => {
            tracing::debug!(kind = %kind, "ignoring unknown event");
        }
    }
    None
}

/// Apply channel output for one session until it is cancelled or the channel
/// goes away.
async fn pump_events(
    inner: Arc<Inner>,
    conversation_id: String,
    mut events: tokio::sync::mpsc::UnboundedReceiver<ChannelEvent>,
    token: CancellationToken,
) {
    // Header fetches for conversations seen only through buffered messages.
    // Dropping the set when the pump stops aborts them.
    let mut hydrating: HashSet<String> = HashSet::new();
    let mut hydrations: JoinSet<String> = JoinSet::new();

    loop {
        let item = tokio::select! {
            _ = token.cancelled() => break,
            Some(done) = hydrations.join_next() => {
                match done {
                    Ok(id) => {
                        hydrating.remove(&id);
                    }
                    Err(e) => tracing::warn!(error = %e, "conversation fetch task failed"),
                }
                continue;
            }
            item = events.recv() => item,
        };
        let Some(item) = item else {
            tracing::warn!(conversation_id = %conversation_id, "event channel closed");
            break;
        };

        match item {
            ChannelEvent::Event(event) => {
                let unknown = {
                    let mut store = inner.store.write().await;
                    if token.is_cancelled() {
                        break;
                    }
                    apply_event(&mut store, event)
                };
                if let Some(id) = unknown {
                    if hydrating.insert(id.clone()) {
                        hydrations.spawn(fetch_unknown_conversation(
                            Arc::clone(&inner),
                            id,
                            token.clone(),
                        ));
                    }
                }
            }
            ChannelEvent::State(ConnectionState::Disconnected | ConnectionState::Error) => {
                let _store = inner.store.write().await;
                if token.is_cancelled() {
                    break;
                }
                if matches!(*inner.state.borrow(), SessionState::Live { .. }) {
                    tracing::info!(conversation_id = %conversation_id, "connection lost, reconnecting");
                    inner.state.send_replace(SessionState::Reconnecting {
                        conversation_id: conversation_id.clone(),
                    });
                }
            }
            ChannelEvent::State(ConnectionState::Connected) => {
                let reconnecting =
                    matches!(*inner.state.borrow(), SessionState::Reconnecting { .. });
                if reconnecting {
                    gap_fill(&inner, &conversation_id, &token).await;
                }
            }
            ChannelEvent::State(ConnectionState::Connecting) => {}
        }
    }
    tracing::debug!(conversation_id = %conversation_id, "event pump stopped");
}

/// Fetch a conversation that so far only exists as buffered messages, so
/// the store can flush them. Returns the id for bookkeeping.
async fn fetch_unknown_conversation(
    inner: Arc<Inner>,
    conversation_id: String,
    token: CancellationToken,
) -> String {
    tracing::debug!(conversation_id = %conversation_id, "fetching conversation for buffered messages");
    let fetched = tokio::select! {
        _ = token.cancelled() => return conversation_id,
        result = inner.api.get_conversation(&conversation_id) => result,
    };
    match fetched {
        Ok(detail) => {
            let mut store = inner.store.write().await;
            if !token.is_cancelled() {
                apply_detail(&mut store, detail);
            }
        }
        Err(e) => {
            tracing::warn!(conversation_id = %conversation_id, error = %e, "conversation fetch failed");
        }
    }
    conversation_id
}

/// Re-fetch history after a reconnect, then go back to `Live`.
///
/// A failed fetch is logged and the session still returns to `Live`; the
/// next reconnect tries again.
async fn gap_fill(inner: &Inner, conversation_id: &str, token: &CancellationToken) {
    tracing::info!(conversation_id = %conversation_id, "reconnected, back-filling history");
    let fetched = tokio::select! {
        _ = token.cancelled() => return,
        result = inner.api.get_conversation(conversation_id) => result,
    };

    let mut store = inner.store.write().await;
    if token.is_cancelled() {
        return;
    }
    match fetched {
        Ok(detail) => apply_detail(&mut store, detail),
        Err(e) => {
            tracing::warn!(conversation_id = %conversation_id, error = %e, "gap-fill failed");
        }
    }
    inner.state.send_replace(SessionState::Live {
        conversation_id: conversation_id.to_string(),
    });
}
