//! In-memory conversation store
//!
//! [`ConversationStore`] is the single source of truth for conversations and
//! their messages. It performs no I/O and never fails: the sync coordinator
//! feeds it REST results and transport events, and UI collaborators read it
//! after receiving a [`StoreChange`] notification.
//!
//! # Invariants
//!
//! - Messages within a conversation are kept sorted by `(timestamp, id)`,
//!   independent of arrival order.
//! - A message id appears at most once per conversation; re-applying a
//!   message replaces the stored copy.
//! - A message carrying a correlation id replaces any stored message with
//!   the same correlation id, which is how optimistic sends are reconciled.
//! - Messages for unknown conversations wait in a bounded pending queue and
//!   are flushed, in arrival order, when the conversation is upserted.
//! - A conversation's `updated_at` never moves backwards.
//! - The selected conversation, when set, is always a stored conversation.

use std::collections::{BTreeSet, HashMap, VecDeque};

use tokio::sync::broadcast;

use crate::model::{Conversation, Message, MessageStatus};

/// Default number of messages held for conversations the store has not
/// seen yet.
pub const DEFAULT_PENDING_CAPACITY: usize = 256;

/// Capacity of the change notification channel. Receivers that fall behind
/// observe `Lagged` and should simply re-read the store.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Kinds of state change published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// The set of conversations or any conversation header changed
    ConversationsChanged,
    /// The message list of one conversation changed
    MessagesChanged { conversation_id: String },
    /// The selected conversation changed
    SelectionChanged,
    /// Typing participants of one conversation changed
    TypingChanged { conversation_id: String },
}

/// What [`ConversationStore::append_message`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// New message added to its conversation
    Inserted,
    /// An existing message with the same id or correlation id was replaced
    Replaced,
    /// Conversation unknown; message buffered until it arrives
    Pending,
}

/// Authoritative in-memory model of conversations and messages.
#[derive(Debug)]
pub struct ConversationStore {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<Message>>,
    pending: VecDeque<Message>,
    pending_capacity: usize,
    selected: Option<String>,
    typing: HashMap<String, BTreeSet<String>>,
    last_read: HashMap<String, String>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_CAPACITY)
    }
}

impl ConversationStore {
    /// Create an empty store.
    ///
    /// # Arguments
    ///
    /// * `pending_capacity` - Maximum number of messages buffered for
    ///   conversations that have not been upserted yet. The oldest message
    ///   is dropped when the buffer is full. A capacity of zero is treated
    ///   as one.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatsync::store::ConversationStore;
    ///
    /// let store = ConversationStore::new(16);
    /// assert!(store.conversations().is_empty());
    /// assert!(store.selected().is_none());
    /// ```
    pub fn new(pending_capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            conversations: HashMap::new(),
            messages: HashMap::new(),
            pending: VecDeque::new(),
            pending_capacity: pending_capacity.max(1),
            selected: None,
            typing: HashMap::new(),
            last_read: HashMap::new(),
            changes,
        }
    }

    /// Subscribe to change notifications.
    ///
    /// Notifications carry no data beyond the change kind; consumers re-read
    /// the store after receiving one.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Insert a conversation or merge it into the stored copy.
    ///
    /// Header fields are only taken from `incoming` when its `updated_at` is
    /// not older than the stored one; an older header is ignored. Either way,
    /// messages waiting in the pending queue for this conversation are
    /// flushed afterwards.
    pub fn upsert_conversation(&mut self, incoming: Conversation) {
        let id = incoming.id.clone();
        let local_count = self.messages.get(&id).map_or(0, Vec::len);

        let changed = match self.conversations.get_mut(&id) {
            Some(existing) => {
                if incoming.updated_at >= existing.updated_at {
                    let merged = Conversation {
                        created_at: existing.created_at,
                        message_count: incoming.message_count.max(local_count),
                        ..incoming
                    };
                    let changed = *existing != merged;
                    *existing = merged;
                    changed
                } else {
                    tracing::debug!(
                        conversation_id = %id,
                        "ignoring stale conversation header"
                    );
                    false
                }
            }
            None => {
                self.conversations.insert(id.clone(), incoming);
                self.messages.entry(id.clone()).or_default();
                true
            }
        };

        if changed {
            self.notify(StoreChange::ConversationsChanged);
        }

        self.flush_pending(&id);
    }

    /// Apply a message to its conversation.
    ///
    /// - Unknown conversation: the message is buffered (see
    ///   [`ConversationStore::new`] for the capacity rule).
    /// - Same id, or same correlation id, already stored: the stored copy is
    ///   replaced.
    /// - Otherwise the message is inserted at its timestamp position.
    pub fn append_message(&mut self, message: Message) -> AppendOutcome {
        if !self.conversations.contains_key(&message.conversation_id) {
            self.buffer_pending(message);
            return AppendOutcome::Pending;
        }

        let conversation_id = message.conversation_id.clone();
        let outcome = self.insert_sorted(message);
        self.refresh_header(&conversation_id);
        self.notify(StoreChange::MessagesChanged {
            conversation_id: conversation_id.clone(),
        });
        self.notify(StoreChange::ConversationsChanged);
        outcome
    }

    /// Replace the optimistic message `local_id` with its server-confirmed
    /// counterpart.
    ///
    /// The local message is removed by id even when the confirmed message
    /// carries no correlation id, so a server that does not echo metadata
    /// still ends up with exactly one copy.
    pub fn reconcile(&mut self, local_id: &str, confirmed: Message) -> AppendOutcome {
        if let Some(list) = self.messages.get_mut(&confirmed.conversation_id) {
            list.retain(|m| m.id != local_id);
        }
        self.append_message(confirmed)
    }

    /// Update the status of a stored message. Returns `false` when the
    /// message is not present.
    pub fn set_message_status(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        status: MessageStatus,
    ) -> bool {
        let Some(message) = self
            .messages
            .get_mut(conversation_id)
            .and_then(|list| list.iter_mut().find(|m| m.id == message_id))
        else {
            return false;
        };
        if message.status != status {
            message.status = status;
            self.notify(StoreChange::MessagesChanged {
                conversation_id: conversation_id.to_string(),
            });
        }
        true
    }

    /// Mark every `sending` message in the conversation as `error`.
    ///
    /// Used when a session closes with sends still in flight so the messages
    /// stay visible with a retry affordance. Returns the number marked.
    pub fn fail_in_flight(&mut self, conversation_id: &str) -> usize {
        let mut marked = 0;
        if let Some(list) = self.messages.get_mut(conversation_id) {
            for message in list
                .iter_mut()
                .filter(|m| m.status == MessageStatus::Sending)
            {
                message.status = MessageStatus::Error;
                marked += 1;
            }
        }
        if marked > 0 {
            self.notify(StoreChange::MessagesChanged {
                conversation_id: conversation_id.to_string(),
            });
        }
        marked
    }

    /// Select a conversation. Silently ignored when `id` is not stored.
    pub fn select_conversation(&mut self, id: &str) {
        if !self.conversations.contains_key(id) {
            tracing::debug!(conversation_id = %id, "select ignored: unknown conversation");
            return;
        }
        if self.selected.as_deref() != Some(id) {
            self.selected = Some(id.to_string());
            self.notify(StoreChange::SelectionChanged);
        }
    }

    /// Clear the selection.
    pub fn clear_selection(&mut self) {
        if self.selected.take().is_some() {
            self.notify(StoreChange::SelectionChanged);
        }
    }

    /// Record that `participant` started or stopped typing.
    pub fn set_typing(&mut self, conversation_id: &str, participant: &str, is_typing: bool) {
        let set = self.typing.entry(conversation_id.to_string()).or_default();
        let changed = if is_typing {
            set.insert(participant.to_string())
        } else {
            set.remove(participant)
        };
        if changed {
            self.notify(StoreChange::TypingChanged {
                conversation_id: conversation_id.to_string(),
            });
        }
    }

    /// Record the newest message the remote side has read.
    pub fn mark_read(&mut self, conversation_id: &str, message_id: &str) {
        let previous = self
            .last_read
            .insert(conversation_id.to_string(), message_id.to_string());
        if previous.as_deref() != Some(message_id) {
            self.notify(StoreChange::MessagesChanged {
                conversation_id: conversation_id.to_string(),
            });
        }
    }

    /// Drop all state. This is the only way data leaves the store.
    pub fn reset(&mut self) {
        self.conversations.clear();
        self.messages.clear();
        self.pending.clear();
        self.typing.clear();
        self.last_read.clear();
        self.selected = None;
        self.notify(StoreChange::ConversationsChanged);
        self.notify(StoreChange::SelectionChanged);
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    /// All conversations, most recently updated first.
    pub fn conversations(&self) -> Vec<&Conversation> {
        let mut list: Vec<&Conversation> = self.conversations.values().collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    /// Messages of a conversation in timestamp order. Empty when unknown.
    pub fn messages(&self, conversation_id: &str) -> &[Message] {
        self.messages
            .get(conversation_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn message(&self, conversation_id: &str, message_id: &str) -> Option<&Message> {
        self.messages(conversation_id)
            .iter()
            .find(|m| m.id == message_id)
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Messages of the selected conversation, empty when none is selected.
    pub fn selected_messages(&self) -> &[Message] {
        match &self.selected {
            Some(id) => self.messages(id),
            None => &[],
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Participants currently typing in a conversation.
    pub fn typing(&self, conversation_id: &str) -> Vec<&str> {
        self.typing
            .get(conversation_id)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn last_read(&self, conversation_id: &str) -> Option<&str> {
        self.last_read.get(conversation_id).map(String::as_str)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn insert_sorted(&mut self, mut message: Message) -> AppendOutcome {
        let list = self
            .messages
            .entry(message.conversation_id.clone())
            .or_default();

        let before = list.len();
        let id = message.id.clone();
        let correlation = message.correlation_id().map(str::to_owned);
        let same = |m: &Message| {
            m.id == id
                || matches!(
                    (&correlation, m.correlation_id()),
                    (Some(ours), Some(theirs)) if ours == theirs
                )
        };
        // A transport echo of our own confirmed send arrives without status.
        if message.status == MessageStatus::Received
            && list
                .iter()
                .any(|m| m.status == MessageStatus::Sent && same(m))
        {
            message.status = MessageStatus::Sent;
        }
        list.retain(|m| !same(m));
        let outcome = if list.len() < before {
            AppendOutcome::Replaced
        } else {
            AppendOutcome::Inserted
        };

        let position = list.partition_point(|m| {
            (m.timestamp, m.id.as_str()) < (message.timestamp, message.id.as_str())
        });
        list.insert(position, message);
        outcome
    }

    /// Recompute the denormalized header fields from the stored messages.
    fn refresh_header(&mut self, conversation_id: &str) {
        let (Some(conversation), Some(list)) = (
            self.conversations.get_mut(conversation_id),
            self.messages.get(conversation_id),
        ) else {
            return;
        };
        conversation.message_count = conversation.message_count.max(list.len());
        if let Some(newest) = list.last() {
            conversation.last_message = Some(newest.content.clone());
        }
        // Local messages carry the client clock; only server time moves
        // `updated_at`.
        if let Some(newest) = list.iter().rev().find(|m| !m.is_local()) {
            if newest.timestamp > conversation.updated_at {
                conversation.updated_at = newest.timestamp;
            }
        }
    }

    fn buffer_pending(&mut self, message: Message) {
        if let Some(slot) = self
            .pending
            .iter_mut()
            .find(|m| m.id == message.id && m.conversation_id == message.conversation_id)
        {
            *slot = message;
            return;
        }
        if self.pending.len() >= self.pending_capacity {
            if let Some(dropped) = self.pending.pop_front() {
                tracing::warn!(
                    conversation_id = %dropped.conversation_id,
                    message_id = %dropped.id,
                    capacity = self.pending_capacity,
                    "pending buffer full, dropping oldest message"
                );
            }
        }
        tracing::debug!(
            conversation_id = %message.conversation_id,
            message_id = %message.id,
            "buffering message for unknown conversation"
        );
        self.pending.push_back(message);
    }

    fn flush_pending(&mut self, conversation_id: &str) {
        if !self
            .pending
            .iter()
            .any(|m| m.conversation_id == conversation_id)
        {
            return;
        }
        let (ready, waiting): (VecDeque<Message>, VecDeque<Message>) = self
            .pending
            .drain(..)
            .partition(|m| m.conversation_id == conversation_id);
        self.pending = waiting;
        tracing::debug!(
            conversation_id = %conversation_id,
            count = ready.len(),
            "flushing pending messages"
        );
        for message in ready {
            self.append_message(message);
        }
    }

    fn notify(&self, change: StoreChange) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.changes.send(change);
    }
}
