//! Conversation REST endpoints
//!
//! [`ConversationApi`] is the seam between the sync coordinator and the
//! server. [`RequestClient`] implements it against the real endpoints:
//!
//! | Call                  | Endpoint                             |
//! |-----------------------|--------------------------------------|
//! | list conversations    | `GET conversations`                  |
//! | conversation+history  | `GET conversations/{id}`             |
//! | create conversation   | `POST conversations`                 |
//! | send message          | `POST conversations/{id}/messages`   |

use async_trait::async_trait;
use serde_json::json;

use crate::client::RequestClient;
use crate::error::SyncResult;
use crate::model::{
    Conversation, ConversationDetail, ConversationEnvelope, ConversationList, Message,
    MessageEnvelope,
};

/// Conversation operations the sync coordinator needs from the server.
#[async_trait]
pub trait ConversationApi: Send + Sync + std::fmt::Debug {
    /// All conversations visible to the current user.
    async fn list_conversations(&self) -> SyncResult<Vec<Conversation>>;

    /// One conversation header together with its message history.
    async fn get_conversation(&self, conversation_id: &str) -> SyncResult<ConversationDetail>;

    /// Create a conversation. The server picks a title when `title` is `None`.
    async fn create_conversation(&self, title: Option<&str>) -> SyncResult<Conversation>;

    /// Post a user message.
    ///
    /// `correlation_id` is echoed back in the confirmed message's metadata
    /// and on the matching transport event.
    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        correlation_id: &str,
    ) -> SyncResult<Message>;
}

#[async_trait]
impl ConversationApi for RequestClient {
    async fn list_conversations(&self) -> SyncResult<Vec<Conversation>> {
        let list: ConversationList = self.get("conversations", None).await?;
        Ok(list.conversations)
    }

    async fn get_conversation(&self, conversation_id: &str) -> SyncResult<ConversationDetail> {
        let mut detail: ConversationDetail = self
            .get(&format!("conversations/{}", conversation_id), None)
            .await?;
        for message in &mut detail.messages {
            if message.conversation_id.is_empty() {
                message.conversation_id = detail.conversation.id.clone();
            }
        }
        Ok(detail)
    }

    async fn create_conversation(&self, title: Option<&str>) -> SyncResult<Conversation> {
        let body = match title {
            Some(title) => json!({ "title": title }),
            None => json!({}),
        };
        let envelope: ConversationEnvelope = self.post("conversations", Some(&body)).await?;
        Ok(envelope.conversation)
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        correlation_id: &str,
    ) -> SyncResult<Message> {
        let envelope: MessageEnvelope = self
            .post(
                &format!("conversations/{}/messages", conversation_id),
                Some(&json!({ "content": content, "correlationId": correlation_id })),
            )
            .await?;
        let mut message = envelope.message;
        if message.conversation_id.is_empty() {
            message.conversation_id = conversation_id.to_string();
        }
        if message.correlation_id().is_none() {
            message.set_correlation_id(correlation_id);
        }
        Ok(message)
    }
}
