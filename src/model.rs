//! Conversation and message data model
//!
//! These types mirror the server's JSON representation (camelCase field
//! names, RFC 3339 timestamps). They are plain data: all merge and ordering
//! rules live in [`crate::store::ConversationStore`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation header with denormalized preview fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Stable unique identifier
    pub id: String,
    /// Display title
    pub title: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last activity; never moves backwards in the store
    pub updated_at: DateTime<Utc>,
    /// Number of messages known to exist
    #[serde(default)]
    pub message_count: usize,
    /// Preview of the newest message
    #[serde(default)]
    pub last_message: Option<String>,
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Sent by the local user
    User,
    /// Produced by the assistant
    Assistant,
    /// System notice
    System,
    /// Tool invocation or output
    Tool,
}

/// Delivery state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Optimistically shown, waiting for server confirmation
    Sending,
    /// Confirmed by the server
    Sent,
    /// Delivered from the server
    #[default]
    Received,
    /// Send failed; kept visible for retry
    Error,
}

/// A tool invocation requested by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier, referenced by the matching [`ToolResult`]
    pub id: String,
    /// Tool name
    pub name: String,
    /// Arguments as an open JSON object
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// Output of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Identifier of the originating [`ToolCall`]
    pub call_id: String,
    /// Arbitrary JSON result
    pub result: serde_json::Value,
    /// Error text when the tool failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A fenced code block attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
}

/// Reference to a workspace file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReference {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub size: u64,
}

/// The structured payload a message may carry. At most one is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Attachment {
    ToolCall(ToolCall),
    ToolResult(ToolResult),
    CodeBlock(CodeBlock),
    FileReference(FileReference),
}

/// Optional message metadata.
///
/// On the wire the attachment is flattened next to `correlationId`, e.g.
/// `{"correlationId": "...", "codeBlock": {"language": "rust", "code": "..."}}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Client-generated id used to reconcile an optimistic send with the
    /// server-confirmed message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(flatten)]
    pub attachment: Option<Attachment>,
}

impl MessageMetadata {
    /// Metadata carrying only a correlation id.
    pub fn correlated(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            attachment: None,
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned id, or a `local-` id while optimistic
    pub id: String,
    /// Owning conversation
    #[serde(default)]
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    /// Server timestamp; defines read order within a conversation
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    /// Prefix of ids assigned to optimistic messages before the server
    /// confirms them.
    pub const LOCAL_ID_PREFIX: &'static str = "local-";

    /// Build the optimistic message shown while a send is in flight.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatsync::model::{Message, MessageStatus};
    ///
    /// let msg = Message::outgoing("c1", "hi", "corr-1");
    /// assert_eq!(msg.status, MessageStatus::Sending);
    /// assert_eq!(msg.correlation_id(), Some("corr-1"));
    /// assert!(msg.is_local());
    /// ```
    pub fn outgoing(
        conversation_id: impl Into<String>,
        content: impl Into<String>,
        correlation_id: &str,
    ) -> Self {
        Self {
            id: format!("{}{}", Self::LOCAL_ID_PREFIX, correlation_id),
            conversation_id: conversation_id.into(),
            role: MessageRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            status: MessageStatus::Sending,
            metadata: Some(MessageMetadata::correlated(correlation_id)),
        }
    }

    /// Correlation id carried in metadata, if any.
    pub fn correlation_id(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.correlation_id.as_deref())
    }

    /// Attach a correlation id, keeping any existing attachment.
    pub fn set_correlation_id(&mut self, correlation_id: &str) {
        self.metadata
            .get_or_insert_with(MessageMetadata::default)
            .correlation_id = Some(correlation_id.to_string());
    }

    /// True while the message only exists locally.
    pub fn is_local(&self) -> bool {
        self.id.starts_with(Self::LOCAL_ID_PREFIX)
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }

    pub fn is_system(&self) -> bool {
        self.role == MessageRole::System
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(
            self.metadata.as_ref().and_then(|m| m.attachment.as_ref()),
            Some(Attachment::ToolCall(_))
        )
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(
            self.metadata.as_ref().and_then(|m| m.attachment.as_ref()),
            Some(Attachment::ToolResult(_))
        )
    }
}

/// `GET conversations` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationList {
    pub conversations: Vec<Conversation>,
}

/// `GET conversations/{id}` response body: header plus history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// `POST conversations` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEnvelope {
    pub conversation: Conversation,
}

/// `POST conversations/{id}/messages` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub message: Message,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message_with_role(role: MessageRole) -> Message {
        Message {
            id: "1".to_string(),
            conversation_id: "conv1".to_string(),
            role,
            content: "Hello".to_string(),
            timestamp: Utc::now(),
            status: MessageStatus::Sent,
            metadata: None,
        }
    }

    #[test]
    fn test_message_role_predicates() {
        let user = message_with_role(MessageRole::User);
        let assistant = message_with_role(MessageRole::Assistant);
        let system = message_with_role(MessageRole::System);

        assert!(user.is_user());
        assert!(!user.is_assistant());
        assert!(!user.is_system());

        assert!(!assistant.is_user());
        assert!(assistant.is_assistant());
        assert!(!assistant.is_system());

        assert!(!system.is_user());
        assert!(!system.is_assistant());
        assert!(system.is_system());
    }

    #[test]
    fn test_message_decodes_server_json() {
        let value = json!({
            "id": "m1",
            "conversationId": "c1",
            "role": "assistant",
            "content": "hello",
            "timestamp": "2025-03-23T10:00:00Z",
            "status": "received"
        });
        let msg: Message = serde_json::from_value(value).expect("decode");
        assert_eq!(msg.conversation_id, "c1");
        assert_eq!(msg.role, MessageRole::Assistant);
        assert!(msg.metadata.is_none());
    }

    #[test]
    fn test_missing_status_defaults_to_received() {
        let value = json!({
            "id": "m1",
            "conversationId": "c1",
            "role": "assistant",
            "content": "hello",
            "timestamp": "2025-03-23T10:00:00Z"
        });
        let msg: Message = serde_json::from_value(value).expect("decode");
        assert_eq!(msg.status, MessageStatus::Received);
    }

    #[test]
    fn test_metadata_tool_call_decodes_flattened() {
        let value = json!({
            "id": "m2",
            "conversationId": "c1",
            "role": "assistant",
            "content": "",
            "timestamp": "2025-03-23T10:00:00Z",
            "metadata": {
                "correlationId": "corr-9",
                "toolCall": {"id": "call-1", "name": "read_file", "arguments": {"path": "a.rs"}}
            }
        });
        let msg: Message = serde_json::from_value(value).expect("decode");
        assert!(msg.is_tool_call());
        assert!(!msg.is_tool_result());
        assert_eq!(msg.correlation_id(), Some("corr-9"));
        match msg.metadata.and_then(|m| m.attachment) {
            Some(Attachment::ToolCall(call)) => {
                assert_eq!(call.name, "read_file");
                assert_eq!(call.arguments["path"], "a.rs");
            }
            other => panic!("expected tool call, got {:?}", other),
        }
    }

    #[test]
    fn test_metadata_with_only_correlation_has_no_attachment() {
        let meta: MessageMetadata =
            serde_json::from_value(json!({"correlationId": "abc"})).expect("decode");
        assert_eq!(meta.correlation_id.as_deref(), Some("abc"));
        assert!(meta.attachment.is_none());
    }

    #[test]
    fn test_file_reference_serializes_type_field() {
        let meta = MessageMetadata {
            correlation_id: None,
            attachment: Some(Attachment::FileReference(FileReference {
                id: "f1".into(),
                name: "main.rs".into(),
                path: "src/main.rs".into(),
                kind: "file".into(),
                size: 42,
            })),
        };
        let value = serde_json::to_value(&meta).expect("encode");
        assert_eq!(value["fileReference"]["type"], "file");
        assert!(value.get("correlationId").is_none());
    }

    #[test]
    fn test_outgoing_message_is_local_and_correlated() {
        let msg = Message::outgoing("c1", "hi", "abc");
        assert_eq!(msg.id, "local-abc");
        assert!(msg.is_local());
        assert!(msg.is_user());
        assert_eq!(msg.correlation_id(), Some("abc"));
    }

    #[test]
    fn test_set_correlation_id_preserves_attachment() {
        let mut msg = message_with_role(MessageRole::Assistant);
        msg.metadata = Some(MessageMetadata {
            correlation_id: None,
            attachment: Some(Attachment::CodeBlock(CodeBlock {
                language: "rust".into(),
                code: "fn main() {}".into(),
            })),
        });
        msg.set_correlation_id("xyz");
        let meta = msg.metadata.as_ref().expect("metadata");
        assert_eq!(meta.correlation_id.as_deref(), Some("xyz"));
        assert!(matches!(meta.attachment, Some(Attachment::CodeBlock(_))));
    }

    #[test]
    fn test_conversation_decodes_null_last_message() {
        let value = json!({
            "id": "c1",
            "title": "First",
            "createdAt": "2025-03-23T10:00:00Z",
            "updatedAt": "2025-03-23T11:00:00Z",
            "messageCount": 2,
            "lastMessage": null
        });
        let conv: Conversation = serde_json::from_value(value).expect("decode");
        assert_eq!(conv.message_count, 2);
        assert!(conv.last_message.is_none());
    }
}
