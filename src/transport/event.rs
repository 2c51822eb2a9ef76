//! Typed transport events
//!
//! Every frame on the event stream is a JSON envelope
//! `{"type": "<kind>", "payload": {...}}`. The `type` field selects how the
//! payload is decoded; kinds this client does not understand are preserved
//! as [`TransportEvent::Unknown`] with the original frame bytes so they can
//! be logged or forwarded verbatim.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{ChatSyncError, SyncResult};
use crate::model::{Conversation, Message};

/// Participant name used when a typing event does not say who is typing.
pub const UNKNOWN_PARTICIPANT: &str = "remote";

/// A decoded event from the transport channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A new or updated message
    Message {
        conversation_id: String,
        message: Message,
    },
    /// A participant started or stopped typing
    Typing {
        conversation_id: String,
        participant: String,
        is_typing: bool,
    },
    /// The remote side read up to `message_id`
    Read {
        conversation_id: String,
        message_id: String,
    },
    /// A conversation header was created or changed
    Conversation { conversation: Conversation },
    /// An event kind this client does not know; `raw` is the whole frame
    Unknown { kind: String, raw: Bytes },
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Serialize)]
struct OutboundEnvelope<'a, P: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    payload: P,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePayload {
    conversation_id: String,
    message: Message,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingPayload {
    conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(default = "default_is_typing")]
    is_typing: bool,
}

fn default_is_typing() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadPayload {
    conversation_id: String,
    message_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConversationPayload {
    conversation: Conversation,
}

impl TransportEvent {
    /// Decode a raw frame.
    ///
    /// # Errors
    ///
    /// Returns [`ChatSyncError::Decode`] when the frame is not a JSON
    /// envelope, or when the payload of a known kind does not match its
    /// schema. Unknown kinds never fail.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatsync::transport::TransportEvent;
    ///
    /// let frame = br#"{"type":"presence","payload":{"online":true}}"#;
    /// match TransportEvent::decode(frame).unwrap() {
    ///     TransportEvent::Unknown { kind, raw } => {
    ///         assert_eq!(kind, "presence");
    ///         assert_eq!(&raw[..], &frame[..]);
    ///     }
    ///     other => panic!("unexpected {:?}", other),
    /// }
    /// ```
    pub fn decode(raw: &[u8]) -> SyncResult<Self> {
        let envelope: RawEnvelope = serde_json::from_slice(raw)
            .map_err(|e| ChatSyncError::Decode(format!("invalid event envelope: {}", e)))?;

        let event = match envelope.kind.as_str() {
            "message" => {
                let payload: MessagePayload = payload_of(&envelope)?;
                let mut message = payload.message;
                // The envelope's conversation id is authoritative.
                message.conversation_id = payload.conversation_id.clone();
                Self::Message {
                    conversation_id: payload.conversation_id,
                    message,
                }
            }
            "typing" => {
                let payload: TypingPayload = payload_of(&envelope)?;
                Self::Typing {
                    conversation_id: payload.conversation_id,
                    participant: payload
                        .user_id
                        .unwrap_or_else(|| UNKNOWN_PARTICIPANT.to_string()),
                    is_typing: payload.is_typing,
                }
            }
            "read" => {
                let payload: ReadPayload = payload_of(&envelope)?;
                Self::Read {
                    conversation_id: payload.conversation_id,
                    message_id: payload.message_id,
                }
            }
            "conversation" => {
                let payload: ConversationPayload = payload_of(&envelope)?;
                Self::Conversation {
                    conversation: payload.conversation,
                }
            }
            _ => Self::Unknown {
                kind: envelope.kind,
                raw: Bytes::copy_from_slice(raw),
            },
        };
        Ok(event)
    }

    /// Encode the event as a text frame.
    ///
    /// Unknown events are re-emitted byte for byte.
    pub fn encode(&self) -> SyncResult<String> {
        let text = match self {
            Self::Message {
                conversation_id,
                message,
            } => serde_json::to_string(&OutboundEnvelope {
                kind: "message",
                payload: MessagePayload {
                    conversation_id: conversation_id.clone(),
                    message: message.clone(),
                },
            })?,
            Self::Typing {
                conversation_id,
                participant,
                is_typing,
            } => serde_json::to_string(&OutboundEnvelope {
                kind: "typing",
                payload: TypingPayload {
                    conversation_id: conversation_id.clone(),
                    user_id: Some(participant.clone()),
                    is_typing: *is_typing,
                },
            })?,
            Self::Read {
                conversation_id,
                message_id,
            } => serde_json::to_string(&OutboundEnvelope {
                kind: "read",
                payload: ReadPayload {
                    conversation_id: conversation_id.clone(),
                    message_id: message_id.clone(),
                },
            })?,
            Self::Conversation { conversation } => serde_json::to_string(&OutboundEnvelope {
                kind: "conversation",
                payload: ConversationPayload {
                    conversation: conversation.clone(),
                },
            })?,
            Self::Unknown { raw, .. } => String::from_utf8(raw.to_vec())
                .map_err(|e| ChatSyncError::Decode(format!("opaque frame is not UTF-8: {}", e)))?,
        };
        Ok(text)
    }

    /// The envelope `type` of this event.
    pub fn kind(&self) -> &str {
        match self {
            Self::Message { .. } => "message",
            Self::Typing { .. } => "typing",
            Self::Read { .. } => "read",
            Self::Conversation { .. } => "conversation",
            Self::Unknown { kind, .. } => kind,
        }
    }
}

fn payload_of<T: serde::de::DeserializeOwned>(envelope: &RawEnvelope) -> SyncResult<T> {
    T::deserialize(&envelope.payload).map_err(|e| {
        ChatSyncError::Decode(format!("invalid '{}' payload: {}", envelope.kind, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageStatus;

    const MESSAGE_FRAME: &str = r#"{
        "type": "message",
        "payload": {
            "conversationId": "c1",
            "message": {
                "id": "m1",
                "role": "assistant",
                "content": "hello",
                "timestamp": "2025-03-23T10:00:00Z"
            }
        }
    }"#;

    #[test]
    fn test_decode_message_event_fills_conversation_id() {
        let event = TransportEvent::decode(MESSAGE_FRAME.as_bytes()).expect("decode");
        match event {
            TransportEvent::Message {
                conversation_id,
                message,
            } => {
                assert_eq!(conversation_id, "c1");
                assert_eq!(message.conversation_id, "c1");
                assert_eq!(message.status, MessageStatus::Received);
            }
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_typing_defaults() {
        let frame = br#"{"type":"typing","payload":{"conversationId":"c1"}}"#;
        let event = TransportEvent::decode(frame).expect("decode");
        assert_eq!(
            event,
            TransportEvent::Typing {
                conversation_id: "c1".into(),
                participant: UNKNOWN_PARTICIPANT.into(),
                is_typing: true,
            }
        );
    }

    #[test]
    fn test_decode_read_event() {
        let frame = br#"{"type":"read","payload":{"conversationId":"c1","messageId":"m4"}}"#;
        let event = TransportEvent::decode(frame).expect("decode");
        assert_eq!(event.kind(), "read");
    }

    #[test]
    fn test_decode_rejects_non_json() {
        let err = TransportEvent::decode(b"not json at all").unwrap_err();
        assert!(matches!(err, ChatSyncError::Decode(_)));
    }

    #[test]
    fn test_decode_rejects_known_kind_with_bad_payload() {
        let frame = br#"{"type":"message","payload":{"conversationId":"c1"}}"#;
        let err = TransportEvent::decode(frame).unwrap_err();
        assert!(err.to_string().contains("'message' payload"));
    }

    #[test]
    fn test_decode_missing_type_is_error() {
        let err = TransportEvent::decode(br#"{"payload":{}}"#).unwrap_err();
        assert!(matches!(err, ChatSyncError::Decode(_)));
    }

    #[test]
    fn test_unknown_event_reencodes_verbatim() {
        let frame = r#"{"type":"presence","payload":{"online":true,"extra":[1,2]}}"#;
        let event = TransportEvent::decode(frame.as_bytes()).expect("decode");
        assert_eq!(event.kind(), "presence");
        assert_eq!(event.encode().expect("encode"), frame);
    }

    #[test]
    fn test_encode_typing_has_envelope_shape() {
        let event = TransportEvent::Typing {
            conversation_id: "c1".into(),
            participant: "me".into(),
            is_typing: false,
        };
        let value: serde_json::Value =
            serde_json::from_str(&event.encode().expect("encode")).expect("json");
        assert_eq!(value["type"], "typing");
        assert_eq!(value["payload"]["conversationId"], "c1");
        assert_eq!(value["payload"]["userId"], "me");
        assert_eq!(value["payload"]["isTyping"], false);
    }
}
