//! Error types for chatsync
//!
//! This module defines the error taxonomy shared by the request client, the
//! transport channel, and the sync coordinator, using `thiserror` for
//! ergonomic error handling.
//!
//! Core component APIs return [`SyncResult`] so callers can match on the
//! error kind (retryable network failure vs. schema drift vs. expired
//! credentials). Application plumbing such as configuration loading and the
//! CLI uses the [`Result`] alias backed by `anyhow`.

use thiserror::Error;

/// Main error type for chatsync operations
#[derive(Error, Debug)]
pub enum ChatSyncError {
    /// Transient network failure (connect, timeout, reset). Retryable.
    #[error("Network error: {0}")]
    Network(String),

    /// Response body did not match the expected schema. Not retryable;
    /// indicates protocol drift between client and server.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The server rejected the credentials (HTTP 401). Requires
    /// re-authentication and is never retried silently.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Non-2xx response other than 401
    #[error("Request failed with status {status}: {message}")]
    Request {
        /// HTTP status code returned by the server
        status: u16,
        /// Server-provided message, or the status reason
        message: String,
    },

    /// The transport channel was unavailable when sending
    #[error("Transport error: {0}")]
    Transport(String),

    /// Hydrating a conversation failed
    #[error("Failed to load conversation {conversation_id}: {source}")]
    Load {
        /// Conversation that was being opened
        conversation_id: String,
        /// Underlying request failure
        #[source]
        source: Box<ChatSyncError>,
    },

    /// An operation needed an open conversation session
    #[error("No conversation is open")]
    NoActiveSession,

    /// A message referenced by id is not in the store
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// The operation was cancelled because its session closed
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ChatSyncError {
    /// Returns `true` when retrying the same operation may succeed.
    ///
    /// Network failures, rate limiting, and server-side errors are
    /// retryable. Decode failures, authentication failures, and client
    /// errors are not.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatsync::error::ChatSyncError;
    ///
    /// assert!(ChatSyncError::Network("reset".into()).is_retryable());
    /// assert!(!ChatSyncError::Decode("missing field".into()).is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Request { status, .. } => *status == 429 || *status >= 500,
            Self::Load { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Returns `true` when the error requires the user to sign in again.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Unauthorized(_) => true,
            Self::Load { source, .. } => source.is_unauthorized(),
            _ => false,
        }
    }

    /// Maps a `reqwest` failure to `Network` or `Decode`.
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Result type for the sync core components
pub type SyncResult<T> = std::result::Result<T, ChatSyncError>;

/// Result type alias for application-level operations
///
/// Uses `anyhow::Error` so configuration and CLI code can attach context
/// while still carrying a [`ChatSyncError`] underneath.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_display() {
        let error = ChatSyncError::Network("connection reset".to_string());
        assert_eq!(error.to_string(), "Network error: connection reset");
    }

    #[test]
    fn test_request_error_display() {
        let error = ChatSyncError::Request {
            status: 404,
            message: "conversation not found".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Request failed with status 404: conversation not found"
        );
    }

    #[test]
    fn test_load_error_wraps_source() {
        let error = ChatSyncError::Load {
            conversation_id: "c1".to_string(),
            source: Box::new(ChatSyncError::Network("timeout".to_string())),
        };
        let s = error.to_string();
        assert!(s.contains("c1"));
        assert!(s.contains("timeout"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ChatSyncError::Network("x".into()).is_retryable());
        assert!(ChatSyncError::Request {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(ChatSyncError::Request {
            status: 429,
            message: "slow down".into()
        }
        .is_retryable());
        assert!(!ChatSyncError::Request {
            status: 400,
            message: "bad".into()
        }
        .is_retryable());
        assert!(!ChatSyncError::Decode("x".into()).is_retryable());
        assert!(!ChatSyncError::Unauthorized("x".into()).is_retryable());
        assert!(!ChatSyncError::Transport("x".into()).is_retryable());
    }

    #[test]
    fn test_load_error_inherits_classification() {
        let retryable = ChatSyncError::Load {
            conversation_id: "c1".into(),
            source: Box::new(ChatSyncError::Network("down".into())),
        };
        assert!(retryable.is_retryable());

        let auth = ChatSyncError::Load {
            conversation_id: "c1".into(),
            source: Box::new(ChatSyncError::Unauthorized("expired".into())),
        };
        assert!(!auth.is_retryable());
        assert!(auth.is_unauthorized());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: ChatSyncError = io_error.into();
        assert!(matches!(error, ChatSyncError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: ChatSyncError = json_error.into();
        assert!(matches!(error, ChatSyncError::Serialization(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: : yaml").unwrap_err();
        let error: ChatSyncError = yaml_error.into();
        assert!(matches!(error, ChatSyncError::Yaml(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ChatSyncError>();
    }
}
