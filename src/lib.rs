//! chatsync - conversation synchronization core
//!
//! This library keeps a local conversation/message store consistent with a
//! chat server that is reached two ways at once: REST request/response calls
//! and an out-of-order, at-least-once WebSocket event stream.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `transport`: Reconnecting WebSocket event channel and typed events
//! - `client`: Typed HTTP request client with bearer-token injection
//! - `api`: Conversation REST endpoints behind the `ConversationApi` trait
//! - `store`: In-memory conversation store with change notifications
//! - `coordinator`: Session state machine tying the pieces together
//! - `auth`: Token storage and sign-in
//! - `files`: Remote file endpoints
//! - `github`: GitHub repository browser endpoints
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli` / `commands`: Command-line front end
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chatsync::{Config, ConversationStore, RequestClient, SyncCoordinator, WebSocketChannel};
//! use chatsync::auth::MemoryTokenStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/chatsync.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let tokens = Arc::new(MemoryTokenStore::with_token("token"));
//!     let client = RequestClient::new(
//!         config.api.base_url()?,
//!         tokens.clone(),
//!         config.api.timeout(),
//!         config.api.connect_timeout(),
//!     )?;
//!     let channel = Arc::new(WebSocketChannel::connect(
//!         config.api.ws_url()?,
//!         tokens,
//!         config.transport.backoff(),
//!     ));
//!     let coordinator = SyncCoordinator::new(
//!         Arc::new(client),
//!         channel,
//!         ConversationStore::new(config.store.pending_capacity),
//!         "me",
//!     );
//!     coordinator.open_conversation("c1").await?;
//!     coordinator.send_message("hello").await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod files;
pub mod github;
pub mod model;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use api::ConversationApi;
pub use client::RequestClient;
pub use config::Config;
pub use coordinator::{SessionState, SyncCoordinator};
pub use error::{ChatSyncError, Result, SyncResult};
pub use model::{Conversation, Message, MessageRole, MessageStatus};
pub use store::{ConversationStore, StoreChange};
pub use transport::{ConnectionState, EventChannel, TransportEvent, WebSocketChannel};
