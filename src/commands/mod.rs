/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `conversations` - List and create conversations
- `chat`          - Live chat session on one conversation
- `files`         - Remote file operations
- `auth`          - Sign in, sign out, whoami
- `github`        - Browse GitHub repositories

The handlers are thin: they wire the library components together from the
loaded [`Config`] and print results. None of them writes to the
conversation store directly.
*/

use std::sync::Arc;

use crate::auth::{FallbackTokenStore, KeyringTokenStore, TokenStore};
use crate::client::RequestClient;
use crate::config::Config;
use crate::error::Result;

pub mod auth;
pub mod chat;
pub mod conversations;
pub mod files;
pub mod github;

/// Token store for the CLI: the OS keyring, falling back to the configured
/// API key.
pub fn token_store(config: &Config) -> Arc<dyn TokenStore> {
    Arc::new(FallbackTokenStore::new(
        Arc::new(KeyringTokenStore::new(&config.auth.keyring_service)),
        config.settings.api_key.clone(),
    ))
}

/// Request client for the configured API.
pub fn request_client(config: &Config, tokens: Arc<dyn TokenStore>) -> Result<RequestClient> {
    Ok(RequestClient::new(
        config.api.base_url()?,
        tokens,
        config.api.timeout(),
        config.api.connect_timeout(),
    )?)
}

/// Shorten `text` to at most `max` characters, marking the cut with `...`.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn test_request_client_rejects_bad_base_url() {
        let mut config = Config::default();
        config.api.base_url = "ftp://example.com".to_string();
        let tokens: Arc<dyn TokenStore> = Arc::new(crate::auth::MemoryTokenStore::default());
        assert!(request_client(&config, tokens).is_err());
    }
}
