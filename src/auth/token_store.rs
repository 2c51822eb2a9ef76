//! Bearer token persistence
//!
//! The [`TokenStore`] trait is the single source of the API bearer token.
//! Both the request client and the WebSocket channel read it on every use,
//! so a login or logout takes effect on the next request or handshake.
//!
//! Two implementations are provided:
//!
//! - [`KeyringTokenStore`] stores the token in the operating system's native
//!   credential store (Keychain on macOS, Secret Service on Linux, Windows
//!   Credential Manager on Windows).
//! - [`MemoryTokenStore`] keeps it in process memory, for tests and for
//!   tokens supplied through configuration.

use std::sync::{Arc, RwLock};

use crate::error::{ChatSyncError, SyncResult};

/// Keyring account under which the bearer token is stored.
pub const TOKEN_ACCOUNT: &str = "authToken";

/// Keyring account of the GitHub access token.
pub const GITHUB_TOKEN_ACCOUNT: &str = "githubToken";

/// Source and sink of the API bearer token.
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    /// The current token, or `None` when signed out.
    ///
    /// Read failures are treated as "no token" and logged.
    fn get_token(&self) -> Option<String>;

    /// Replace the stored token.
    fn set_token(&self, token: &str) -> SyncResult<()>;

    /// Remove the stored token. Clearing an empty store is not an error.
    fn clear_token(&self) -> SyncResult<()>;
}

// ---------------------------------------------------------------------------
// MemoryTokenStore
// ---------------------------------------------------------------------------

/// In-memory token store.
///
/// # Examples
///
/// ```
/// use chatsync::auth::{MemoryTokenStore, TokenStore};
///
/// let store = MemoryTokenStore::with_token("abc");
/// assert_eq!(store.get_token().as_deref(), Some("abc"));
/// store.clear_token().unwrap();
/// assert!(store.get_token().is_none());
/// ```
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_token(&self, token: &str) -> SyncResult<()> {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.to_string());
        Ok(())
    }

    fn clear_token(&self) -> SyncResult<()> {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// KeyringTokenStore
// ---------------------------------------------------------------------------

/// Token store backed by the OS keyring.
///
/// The token lives under `(service, account)`, where the account is
/// `"authToken"` unless built with [`KeyringTokenStore::with_account`]. The
/// keyring itself is stateless; this struct only carries the names.
///
/// # Examples
///
/// ```no_run
/// use chatsync::auth::{KeyringTokenStore, TokenStore};
///
/// let store = KeyringTokenStore::new("chatsync");
/// store.set_token("secret").unwrap();
/// assert_eq!(store.get_token().as_deref(), Some("secret"));
/// ```
#[derive(Debug, Clone)]
pub struct KeyringTokenStore {
    service: String,
    account: String,
}

impl KeyringTokenStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self::with_account(service, TOKEN_ACCOUNT)
    }

    /// A store for another credential under the same service, such as
    /// [`GITHUB_TOKEN_ACCOUNT`].
    pub fn with_account(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    fn entry(&self) -> SyncResult<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.account).map_err(ChatSyncError::Keyring)
    }
}

impl TokenStore for KeyringTokenStore {
    fn get_token(&self) -> Option<String> {
        let entry = match self.entry() {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(service = %self.service, error = %e, "keyring unavailable");
                return None;
            }
        };
        match entry.get_password() {
            Ok(token) => Some(token),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                tracing::warn!(service = %self.service, error = %e, "failed to read token from keyring");
                None
            }
        }
    }

    fn set_token(&self, token: &str) -> SyncResult<()> {
        self.entry()?
            .set_password(token)
            .map_err(ChatSyncError::Keyring)
    }

    /// Idempotent: a missing entry is treated as already cleared.
    fn clear_token(&self) -> SyncResult<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(ChatSyncError::Keyring(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// FallbackTokenStore
// ---------------------------------------------------------------------------

/// A token store that falls back to a fixed API key.
///
/// Reads prefer the wrapped store; when it holds no token the configured API
/// key is used. Writes and clears go to the wrapped store only, so signing
/// out never forgets the configured key.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use chatsync::auth::{FallbackTokenStore, MemoryTokenStore, TokenStore};
///
/// let store = FallbackTokenStore::new(Arc::new(MemoryTokenStore::default()), Some("key".into()));
/// assert_eq!(store.get_token().as_deref(), Some("key"));
/// store.set_token("session").unwrap();
/// assert_eq!(store.get_token().as_deref(), Some("session"));
/// ```
#[derive(Debug)]
pub struct FallbackTokenStore {
    primary: Arc<dyn TokenStore>,
    api_key: Option<String>,
}

impl FallbackTokenStore {
    pub fn new(primary: Arc<dyn TokenStore>, api_key: Option<String>) -> Self {
        Self {
            primary,
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }
}

impl TokenStore for FallbackTokenStore {
    fn get_token(&self) -> Option<String> {
        self.primary.get_token().or_else(|| self.api_key.clone())
    }

    fn set_token(&self, token: &str) -> SyncResult<()> {
        self.primary.set_token(token)
    }

    fn clear_token(&self) -> SyncResult<()> {
        self.primary.clear_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_starts_empty() {
        let store = MemoryTokenStore::default();
        assert!(store.get_token().is_none());
    }

    #[test]
    fn test_memory_store_set_replaces_token() {
        let store = MemoryTokenStore::with_token("old");
        store.set_token("new").unwrap();
        assert_eq!(store.get_token().as_deref(), Some("new"));
    }

    #[test]
    fn test_memory_store_clear_is_idempotent() {
        let store = MemoryTokenStore::default();
        store.clear_token().unwrap();
        store.clear_token().unwrap();
        assert!(store.get_token().is_none());
    }

    #[test]
    fn test_fallback_store_prefers_primary_and_keeps_api_key() {
        let store = FallbackTokenStore::new(
            Arc::new(MemoryTokenStore::with_token("session")),
            Some("configured".into()),
        );
        assert_eq!(store.get_token().as_deref(), Some("session"));
        store.clear_token().unwrap();
        assert_eq!(store.get_token().as_deref(), Some("configured"));
    }

    #[test]
    fn test_fallback_store_ignores_empty_api_key() {
        let store = FallbackTokenStore::new(Arc::new(MemoryTokenStore::default()), Some(String::new()));
        assert!(store.get_token().is_none());
    }

    #[test]
    fn test_keyring_store_accounts() {
        let api = KeyringTokenStore::new("chatsync");
        let github = KeyringTokenStore::with_account("chatsync", GITHUB_TOKEN_ACCOUNT);
        assert_eq!(api.account(), TOKEN_ACCOUNT);
        assert_eq!(github.account(), "githubToken");
        assert_eq!(github.service(), api.service());
    }

    #[test]
    #[ignore = "requires system keyring"]
    fn test_keyring_store_roundtrip() {
        let store = KeyringTokenStore::new("chatsync-test-roundtrip");
        store.set_token("kr-token").expect("set");
        assert_eq!(store.get_token().as_deref(), Some("kr-token"));
        store.clear_token().expect("clear");
        assert!(store.get_token().is_none());
    }

    #[test]
    #[ignore = "requires system keyring"]
    fn test_keyring_clear_missing_entry_is_ok() {
        let store = KeyringTokenStore::new("chatsync-test-never-written");
        assert!(store.clear_token().is_ok());
    }
}
