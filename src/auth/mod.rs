//! Authentication
//!
//! Token persistence lives in [`token_store`]. This module adds the sign-in
//! flow against the REST API:
//!
//! - [`AuthService::sign_in`] posts credentials to `auth/login` and stores
//!   the returned token.
//! - [`AuthService::profile`] fetches `auth/profile` with the stored token.
//! - [`AuthService::sign_out`] clears the token. Callers that hold a
//!   [`crate::coordinator::SyncCoordinator`] also reset it so no
//!   conversation data outlives the session.

pub mod token_store;

pub use token_store::{
    FallbackTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore, GITHUB_TOKEN_ACCOUNT,
};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::RequestClient;
use crate::error::SyncResult;

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    user: User,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    user: User,
}

/// Sign-in, profile and sign-out calls.
#[derive(Debug, Clone)]
pub struct AuthService {
    client: RequestClient,
}

impl AuthService {
    pub fn new(client: RequestClient) -> Self {
        Self { client }
    }

    /// Exchange credentials for a token and persist it.
    ///
    /// # Errors
    ///
    /// Propagates request errors; bad credentials surface as
    /// [`crate::error::ChatSyncError::Unauthorized`]. A token that cannot be
    /// persisted surfaces as the store's error.
    pub async fn sign_in(&self, username: &str, password: &str) -> SyncResult<User> {
        let response: LoginResponse = self
            .client
            .post(
                "auth/login",
                Some(&json!({ "username": username, "password": password })),
            )
            .await?;
        self.client.tokens().set_token(&response.token)?;
        tracing::info!(username = %response.user.username, "signed in");
        Ok(response.user)
    }

    /// Fetch the profile of the user owning the current token.
    ///
    /// A 401 is returned as [`crate::error::ChatSyncError::Unauthorized`];
    /// the token is left in place so the caller decides whether to sign out.
    pub async fn profile(&self) -> SyncResult<User> {
        let response: ProfileResponse = self.client.get("auth/profile", None).await?;
        Ok(response.user)
    }

    pub fn is_signed_in(&self) -> bool {
        self.client.tokens().get_token().is_some()
    }

    pub fn sign_out(&self) -> SyncResult<()> {
        self.client.tokens().clear_token()?;
        tracing::info!("signed out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_decodes_without_avatar() {
        let user: User =
            serde_json::from_str(r#"{"id":"u1","name":"Ada","username":"ada"}"#).unwrap();
        assert_eq!(user.username, "ada");
        assert!(user.avatar_url.is_none());
    }

    #[test]
    fn test_user_decodes_camel_case_avatar() {
        let user: User = serde_json::from_str(
            r#"{"id":"u1","name":"Ada","username":"ada","avatarUrl":"https://a/x.png"}"#,
        )
        .unwrap();
        assert_eq!(user.avatar_url.as_deref(), Some("https://a/x.png"));
    }
}
