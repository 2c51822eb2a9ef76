//! Typed HTTP request client
//!
//! [`RequestClient`] wraps a `reqwest::Client` with three responsibilities:
//!
//! - Resolve endpoint paths against the configured API base URL.
//! - Attach `Authorization: Bearer <token>` to every request when the token
//!   store holds a token. The client never refreshes tokens itself.
//! - Map every outcome onto [`ChatSyncError`]:
//!
//! | Outcome                          | Error                         |
//! |----------------------------------|-------------------------------|
//! | connect/timeout/reset            | [`ChatSyncError::Network`]    |
//! | HTTP 401                         | [`ChatSyncError::Unauthorized`] |
//! | other non-2xx                    | [`ChatSyncError::Request`]    |
//! | body does not match `T`          | [`ChatSyncError::Decode`]     |

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::TokenStore;
use crate::error::{ChatSyncError, SyncResult};

/// Typed request/response client for the REST API.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use chatsync::auth::MemoryTokenStore;
/// use chatsync::client::RequestClient;
/// use chatsync::model::ConversationList;
///
/// # async fn example() -> chatsync::error::SyncResult<()> {
/// let client = RequestClient::new(
///     url::Url::parse("https://api.example.com/").unwrap(),
///     Arc::new(MemoryTokenStore::with_token("token")),
///     Duration::from_secs(30),
///     Duration::from_secs(10),
/// )?;
/// let list: ConversationList = client.get("conversations", None).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RequestClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn TokenStore>,
    headers: HeaderMap,
}

const USER_AGENT: &str = concat!("chatsync/", env!("CARGO_PKG_VERSION"));

impl RequestClient {
    /// Build a client for `base_url`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root; a trailing slash is added when missing so
    ///   relative paths resolve beneath it.
    /// * `tokens` - Source of the bearer token, read on every request.
    /// * `timeout` - Whole-request timeout.
    /// * `connect_timeout` - TCP/TLS connect timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ChatSyncError::Config`] if the HTTP client cannot be built
    /// (for example when TLS initialisation fails).
    pub fn new(
        mut base_url: Url,
        tokens: Arc<dyn TokenStore>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> SyncResult<Self> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ChatSyncError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url,
            tokens,
            headers: HeaderMap::new(),
        })
    }

    /// Send `name: value` with every request, replacing an earlier value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The token store this client reads credentials from.
    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Issue a request and decode the response body into `T`.
    ///
    /// For `GET` and `DELETE`, `params` must be a JSON object and is sent as
    /// the query string. For other methods it is sent as the JSON body.
    /// An empty success body decodes as JSON `null`, so `T = ()` or
    /// `Option<_>` work for endpoints without a body.
    ///
    /// # Errors
    ///
    /// See the module documentation for the error mapping.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: Option<&serde_json::Value>,
    ) -> SyncResult<T> {
        let url = self.endpoint(path)?;
        tracing::debug!(method = %method, url = %url, "request");

        let mut builder = self
            .http
            .request(method.clone(), url)
            .headers(self.headers.clone());
        if let Some(params) = params {
            builder = if method == Method::GET || method == Method::DELETE {
                builder.query(&query_pairs(params)?)
            } else {
                builder.json(params)
            };
        }
        if let Some(token) = self.tokens.get_token() {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(ChatSyncError::from_reqwest)?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ChatSyncError::Network(format!("failed to read response body: {}", e)))?;

        if status == StatusCode::UNAUTHORIZED {
            tracing::debug!(method = %method, path, "request unauthorized");
            return Err(ChatSyncError::Unauthorized(error_message(status, &body)));
        }
        if !status.is_success() {
            tracing::debug!(method = %method, path, status = status.as_u16(), "request failed");
            return Err(ChatSyncError::Request {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }

        let payload: &[u8] = if body.is_empty() { b"null" } else { &body };
        serde_json::from_slice(payload).map_err(|e| {
            ChatSyncError::Decode(format!("{} {}: {}", method, path, e))
        })
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Option<&serde_json::Value>,
    ) -> SyncResult<T> {
        self.request(Method::GET, path, params).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Option<&serde_json::Value>,
    ) -> SyncResult<T> {
        self.request(Method::POST, path, params).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Option<&serde_json::Value>,
    ) -> SyncResult<T> {
        self.request(Method::PUT, path, params).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Option<&serde_json::Value>,
    ) -> SyncResult<T> {
        self.request(Method::DELETE, path, params).await
    }

    fn endpoint(&self, path: &str) -> SyncResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ChatSyncError::Config(format!("invalid endpoint path '{}': {}", path, e)))
    }
}

/// Flatten a JSON object into query pairs. Strings are used verbatim; other
/// scalars use their JSON text.
fn query_pairs(params: &serde_json::Value) -> SyncResult<Vec<(String, String)>> {
    let object = params.as_object().ok_or_else(|| {
        ChatSyncError::Config("query parameters must be a JSON object".to_string())
    })?;
    Ok(object
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect())
}

/// Human-readable message for an error response.
///
/// Prefers a JSON `message` or `error` field, then the raw body text, then
/// the status reason phrase.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    if !text.is_empty() {
        return text;
    }
    status
        .canonical_reason()
        .unwrap_or("unknown error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;
    use serde_json::json;

    fn client(base: &str) -> RequestClient {
        RequestClient::new(
            Url::parse(base).unwrap(),
            Arc::new(MemoryTokenStore::default()),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .expect("client")
    }

    #[test]
    fn test_endpoint_resolves_under_base_path() {
        let c = client("https://api.example.com/v1");
        assert_eq!(
            c.endpoint("conversations/c1").unwrap().as_str(),
            "https://api.example.com/v1/conversations/c1"
        );
        assert_eq!(
            c.endpoint("/files/list").unwrap().as_str(),
            "https://api.example.com/v1/files/list"
        );
    }

    #[test]
    fn test_query_pairs_stringifies_scalars() {
        let pairs = query_pairs(&json!({"path": "/src", "limit": 5, "skip": null})).unwrap();
        assert!(pairs.contains(&("path".to_string(), "/src".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "5".to_string())));
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_query_pairs_rejects_non_object() {
        assert!(query_pairs(&json!(["a"])).is_err());
    }

    #[test]
    fn test_error_message_prefers_json_fields() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, br#"{"message":"bad title"}"#),
            "bad title"
        );
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, br#"{"error":"nope"}"#),
            "nope"
        );
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, b"upstream down"),
            "upstream down"
        );
        assert_eq!(error_message(StatusCode::NOT_FOUND, b""), "Not Found");
    }
}
