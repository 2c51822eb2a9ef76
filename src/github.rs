//! GitHub repository browser endpoints
//!
//! [`GitHubClient`] reads the signed-in user, their repositories, branches
//! and file trees from the GitHub REST API. It runs on a [`RequestClient`]
//! rooted at the GitHub API URL whose token store holds a GitHub access
//! token (kept in the keyring under
//! [`crate::auth::GITHUB_TOKEN_ACCOUNT`], separate from the chat token).
//!
//! Every call fails fast with [`ChatSyncError::Unauthorized`] when no token
//! is stored, without touching the network.

use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::RequestClient;
use crate::error::{ChatSyncError, SyncResult};

/// Public GitHub API root.
pub const GITHUB_API_URL: &str = "https://api.github.com";

const GITHUB_MEDIA_TYPE: &str = "application/vnd.github.v3+json";

/// Results per repository search.
const SEARCH_PAGE_SIZE: u32 = 10;

/// A GitHub account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub id: u64,
    pub login: String,
    pub avatar_url: String,
    pub html_url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

/// A repository as listed by GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubRepository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: GitHubUser,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "private")]
    pub is_private: bool,
    pub html_url: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub language: Option<String>,
    pub default_branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubCommit {
    pub sha: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubBranch {
    pub name: String,
    pub commit: GitHubCommit,
    #[serde(default)]
    pub protected: bool,
}

/// Kind of a repository tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    File,
    Dir,
    Symlink,
    Submodule,
}

/// A file or directory in a repository tree.
///
/// `content` is only present when a single file was requested; GitHub
/// sends it base64 encoded with line breaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubContent {
    pub name: String,
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    pub url: String,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

impl GitHubContent {
    pub fn is_dir(&self) -> bool {
        self.kind == ContentKind::Dir
    }

    /// Decoded UTF-8 text of a file entry.
    ///
    /// # Errors
    ///
    /// [`ChatSyncError::Decode`] when the entry carries no inline content,
    /// the base64 payload is malformed, or the file is not UTF-8.
    pub fn text(&self) -> SyncResult<String> {
        let content = self.content.as_deref().ok_or_else(|| {
            ChatSyncError::Decode(format!("{} has no inline content", self.path))
        })?;
        match self.encoding.as_deref() {
            Some("base64") => {
                let compact: String = content.split_whitespace().collect();
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(compact)
                    .map_err(|e| ChatSyncError::Decode(format!("{}: {}", self.path, e)))?;
                String::from_utf8(bytes).map_err(|_| {
                    ChatSyncError::Decode(format!("{} is not a text file", self.path))
                })
            }
            _ => Ok(content.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResult<T> {
    items: Vec<T>,
}

/// Typed client for the GitHub endpoints.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: RequestClient,
}

impl GitHubClient {
    pub fn new(client: RequestClient) -> Self {
        Self {
            client: client.with_header(ACCEPT, HeaderValue::from_static(GITHUB_MEDIA_TYPE)),
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.client.tokens().get_token().is_some()
    }

    /// Store `token` and check it against `GET /user`. A rejected token is
    /// removed again.
    pub async fn sign_in_with_token(&self, token: &str) -> SyncResult<GitHubUser> {
        self.client.tokens().set_token(token)?;
        match self.current_user().await {
            Ok(user) => {
                tracing::info!(login = %user.login, "signed in to GitHub");
                Ok(user)
            }
            Err(e) => {
                self.client.tokens().clear_token()?;
                Err(e)
            }
        }
    }

    pub fn sign_out(&self) -> SyncResult<()> {
        self.client.tokens().clear_token()
    }

    pub async fn current_user(&self) -> SyncResult<GitHubUser> {
        self.get("user", None).await
    }

    /// Repositories of the signed-in user, most recently updated first.
    pub async fn repositories(&self) -> SyncResult<Vec<GitHubRepository>> {
        self.get("user/repos", Some(&json!({ "sort": "updated" })))
            .await
    }

    /// Search all repositories. A blank query returns nothing without a
    /// request.
    pub async fn search_repositories(&self, query: &str) -> SyncResult<Vec<GitHubRepository>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let result: SearchResult<GitHubRepository> = self
            .get(
                "search/repositories",
                Some(&json!({
                    "q": query,
                    "sort": "updated",
                    "per_page": SEARCH_PAGE_SIZE,
                })),
            )
            .await?;
        Ok(result.items)
    }

    pub async fn repository(&self, owner: &str, repo: &str) -> SyncResult<GitHubRepository> {
        self.get(&format!("repos/{}/{}", owner, repo), None).await
    }

    pub async fn branches(&self, owner: &str, repo: &str) -> SyncResult<Vec<GitHubBranch>> {
        self.get(&format!("repos/{}/{}/branches", owner, repo), None)
            .await
    }

    /// Entries of a directory, directories first, then by name. An empty
    /// `path` is the repository root; `git_ref` defaults to the default
    /// branch.
    pub async fn contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> SyncResult<Vec<GitHubContent>> {
        let mut entries: Vec<GitHubContent> = self
            .get(&contents_path(owner, repo, path), Some(&json!({ "ref": git_ref })))
            .await?;
        entries.sort_by(|a, b| b.is_dir().cmp(&a.is_dir()).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }

    /// A single file, with its content. See [`GitHubContent::text`].
    pub async fn file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> SyncResult<GitHubContent> {
        self.get(&contents_path(owner, repo, path), Some(&json!({ "ref": git_ref })))
            .await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Option<&serde_json::Value>,
    ) -> SyncResult<T> {
        if !self.is_signed_in() {
            return Err(ChatSyncError::Unauthorized(
                "not signed in to GitHub".to_string(),
            ));
        }
        self.client.get(path, params).await
    }
}

fn contents_path(owner: &str, repo: &str, path: &str) -> String {
    let path = path.trim_matches('/');
    if path.is_empty() {
        format!("repos/{}/{}/contents", owner, repo)
    } else {
        format!("repos/{}/{}/contents/{}", owner, repo, path)
    }
}

/// The branch to browse first: the repository's default branch when
/// listed, otherwise the first one.
pub fn initial_branch<'a>(
    repository: &GitHubRepository,
    branches: &'a [GitHubBranch],
) -> Option<&'a GitHubBranch> {
    branches
        .iter()
        .find(|b| b.name == repository.default_branch)
        .or_else(|| branches.first())
}

/// The directory above `path`; the root is its own parent.
///
/// ```
/// use chatsync::github::parent_path;
///
/// assert_eq!(parent_path("src/transport/mod.rs"), "src/transport");
/// assert_eq!(parent_path("README.md"), "");
/// assert_eq!(parent_path(""), "");
/// ```
pub fn parent_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    match parts.split_last() {
        Some((_, rest)) => rest.join("/"),
        None => String::new(),
    }
}

/// Split `owner/repo`.
pub fn parse_repo_slug(slug: &str) -> SyncResult<(&str, &str)> {
    match slug.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => Err(ChatSyncError::Config(format!(
            "expected a repository as owner/name, got '{}'",
            slug
        ))),
    }
}
