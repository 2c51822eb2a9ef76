//! File REST endpoints
//!
//! Thin typed wrappers over the `files/*` endpoints. Listing and reading
//! return data; the mutating calls return `()` and turn a
//! `{"success": false}` reply into an error so callers need only `?`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::RequestClient;
use crate::error::{ChatSyncError, SyncResult};

/// A file or directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileItem {
    pub path: String,
    pub name: String,
    pub is_directory: bool,
    #[serde(default)]
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileItem>>,
}

/// Reply of the mutating file endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileOperationResult {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl FileOperationResult {
    /// Convert an unsuccessful reply into [`ChatSyncError::Request`].
    ///
    /// The reply arrived with a 2xx status, so the error carries status 200
    /// and the server's message, or `"<operation> failed"` when it sent none.
    pub fn into_result(self, operation: &str) -> SyncResult<()> {
        if self.success {
            return Ok(());
        }
        Err(ChatSyncError::Request {
            status: 200,
            message: self
                .message
                .unwrap_or_else(|| format!("{} failed", operation)),
        })
    }
}

#[derive(Debug, Deserialize)]
struct FileListResponse {
    files: Vec<FileItem>,
}

#[derive(Debug, Deserialize)]
struct FileContentResponse {
    content: String,
}

/// Typed client for the file endpoints.
#[derive(Debug, Clone)]
pub struct FileClient {
    client: RequestClient,
}

impl FileClient {
    pub fn new(client: RequestClient) -> Self {
        Self { client }
    }

    /// Entries of the directory at `path`, directories first, then by name.
    pub async fn list(&self, path: &str) -> SyncResult<Vec<FileItem>> {
        let response: FileListResponse = self
            .client
            .get("files/list", Some(&json!({ "path": path })))
            .await?;
        let mut files = response.files;
        files.sort_by(|a, b| {
            b.is_directory
                .cmp(&a.is_directory)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(files)
    }

    pub async fn content(&self, path: &str) -> SyncResult<String> {
        let response: FileContentResponse = self
            .client
            .get("files/content", Some(&json!({ "path": path })))
            .await?;
        Ok(response.content)
    }

    pub async fn save(&self, path: &str, content: &str) -> SyncResult<()> {
        self.operation("files/save", "save", json!({ "path": path, "content": content }))
            .await
    }

    pub async fn create(&self, path: &str, content: &str) -> SyncResult<()> {
        self.operation("files/create", "create", json!({ "path": path, "content": content }))
            .await
    }

    pub async fn mkdir(&self, path: &str) -> SyncResult<()> {
        self.operation("files/mkdir", "mkdir", json!({ "path": path }))
            .await
    }

    pub async fn delete(&self, path: &str) -> SyncResult<()> {
        let result: FileOperationResult = self
            .client
            .delete("files/delete", Some(&json!({ "path": path })))
            .await?;
        result.into_result("delete")
    }

    pub async fn rename(&self, old_path: &str, new_path: &str) -> SyncResult<()> {
        self.operation(
            "files/rename",
            "rename",
            json!({ "oldPath": old_path, "newPath": new_path }),
        )
        .await
    }

    async fn operation(
        &self,
        endpoint: &str,
        operation: &str,
        body: serde_json::Value,
    ) -> SyncResult<()> {
        let result: FileOperationResult = self.client.post(endpoint, Some(&body)).await?;
        tracing::debug!(operation, success = result.success, "file operation");
        result.into_result(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_item_decodes_nested_children() {
        let json = r#"{
            "path": "/src",
            "name": "src",
            "isDirectory": true,
            "size": 0,
            "modifiedAt": "2025-03-23T10:00:00Z",
            "children": [
                {"path": "/src/main.rs", "name": "main.rs", "isDirectory": false,
                 "size": 120, "modifiedAt": "2025-03-23T09:00:00Z"}
            ]
        }"#;
        let item: FileItem = serde_json::from_str(json).expect("decode");
        assert!(item.is_directory);
        let children = item.children.expect("children");
        assert_eq!(children[0].size, 120);
        assert!(children[0].children.is_none());
    }

    #[test]
    fn test_failed_operation_uses_server_message() {
        let result = FileOperationResult {
            success: false,
            message: Some("permission denied".into()),
        };
        match result.into_result("save") {
            Err(ChatSyncError::Request { status, message }) => {
                assert_eq!(status, 200);
                assert_eq!(message, "permission denied");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_failed_operation_without_message() {
        let result = FileOperationResult {
            success: false,
            message: None,
        };
        let err = result.into_result("mkdir").unwrap_err();
        assert!(err.to_string().contains("mkdir failed"));
    }
}
