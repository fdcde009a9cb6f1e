use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    #[serde(rename = "dir")]
    Directory,
}

impl EntryKind {
    pub fn is_dir(&self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

/// One item of a backend listing, before any sentinel filtering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    /// Version token of the blob; directories carry none
    pub content_id: Option<String>,
    pub size: u64,
    /// Unix seconds, when the backend reports one
    pub modified: Option<u64>,
}

/// Whole-blob read result
#[derive(Debug, Clone)]
pub struct Blob {
    pub path: String,
    pub content: Bytes,
    pub content_id: String,
    pub size: u64,
    /// Direct link to the raw content, when the backend exposes one
    pub download_url: Option<String>,
}

/// Flat, path-addressed blob storage where every change is its own commit.
///
/// There are no directories, transactions or renames at this level. Writes
/// over an existing blob and deletes take the blob's current content id as a
/// precondition and fail with [`StoreError::Conflict`] when it is stale.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Immediate children of `path` ("" is the root).
    async fn list(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError>;

    async fn get(&self, path: &str) -> Result<Blob, StoreError>;

    /// Create (`expected_content_id == None`) or update a blob. Returns the
    /// new content id.
    async fn put(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        expected_content_id: Option<&str>,
    ) -> Result<String, StoreError>;

    async fn delete(
        &self,
        path: &str,
        expected_content_id: &str,
        message: &str,
    ) -> Result<(), StoreError>;
}
