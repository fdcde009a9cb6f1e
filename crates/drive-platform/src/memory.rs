//! In-memory blob store.
//!
//! Behaves like the remote contents API (flat paths, content-hash ids,
//! precondition checks, 404 on empty prefixes) and adds fault injection and
//! per-operation call counters so the layers above can be tested without a
//! network.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::StoreError;
use crate::store::{Blob, BlobStore, EntryKind, StoreEntry};

/// Default per-blob ceiling, matching the remote API limit (25 MB)
pub const DEFAULT_MAX_BLOB_BYTES: u64 = 25 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    List,
    Get,
    Put,
    Delete,
}

#[derive(Debug, Clone)]
struct StoredBlob {
    content: Bytes,
    content_id: String,
    modified: u64,
}

#[derive(Debug)]
struct Fault {
    op: StoreOp,
    path: Option<String>,
    error: StoreError,
}

#[derive(Debug, Default)]
struct Inner {
    blobs: BTreeMap<String, StoredBlob>,
    faults: Vec<Fault>,
    calls: HashMap<StoreOp, usize>,
}

#[derive(Debug)]
pub struct MemoryBlobStore {
    inner: Mutex<Inner>,
    max_blob_bytes: u64,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::with_max_blob_bytes(DEFAULT_MAX_BLOB_BYTES)
    }

    pub fn with_max_blob_bytes(max_blob_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_blob_bytes,
        }
    }

    /// Seed a blob directly, bypassing call counting and faults.
    pub fn insert(&self, path: &str, content: impl Into<Bytes>) -> String {
        let path = normalize(path);
        let content = content.into();
        let content_id = content_id_for(&content);
        self.lock().blobs.insert(
            path,
            StoredBlob {
                content,
                content_id: content_id.clone(),
                modified: now_secs(),
            },
        );
        content_id
    }

    /// Current content id at `path`, if a blob lives there.
    pub fn content_id(&self, path: &str) -> Option<String> {
        self.lock()
            .blobs
            .get(&normalize(path))
            .map(|b| b.content_id.clone())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().blobs.contains_key(&normalize(path))
    }

    /// All stored blob paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.lock().blobs.keys().cloned().collect()
    }

    /// Make the next `op` (optionally only on `path`) fail with `error`.
    pub fn fail_next(&self, op: StoreOp, path: Option<&str>, error: StoreError) {
        self.lock().faults.push(Fault {
            op,
            path: path.map(normalize),
            error,
        });
    }

    /// Number of calls issued for `op` so far.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call and pop a matching injected fault, if any.
    fn enter(inner: &mut Inner, op: StoreOp, path: &str) -> Result<(), StoreError> {
        *inner.calls.entry(op).or_insert(0) += 1;
        let hit = inner
            .faults
            .iter()
            .position(|f| f.op == op && f.path.as_deref().map_or(true, |p| p == path));
        match hit {
            Some(idx) => {
                let fault = inner.faults.remove(idx);
                debug!("memory store: injected {:?} failure on {}", op, path);
                Err(fault.error)
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError> {
        let path = normalize(path);
        let mut inner = self.lock();
        Self::enter(&mut inner, StoreOp::List, &path)?;

        if inner.blobs.contains_key(&path) {
            return Err(StoreError::NotADirectory { path });
        }

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };

        let mut children: BTreeMap<String, StoreEntry> = BTreeMap::new();
        for (key, blob) in inner.blobs.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                None => {
                    children.insert(
                        rest.to_string(),
                        StoreEntry {
                            name: rest.to_string(),
                            path: key.clone(),
                            kind: EntryKind::File,
                            content_id: Some(blob.content_id.clone()),
                            size: blob.content.len() as u64,
                            modified: Some(blob.modified),
                        },
                    );
                }
                Some((dir, _)) => {
                    children.entry(dir.to_string()).or_insert_with(|| StoreEntry {
                        name: dir.to_string(),
                        path: format!("{}{}", prefix, dir),
                        kind: EntryKind::Directory,
                        content_id: None,
                        size: 0,
                        modified: None,
                    });
                }
            }
        }

        if children.is_empty() {
            return Err(StoreError::NotFound { path });
        }
        Ok(children.into_values().collect())
    }

    async fn get(&self, path: &str) -> Result<Blob, StoreError> {
        let path = normalize(path);
        let mut inner = self.lock();
        Self::enter(&mut inner, StoreOp::Get, &path)?;

        let blob = inner
            .blobs
            .get(&path)
            .ok_or_else(|| StoreError::not_found(&path))?;
        Ok(Blob {
            path: path.clone(),
            content: blob.content.clone(),
            content_id: blob.content_id.clone(),
            size: blob.content.len() as u64,
            download_url: None,
        })
    }

    async fn put(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        expected_content_id: Option<&str>,
    ) -> Result<String, StoreError> {
        let path = normalize(path);
        let mut inner = self.lock();
        Self::enter(&mut inner, StoreOp::Put, &path)?;

        if content.len() as u64 > self.max_blob_bytes {
            return Err(StoreError::TooLarge {
                path,
                size: content.len() as u64,
                max: self.max_blob_bytes,
            });
        }

        // a blob cannot sit under another blob, nor shadow a directory prefix
        let mut ancestor = path.as_str();
        while let Some((parent, _)) = ancestor.rsplit_once('/') {
            if inner.blobs.contains_key(parent) {
                return Err(StoreError::conflict(&path));
            }
            ancestor = parent;
        }
        let dir_prefix = format!("{}/", path);
        if inner.blobs.keys().any(|k| k.starts_with(&dir_prefix)) {
            return Err(StoreError::conflict(&path));
        }

        let current = inner.blobs.get(&path).map(|b| b.content_id.as_str());
        match (current, expected_content_id) {
            (None, None) => {}
            (Some(cur), Some(exp)) if cur == exp => {}
            _ => return Err(StoreError::conflict(&path)),
        }

        let content = Bytes::copy_from_slice(content);
        let content_id = content_id_for(&content);
        debug!("memory store: put {} ({} bytes): {}", path, content.len(), message);
        inner.blobs.insert(
            path,
            StoredBlob {
                content,
                content_id: content_id.clone(),
                modified: now_secs(),
            },
        );
        Ok(content_id)
    }

    async fn delete(
        &self,
        path: &str,
        expected_content_id: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        let path = normalize(path);
        let mut inner = self.lock();
        Self::enter(&mut inner, StoreOp::Delete, &path)?;

        match inner.blobs.get(&path) {
            None => Err(StoreError::not_found(&path)),
            Some(b) if b.content_id != expected_content_id => Err(StoreError::conflict(&path)),
            Some(_) => {
                debug!("memory store: delete {}: {}", path, message);
                inner.blobs.remove(&path);
                Ok(())
            }
        }
    }
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Git-style blob id: hash over a `blob <len>\0` header and the content.
fn content_id_for(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
