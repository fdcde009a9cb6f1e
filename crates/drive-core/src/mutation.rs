//! Logical drive operations decomposed into single-blob backend calls.
//!
//! The backend commits every call on its own, so a multi-step operation can
//! stop half way. Rename/move records each step in a [`PendingMutation`] and
//! reports a write-then-failed-delete as [`MutationOutcome::PartialFailure`]:
//! both paths then exist and the next listing shows them.

use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};

use crate::directory::{fetch_listing, list_raw};
use crate::entry::Entry;
use crate::error::DriveError;
use crate::path::{self, SENTINEL_NAME};
use crate::session::DriveSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepKind {
    ReadSource,
    WriteTarget,
    DeleteSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StepState {
    Pending,
    Done,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub kind: StepKind,
    pub path: String,
    pub state: StepState,
}

/// A rename or move in flight, with the state of each of its steps
#[derive(Debug, Clone, Serialize)]
pub struct PendingMutation {
    pub from: String,
    pub to: String,
    pub steps: Vec<Step>,
}

impl PendingMutation {
    fn relocate(from: &str, to: &str) -> Self {
        let step = |kind, path: &str| Step {
            kind,
            path: path.to_string(),
            state: StepState::Pending,
        };
        Self {
            from: from.to_string(),
            to: to.to_string(),
            steps: vec![
                step(StepKind::ReadSource, from),
                step(StepKind::WriteTarget, to),
                step(StepKind::DeleteSource, from),
            ],
        }
    }

    fn mark(&mut self, kind: StepKind, state: StepState) {
        if let Some(step) = self.steps.iter_mut().find(|s| s.kind == kind) {
            step.state = state;
        }
    }

    fn done(&mut self, kind: StepKind) {
        self.mark(kind, StepState::Done);
    }

    fn failed(&mut self, kind: StepKind, err: &DriveError) {
        self.mark(kind, StepState::Failed(err.to_string()));
    }

    /// Steps that reached the backend successfully, in order.
    pub fn completed(&self) -> Vec<StepKind> {
        self.steps
            .iter()
            .filter(|s| s.state == StepState::Done)
            .map(|s| s.kind)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.state == StepState::Done)
    }
}

#[derive(Debug, Clone)]
pub enum MutationOutcome {
    /// Every step applied; `content_id` identifies the blob at the new path
    Completed {
        mutation: PendingMutation,
        content_id: String,
    },
    /// The new path was written but the old one could not be removed
    PartialFailure {
        mutation: PendingMutation,
        error: DriveError,
    },
}

impl MutationOutcome {
    pub fn mutation(&self) -> &PendingMutation {
        match self {
            MutationOutcome::Completed { mutation, .. } => mutation,
            MutationOutcome::PartialFailure { mutation, .. } => mutation,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, MutationOutcome::PartialFailure { .. })
    }
}

/// Result for one entry of a multi-entry operation
#[derive(Debug, Clone)]
pub struct ItemOutcome<T = ()> {
    pub path: String,
    pub result: Result<T, DriveError>,
}

impl<T> ItemOutcome<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Content fetched for a download
#[derive(Debug, Clone)]
pub struct Download {
    pub path: String,
    pub name: String,
    pub content: Bytes,
    pub content_id: String,
    pub size: u64,
    pub download_url: Option<String>,
}

/// Outcome of emptying a folder one blob at a time
#[derive(Debug, Clone)]
pub struct DirectoryDeleteReport {
    pub path: String,
    pub outcomes: Vec<ItemOutcome>,
    /// Subfolders left in place; deletion never recurses
    pub skipped: Vec<String>,
    /// Whether the folder's sentinel marker was removed as well
    pub removed_marker: bool,
    /// Why removing the marker failed; the folder then stays listed
    pub marker_error: Option<DriveError>,
}

impl DirectoryDeleteReport {
    pub fn deleted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.deleted()
    }

    /// No backend call failed, marker removal included.
    pub fn is_clean(&self) -> bool {
        self.failed() == 0 && self.marker_error.is_none()
    }
}

/// Rename a file in place.
pub async fn rename(
    session: &DriveSession,
    entry: &Entry,
    new_name: &str,
) -> Result<MutationOutcome, DriveError> {
    path::validate_name(new_name)?;
    let to = path::join(path::parent_of(&entry.path), new_name);
    relocate(session, entry, to).await
}

/// Move a file into another folder, keeping its name.
pub async fn move_to(
    session: &DriveSession,
    entry: &Entry,
    dest_dir: &str,
) -> Result<MutationOutcome, DriveError> {
    let dest_dir = path::normalize(dest_dir);
    if !dest_dir.is_empty() {
        path::validate_path(&dest_dir)?;
    }
    let to = path::join(&dest_dir, &entry.name);
    relocate(session, entry, to).await
}

/// Read, write at the new path, delete the old path.
///
/// `Err` means the backend was left untouched. After the write succeeds the
/// operation can no longer fail outright; a failed delete comes back as
/// `PartialFailure`.
async fn relocate(
    session: &DriveSession,
    entry: &Entry,
    to: String,
) -> Result<MutationOutcome, DriveError> {
    let expected = file_content_id(entry)?;
    if to == entry.path {
        return Err(DriveError::AlreadyExists { path: to });
    }

    let _guard = session.lock_mutations().await;

    let destination = fetch_listing(session, path::parent_of(&to)).await?;
    if destination.iter().any(|e| e.path == to) {
        return Err(DriveError::AlreadyExists { path: to });
    }

    let store = session.store();
    let mut mutation = PendingMutation::relocate(&entry.path, &to);

    let blob = match session.call(&entry.path, store.get(&entry.path)).await {
        Ok(blob) => blob,
        Err(e) => {
            mutation.failed(StepKind::ReadSource, &e);
            warn!("rename {} -> {}: read failed: {}", entry.path, to, e);
            return Err(e);
        }
    };
    if blob.content_id != expected {
        let e = DriveError::Conflict {
            path: entry.path.clone(),
        };
        mutation.failed(StepKind::ReadSource, &e);
        warn!("rename {} -> {}: content id is stale", entry.path, to);
        return Err(e);
    }
    mutation.done(StepKind::ReadSource);

    let message = format!("Rename: {} → {}", entry.name, path::name_of(&to));
    let content_id = match session
        .call(&to, store.put(&to, &blob.content, &message, None))
        .await
    {
        Ok(id) => id,
        Err(e) => {
            mutation.failed(StepKind::WriteTarget, &e);
            warn!("rename {} -> {}: write failed: {}", entry.path, to, e);
            session.invalidate(&to);
            return Err(e);
        }
    };
    mutation.done(StepKind::WriteTarget);
    session.invalidate(&to);

    let deleted = session
        .call(
            &entry.path,
            store.delete(&entry.path, &blob.content_id, "Delete old file after rename"),
        )
        .await;
    session.invalidate(&entry.path);

    match deleted {
        Ok(()) => {
            mutation.done(StepKind::DeleteSource);
            info!("renamed {} -> {}", entry.path, to);
            Ok(MutationOutcome::Completed {
                mutation,
                content_id,
            })
        }
        Err(e) => {
            mutation.failed(StepKind::DeleteSource, &e);
            warn!(
                "rename {} -> {}: new copy written but old path remains: {}",
                entry.path, to, e
            );
            Ok(MutationOutcome::PartialFailure { mutation, error: e })
        }
    }
}

/// Delete one file, guarded by its content id.
///
/// A stale id fails with `Conflict` (refresh and retry); a path that is
/// already gone fails with `NotFound`.
pub async fn delete_file(session: &DriveSession, entry: &Entry) -> Result<(), DriveError> {
    let content_id = file_content_id(entry)?;
    let _guard = session.lock_mutations().await;
    let message = format!("Delete {}", entry.name);
    delete_blob(session, &entry.path, content_id, &message).await?;
    info!("deleted {}", entry.path);
    Ok(())
}

async fn delete_blob(
    session: &DriveSession,
    path: &str,
    content_id: &str,
    message: &str,
) -> Result<(), DriveError> {
    let result = session
        .call(path, session.store().delete(path, content_id, message))
        .await;
    session.invalidate(path);
    result
}

/// Delete the files directly inside a folder.
///
/// Subfolders are reported in `skipped` and left alone; there is no
/// recursive delete. Once no subfolder remains and every file went, the
/// sentinel marker is removed too so the folder itself disappears.
pub async fn delete_directory(
    session: &DriveSession,
    dir: &str,
) -> Result<DirectoryDeleteReport, DriveError> {
    let dir = path::normalize(dir);
    if dir.is_empty() {
        return Err(DriveError::InvalidName {
            name: dir,
            reason: "the drive root cannot be deleted",
        });
    }

    let _guard = session.lock_mutations().await;

    let raw = list_raw(session, &dir).await?;
    if raw.is_empty() {
        return Err(DriveError::NotFound { path: dir });
    }

    let mut report = DirectoryDeleteReport {
        path: dir.clone(),
        outcomes: Vec::new(),
        skipped: Vec::new(),
        removed_marker: false,
        marker_error: None,
    };
    let mut marker = None;

    for item in raw {
        if item.kind.is_dir() {
            warn!("not descending into {} while deleting {}", item.path, dir);
            report.skipped.push(item.path);
            continue;
        }
        let Some(content_id) = item.content_id.clone() else {
            report.outcomes.push(ItemOutcome {
                result: Err(DriveError::Conflict {
                    path: item.path.clone(),
                }),
                path: item.path,
            });
            continue;
        };
        if item.name == SENTINEL_NAME {
            marker = Some((item.path, content_id));
            continue;
        }
        let message = format!("Delete {}", item.name);
        let result = delete_blob(session, &item.path, &content_id, &message).await;
        if let Err(e) = &result {
            warn!("failed to delete {}: {}", item.path, e);
        }
        report.outcomes.push(ItemOutcome {
            path: item.path,
            result,
        });
    }

    if report.skipped.is_empty() && report.failed() == 0 {
        if let Some((marker_path, content_id)) = marker {
            match delete_blob(session, &marker_path, &content_id, "Delete folder").await {
                Ok(()) => report.removed_marker = true,
                Err(e) => {
                    warn!("failed to remove folder marker {}: {}", marker_path, e);
                    report.marker_error = Some(e);
                }
            }
        }
    }
    session.invalidate(&dir);

    info!(
        "emptied {}: {} deleted, {} failed, {} subfolders skipped",
        dir,
        report.deleted(),
        report.failed(),
        report.skipped.len()
    );
    Ok(report)
}

/// Upload a new file into `dir`.
///
/// The size ceiling is checked before anything is sent.
pub async fn upload(
    session: &DriveSession,
    dir: &str,
    name: &str,
    content: &[u8],
) -> Result<Entry, DriveError> {
    path::validate_name(name)?;
    let dir = path::normalize(dir);
    let target = path::join(&dir, name);
    check_size(session, &target, content.len())?;

    let _guard = session.lock_mutations().await;

    let siblings = fetch_listing(session, &dir).await?;
    if siblings.iter().any(|e| e.path == target) {
        return Err(DriveError::AlreadyExists { path: target });
    }

    let message = format!("Upload {}", name);
    let result = session
        .call(&target, session.store().put(&target, content, &message, None))
        .await;
    session.invalidate(&target);
    let content_id = result?;

    info!("uploaded {} ({} bytes)", target, content.len());
    Ok(Entry::file(&target, content_id, content.len() as u64))
}

/// Overwrite an existing file, guarded by its content id.
pub async fn replace(
    session: &DriveSession,
    entry: &Entry,
    content: &[u8],
) -> Result<Entry, DriveError> {
    let expected = file_content_id(entry)?;
    check_size(session, &entry.path, content.len())?;

    let _guard = session.lock_mutations().await;

    let message = format!("Update {}", entry.name);
    let result = session
        .call(
            &entry.path,
            session
                .store()
                .put(&entry.path, content, &message, Some(expected)),
        )
        .await;
    session.invalidate(&entry.path);
    let content_id = result?;

    info!("updated {} ({} bytes)", entry.path, content.len());
    Ok(Entry::file(&entry.path, content_id, content.len() as u64))
}

/// Fetch a file's content.
pub async fn download(session: &DriveSession, entry: &Entry) -> Result<Download, DriveError> {
    if entry.is_dir() {
        return Err(DriveError::IsADirectory {
            path: entry.path.clone(),
        });
    }
    let blob = session
        .call(&entry.path, session.store().get(&entry.path))
        .await?;
    info!("downloaded {} ({} bytes)", entry.path, blob.content.len());
    Ok(Download {
        name: path::name_of(&blob.path).to_string(),
        size: blob.content.len() as u64,
        path: blob.path,
        content: blob.content,
        content_id: blob.content_id,
        download_url: blob.download_url,
    })
}

fn file_content_id(entry: &Entry) -> Result<&str, DriveError> {
    if entry.is_dir() {
        return Err(DriveError::IsADirectory {
            path: entry.path.clone(),
        });
    }
    // a file without a version token cannot satisfy the precondition
    entry.content_id.as_deref().ok_or_else(|| DriveError::Conflict {
        path: entry.path.clone(),
    })
}

fn check_size(session: &DriveSession, path: &str, len: usize) -> Result<(), DriveError> {
    let max = session.limits().max_blob_bytes;
    if len as u64 > max {
        return Err(DriveError::TooLarge {
            path: path.to_string(),
            size: len as u64,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use drive_platform::{MemoryBlobStore, StoreError, StoreOp};

    use crate::directory::list_directory;
    use crate::session::Limits;

    fn setup() -> (Arc<MemoryBlobStore>, DriveSession) {
        let store = Arc::new(MemoryBlobStore::new());
        let session = DriveSession::new(store.clone(), Limits::default());
        (store, session)
    }

    async fn entry_at(session: &DriveSession, path: &str) -> Entry {
        list_directory(session, path::parent_of(path))
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.path == path)
            .unwrap()
    }

    async fn names(session: &DriveSession, dir: &str) -> Vec<String> {
        let mut names: Vec<String> = list_directory(session, dir)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_rename_moves_content() {
        let (store, session) = setup();
        store.insert("a/x.txt", "hello");
        let entry = entry_at(&session, "a/x.txt").await;

        let outcome = rename(&session, &entry, "y.txt").await.unwrap();
        assert!(!outcome.is_partial());
        assert!(outcome.mutation().is_complete());
        assert_eq!(names(&session, "a").await, vec!["y.txt"]);

        let moved = entry_at(&session, "a/y.txt").await;
        let data = download(&session, &moved).await.unwrap();
        assert_eq!(&data.content[..], b"hello");
    }

    #[tokio::test]
    async fn test_rename_with_failed_delete_leaves_both_paths() {
        let (store, session) = setup();
        store.insert("a/x.txt", "hello");
        let entry = entry_at(&session, "a/x.txt").await;
        store.fail_next(
            StoreOp::Delete,
            Some("a/x.txt"),
            StoreError::unavailable("a/x.txt", "HTTP 502"),
        );

        let outcome = rename(&session, &entry, "y.txt").await.unwrap();
        match &outcome {
            MutationOutcome::PartialFailure { mutation, error } => {
                assert_eq!(
                    mutation.completed(),
                    vec![StepKind::ReadSource, StepKind::WriteTarget]
                );
                assert_eq!(error.path(), Some("a/x.txt"));
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
        assert_eq!(names(&session, "a").await, vec!["x.txt", "y.txt"]);
    }

    #[tokio::test]
    async fn test_rename_write_failure_leaves_source_untouched() {
        let (store, session) = setup();
        store.insert("a/x.txt", "hello");
        let entry = entry_at(&session, "a/x.txt").await;
        store.fail_next(StoreOp::Put, None, StoreError::unavailable("a/y.txt", "HTTP 500"));

        let err = rename(&session, &entry, "y.txt").await.unwrap_err();
        assert!(matches!(err, DriveError::BackendUnavailable { .. }));
        assert_eq!(store.calls(StoreOp::Delete), 0);
        assert_eq!(names(&session, "a").await, vec!["x.txt"]);
    }

    #[tokio::test]
    async fn test_rename_with_stale_id_conflicts_without_writing() {
        let (store, session) = setup();
        store.insert("a/x.txt", "v1");
        let stale = entry_at(&session, "a/x.txt").await;
        store.insert("a/x.txt", "v2");

        let err = rename(&session, &stale, "y.txt").await.unwrap_err();
        assert_eq!(err, DriveError::Conflict { path: "a/x.txt".into() });
        assert_eq!(store.calls(StoreOp::Put), 0);
        assert!(!store.contains("a/y.txt"));

        // retry after re-reading succeeds
        session.invalidate("a");
        let fresh = entry_at(&session, "a/x.txt").await;
        assert!(rename(&session, &fresh, "y.txt").await.is_ok());
    }

    #[tokio::test]
    async fn test_rename_onto_existing_name() {
        let (store, session) = setup();
        store.insert("a/x.txt", "x");
        store.insert("a/y.txt", "y");
        let entry = entry_at(&session, "a/x.txt").await;

        let err = rename(&session, &entry, "y.txt").await.unwrap_err();
        assert_eq!(err, DriveError::AlreadyExists { path: "a/y.txt".into() });
        let err = rename(&session, &entry, "x.txt").await.unwrap_err();
        assert_eq!(err, DriveError::AlreadyExists { path: "a/x.txt".into() });
    }

    #[tokio::test]
    async fn test_rename_directory_rejected() {
        let (store, session) = setup();
        store.insert("a/b/x.txt", "x");
        let dir = entry_at(&session, "a/b").await;
        let err = rename(&session, &dir, "c").await.unwrap_err();
        assert_eq!(err, DriveError::IsADirectory { path: "a/b".into() });
    }

    #[tokio::test]
    async fn test_rename_only_touches_last_segment() {
        let (store, session) = setup();
        store.insert("x/x", "data");
        let entry = entry_at(&session, "x/x").await;
        rename(&session, &entry, "y").await.unwrap();
        assert!(store.contains("x/y"));
        assert!(!store.contains("y/x"));
    }

    #[tokio::test]
    async fn test_move_into_new_folder() {
        let (store, session) = setup();
        store.insert("inbox/report.pdf", "pdf");
        let entry = entry_at(&session, "inbox/report.pdf").await;

        let outcome = move_to(&session, &entry, "archive/2024").await.unwrap();
        assert_eq!(outcome.mutation().to, "archive/2024/report.pdf");
        assert!(store.contains("archive/2024/report.pdf"));
        assert!(list_directory(&session, "inbox").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_stale_is_conflict_missing_is_not_found() {
        let (store, session) = setup();
        store.insert("x.txt", "v1");
        let stale = entry_at(&session, "x.txt").await;
        store.insert("x.txt", "v2");

        let err = delete_file(&session, &stale).await.unwrap_err();
        assert_eq!(err, DriveError::Conflict { path: "x.txt".into() });

        let gone = Entry::file("gone.txt", "abc", 1);
        let err = delete_file(&session, &gone).await.unwrap_err();
        assert_eq!(err, DriveError::NotFound { path: "gone.txt".into() });
    }

    #[tokio::test]
    async fn test_delete_file_updates_listing() {
        let (store, session) = setup();
        store.insert("a/x.txt", "x");
        store.insert("a/y.txt", "y");
        let entry = entry_at(&session, "a/x.txt").await;
        delete_file(&session, &entry).await.unwrap();
        assert_eq!(names(&session, "a").await, vec!["y.txt"]);
    }

    #[tokio::test]
    async fn test_upload_one_byte_over_ceiling_makes_no_call() {
        let store = Arc::new(MemoryBlobStore::new());
        let session = DriveSession::new(
            store.clone(),
            Limits {
                max_blob_bytes: 10,
                ..Limits::default()
            },
        );

        let err = upload(&session, "a", "big.bin", &[0u8; 11]).await.unwrap_err();
        assert_eq!(
            err,
            DriveError::TooLarge {
                path: "a/big.bin".into(),
                size: 11,
                max: 10
            }
        );
        assert_eq!(store.total_calls(), 0);

        assert!(upload(&session, "a", "ok.bin", &[0u8; 10]).await.is_ok());
    }

    #[tokio::test]
    async fn test_upload_rejects_existing_and_reserved_names() {
        let (store, session) = setup();
        store.insert("a/x.txt", "x");
        let err = upload(&session, "a", "x.txt", b"new").await.unwrap_err();
        assert_eq!(err, DriveError::AlreadyExists { path: "a/x.txt".into() });

        let err = upload(&session, "a", SENTINEL_NAME, b"").await.unwrap_err();
        assert!(matches!(err, DriveError::InvalidName { .. }));
    }

    #[tokio::test]
    async fn test_replace_requires_current_id() {
        let (store, session) = setup();
        store.insert("notes.md", "v1");
        let entry = entry_at(&session, "notes.md").await;

        let updated = replace(&session, &entry, b"v2").await.unwrap();
        assert_eq!(updated.size, Some(2));
        assert_eq!(store.content_id("notes.md"), updated.content_id);

        let err = replace(&session, &entry, b"v3").await.unwrap_err();
        assert_eq!(err, DriveError::Conflict { path: "notes.md".into() });
    }

    #[tokio::test]
    async fn test_delete_directory_is_not_recursive() {
        let (store, session) = setup();
        store.insert("a/.gitkeep", "");
        store.insert("a/x.txt", "x");
        store.insert("a/y.txt", "y");
        store.insert("a/sub/z.txt", "z");

        let report = delete_directory(&session, "a").await.unwrap();
        assert_eq!(report.deleted(), 2);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.skipped, vec!["a/sub".to_string()]);
        assert!(!report.removed_marker);
        assert!(store.contains("a/sub/z.txt"));
        assert!(store.contains("a/.gitkeep"));
        assert_eq!(names(&session, "a").await, vec!["sub"]);
    }

    #[tokio::test]
    async fn test_delete_flat_directory_removes_folder() {
        let (store, session) = setup();
        create_dir_with_file(&store);

        let report = delete_directory(&session, "docs").await.unwrap();
        assert_eq!(report.deleted(), 1);
        assert!(report.removed_marker);
        assert!(report.is_clean());
        assert!(store.paths().is_empty());
        assert!(list_directory(&session, "").await.unwrap().is_empty());
    }

    fn create_dir_with_file(store: &MemoryBlobStore) {
        store.insert("docs/.gitkeep", "");
        store.insert("docs/readme.txt", "hi");
    }

    #[tokio::test]
    async fn test_delete_directory_failure_keeps_marker() {
        let (store, session) = setup();
        create_dir_with_file(&store);
        store.fail_next(
            StoreOp::Delete,
            Some("docs/readme.txt"),
            StoreError::unavailable("docs/readme.txt", "HTTP 500"),
        );

        let report = delete_directory(&session, "docs").await.unwrap();
        assert_eq!(report.failed(), 1);
        assert_eq!(report.outcomes[0].path, "docs/readme.txt");
        assert!(!report.removed_marker);
        assert!(store.contains("docs/.gitkeep"));
    }

    #[tokio::test]
    async fn test_delete_directory_reports_marker_failure() {
        let (store, session) = setup();
        create_dir_with_file(&store);
        store.fail_next(
            StoreOp::Delete,
            Some("docs/.gitkeep"),
            StoreError::unavailable("docs/.gitkeep", "HTTP 502"),
        );

        let report = delete_directory(&session, "docs").await.unwrap();
        assert_eq!(report.deleted(), 1);
        assert!(!report.removed_marker);
        assert_eq!(
            report.marker_error.as_ref().and_then(|e| e.path()),
            Some("docs/.gitkeep")
        );
        assert!(!report.is_clean());
        assert!(store.contains("docs/.gitkeep"));
        assert_eq!(names(&session, "").await, vec!["docs"]);
    }

    #[tokio::test]
    async fn test_rename_read_failure_leaves_source_untouched() {
        let (store, session) = setup();
        store.insert("a/x.txt", "hello");
        let entry = entry_at(&session, "a/x.txt").await;
        store.fail_next(
            StoreOp::Get,
            Some("a/x.txt"),
            StoreError::unavailable("a/x.txt", "HTTP 503"),
        );

        let err = rename(&session, &entry, "y.txt").await.unwrap_err();
        assert!(matches!(err, DriveError::BackendUnavailable { .. }));
        assert_eq!(store.calls(StoreOp::Put), 0);
        assert_eq!(store.calls(StoreOp::Delete), 0);
        assert_eq!(names(&session, "a").await, vec!["x.txt"]);
    }

    #[tokio::test]
    async fn test_delete_missing_directory() {
        let (_store, session) = setup();
        let err = delete_directory(&session, "nope").await.unwrap_err();
        assert_eq!(err, DriveError::NotFound { path: "nope".into() });
        assert!(delete_directory(&session, "").await.is_err());
    }
}
