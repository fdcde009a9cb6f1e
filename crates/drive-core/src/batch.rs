//! Multi-entry operations over the current selection.
//!
//! Items run strictly one after another. A failing item is recorded and the
//! batch moves on; only an oversized selection rejects the whole batch, and
//! it does so before any backend call.

use std::collections::BTreeSet;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::entry::Entry;
use crate::error::DriveError;
use crate::mutation::{self, Download, ItemOutcome};
use crate::session::DriveSession;
use crate::tree::TreeView;

/// Paths marked for a batch operation.
///
/// Keyed by path and resolved against the current snapshot only when a batch
/// runs, so a selection never holds on to a stale content id.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    paths: BTreeSet<String>,
}

impl Selection {
    pub fn select(&mut self, path: impl Into<String>) -> bool {
        self.paths.insert(path.into())
    }

    pub fn deselect(&mut self, path: &str) -> bool {
        self.paths.remove(path)
    }

    /// Flip membership; returns whether `path` is now selected.
    pub fn toggle(&mut self, path: &str) -> bool {
        if self.paths.remove(path) {
            false
        } else {
            self.paths.insert(path.to_string());
            true
        }
    }

    pub fn select_all<I: IntoIterator<Item = String>>(&mut self, paths: I) {
        self.paths.extend(paths);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}

/// Per-item results of a batch with aggregate counts
#[derive(Debug, Clone)]
pub struct BatchReport<T = ()> {
    pub outcomes: Vec<ItemOutcome<T>>,
    pub succeeded: usize,
    pub failed: usize,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            outcomes: Vec::new(),
            succeeded: 0,
            failed: 0,
        }
    }
}

impl<T> BatchReport<T> {
    fn push(&mut self, path: String, result: Result<T, DriveError>) {
        match &result {
            Ok(_) => self.succeeded += 1,
            Err(e) => {
                warn!("batch item {} failed: {}", path, e);
                self.failed += 1;
            }
        }
        self.outcomes.push(ItemOutcome { path, result });
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &DriveError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.path.as_str(), e)))
    }
}

/// Progress of a running batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Started { total: usize },
    ItemFinished { index: usize, path: String, ok: bool },
    Finished { succeeded: usize, failed: usize },
}

pub struct BatchCoordinator<'a> {
    session: &'a DriveSession,
    progress: Option<mpsc::UnboundedSender<BatchEvent>>,
}

impl<'a> BatchCoordinator<'a> {
    pub fn new(session: &'a DriveSession) -> Self {
        Self {
            session,
            progress: None,
        }
    }

    /// Report progress on `tx` as items complete.
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<BatchEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Delete every selected file, then clear the selection and reload the view.
    pub async fn delete_selected(&self, view: &mut TreeView) -> Result<BatchReport, DriveError> {
        let resolved = self.resolve(view)?;
        self.emit(BatchEvent::Started {
            total: resolved.len(),
        });

        let mut report = BatchReport::default();
        for (index, (path, entry)) in resolved.into_iter().enumerate() {
            let result = match entry {
                Some(entry) => mutation::delete_file(self.session, &entry).await,
                None => Err(DriveError::NotFound { path: path.clone() }),
            };
            self.record(&mut report, index, path, result);
        }

        self.finish(view, &report, "delete");
        if let Err(e) = view.refresh(self.session).await {
            warn!("reload after batch delete failed: {}", e);
        }
        Ok(report)
    }

    /// Download every selected file, pausing between backend calls.
    pub async fn download_selected(
        &self,
        view: &mut TreeView,
    ) -> Result<BatchReport<Download>, DriveError> {
        let resolved = self.resolve(view)?;
        self.emit(BatchEvent::Started {
            total: resolved.len(),
        });

        let delay = self.session.limits().download_delay;
        let mut report = BatchReport::default();
        let mut issued = false;
        for (index, (path, entry)) in resolved.into_iter().enumerate() {
            let result = match entry {
                Some(entry) => {
                    if issued && !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    issued = true;
                    mutation::download(self.session, &entry).await
                }
                None => Err(DriveError::NotFound { path: path.clone() }),
            };
            self.record(&mut report, index, path, result);
        }

        self.finish(view, &report, "download");
        Ok(report)
    }

    /// Upload several files into `dir`, one at a time.
    pub async fn upload_many(
        &self,
        dir: &str,
        files: Vec<(String, Vec<u8>)>,
    ) -> BatchReport<Entry> {
        self.emit(BatchEvent::Started { total: files.len() });

        let mut report = BatchReport::default();
        for (index, (name, content)) in files.into_iter().enumerate() {
            let path = crate::path::join(dir, &name);
            let result = mutation::upload(self.session, dir, &name, &content).await;
            self.record(&mut report, index, path, result);
        }

        self.emit(BatchEvent::Finished {
            succeeded: report.succeeded,
            failed: report.failed,
        });
        info!(
            "uploaded {} of {} files into {:?}",
            report.succeeded,
            report.outcomes.len(),
            dir
        );
        report
    }

    /// Check the cap, then map each selected path to its snapshot entry.
    fn resolve(&self, view: &TreeView) -> Result<Vec<(String, Option<Entry>)>, DriveError> {
        let max = self.session.limits().max_selection;
        let count = view.selection().len();
        if count > max {
            return Err(DriveError::SelectionTooLarge { count, max });
        }
        Ok(view
            .selection()
            .iter()
            .map(|path| (path.to_string(), view.entry(path).cloned()))
            .collect())
    }

    fn record<T>(
        &self,
        report: &mut BatchReport<T>,
        index: usize,
        path: String,
        result: Result<T, DriveError>,
    ) {
        self.emit(BatchEvent::ItemFinished {
            index,
            path: path.clone(),
            ok: result.is_ok(),
        });
        report.push(path, result);
    }

    fn finish<T>(&self, view: &mut TreeView, report: &BatchReport<T>, what: &str) {
        view.selection_mut().clear();
        self.emit(BatchEvent::Finished {
            succeeded: report.succeeded,
            failed: report.failed,
        });
        info!(
            "batch {}: {} succeeded, {} failed",
            what, report.succeeded, report.failed
        );
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(tx) = &self.progress {
            // a dropped receiver only means nobody is watching
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use drive_platform::{MemoryBlobStore, StoreError, StoreOp};

    use crate::session::Limits;

    async fn loaded(files: &[&str]) -> (Arc<MemoryBlobStore>, DriveSession, TreeView) {
        let store = Arc::new(MemoryBlobStore::new());
        for f in files {
            store.insert(*f, f.to_string());
        }
        let session = DriveSession::new(store.clone(), Limits::default());
        let mut view = TreeView::new();
        view.navigate(&session, "d").await.unwrap();
        (store, session, view)
    }

    #[test]
    fn test_selection_basics() {
        let mut sel = Selection::default();
        assert!(sel.select("a"));
        assert!(!sel.select("a"));
        assert!(!sel.toggle("a"));
        assert!(sel.toggle("b"));
        sel.select_all(vec!["c".to_string(), "d".to_string()]);
        assert_eq!(sel.iter().collect::<Vec<_>>(), vec!["b", "c", "d"]);
        assert!(sel.deselect("c"));
        sel.clear();
        assert!(sel.is_empty());
    }

    #[tokio::test]
    async fn test_six_items_rejected_before_any_call() {
        let files = ["d/1", "d/2", "d/3", "d/4", "d/5", "d/6"];
        let (store, session, mut view) = loaded(&files).await;
        view.select_visible();
        let before = store.total_calls();

        let err = BatchCoordinator::new(&session)
            .delete_selected(&mut view)
            .await
            .unwrap_err();
        assert_eq!(err, DriveError::SelectionTooLarge { count: 6, max: 5 });
        assert_eq!(store.total_calls(), before);
        assert_eq!(view.selection().len(), 6);

        let err = BatchCoordinator::new(&session)
            .download_selected(&mut view)
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::SelectionTooLarge { .. }));
        assert_eq!(store.total_calls(), before);
    }

    #[tokio::test]
    async fn test_delete_failure_is_isolated() {
        let (store, session, mut view) = loaded(&["d/a", "d/b", "d/c"]).await;
        view.select_visible();
        store.fail_next(
            StoreOp::Delete,
            Some("d/b"),
            StoreError::unavailable("d/b", "HTTP 500"),
        );

        let report = BatchCoordinator::new(&session)
            .delete_selected(&mut view)
            .await
            .unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        let failures: Vec<&str> = report.failures().map(|(p, _)| p).collect();
        assert_eq!(failures, vec!["d/b"]);
        assert!(view.selection().is_empty());
        assert_eq!(store.paths(), vec!["d/b".to_string()]);
        assert_eq!(view.snapshot().unwrap().entries.len(), 1);
    }

    #[tokio::test]
    async fn test_unresolved_selection_fails_without_call() {
        let (store, session, mut view) = loaded(&["d/a"]).await;
        view.selection_mut().select("d/gone");
        let before = store.total_calls();

        let report = BatchCoordinator::new(&session)
            .download_selected(&mut view)
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert!(report.outcomes[0].result.as_ref().unwrap_err().is_not_found());
        assert_eq!(store.total_calls(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_downloads_are_spaced_out() {
        let (_store, session, mut view) = loaded(&["d/a", "d/b", "d/c"]).await;
        view.select_visible();

        let start = tokio::time::Instant::now();
        let report = BatchCoordinator::new(&session)
            .download_selected(&mut view)
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(report.succeeded, 3);
        assert_eq!(&report.outcomes[1].result.as_ref().unwrap().content[..], b"d/b");
        assert!(elapsed >= Duration::from_millis(1000), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1500), "{:?}", elapsed);
        assert!(view.selection().is_empty());
    }

    #[tokio::test]
    async fn test_progress_events() {
        let (_store, session, mut view) = loaded(&["d/a", "d/b"]).await;
        view.select_visible();
        let (tx, mut rx) = mpsc::unbounded_channel();

        BatchCoordinator::new(&session)
            .with_progress(tx)
            .delete_selected(&mut view)
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.first(), Some(&BatchEvent::Started { total: 2 }));
        assert_eq!(
            events[1],
            BatchEvent::ItemFinished {
                index: 0,
                path: "d/a".into(),
                ok: true
            }
        );
        assert_eq!(
            events.last(),
            Some(&BatchEvent::Finished {
                succeeded: 2,
                failed: 0
            })
        );
    }

    #[tokio::test]
    async fn test_upload_many_is_not_capped() {
        let store = Arc::new(MemoryBlobStore::new());
        let session = DriveSession::new(
            store.clone(),
            Limits {
                max_blob_bytes: 4,
                ..Limits::default()
            },
        );
        let mut files: Vec<(String, Vec<u8>)> =
            (0..7).map(|i| (format!("f{}.txt", i), b"ok".to_vec())).collect();
        files.push(("big.bin".into(), vec![0; 5]));

        let report = BatchCoordinator::new(&session)
            .upload_many("up", files)
            .await;
        assert_eq!(report.succeeded, 7);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures().next().unwrap().0, "up/big.bin");
        assert_eq!(store.paths().len(), 7);
    }
}
