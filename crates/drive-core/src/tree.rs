//! The current directory as a view: load state, snapshot and the
//! filter/sort/search projection rendered from it.

use std::cmp::Ordering;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, warn};

use crate::batch::Selection;
use crate::directory::list_directory;
use crate::entry::Entry;
use crate::error::DriveError;
use crate::file_type::FileCategory;
use crate::format::days_between;
use crate::path;
use crate::session::DriveSession;

/// Label of the root breadcrumb
pub const ROOT_LABEL: &str = "My Drive";

/// Window for the Recent filter, in days
const RECENT_DAYS: u64 = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    #[default]
    All,
    Folders,
    Images,
    Documents,
    Recent,
}

impl FromStr for Filter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Filter::All),
            "folders" => Ok(Filter::Folders),
            "images" => Ok(Filter::Images),
            "documents" | "docs" => Ok(Filter::Documents),
            "recent" => Ok(Filter::Recent),
            other => Err(format!("unknown filter: {}", other)),
        }
    }
}

impl Filter {
    fn accepts(self, entry: &Entry, now: u64) -> bool {
        match self {
            Filter::All => true,
            Filter::Folders => entry.is_dir(),
            Filter::Images => entry.category() == Some(FileCategory::Image),
            Filter::Documents => matches!(
                entry.category(),
                Some(FileCategory::Pdf | FileCategory::Document | FileCategory::Text)
            ),
            Filter::Recent => entry
                .modified
                .is_some_and(|m| days_between(m, now) < RECENT_DAYS),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Name,
    NameDesc,
    Newest,
    Oldest,
    Largest,
    Smallest,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(SortOrder::Name),
            "name_desc" | "name-desc" => Ok(SortOrder::NameDesc),
            "newest" | "date" => Ok(SortOrder::Newest),
            "oldest" | "date_old" => Ok(SortOrder::Oldest),
            "largest" | "size" => Ok(SortOrder::Largest),
            "smallest" | "size_small" => Ok(SortOrder::Smallest),
            other => Err(format!("unknown sort order: {}", other)),
        }
    }
}

impl SortOrder {
    /// Folders always come first; ties fall back to the name.
    fn compare(self, a: &Entry, b: &Entry) -> Ordering {
        let by_kind = b.is_dir().cmp(&a.is_dir());
        let by_name = || a.name.to_lowercase().cmp(&b.name.to_lowercase());
        let primary = match self {
            SortOrder::Name => by_name(),
            SortOrder::NameDesc => by_name().reverse(),
            SortOrder::Newest => b.modified.unwrap_or(0).cmp(&a.modified.unwrap_or(0)),
            SortOrder::Oldest => a.modified.unwrap_or(0).cmp(&b.modified.unwrap_or(0)),
            SortOrder::Largest => b.size.unwrap_or(0).cmp(&a.size.unwrap_or(0)),
            SortOrder::Smallest => a.size.unwrap_or(0).cmp(&b.size.unwrap_or(0)),
        };
        by_kind.then(primary).then_with(by_name)
    }
}

/// Listing of one directory as loaded from the backend
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub path: String,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ViewState {
    #[default]
    Empty,
    Loading {
        path: String,
    },
    Ready(Snapshot),
    Error {
        path: String,
        error: DriveError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub folders: usize,
    pub files: usize,
    pub images: usize,
    pub pdfs: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageUsage {
    pub used_bytes: u64,
    pub quota_bytes: u64,
    /// 0..=100
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub label: String,
    pub path: String,
}

/// State behind a directory browser.
///
/// Filter, sort and search never touch the snapshot; [`TreeView::visible`]
/// recomputes the projection from scratch each time.
#[derive(Debug, Default)]
pub struct TreeView {
    state: ViewState,
    filter: Filter,
    sort: SortOrder,
    search: String,
    selection: Selection,
}

impl TreeView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match &self.state {
            ViewState::Ready(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    /// Directory the view is showing or loading.
    pub fn current_path(&self) -> Option<&str> {
        match &self.state {
            ViewState::Empty => None,
            ViewState::Loading { path } | ViewState::Error { path, .. } => Some(path),
            ViewState::Ready(snapshot) => Some(&snapshot.path),
        }
    }

    /// Enter `Loading` for `path`. Leaving a directory clears the selection.
    pub fn begin_load(&mut self, path: &str) {
        let path = path::normalize(path);
        if self.current_path().is_some_and(|cur| cur != path) {
            self.selection.clear();
        }
        self.state = ViewState::Loading { path };
    }

    /// Settle a load started by [`TreeView::begin_load`].
    ///
    /// A result for a directory other than the one being loaded is dropped.
    pub fn finish_load(&mut self, path: &str, result: Result<Vec<Entry>, DriveError>) {
        let path = path::normalize(path);
        match &self.state {
            ViewState::Loading { path: loading } if *loading == path => {}
            _ => {
                debug!("dropping stale listing for {:?}", path);
                return;
            }
        }
        self.state = match result {
            Ok(entries) => ViewState::Ready(Snapshot { path, entries }),
            Err(error) => {
                warn!("failed to load {:?}: {}", path, error);
                ViewState::Error { path, error }
            }
        };
    }

    pub async fn navigate(&mut self, session: &DriveSession, path: &str) -> Result<(), DriveError> {
        let path = path::normalize(path);
        self.begin_load(&path);
        let result = list_directory(session, &path).await;
        let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
        self.finish_load(&path, result);
        outcome
    }

    /// Reload the current directory from the backend, bypassing the cache.
    pub async fn refresh(&mut self, session: &DriveSession) -> Result<(), DriveError> {
        let path = self.current_path().unwrap_or_default().to_string();
        session.invalidate(&path);
        self.navigate(session, &path).await
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = filter;
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    pub fn set_sort(&mut self, sort: SortOrder) {
        self.sort = sort;
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn set_search(&mut self, query: &str) {
        self.search = query.trim().to_string();
    }

    /// Entries to render right now.
    pub fn visible(&self) -> Vec<&Entry> {
        self.visible_at(now_secs())
    }

    /// Entries to render, with `now` (Unix seconds) as the reference for Recent.
    pub fn visible_at(&self, now: u64) -> Vec<&Entry> {
        let Some(snapshot) = self.snapshot() else {
            return Vec::new();
        };
        let needle = self.search.to_lowercase();
        let mut entries: Vec<&Entry> = snapshot
            .entries
            .iter()
            .filter(|e| self.filter.accepts(e, now))
            .filter(|e| needle.is_empty() || e.name.to_lowercase().contains(&needle))
            .collect();
        entries.sort_by(|a, b| self.sort.compare(a, b));
        entries
    }

    /// Counts over the whole snapshot, ignoring filter and search.
    pub fn stats(&self) -> Stats {
        let mut stats = Stats::default();
        for entry in self.snapshot().map(|s| s.entries.as_slice()).unwrap_or_default() {
            if entry.is_dir() {
                stats.folders += 1;
                continue;
            }
            stats.files += 1;
            stats.total_bytes += entry.size.unwrap_or(0);
            match entry.category() {
                Some(FileCategory::Image) => stats.images += 1,
                Some(FileCategory::Pdf) => stats.pdfs += 1,
                _ => {}
            }
        }
        stats
    }

    pub fn storage_usage(&self, quota_bytes: u64) -> StorageUsage {
        let used_bytes = self.stats().total_bytes;
        let percent = if quota_bytes == 0 {
            if used_bytes > 0 {
                100.0
            } else {
                0.0
            }
        } else {
            (used_bytes as f64 / quota_bytes as f64 * 100.0).min(100.0)
        };
        StorageUsage {
            used_bytes,
            quota_bytes,
            percent,
        }
    }

    /// Root first, then one crumb per path segment.
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        let mut crumbs = vec![Breadcrumb {
            label: ROOT_LABEL.to_string(),
            path: String::new(),
        }];
        let Some(current) = self.current_path() else {
            return crumbs;
        };
        let mut walked = String::new();
        for segment in current.split('/').filter(|s| !s.is_empty()) {
            walked = path::join(&walked, segment);
            crumbs.push(Breadcrumb {
                label: segment.to_string(),
                path: walked.clone(),
            });
        }
        crumbs
    }

    /// Entry in the snapshot with exactly this name.
    pub fn find(&self, name: &str) -> Option<&Entry> {
        self.snapshot()?.entries.iter().find(|e| e.name == name)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Entry in the snapshot at `path`.
    pub fn entry(&self, path: &str) -> Option<&Entry> {
        self.snapshot()?.entries.iter().find(|e| e.path == path)
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    /// Select every entry currently visible.
    pub fn select_visible(&mut self) {
        let paths: Vec<String> = self.visible().into_iter().map(|e| e.path.clone()).collect();
        self.selection.select_all(paths);
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
