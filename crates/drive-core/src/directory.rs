//! Folders on a backend that only stores blobs.
//!
//! A folder exists while at least one blob lives beneath it. An empty folder
//! is kept alive by a zero-length sentinel blob (`.gitkeep`), which never
//! shows up in a listing.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use drive_platform::StoreEntry;

use crate::entry::Entry;
use crate::error::DriveError;
use crate::path::{self, SENTINEL_NAME};
use crate::session::DriveSession;

/// Visible entries directly under `path`.
///
/// A directory the backend has never heard of is indistinguishable from an
/// empty one, so a missing path lists as empty.
pub async fn list_directory(session: &DriveSession, path: &str) -> Result<Vec<Entry>, DriveError> {
    let path = path::normalize(path);
    if let Some(entries) = session.cached_listing(&path) {
        debug!("listing {:?} served from cache ({} entries)", path, entries.len());
        return Ok(entries);
    }
    fetch_listing(session, &path).await
}

/// Fresh listing, bypassing (and refreshing) the cache.
pub(crate) async fn fetch_listing(session: &DriveSession, path: &str) -> Result<Vec<Entry>, DriveError> {
    let path = path::normalize(path);
    let generation = session.listing_generation();
    let raw = list_raw(session, &path).await?;
    let entries = visible_entries(&path, raw);
    session.remember_listing(&path, entries.clone(), generation);
    Ok(entries)
}

/// Backend listing including sentinel markers; missing paths list as empty.
pub(crate) async fn list_raw(session: &DriveSession, path: &str) -> Result<Vec<StoreEntry>, DriveError> {
    match session.call(path, session.store().list(path)).await {
        Ok(raw) => Ok(raw),
        Err(DriveError::NotFound { .. }) => {
            debug!("{:?} not found at backend, treating as empty", path);
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

fn visible_entries(dir: &str, raw: Vec<StoreEntry>) -> Vec<Entry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(raw.len());
    for item in raw {
        if !item.kind.is_dir() && item.name == SENTINEL_NAME {
            continue;
        }
        if !seen.insert(item.path.clone()) {
            warn!("listing of {:?} repeats {}, keeping the first", dir, item.path);
            continue;
        }
        entries.push(Entry::from(item));
    }
    entries
}

/// Create an empty folder by writing its sentinel marker.
///
/// Two clients creating the same folder at once both succeed or the later
/// write wins at the backend; nothing here serializes across clients.
pub async fn create_directory(session: &DriveSession, path: &str) -> Result<(), DriveError> {
    let path = path::validate_path(path)?;
    let _guard = session.lock_mutations().await;

    let siblings = fetch_listing(session, path::parent_of(&path)).await?;
    if siblings.iter().any(|e| e.path == path) {
        return Err(DriveError::AlreadyExists { path });
    }

    let marker = path::join(&path, SENTINEL_NAME);
    let message = format!("Create folder: {}", path::name_of(&path));
    let result = session
        .call(&marker, session.store().put(&marker, b"", &message, None))
        .await;
    session.invalidate(&marker);
    result?;

    info!("created folder {}", path);
    Ok(())
}
