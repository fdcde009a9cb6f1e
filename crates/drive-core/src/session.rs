use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use drive_platform::{BlobStore, StoreError};

use crate::entry::Entry;
use crate::error::DriveError;
use crate::path;

/// Operational limits for a session
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_blob_bytes: u64,
    pub max_selection: usize,
    pub download_delay: Duration,
    pub request_timeout: Duration,
    pub listing_ttl: Duration,
    pub quota_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_blob_bytes: 25 * 1024 * 1024,
            max_selection: 5,
            download_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
            listing_ttl: Duration::from_secs(5),
            quota_bytes: 1024 * 1024 * 1024,
        }
    }
}

/// Short-lived directory listings keyed by normalized path
struct ListingCache {
    ttl: Duration,
    listings: HashMap<String, (Instant, Vec<Entry>)>,
    /// Bumped on every invalidation
    generation: u64,
}

impl ListingCache {
    fn get(&self, path: &str) -> Option<Vec<Entry>> {
        let (fetched, entries) = self.listings.get(path)?;
        (fetched.elapsed() < self.ttl).then(|| entries.clone())
    }

    /// Store a listing read while the cache was at `generation`. A listing
    /// read before an invalidation may predate the change and is dropped.
    fn put(&mut self, path: &str, entries: Vec<Entry>, generation: u64) {
        if self.ttl.is_zero() {
            return;
        }
        if generation != self.generation {
            debug!("discarding listing of {:?} read before an invalidation", path);
            return;
        }
        self.listings.insert(path.to_string(), (Instant::now(), entries));
    }

    /// Drop every listing whose contents a change at `changed` can affect:
    /// its ancestors (a folder may appear or vanish) and anything beneath it.
    fn invalidate(&mut self, changed: &str) {
        self.generation += 1;
        self.listings
            .retain(|key, _| !(path::is_within(changed, key) || path::is_within(key, changed)));
    }
}

/// Everything a drive operation needs: the store, limits, the listing cache
/// and the lock that serializes mutations.
///
/// One session corresponds to one authenticated backend; pass it explicitly
/// to every operation.
pub struct DriveSession {
    store: Arc<dyn BlobStore>,
    limits: Limits,
    listings: Mutex<ListingCache>,
    mutations: tokio::sync::Mutex<()>,
}

impl DriveSession {
    pub fn new(store: Arc<dyn BlobStore>, limits: Limits) -> Self {
        let listings = ListingCache {
            ttl: limits.listing_ttl,
            listings: HashMap::new(),
            generation: 0,
        };
        Self {
            store,
            limits,
            listings: Mutex::new(listings),
            mutations: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store(&self) -> &dyn BlobStore {
        self.store.as_ref()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Run one backend call under the request timeout.
    pub(crate) async fn call<T, F>(&self, path: &str, fut: F) -> Result<T, DriveError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.limits.request_timeout, fut).await {
            Ok(result) => result.map_err(DriveError::from),
            Err(_) => {
                warn!(
                    "backend call for {} timed out after {:?}",
                    path, self.limits.request_timeout
                );
                Err(DriveError::BackendUnavailable {
                    path: path.to_string(),
                    reason: format!("timed out after {:?}", self.limits.request_timeout),
                })
            }
        }
    }

    /// Hold for the whole duration of a mutation.
    pub(crate) async fn lock_mutations(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.mutations.lock().await
    }

    pub(crate) fn cached_listing(&self, path: &str) -> Option<Vec<Entry>> {
        self.listings().get(path)
    }

    /// Take before reading a listing; pass to [`DriveSession::remember_listing`].
    pub(crate) fn listing_generation(&self) -> u64 {
        self.listings().generation
    }

    pub(crate) fn remember_listing(&self, path: &str, entries: Vec<Entry>, generation: u64) {
        self.listings().put(path, entries, generation);
    }

    /// Forget cached listings affected by a change at `path`.
    pub fn invalidate(&self, path: &str) {
        debug!("invalidating cached listings for {:?}", path);
        self.listings().invalidate(path);
    }

    fn listings(&self) -> MutexGuard<'_, ListingCache> {
        self.listings.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_platform::MemoryBlobStore;

    fn session_with(limits: Limits) -> DriveSession {
        DriveSession::new(Arc::new(MemoryBlobStore::new()), limits)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_listing_expires() {
        let session = session_with(Limits::default());
        let generation = session.listing_generation();
        session.remember_listing("a", vec![Entry::directory("a/b")], generation);
        assert!(session.cached_listing("a").is_some());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(session.cached_listing("a").is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let session = session_with(Limits {
            listing_ttl: Duration::ZERO,
            ..Limits::default()
        });
        session.remember_listing("a", vec![], session.listing_generation());
        assert!(session.cached_listing("a").is_none());
    }

    #[tokio::test]
    async fn test_listing_read_before_invalidation_is_not_cached() {
        let session = session_with(Limits::default());
        let before = session.listing_generation();
        session.invalidate("a/x.txt");

        session.remember_listing("a", vec![Entry::file("a/old.txt", "id", 1)], before);
        assert!(session.cached_listing("a").is_none());

        session.remember_listing("a", vec![], session.listing_generation());
        assert!(session.cached_listing("a").is_some());
    }

    #[tokio::test]
    async fn test_invalidate_hits_ancestors_and_descendants() {
        let session = session_with(Limits::default());
        let generation = session.listing_generation();
        for p in ["", "a", "a/b", "a/b/c", "other"] {
            session.remember_listing(p, vec![], generation);
        }
        session.invalidate("a/b");

        assert!(session.cached_listing("").is_none());
        assert!(session.cached_listing("a").is_none());
        assert!(session.cached_listing("a/b").is_none());
        assert!(session.cached_listing("a/b/c").is_none());
        assert!(session.cached_listing("other").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_times_out_as_unavailable() {
        let session = session_with(Limits {
            request_timeout: Duration::from_secs(2),
            ..Limits::default()
        });
        let hung = std::future::pending::<Result<(), StoreError>>();
        let err = session.call("a/x.txt", hung).await.unwrap_err();
        match err {
            DriveError::BackendUnavailable { path, reason } => {
                assert_eq!(path, "a/x.txt");
                assert!(reason.contains("timed out"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
