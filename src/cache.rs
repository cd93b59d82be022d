//! Cache storage module
//!
//! This module provides persistent "fetch-or-reuse" caching with a fixed
//! freshness window. Payloads are opaque bytes stored one file per key; the
//! file modification time is the fetch timestamp.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Cached payloads older than this are refetched
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// Failed to determine cache directory location
    #[error("Failed to determine cache directory location")]
    CacheDirectoryNotFound,

    /// Failed to create or access cache directory
    #[error("Failed to create cache directory at {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read cached data
    #[error("Failed to read cache file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write cached data
    #[error("Failed to write cache file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to remove a cache entry
    #[error("Failed to remove cache file {path}: {source}")]
    RemoveFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The key cannot be used as a file name
    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),
}

/// A stored payload together with the time it was fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub payload: Vec<u8>,
    pub stored_at: SystemTime,
}

/// Persistent key/value storage underneath the freshness cache
pub trait KeyValueStore {
    /// Returns the entry for `key`, or `None` if nothing is stored
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Stores `payload` under `key`, replacing any previous entry
    fn put(&self, key: &str, payload: &[u8], stored_at: SystemTime) -> Result<(), CacheError>;

    /// Removes the entry for `key`; removing a missing entry is not an error
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// A key/value store keeping one file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    /// The directory where cached data is stored
    cache_dir: PathBuf,
}

impl FileStore {
    /// Opens or creates a file store rooted at `cache_dir`
    pub fn open(cache_dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.into();

        fs::create_dir_all(&cache_dir).map_err(|e| CacheError::DirectoryCreationFailed {
            path: cache_dir.clone(),
            source: e,
        })?;

        Ok(Self { cache_dir })
    }

    /// Opens the store in the system's standard cache directory
    ///
    /// - Linux: ~/.cache/episodecourier/
    /// - macOS: ~/Library/Caches/de.westhoffswelt.episodecourier/
    /// - Windows: %LOCALAPPDATA%\westhoffswelt\episodecourier\cache\
    pub fn open_default() -> Result<Self, CacheError> {
        let proj_dirs = directories::ProjectDirs::from("de", "westhoffswelt", "episodecourier")
            .ok_or(CacheError::CacheDirectoryNotFound)?;

        Self::open(proj_dirs.cache_dir())
    }

    /// Returns the path to the cache directory
    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\']) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.cache_dir.join(key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let file_path = self.entry_path(key)?;

        let payload = match fs::read(&file_path) {
            Ok(payload) => payload,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CacheError::ReadFailed {
                    path: file_path,
                    source: e,
                });
            }
        };

        let stored_at = fs::metadata(&file_path)
            .and_then(|metadata| metadata.modified())
            .map_err(|e| CacheError::ReadFailed {
                path: file_path.clone(),
                source: e,
            })?;

        Ok(Some(CacheEntry { payload, stored_at }))
    }

    fn put(&self, key: &str, payload: &[u8], stored_at: SystemTime) -> Result<(), CacheError> {
        let file_path = self.entry_path(key)?;
        let write_failed = |e| CacheError::WriteFailed {
            path: file_path.clone(),
            source: e,
        };

        let mut file = fs::File::create(&file_path).map_err(write_failed)?;
        file.write_all(payload).map_err(write_failed)?;
        file.set_modified(stored_at).map_err(write_failed)?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let file_path = self.entry_path(key)?;

        match fs::remove_file(&file_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::RemoveFailed {
                path: file_path,
                source: e,
            }),
        }
    }
}

/// Fetch-or-reuse layer over a [`KeyValueStore`]
///
/// A stored entry younger than the time-to-live is returned verbatim. Anything
/// else is produced again and overwrites the old entry. Failed productions are
/// never stored.
pub struct FreshnessCache<S> {
    store: S,
    ttl: Duration,
    clock: fn() -> SystemTime,
}

impl<S: KeyValueStore> FreshnessCache<S> {
    /// Creates a cache with the standard 24 hour freshness window
    pub fn new(store: S) -> Self {
        Self {
            store,
            ttl: FRESHNESS_WINDOW,
            clock: SystemTime::now,
        }
    }

    /// Replaces the time source used for freshness checks and timestamps
    pub fn with_clock(mut self, clock: fn() -> SystemTime) -> Self {
        self.clock = clock;
        self
    }

    /// Returns true if a fresh entry exists for `key`
    pub fn is_fresh(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self
            .store
            .get(key)?
            .is_some_and(|entry| is_within_window(entry.stored_at, (self.clock)(), self.ttl)))
    }

    /// Returns the cached payload for `key` or invokes `producer` to create it
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let body = cache.fetch_cached(&url_key(url), || transport.get_text(url).map(String::into_bytes))?;
    /// ```
    pub fn fetch_cached<E, F>(&self, key: &str, producer: F) -> Result<Vec<u8>, E>
    where
        F: FnOnce() -> Result<Vec<u8>, E>,
        E: From<CacheError>,
    {
        let now = (self.clock)();

        if let Some(entry) = self.store.get(key)? {
            if is_within_window(entry.stored_at, now, self.ttl) {
                log::debug!("Cache hit for {}", key);
                return Ok(entry.payload);
            }
            log::debug!("Cache entry {} is stale", key);
        } else {
            log::debug!("Cache miss for {}", key);
        }

        let payload = producer()?;
        self.store.put(key, &payload, now)?;

        Ok(payload)
    }

    /// Drops the entry for `key` so the next fetch produces it again
    pub fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.store.remove(key)
    }
}

fn is_within_window(stored_at: SystemTime, now: SystemTime, ttl: Duration) -> bool {
    match now.duration_since(stored_at) {
        Ok(age) => age < ttl,
        // Timestamp in the future, e.g. after a clock adjustment
        Err(_) => true,
    }
}

/// Encodes a URL into a reversible, file-name safe cache key
pub fn url_key(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(url)
}

/// Builds the cache key of a series metadata bundle
///
/// Ids made of lowercase letters, digits and hyphens are used verbatim. Any
/// other id is encoded behind a leading `_`, which no verbatim key carries,
/// so distinct ids never share an entry.
pub fn series_key(series_id: &str) -> String {
    if is_plain_id(series_id) {
        format!("{}.json", series_id)
    } else {
        format!("_{}.json", url_key(series_id))
    }
}

fn is_plain_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::UNIX_EPOCH;

    fn written_at() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn just_before_expiry() -> SystemTime {
        written_at() + Duration::from_secs(23 * 3600 + 59 * 60)
    }

    fn just_after_expiry() -> SystemTime {
        written_at() + Duration::from_secs(24 * 3600 + 1)
    }

    fn open_cache(dir: &std::path::Path, clock: fn() -> SystemTime) -> FreshnessCache<FileStore> {
        FreshnessCache::new(FileStore::open(dir).unwrap()).with_clock(clock)
    }

    #[test]
    fn test_series_key() {
        assert_eq!(series_key("16498"), "16498.json");
        assert_eq!(series_key("cowboy-bebop"), "cowboy-bebop.json");
        assert!(series_key("a/b").starts_with('_'));
        assert!(!series_key("a/b").contains('/'));
    }

    #[test]
    fn test_series_keys_do_not_collide() {
        let ids = ["AB", "ab", "a.b", "a_b", "a b", "", "_"];
        let keys: std::collections::HashSet<_> = ids.iter().map(|id| series_key(id)).collect();

        assert_eq!(keys.len(), ids.len());
    }

    #[test]
    fn test_url_key_is_reversible_and_path_safe() {
        let url = "http://9anime.to/ajax/film/search?sort=year%3Adesc&keyword=a/b?c";
        let key = url_key(url);

        assert!(!key.contains('/'));
        assert!(!key.contains('\\'));
        assert_eq!(URL_SAFE_NO_PAD.decode(&key).unwrap(), url.as_bytes());
    }

    #[test]
    fn test_fresh_entry_is_reused_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Cell::new(0);

        let writer = open_cache(dir.path(), written_at);
        let first: Result<_, CacheError> = writer.fetch_cached("key", || {
            calls.set(calls.get() + 1);
            Ok(b"original".to_vec())
        });
        assert_eq!(first.unwrap(), b"original");

        let reader = open_cache(dir.path(), just_before_expiry);
        let second: Result<_, CacheError> = reader.fetch_cached("key", || {
            calls.set(calls.get() + 1);
            Ok(b"replacement".to_vec())
        });
        assert_eq!(second.unwrap(), b"original");
        assert_eq!(calls.get(), 1);
        assert!(reader.is_fresh("key").unwrap());
    }

    #[test]
    fn test_stale_entry_is_replaced() {
        let dir = tempfile::tempdir().unwrap();

        let writer = open_cache(dir.path(), written_at);
        let _: Result<_, CacheError> = writer.fetch_cached("key", || Ok(b"old".to_vec()));

        let reader = open_cache(dir.path(), just_after_expiry);
        assert!(!reader.is_fresh("key").unwrap());

        let refreshed: Result<_, CacheError> = reader.fetch_cached("key", || Ok(b"new".to_vec()));
        assert_eq!(refreshed.unwrap(), b"new");
        assert!(reader.is_fresh("key").unwrap());
    }

    #[test]
    fn test_failures_are_not_cached() {
        #[derive(Debug)]
        enum FetchError {
            Upstream,
            Cache,
        }
        impl From<CacheError> for FetchError {
            fn from(_: CacheError) -> Self {
                FetchError::Cache
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(dir.path(), written_at);

        let result = cache.fetch_cached("key", || Err(FetchError::Upstream));
        assert!(matches!(result, Err(FetchError::Upstream)));
        assert!(!dir.path().join("key").exists());
        assert!(!cache.is_fresh("key").unwrap());
    }

    #[test]
    fn test_invalidate_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(dir.path(), written_at);

        let _: Result<_, CacheError> = cache.fetch_cached("16498.json", || Ok(b"{}".to_vec()));
        assert!(dir.path().join("16498.json").exists());

        cache.invalidate("16498.json").unwrap();
        assert!(!dir.path().join("16498.json").exists());

        // Removing twice is fine
        cache.invalidate("16498.json").unwrap();
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert!(matches!(store.get("../escape"), Err(CacheError::InvalidKey(_))));
        assert!(matches!(store.get(""), Err(CacheError::InvalidKey(_))));
    }
}
