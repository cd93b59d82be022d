//! Cached metadata provider implementation
//!
//! This module provides a caching wrapper for metadata providers that
//! stores each series bundle as one JSON document with a 24 hour lifetime.

use super::{MetadataProvider, MetadataRetrievalError, SeriesBundle};
use crate::cache::{CacheError, FreshnessCache, KeyValueStore, series_key};

/// A caching wrapper for metadata providers
///
/// Fresh bundles are returned verbatim. Stale or unreadable bundles are
/// fetched again and replace the stored document as a whole.
pub struct CachedMetadataProvider<P, S>
where
    P: MetadataProvider,
    S: KeyValueStore,
{
    /// The underlying metadata provider
    provider: P,
    /// Cache storage for series bundles
    cache: FreshnessCache<S>,
}

impl<P, S> CachedMetadataProvider<P, S>
where
    P: MetadataProvider,
    S: KeyValueStore,
{
    /// Creates a new cached metadata provider wrapping the given provider
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let jikan = JikanProvider::new(&transport);
    /// let cache = FreshnessCache::new(FileStore::open("cache")?);
    /// let cached = CachedMetadataProvider::new(jikan, cache);
    /// ```
    pub fn new(provider: P, cache: FreshnessCache<S>) -> Self {
        Self { provider, cache }
    }

    /// Removes the cached bundle of `series_id`, forcing a refetch next time
    pub fn invalidate(&self, series_id: &str) -> Result<(), CacheError> {
        log::debug!("Invalidating metadata cache for series {}", series_id);
        self.cache.invalidate(&series_key(series_id))
    }

    fn fetch_and_encode(&self, series_id: &str) -> Result<Vec<u8>, MetadataRetrievalError> {
        let bundle = self.provider.fetch_series(series_id)?;
        serde_json::to_vec(&bundle).map_err(|e| MetadataRetrievalError::InvalidData(e.to_string()))
    }
}

impl<P, S> MetadataProvider for CachedMetadataProvider<P, S>
where
    P: MetadataProvider,
    S: KeyValueStore,
{
    fn fetch_series(&self, series_id: &str) -> Result<SeriesBundle, MetadataRetrievalError> {
        let key = series_key(series_id);
        let payload = self
            .cache
            .fetch_cached(&key, || self.fetch_and_encode(series_id))?;

        match serde_json::from_slice(&payload) {
            Ok(bundle) => Ok(bundle),
            Err(e) => {
                // Unreadable documents are replaced rather than patched
                log::warn!("Discarding unreadable cache entry {}: {}", key, e);
                self.cache.invalidate(&key)?;
                let payload = self
                    .cache
                    .fetch_cached(&key, || self.fetch_and_encode(series_id))?;

                serde_json::from_slice(&payload)
                    .map_err(|e| MetadataRetrievalError::InvalidData(e.to_string()))
            }
        }
    }
}
