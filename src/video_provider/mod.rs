//! Video provider module
//!
//! A video provider finds a series by title on a video-hosting site, lists
//! its episodes and resolves each episode to the renditions available for
//! download. Two integration shapes exist: a structured catalog client and a
//! raw HTTP/JSON scraping protocol.

mod catalog;
pub(crate) mod raw_http;

pub use catalog::CatalogProvider;
pub use raw_http::RawHttpProvider;

use crate::cache::{CacheError, FreshnessCache, KeyValueStore, url_key};
use crate::episode_matcher::EpisodeNumbering;
use crate::quality::VideoRendition;
use crate::transport::{Transport, TransportError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while querying a video provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request to the provider failed
    #[error("Request failed: {0}")]
    Request(#[from] TransportError),

    /// Reading or writing the page cache failed
    #[error("Page cache error: {0}")]
    Cache(#[from] CacheError),

    /// A JSON response could not be parsed
    #[error("Failed to parse response from {url}: {source}")]
    Json {
        url: String,
        source: serde_json::Error,
    },

    /// A response did not have the expected shape
    #[error("Unexpected response from {url}: {reason}")]
    UnexpectedResponse { url: String, reason: String },

    /// The local catalog index could not be read
    #[error("Failed to read catalog index {path}: {source}")]
    CatalogIndex {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The local catalog index is not valid JSON
    #[error("Failed to parse catalog index {path}: {source}")]
    CatalogIndexFormat {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// An episode entry was produced by a different provider
    #[error("Provider {provider} cannot resolve episode {display_name:?}")]
    ForeignEntry {
        provider: &'static str,
        display_name: String,
    },
}

/// How the renditions of a scraped episode are obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeSource {
    /// The listing already carries the renditions
    Listed(Vec<VideoRendition>),
    /// Provider-side identifiers resolved through follow-up requests
    Remote {
        film_id: String,
        episode_ids: Vec<String>,
    },
}

/// One episode as listed by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedEpisodeEntry {
    /// Free text containing the episode index, e.g. "12" or "Episode 012"
    pub display_name: String,
    pub source: EpisodeSource,
}

/// The episodes a provider lists for one series, in provider order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    /// The title as spelled by the provider
    pub title: String,
    pub url: String,
    pub entries: Vec<ScrapedEpisodeEntry>,
}

/// Capability of a video-hosting source
pub trait VideoProvider {
    /// Short provider name for log output
    fn name(&self) -> &'static str;

    /// How this provider embeds episode indices in display names
    fn numbering(&self) -> EpisodeNumbering;

    /// Looks up the series listing for `title`
    ///
    /// Returns `Ok(None)` if the provider does not know the title.
    fn search(&self, title: &str) -> Result<Option<Listing>, ProviderError>;

    /// Lists the renditions available for an episode
    fn resolve_renditions(
        &self,
        entry: &ScrapedEpisodeEntry,
    ) -> Result<Vec<VideoRendition>, ProviderError>;
}

/// Fetches a page through the page cache
fn fetch_page<T, S>(
    transport: &T,
    cache: &FreshnessCache<S>,
    url: &str,
) -> Result<String, ProviderError>
where
    T: Transport,
    S: KeyValueStore,
{
    let payload = cache.fetch_cached(&url_key(url), || {
        transport
            .get_text(url)
            .map(String::into_bytes)
            .map_err(ProviderError::from)
    })?;

    Ok(String::from_utf8_lossy(&payload).into_owned())
}

fn parse_json<R: serde::de::DeserializeOwned>(url: &str, body: &str) -> Result<R, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::Json {
        url: url.to_string(),
        source: e,
    })
}
