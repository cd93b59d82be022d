//! Structured catalog provider
//!
//! A local catalog index maps series names to catalog URLs. Each catalog URL
//! serves a JSON document listing the episodes together with their video
//! links, so no per-episode requests are needed.

use super::{
    EpisodeSource, Listing, ProviderError, ScrapedEpisodeEntry, VideoProvider, fetch_page,
    parse_json,
};
use crate::cache::{FreshnessCache, KeyValueStore};
use crate::episode_matcher::EpisodeNumbering;
use crate::quality::VideoRendition;
use crate::transport::Transport;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// An entry of the catalog index file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogIndexEntry {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct CatalogSeries {
    episodes: Vec<CatalogEpisode>,
}

#[derive(Debug, Deserialize)]
struct CatalogEpisode {
    /// e.g. "Episode 012"
    name: String,
    #[serde(default)]
    video_links: Vec<CatalogVideoLink>,
}

#[derive(Debug, Deserialize)]
struct CatalogVideoLink {
    /// Quality label, e.g. "720p"
    name: String,
    url: String,
}

/// Video provider backed by a structured catalog
pub struct CatalogProvider<T: Transport, S: KeyValueStore> {
    transport: T,
    page_cache: FreshnessCache<S>,
    index: Vec<CatalogIndexEntry>,
}

impl<T: Transport, S: KeyValueStore> CatalogProvider<T, S> {
    pub fn new(transport: T, page_cache: FreshnessCache<S>, index: Vec<CatalogIndexEntry>) -> Self {
        Self {
            transport,
            page_cache,
            index,
        }
    }

    /// Creates a provider reading the catalog index from a JSON file
    pub fn open(
        transport: T,
        page_cache: FreshnessCache<S>,
        index_path: &Path,
    ) -> Result<Self, ProviderError> {
        let content = fs::read_to_string(index_path).map_err(|e| ProviderError::CatalogIndex {
            path: index_path.to_path_buf(),
            source: e,
        })?;

        let index = serde_json::from_str(&content).map_err(|e| {
            ProviderError::CatalogIndexFormat {
                path: index_path.to_path_buf(),
                source: e,
            }
        })?;

        Ok(Self::new(transport, page_cache, index))
    }
}

impl<T: Transport, S: KeyValueStore> VideoProvider for CatalogProvider<T, S> {
    fn name(&self) -> &'static str {
        "catalog"
    }

    fn numbering(&self) -> EpisodeNumbering {
        EpisodeNumbering::EpisodeLabel
    }

    fn search(&self, title: &str) -> Result<Option<Listing>, ProviderError> {
        let wanted = title.to_lowercase();
        let Some(entry) = self
            .index
            .iter()
            .find(|entry| entry.name.to_lowercase() == wanted)
        else {
            return Ok(None);
        };

        let body = fetch_page(&self.transport, &self.page_cache, &entry.url)?;
        let series: CatalogSeries = parse_json(&entry.url, &body)?;

        let entries = series
            .episodes
            .into_iter()
            .map(|episode| ScrapedEpisodeEntry {
                display_name: episode.name,
                source: EpisodeSource::Listed(
                    episode
                        .video_links
                        .into_iter()
                        .map(|link| VideoRendition::new(link.name, link.url))
                        .collect(),
                ),
            })
            .collect();

        Ok(Some(Listing {
            title: entry.name.clone(),
            url: entry.url.clone(),
            entries,
        }))
    }

    fn resolve_renditions(
        &self,
        entry: &ScrapedEpisodeEntry,
    ) -> Result<Vec<VideoRendition>, ProviderError> {
        match &entry.source {
            EpisodeSource::Listed(renditions) => Ok(renditions.clone()),
            EpisodeSource::Remote { .. } => Err(ProviderError::ForeignEntry {
                provider: self.name(),
                display_name: entry.display_name.clone(),
            }),
        }
    }
}
