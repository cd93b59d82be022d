/// Data structures and traits for canonical series metadata retrieval.
///
/// This module provides structures to represent a series and its episodes
/// with their descriptive metadata (titles, synopses, classification, etc.),
/// as well as traits for implementing metadata providers.
mod cached;
pub(crate) mod jikan;
mod jikan_types;

pub use cached::CachedMetadataProvider;
pub use jikan::JikanProvider;

use crate::cache::CacheError;
use crate::transport::TransportError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during metadata retrieval operations.
#[derive(Debug, Error)]
pub enum MetadataRetrievalError {
    /// Request to the metadata provider failed
    #[error("Request failed: {0}")]
    Request(#[from] TransportError),

    /// Failed to parse the provider's JSON response
    #[error("Failed to parse API response from {url}: {source}")]
    Parse {
        url: String,
        source: serde_json::Error,
    },

    /// The API returned invalid or unexpected data
    #[error("API returned invalid data: {0}")]
    InvalidData(String),

    /// Reading or writing the metadata cache failed
    #[error("Metadata cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Represents a single canonical episode of a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEpisode {
    /// The episode number, starting at 1
    pub number: usize,
    /// The episode title
    pub name: String,
    /// A brief summary or description of the episode
    pub synopsis: String,
}

/// Descriptive metadata of a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    /// Identifier in the canonical metadata source
    pub id: String,
    /// The main title
    pub title: String,
    /// Further titles the series is known under, in lookup order
    pub alternate_titles: Vec<String>,
    pub synopsis: String,
    pub genres: Vec<String>,
    /// Audience classification as published by the source
    pub classification: String,
    /// Free-form airing period, e.g. "Apr 7, 2013 to Sep 29, 2013"
    pub aired: String,
    /// Total number of episodes
    pub episode_count: usize,
    pub artwork_url: String,
}

impl SeriesMetadata {
    /// Titles to try on a video provider, main title first
    pub fn search_titles(&self) -> Vec<String> {
        let mut titles = vec![self.title.clone()];
        for title in &self.alternate_titles {
            if !titles.contains(title) {
                titles.push(title.clone());
            }
        }
        titles
    }
}

/// A series together with its canonical episode list.
///
/// Both come from one upstream fetch and are cached as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesBundle {
    pub series: SeriesMetadata,
    pub episodes: Vec<CanonicalEpisode>,
}

impl SeriesBundle {
    /// Returns episode numbers that occur more than once, in first-seen order
    pub fn duplicate_episode_numbers(&self) -> Vec<usize> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();

        for episode in &self.episodes {
            if !seen.insert(episode.number) && !duplicates.contains(&episode.number) {
                duplicates.push(episode.number);
            }
        }

        duplicates
    }
}

/// Trait for metadata providers that can fetch series information.
///
/// Implementors of this trait can retrieve series metadata and episode lists
/// from various sources such as MyAnimeList or AniDB.
pub trait MetadataProvider {
    /// Fetches metadata and all canonical episodes of a series.
    ///
    /// # Arguments
    ///
    /// * `series_id` - The identifier of the series in the provider's catalog
    ///
    /// # Returns
    ///
    /// A Result containing the SeriesBundle, or a MetadataRetrievalError
    fn fetch_series(&self, series_id: &str) -> Result<SeriesBundle, MetadataRetrievalError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(number: usize) -> CanonicalEpisode {
        CanonicalEpisode {
            number,
            name: format!("Episode {number}"),
            synopsis: String::new(),
        }
    }

    #[test]
    fn test_duplicate_episode_numbers() {
        let bundle = SeriesBundle {
            series: crate::test_support::series_metadata(),
            episodes: vec![episode(1), episode(2), episode(2), episode(3), episode(2), episode(3)],
        };

        assert_eq!(bundle.duplicate_episode_numbers(), vec![2, 3]);
    }

    #[test]
    fn test_search_titles_keep_order_without_repeats() {
        let mut series = crate::test_support::series_metadata();
        series.title = "Shingeki no Kyojin".to_string();
        series.alternate_titles = vec![
            "Attack on Titan".to_string(),
            "Shingeki no Kyojin".to_string(),
            "AoT".to_string(),
        ];

        assert_eq!(
            series.search_titles(),
            vec!["Shingeki no Kyojin", "Attack on Titan", "AoT"]
        );
    }
}
