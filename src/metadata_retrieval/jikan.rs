/// Jikan (MyAnimeList) metadata provider implementation.
use super::jikan_types::{
    JikanAnime, JikanEpisodeDetail, JikanEpisodePage, JikanEpisodeSummary, JikanResponse,
};
use super::{CanonicalEpisode, MetadataProvider, MetadataRetrievalError, SeriesBundle, SeriesMetadata};
use crate::transport::Transport;
use serde::de::DeserializeOwned;
use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

/// Public Jikan v4 endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.jikan.moe/v4";

/// Jikan allows roughly three requests per second
pub const DEFAULT_REQUEST_INTERVAL: Duration = Duration::from_millis(400);

/// Metadata provider for the Jikan API.
///
/// Series details come from `/anime/{id}`, the episode list from the paginated
/// `/anime/{id}/episodes` endpoint and each synopsis from a secondary
/// `/anime/{id}/episodes/{number}` request.
pub struct JikanProvider<T: Transport> {
    transport: T,
    base_url: String,
    request_interval: Duration,
    last_request: Cell<Option<Instant>>,
}

impl<T: Transport> JikanProvider<T> {
    /// Creates a new Jikan provider instance.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_interval: DEFAULT_REQUEST_INTERVAL,
            last_request: Cell::new(None),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_interval(mut self, request_interval: Duration) -> Self {
        self.request_interval = request_interval;
        self
    }

    /// Waits until the minimum interval since the previous request has passed
    fn rate_limit(&self) {
        if let Some(last) = self.last_request.get() {
            let elapsed = last.elapsed();
            if elapsed < self.request_interval {
                thread::sleep(self.request_interval - elapsed);
            }
        }
        self.last_request.set(Some(Instant::now()));
    }

    fn get_json<R: DeserializeOwned>(&self, url: &str) -> Result<R, MetadataRetrievalError> {
        self.rate_limit();
        let body = self.transport.get_text(url)?;

        serde_json::from_str(&body).map_err(|e| MetadataRetrievalError::Parse {
            url: url.to_string(),
            source: e,
        })
    }

    fn fetch_episode_list(
        &self,
        series_id: &str,
    ) -> Result<Vec<JikanEpisodeSummary>, MetadataRetrievalError> {
        let mut episodes = Vec::new();
        let mut page = 1;

        loop {
            let url = format!("{}/anime/{}/episodes?page={}", self.base_url, series_id, page);
            let response: JikanEpisodePage = self.get_json(&url)?;
            episodes.extend(response.data);

            if !response.pagination.has_next_page {
                break;
            }
            page += 1;
        }

        Ok(episodes)
    }

    fn fetch_episode(
        &self,
        series_id: &str,
        summary: JikanEpisodeSummary,
    ) -> Result<CanonicalEpisode, MetadataRetrievalError> {
        let url = format!("{}/anime/{}/episodes/{}", self.base_url, series_id, summary.mal_id);
        let detail: JikanResponse<JikanEpisodeDetail> = self.get_json(&url)?;
        let detail = detail.data;

        if detail.mal_id != summary.mal_id {
            return Err(MetadataRetrievalError::InvalidData(format!(
                "Requested episode {} of series {} but received episode {}",
                summary.mal_id, series_id, detail.mal_id
            )));
        }

        Ok(CanonicalEpisode {
            number: detail.mal_id,
            name: detail
                .title
                .or(summary.title)
                .unwrap_or_else(|| format!("Episode {}", detail.mal_id)),
            synopsis: detail
                .synopsis
                .map(|s| nanohtml2text::html2text(&s).trim().to_string())
                .unwrap_or_default(),
        })
    }

    /// Converts Jikan series data to our internal SeriesMetadata structure.
    fn convert_series(
        anime: JikanAnime,
        fetched_episodes: usize,
    ) -> Result<SeriesMetadata, MetadataRetrievalError> {
        let artwork_url = anime
            .images
            .jpg
            .large_image_url
            .or(anime.images.jpg.image_url)
            .ok_or_else(|| {
                MetadataRetrievalError::InvalidData(format!(
                    "Series {} has no artwork",
                    anime.mal_id
                ))
            })?;

        let mut alternate_titles: Vec<String> = anime.title_english.into_iter().collect();
        alternate_titles.extend(anime.title_synonyms);

        Ok(SeriesMetadata {
            id: anime.mal_id.to_string(),
            title: anime.title,
            alternate_titles,
            synopsis: anime.synopsis.unwrap_or_default(),
            genres: anime.genres.into_iter().map(|genre| genre.name).collect(),
            classification: anime.rating.unwrap_or_default(),
            aired: anime.aired.string.unwrap_or_default(),
            episode_count: anime.episodes.unwrap_or(fetched_episodes),
            artwork_url,
        })
    }
}

impl<T: Transport> MetadataProvider for JikanProvider<T> {
    fn fetch_series(&self, series_id: &str) -> Result<SeriesBundle, MetadataRetrievalError> {
        let url = format!("{}/anime/{}", self.base_url, series_id);
        let anime: JikanResponse<JikanAnime> = self.get_json(&url)?;

        log::info!("Fetching series {}", anime.data.title);

        let episodes = self
            .fetch_episode_list(series_id)?
            .into_iter()
            .map(|summary| self.fetch_episode(series_id, summary))
            .collect::<Result<Vec<_>, _>>()?;

        let series = Self::convert_series(anime.data, episodes.len())?;

        Ok(SeriesBundle { series, episodes })
    }
}
