//! Raw HTTP/JSON provider
//!
//! Speaks the search-then-detail protocol of 9anime style sites:
//!
//! 1. `/ajax/film/search` returns JSON wrapping an HTML fragment of candidates
//! 2. the candidate's detail page lists episodes with numeric ids
//! 3. `/ajax/episode/info` returns a signed grabber URL per episode
//! 4. the grabber returns the renditions as JSON
//!
//! Steps 1 and 2 go through the page cache. Steps 3 and 4 carry one-time
//! tokens and are always fetched fresh.

use super::{
    EpisodeSource, Listing, ProviderError, ScrapedEpisodeEntry, VideoProvider, fetch_page,
    parse_json,
};
use crate::cache::{FreshnessCache, KeyValueStore};
use crate::episode_matcher::EpisodeNumbering;
use crate::quality::VideoRendition;
use crate::transport::Transport;
use reqwest::Url;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::sync::LazyLock;

/// Default site root
pub const DEFAULT_BASE_URL: &str = "http://9anime.to";

static CANDIDATE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".item a.name").expect("valid selector"));

static EPISODE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("ul.episodes a").expect("valid selector"));

#[derive(Debug, Deserialize)]
struct SearchResponse {
    html: String,
}

#[derive(Debug, Deserialize)]
struct EpisodeInfo {
    grabber: String,
    params: GrabParams,
}

#[derive(Debug, Deserialize)]
struct GrabParams {
    token: String,
    options: String,
}

#[derive(Debug, Deserialize)]
struct GrabResponse {
    data: Vec<GrabSource>,
}

#[derive(Debug, Deserialize)]
struct GrabSource {
    label: String,
    file: String,
}

/// A search hit whose name matched the requested title
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    name: String,
    url: String,
    film_id: String,
}

/// Video provider speaking the raw HTTP/JSON protocol
pub struct RawHttpProvider<T: Transport, S: KeyValueStore> {
    transport: T,
    page_cache: FreshnessCache<S>,
    base_url: String,
}

impl<T: Transport, S: KeyValueStore> RawHttpProvider<T, S> {
    pub fn new(transport: T, page_cache: FreshnessCache<S>) -> Self {
        Self {
            transport,
            page_cache,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, ProviderError> {
        let raw = format!("{}{}", self.base_url, path);
        Url::parse_with_params(&raw, params).map_err(|e| ProviderError::UnexpectedResponse {
            url: raw,
            reason: e.to_string(),
        })
    }

    fn search_url(&self, title: &str) -> Result<Url, ProviderError> {
        self.endpoint(
            "/ajax/film/search",
            &[("sort", "year:desc"), ("keyword", title)],
        )
    }

    /// Picks the first candidate whose name equals `title`, ignoring case
    fn find_candidate(&self, html: &str, title: &str) -> Result<Option<Candidate>, ProviderError> {
        let fragment = Html::parse_fragment(html);
        let wanted = title.to_lowercase();

        for element in fragment.select(&CANDIDATE_SELECTOR) {
            let name = element.text().collect::<String>().trim().to_string();
            if name.to_lowercase() != wanted {
                continue;
            }

            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let url = Url::parse(&self.base_url)
                .and_then(|base| base.join(href))
                .map_err(|e| ProviderError::UnexpectedResponse {
                    url: href.to_string(),
                    reason: e.to_string(),
                })?;

            let Some(film_id) = film_id(&url) else {
                log::warn!("Search hit {} has no film id in {}", name, url);
                continue;
            };

            return Ok(Some(Candidate {
                name,
                url: url.to_string(),
                film_id,
            }));
        }

        Ok(None)
    }

    fn fetch_episode_info(
        &self,
        film_id: &str,
        episode_id: &str,
    ) -> Result<EpisodeInfo, ProviderError> {
        let url = self.endpoint(
            "/ajax/episode/info",
            &[("id", episode_id), ("update", "0"), ("film", film_id)],
        )?;
        let body = self.transport.get_text(url.as_str())?;
        parse_json(url.as_str(), &body)
    }

    fn fetch_renditions(
        &self,
        episode_id: &str,
        info: &EpisodeInfo,
    ) -> Result<Vec<VideoRendition>, ProviderError> {
        let url = Url::parse_with_params(
            &info.grabber,
            &[
                ("id", episode_id),
                ("token", info.params.token.as_str()),
                ("options", info.params.options.as_str()),
                ("mobile", "0"),
            ],
        )
        .map_err(|e| ProviderError::UnexpectedResponse {
            url: info.grabber.clone(),
            reason: e.to_string(),
        })?;

        let body = self.transport.get_text(url.as_str())?;
        let grabbed: GrabResponse = parse_json(url.as_str(), &body)?;

        Ok(grabbed
            .data
            .into_iter()
            .map(|source| VideoRendition::new(source.label, source.file))
            .collect())
    }
}

impl<T: Transport, S: KeyValueStore> VideoProvider for RawHttpProvider<T, S> {
    fn name(&self) -> &'static str {
        "raw-http"
    }

    fn numbering(&self) -> EpisodeNumbering {
        EpisodeNumbering::LeadingNumber
    }

    fn search(&self, title: &str) -> Result<Option<Listing>, ProviderError> {
        let url = self.search_url(title)?;
        let body = fetch_page(&self.transport, &self.page_cache, url.as_str())?;
        let response: SearchResponse = parse_json(url.as_str(), &body)?;

        let Some(candidate) = self.find_candidate(&response.html, title)? else {
            return Ok(None);
        };

        let detail = fetch_page(&self.transport, &self.page_cache, &candidate.url)?;
        let entries = parse_episode_list(&detail)
            .into_iter()
            .map(|(display_name, episode_ids)| ScrapedEpisodeEntry {
                display_name,
                source: EpisodeSource::Remote {
                    film_id: candidate.film_id.clone(),
                    episode_ids,
                },
            })
            .collect();

        Ok(Some(Listing {
            title: candidate.name,
            url: candidate.url,
            entries,
        }))
    }

    fn resolve_renditions(
        &self,
        entry: &ScrapedEpisodeEntry,
    ) -> Result<Vec<VideoRendition>, ProviderError> {
        let EpisodeSource::Remote {
            film_id,
            episode_ids,
        } = &entry.source
        else {
            return Err(ProviderError::ForeignEntry {
                provider: self.name(),
                display_name: entry.display_name.clone(),
            });
        };

        // Every server lists the same episode, the first id suffices
        let Some(episode_id) = episode_ids.first() else {
            return Ok(Vec::new());
        };

        let info = self.fetch_episode_info(film_id, episode_id)?;
        self.fetch_renditions(episode_id, &info)
    }
}

/// Extracts the film id from a detail page URL such as `/watch/name.ov8`
fn film_id(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).next_back()?;
    let id = segment.rsplit('.').next().unwrap_or(segment);
    (!id.is_empty()).then(|| id.to_string())
}

/// Groups the episode anchors of a detail page by display name
///
/// Several servers list the same episode; their ids are collected under one
/// entry in first-seen order.
fn parse_episode_list(html: &str) -> Vec<(String, Vec<String>)> {
    let document = Html::parse_document(html);
    let mut episodes: Vec<(String, Vec<String>)> = Vec::new();

    for element in document.select(&EPISODE_SELECTOR) {
        let Some(id) = element.value().attr("data-id") else {
            continue;
        };
        let name = element.text().collect::<String>().trim().to_string();

        match episodes.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, ids)) => ids.push(id.to_string()),
            None => episodes.push((name, vec![id.to_string()])),
        }
    }

    episodes
}
