/// Jikan (MyAnimeList) API response types for deserialization.
///
/// These structures mirror the subset of the Jikan v4 JSON responses we use.
use serde::Deserialize;

/// Envelope around every single-object response.
#[derive(Debug, Deserialize)]
pub(super) struct JikanResponse<T> {
    pub data: T,
}

/// Response of `/anime/{id}`.
#[derive(Debug, Deserialize)]
pub(super) struct JikanAnime {
    pub mal_id: u64,
    pub title: String,
    pub title_english: Option<String>,
    #[serde(default)]
    pub title_synonyms: Vec<String>,
    /// Announced episode count (null while airing)
    pub episodes: Option<usize>,
    pub synopsis: Option<String>,
    #[serde(default)]
    pub genres: Vec<JikanNamedResource>,
    /// Audience rating, e.g. "PG-13 - Teens 13 or older"
    pub rating: Option<String>,
    pub aired: JikanAired,
    pub images: JikanImages,
}

#[derive(Debug, Deserialize)]
pub(super) struct JikanNamedResource {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct JikanAired {
    /// Human readable airing period
    pub string: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct JikanImages {
    pub jpg: JikanImageSet,
}

#[derive(Debug, Deserialize)]
pub(super) struct JikanImageSet {
    pub image_url: Option<String>,
    pub large_image_url: Option<String>,
}

/// One page of `/anime/{id}/episodes`.
#[derive(Debug, Deserialize)]
pub(super) struct JikanEpisodePage {
    pub data: Vec<JikanEpisodeSummary>,
    pub pagination: JikanPagination,
}

#[derive(Debug, Deserialize)]
pub(super) struct JikanPagination {
    pub has_next_page: bool,
}

/// An entry of the episode list. `mal_id` is the episode number.
#[derive(Debug, Deserialize)]
pub(super) struct JikanEpisodeSummary {
    pub mal_id: usize,
    pub title: Option<String>,
}

/// Response of `/anime/{id}/episodes/{number}`.
#[derive(Debug, Deserialize)]
pub(super) struct JikanEpisodeDetail {
    pub mal_id: usize,
    pub title: Option<String>,
    pub synopsis: Option<String>,
}
