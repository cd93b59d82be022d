//! Container metadata tagging
//!
//! This module derives the tag set for an episode from its series metadata
//! and writes it into the video container through the external AtomicParsley
//! tool.

use crate::episode_matcher::ResolvedEpisode;
use crate::metadata_retrieval::SeriesMetadata;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use thiserror::Error;

/// Default name of the tagging executable
pub const DEFAULT_TAGGER_PROGRAM: &str = "AtomicParsley";

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

static AIRED_DATE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"({}) ([0-9]{{1,2}}), ([0-9]{{4}})", MONTHS.join("|"));
    Regex::new(&pattern).expect("valid regex")
});

/// Errors that can occur while tagging
#[derive(Debug, Error)]
pub enum TaggingError {
    /// The series classification has no content rating counterpart
    #[error("Unrecognized classification: {0:?}")]
    UnrecognizedClassification(String),

    /// The tagging tool could not be started
    #[error("Failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        source: std::io::Error,
    },

    /// The tagging tool reported a failure
    #[error("{program} failed on {path} with exit code {code:?}: {stderr}")]
    ToolFailed {
        program: String,
        path: PathBuf,
        code: Option<i32>,
        stderr: String,
    },
}

/// Content ratings understood by the container format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRating {
    G,
    Pg,
    Pg13,
    R,
    Nc17,
}

impl ContentRating {
    /// Maps a series classification label onto a content rating
    pub fn from_classification(classification: &str) -> Result<Self, TaggingError> {
        match classification.trim() {
            "G - All Ages" => Ok(ContentRating::G),
            "PG - Children" => Ok(ContentRating::Pg),
            "PG-13 - Teens 13 or older" => Ok(ContentRating::Pg13),
            "R - 17+ (violence & profanity)" => Ok(ContentRating::R),
            "R+ - Mild Nudity" => Ok(ContentRating::R),
            "Rx - Hentai" => Ok(ContentRating::Nc17),
            _ => Err(TaggingError::UnrecognizedClassification(
                classification.to_string(),
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentRating::G => "G",
            ContentRating::Pg => "PG",
            ContentRating::Pg13 => "PG-13",
            ContentRating::R => "R",
            ContentRating::Nc17 => "NC-17",
        }
    }
}

impl fmt::Display for ContentRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extracts the year of the first `Mon D, YYYY` date in an aired string
pub fn aired_year(aired: &str) -> Option<u16> {
    AIRED_DATE
        .captures(aired)
        .and_then(|captures| captures[3].parse().ok())
}

/// The complete tag set written into one episode file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeTags {
    /// First canonical genre, empty for unmatched episodes
    pub genre: String,
    pub show_name: String,
    pub episode_number: usize,
    pub year: Option<u16>,
    /// Episode synopsis
    pub long_description: String,
    /// Series synopsis
    pub store_description: String,
    pub title: String,
    /// Formatted as `N/total`
    pub track_number: String,
    pub content_rating: ContentRating,
}

impl EpisodeTags {
    /// Builds the tag set, failing on an unmapped classification
    pub fn new(series: &SeriesMetadata, episode: &ResolvedEpisode) -> Result<Self, TaggingError> {
        let content_rating = ContentRating::from_classification(&series.classification)?;

        let year = aired_year(&series.aired);
        if year.is_none() {
            log::warn!(
                "Could not determine the airing year of {} from {:?}",
                series.title,
                series.aired
            );
        }

        let genre = if episode.matched {
            series.genres.first().cloned().unwrap_or_default()
        } else {
            String::new()
        };

        Ok(Self {
            genre,
            show_name: series.title.clone(),
            episode_number: episode.number,
            year,
            long_description: episode.synopsis.clone(),
            store_description: series.synopsis.clone(),
            title: episode.name.clone(),
            track_number: format!("{}/{}", episode.number, series.episode_count),
            content_rating,
        })
    }
}

/// Trait for tools that embed metadata into a video container in place
pub trait Tagger {
    /// Writes `tags` and `artwork` into the file at `video`
    fn tag(&self, video: &Path, artwork: &Path, tags: &EpisodeTags) -> Result<(), TaggingError>;
}

/// Tagger invoking the AtomicParsley command line tool
pub struct AtomicParsleyTagger {
    program: String,
}

impl AtomicParsleyTagger {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Builds the argument list passed after the program name
    fn arguments(video: &Path, artwork: &Path, tags: &EpisodeTags) -> Vec<String> {
        let mut args = vec![
            video.display().to_string(),
            "--overWrite".to_string(),
            "--genre".to_string(),
            tags.genre.clone(),
            "--stik".to_string(),
            "TV Show".to_string(),
            "--TVShowName".to_string(),
            tags.show_name.clone(),
            "--TVEpisodeNum".to_string(),
            tags.episode_number.to_string(),
            "--artwork".to_string(),
            artwork.display().to_string(),
        ];

        if let Some(year) = tags.year {
            args.push("--year".to_string());
            args.push(year.to_string());
        }

        args.extend([
            "--longdesc".to_string(),
            tags.long_description.clone(),
            "--storedesc".to_string(),
            tags.store_description.clone(),
            "--title".to_string(),
            tags.title.clone(),
            "--tracknum".to_string(),
            tags.track_number.clone(),
            "--contentRating".to_string(),
            tags.content_rating.to_string(),
        ]);

        args
    }
}

impl Default for AtomicParsleyTagger {
    fn default() -> Self {
        Self::new(DEFAULT_TAGGER_PROGRAM)
    }
}

impl Tagger for AtomicParsleyTagger {
    fn tag(&self, video: &Path, artwork: &Path, tags: &EpisodeTags) -> Result<(), TaggingError> {
        let output = Command::new(&self.program)
            .args(Self::arguments(video, artwork, tags))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| TaggingError::SpawnFailed {
                program: self.program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(TaggingError::ToolFailed {
                program: self.program.clone(),
                path: video.to_path_buf(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}
