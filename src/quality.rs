//! Rendition quality ranking
//!
//! Picks the single best rendition of an episode under a fixed rank table.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while ranking renditions
#[derive(Debug, Error)]
pub enum QualityError {
    /// A rendition carries a label outside the rank table
    #[error("Unrecognized quality label: {0:?}")]
    UnrecognizedQualityLabel(String),
}

/// Known rendition qualities, ordered from worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Quality {
    P360,
    P480,
    P720,
    P1080,
}

impl Quality {
    /// Vertical resolution in pixels
    pub fn resolution(self) -> u32 {
        match self {
            Quality::P360 => 360,
            Quality::P480 => 480,
            Quality::P720 => 720,
            Quality::P1080 => 1080,
        }
    }
}

impl FromStr for Quality {
    type Err = QualityError;

    /// Accepts both `"720p"` and bare `"720"`
    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let trimmed = label.trim();
        let number = trimmed.strip_suffix(['p', 'P']).unwrap_or(trimmed);

        match number {
            "1080" => Ok(Quality::P1080),
            "720" => Ok(Quality::P720),
            "480" => Ok(Quality::P480),
            "360" => Ok(Quality::P360),
            _ => Err(QualityError::UnrecognizedQualityLabel(label.to_string())),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p", self.resolution())
    }
}

/// One quality-specific encoding of an episode as listed by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRendition {
    /// Provider label, e.g. "1080p"
    pub label: String,
    /// Where the stream can be fetched from
    pub locator: String,
}

impl VideoRendition {
    pub fn new(label: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            locator: locator.into(),
        }
    }
}

/// The rendition chosen for download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestRendition {
    pub quality: Quality,
    pub locator: String,
}

/// Selects the highest ranked rendition
///
/// Every label is validated, even after the best possible quality has been
/// seen. On equal rank the first listed rendition wins. An empty list yields
/// `Ok(None)`.
pub fn select_best(renditions: &[VideoRendition]) -> Result<Option<BestRendition>, QualityError> {
    let mut best: Option<(Quality, &VideoRendition)> = None;

    for rendition in renditions {
        let quality: Quality = rendition.label.parse()?;

        match best {
            Some((best_quality, _)) if best_quality >= quality => {}
            _ => best = Some((quality, rendition)),
        }
    }

    Ok(best.map(|(quality, rendition)| BestRendition {
        quality,
        locator: rendition.locator.clone(),
    }))
}
