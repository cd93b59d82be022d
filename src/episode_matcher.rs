//! Episode matching module
//!
//! Reconciles the free-text episode names scraped from a video provider with
//! the canonical episode list by numeric episode index.

use crate::metadata_retrieval::CanonicalEpisode;
use regex::Regex;
use std::sync::LazyLock;

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)").expect("valid regex"));

static EPISODE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bepisode\s+(\d+)").expect("valid regex"));

/// Where a provider puts the episode index in its display names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeNumbering {
    /// The name starts with the index, e.g. `"2: The Return"`
    LeadingNumber,
    /// The index follows an `Episode` label, e.g. `"91 Days Episode 003"`
    EpisodeLabel,
}

impl EpisodeNumbering {
    fn pattern(self) -> &'static Regex {
        match self {
            EpisodeNumbering::LeadingNumber => &LEADING_NUMBER,
            EpisodeNumbering::EpisodeLabel => &EPISODE_LABEL,
        }
    }
}

/// Extracts the episode index from a scraped display name
pub fn extract_episode_number(display_name: &str, numbering: EpisodeNumbering) -> Option<usize> {
    numbering
        .pattern()
        .captures(display_name)
        .and_then(|captures| captures[1].parse().ok())
}

/// Finds the canonical episode with the given number
///
/// The first canonical episode with that number wins.
pub fn match_episode(number: usize, episodes: &[CanonicalEpisode]) -> Option<&CanonicalEpisode> {
    episodes.iter().find(|episode| episode.number == number)
}

/// The episode identity used for naming and tagging a download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEpisode {
    pub number: usize,
    pub name: String,
    pub synopsis: String,
    /// False if the name was synthesized because no canonical episode matched
    pub matched: bool,
}

/// Resolves a scraped display name to the metadata used downstream
///
/// A number without a canonical counterpart degrades to a synthesized
/// `"Episode NN"` name with an empty synopsis. Returns `None` only if the
/// display name carries no episode number at all.
pub fn resolve_episode(
    display_name: &str,
    numbering: EpisodeNumbering,
    episodes: &[CanonicalEpisode],
    number_width: usize,
) -> Option<ResolvedEpisode> {
    let number = extract_episode_number(display_name, numbering)?;

    Some(match match_episode(number, episodes) {
        Some(episode) => ResolvedEpisode {
            number,
            name: episode.name.clone(),
            synopsis: episode.synopsis.clone(),
            matched: true,
        },
        None => ResolvedEpisode {
            number,
            name: synthesized_name(number, number_width),
            synopsis: String::new(),
            matched: false,
        },
    })
}

/// Name used for episodes without canonical metadata
pub fn synthesized_name(number: usize, number_width: usize) -> String {
    format!("Episode {:0width$}", number, width = number_width)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical() -> Vec<CanonicalEpisode> {
        vec![
            CanonicalEpisode {
                number: 1,
                name: "The Beginning".to_string(),
                synopsis: "First.".to_string(),
            },
            CanonicalEpisode {
                number: 2,
                name: "The Return".to_string(),
                synopsis: "Second.".to_string(),
            },
        ]
    }

    use super::EpisodeNumbering::{EpisodeLabel, LeadingNumber};

    #[test]
    fn test_matches_by_leading_number() {
        let episodes = canonical();
        let number = extract_episode_number("2: The Return", LeadingNumber).unwrap();
        let matched = match_episode(number, &episodes).unwrap();

        assert_eq!(matched.number, 2);
        assert_eq!(matched.name, "The Return");
    }

    #[test]
    fn test_unknown_number_does_not_match() {
        let number = extract_episode_number("5 - Finale", LeadingNumber).unwrap();

        assert_eq!(match_episode(number, &canonical()), None);
    }

    #[test]
    fn test_extract_leading_number() {
        assert_eq!(extract_episode_number("01", LeadingNumber), Some(1));
        assert_eq!(extract_episode_number("  12 - Extra", LeadingNumber), Some(12));
        assert_eq!(extract_episode_number("Episode 012", LeadingNumber), None);
        assert_eq!(extract_episode_number("Special", LeadingNumber), None);
    }

    #[test]
    fn test_extract_episode_label() {
        assert_eq!(extract_episode_number("Naruto Episode 012", EpisodeLabel), Some(12));
        assert_eq!(extract_episode_number("episode 7 [Uncensored]", EpisodeLabel), Some(7));
        assert_eq!(extract_episode_number("12", EpisodeLabel), None);
        assert_eq!(extract_episode_number("Movie", EpisodeLabel), None);
    }

    #[test]
    fn test_episode_label_ignores_numeric_series_title() {
        assert_eq!(extract_episode_number("86 Episode 002", EpisodeLabel), Some(2));
        assert_eq!(extract_episode_number("91 Days Episode 003", EpisodeLabel), Some(3));
    }

    #[test]
    fn test_first_duplicate_wins() {
        let mut episodes = canonical();
        episodes.push(CanonicalEpisode {
            number: 2,
            name: "Duplicate".to_string(),
            synopsis: String::new(),
        });

        assert_eq!(match_episode(2, &episodes).unwrap().name, "The Return");
        assert_eq!(
            resolve_episode("2", LeadingNumber, &episodes, 2).unwrap().name,
            "The Return"
        );
    }

    #[test]
    fn test_resolve_falls_back_to_synthesized_name() {
        let resolved = resolve_episode("5 - Finale", LeadingNumber, &canonical(), 2).unwrap();

        assert_eq!(resolved.number, 5);
        assert_eq!(resolved.name, "Episode 05");
        assert_eq!(resolved.synopsis, "");
        assert!(!resolved.matched);

        let wide = resolve_episode("5", LeadingNumber, &canonical(), 3).unwrap();
        assert_eq!(wide.name, "Episode 005");
    }

    #[test]
    fn test_resolve_uses_canonical_metadata() {
        let resolved = resolve_episode("1", LeadingNumber, &canonical(), 2).unwrap();

        assert_eq!(resolved.name, "The Beginning");
        assert_eq!(resolved.synopsis, "First.");
        assert!(resolved.matched);

        let labelled = resolve_episode("86 Episode 001", EpisodeLabel, &canonical(), 2).unwrap();
        assert_eq!(labelled.name, "The Beginning");
    }

    #[test]
    fn test_resolve_without_number() {
        assert_eq!(resolve_episode("OVA", LeadingNumber, &canonical(), 2), None);
        assert_eq!(resolve_episode("OVA", EpisodeLabel, &canonical(), 2), None);
    }
}
