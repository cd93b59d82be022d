//! Configuration module
//!
//! The run is driven by a TOML file listing the series to fetch and the
//! directories to work in. The file is read once at start-up.

use crate::metadata_retrieval::jikan;
use crate::tagging::DEFAULT_TAGGER_PROGRAM;
use crate::video_provider::raw_http;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to determine the configuration directory location
    #[error("Failed to determine configuration directory location")]
    ConfigDirectoryNotFound,

    #[error("Failed to read configuration file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which video-hosting integration to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Search-then-detail HTTP/JSON scraping
    #[default]
    RawHttp,
    /// Structured catalog with a local index file
    Catalog,
}

/// One series to process
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeriesRequest {
    /// Identifier in the canonical metadata source
    pub id: String,
    /// Title to search the video provider for instead of the canonical titles
    #[serde(default)]
    pub title_override: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub base_url: String,
    /// Minimum pause between two metadata requests
    pub request_interval_ms: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_url: jikan::DEFAULT_BASE_URL.to_string(),
            request_interval_ms: jikan::DEFAULT_REQUEST_INTERVAL.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawHttpConfig {
    pub base_url: String,
}

impl Default for RawHttpConfig {
    fn default() -> Self {
        Self {
            base_url: raw_http::DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON file mapping series names to catalog URLs
    pub index_path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("cache/search.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TaggerConfig {
    /// Executable of the tagging tool
    pub program: String,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_TAGGER_PROGRAM.to_string(),
        }
    }
}

fn default_number_width() -> usize {
    2
}

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Staging directory for the working files
    pub output_directory: PathBuf,
    /// Root of the final library
    pub final_directory: PathBuf,
    /// Cache location, defaults to the system cache directory
    #[serde(default)]
    pub cache_directory: Option<PathBuf>,
    /// Zero padding of episode numbers in names
    #[serde(default = "default_number_width")]
    pub episode_number_width: usize,
    #[serde(default)]
    pub provider: ProviderKind,
    /// Series to process, in order
    pub series: Vec<SeriesRequest>,
    /// Provider titles keyed by series id
    #[serde(default)]
    pub title_overrides: HashMap<String, String>,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub raw_http: RawHttpConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub tagger: TaggerConfig,
}

impl Config {
    /// Loads and validates the configuration file at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Path of the configuration file in the system's config directory
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let proj_dirs = directories::ProjectDirs::from("de", "westhoffswelt", "episodecourier")
            .ok_or(ConfigError::ConfigDirectoryNotFound)?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.series.is_empty() {
            return Err(ConfigError::Invalid("no series configured".to_string()));
        }

        if let Some(request) = self.series.iter().find(|request| request.id.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "series with empty id (title override {:?})",
                request.title_override
            )));
        }

        if !(1..=4).contains(&self.episode_number_width) {
            return Err(ConfigError::Invalid(format!(
                "episode_number_width must be between 1 and 4, got {}",
                self.episode_number_width
            )));
        }

        Ok(())
    }

    /// The explicit provider title for a series, if one is configured
    ///
    /// A title on the series entry wins over the `title_overrides` table.
    pub fn title_override<'a>(&'a self, request: &'a SeriesRequest) -> Option<&'a str> {
        request
            .title_override
            .as_deref()
            .or_else(|| self.title_overrides.get(&request.id).map(String::as_str))
    }
}
