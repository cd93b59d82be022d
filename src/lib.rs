//! EpisodeCourier - Fetch, tag and file episodic video content
//!
//! This library resolves configured series against a canonical metadata
//! source, finds their episodes on a video-hosting provider, downloads the
//! best rendition of every episode, embeds the metadata into the container
//! and files the result into a library. Episodes already in the library are
//! never processed again.

mod cache;
mod config;
mod episode_matcher;
mod file_operations;
mod metadata_retrieval;
mod pipeline;
mod quality;
mod tagging;
mod temp;
mod transport;
mod video_provider;

#[cfg(test)]
mod test_support;

use cache::{FileStore, FreshnessCache, KeyValueStore};
use episode_matcher::resolve_episode;
use file_operations::{CompletionIndex, FilesystemCompletionIndex};
use metadata_retrieval::{CachedMetadataProvider, JikanProvider, MetadataProvider};
use pipeline::{DownloadPipeline, EpisodeOutcome, PipelineLayout};
use quality::select_best;
use std::path::PathBuf;
use std::time::Duration;
use tagging::{AtomicParsleyTagger, Tagger};
use transport::{HttpTransport, Transport};
use video_provider::{CatalogProvider, Listing, RawHttpProvider, VideoProvider};

// Re-export error types
pub use cache::CacheError;
pub use config::ConfigError;
pub use file_operations::FileOperationError;
pub use metadata_retrieval::MetadataRetrievalError;
pub use pipeline::PipelineError;
pub use quality::QualityError;
pub use tagging::TaggingError;
pub use transport::TransportError;
pub use video_provider::ProviderError;

// Re-export configuration and value types
pub use config::{Config, ProviderKind, SeriesRequest};
pub use file_operations::sanitize_filename;
pub use quality::Quality;
pub use transport::TransferProgress;

use thiserror::Error;

/// Why an episode was passed over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The provider's episode name carries no episode number
    NoEpisodeNumber,
    /// The provider lists no rendition for the episode
    NoRendition,
}

/// Progress event emitted while delivering series
///
/// These events allow library users to track progress and provide feedback
/// during a run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Processing of a configured series started
    SeriesStarted {
        index: usize,
        total: usize,
        series_id: String,
    },

    /// Canonical metadata is available
    MetadataReady { title: String, episode_count: usize },

    /// Looking for the series on the video provider
    SearchingProvider {
        provider: &'static str,
        title: String,
    },

    /// None of the candidate titles is known to the provider
    SeriesNotFound { title: String },

    /// The provider listing was found
    ListingFound { title: String, entry_count: usize },

    /// The episode is already in the library
    EpisodeAlreadyDone { number: usize, destination: PathBuf },

    /// The episode cannot be downloaded
    EpisodeSkipped {
        display_name: String,
        reason: SkipReason,
    },

    /// Fetching the series artwork
    FetchingArtwork { url: String },

    /// Downloading an episode video
    DownloadingEpisode {
        number: usize,
        name: String,
        quality: Quality,
        destination: PathBuf,
    },

    /// Progress of the running video transfer
    Transfer(TransferProgress),

    /// Writing metadata into the downloaded file
    TaggingEpisode { number: usize },

    /// The episode was placed into the library
    EpisodeDelivered {
        number: usize,
        destination: PathBuf,
        bytes: u64,
    },

    /// All episodes of a series were processed
    SeriesComplete { title: String },

    /// The run is complete
    Complete { summary: RunSummary },
}

/// Counters describing a completed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub delivered: usize,
    pub delivered_bytes: u64,
    pub already_done: usize,
    pub skipped: usize,
    pub series_not_found: usize,
}

/// Top-level error type for EpisodeCourier operations
///
/// Every error aborts the run.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Error while loading the configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error during cache operations
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Error while setting up the network transport
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Error during metadata retrieval
    #[error("Metadata retrieval error: {0}")]
    MetadataRetrieval(#[from] MetadataRetrievalError),

    /// Error while querying the video provider
    #[error("Video provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A rendition carries an unknown quality label
    #[error("Quality selection error: {0}")]
    Quality(#[from] QualityError),

    /// Error while delivering an episode
    #[error("Episode {number} of {series_title}: {source}")]
    Pipeline {
        series_title: String,
        number: usize,
        source: PipelineError,
    },
}

/// Drives series through metadata resolution, provider lookup and delivery
///
/// Series are processed strictly in order, and so are the episodes of a
/// series. The next episode starts only once the previous one is in the
/// library, since all episodes share the same working files.
pub struct Courier<'a, P, S, T, G, C>
where
    P: MetadataProvider,
    S: KeyValueStore,
    T: Transport,
    G: Tagger,
    C: CompletionIndex,
{
    config: &'a Config,
    metadata: CachedMetadataProvider<P, S>,
    provider: Box<dyn VideoProvider + 'a>,
    pipeline: DownloadPipeline<T, G, C>,
}

impl<'a, P, S, T, G, C> Courier<'a, P, S, T, G, C>
where
    P: MetadataProvider,
    S: KeyValueStore,
    T: Transport,
    G: Tagger,
    C: CompletionIndex,
{
    pub fn new(
        config: &'a Config,
        metadata: CachedMetadataProvider<P, S>,
        provider: Box<dyn VideoProvider + 'a>,
        pipeline: DownloadPipeline<T, G, C>,
    ) -> Self {
        Self {
            config,
            metadata,
            provider,
            pipeline,
        }
    }

    /// Processes every configured series in order
    ///
    /// Progress events are emitted through the provided callback. The first
    /// error aborts the run; a failing tagging tool additionally drops the
    /// cached metadata of its series so the next run starts fresh.
    pub fn deliver_series<F>(&self, mut progress_callback: F) -> Result<RunSummary, CourierError>
    where
        F: FnMut(ProgressEvent),
    {
        let mut summary = RunSummary::default();
        let total = self.config.series.len();

        for (index, request) in self.config.series.iter().enumerate() {
            progress_callback(ProgressEvent::SeriesStarted {
                index,
                total,
                series_id: request.id.clone(),
            });

            self.deliver_one(request, &mut summary, &mut progress_callback)?;
        }

        progress_callback(ProgressEvent::Complete { summary });

        Ok(summary)
    }

    fn deliver_one(
        &self,
        request: &SeriesRequest,
        summary: &mut RunSummary,
        progress_callback: &mut dyn FnMut(ProgressEvent),
    ) -> Result<(), CourierError> {
        log::info!("Processing series {}", request.id);

        let bundle = self.metadata.fetch_series(&request.id)?;
        let series = &bundle.series;

        let duplicates = bundle.duplicate_episode_numbers();
        if !duplicates.is_empty() {
            log::warn!(
                "{} lists episode numbers {:?} more than once, using the first of each",
                series.title,
                duplicates
            );
        }

        progress_callback(ProgressEvent::MetadataReady {
            title: series.title.clone(),
            episode_count: bundle.episodes.len(),
        });

        let titles = match self.config.title_override(request) {
            Some(title) => vec![title.to_string()],
            None => series.search_titles(),
        };

        let Some(listing) = self.find_listing(&titles, progress_callback)? else {
            log::warn!(
                "Could not find {} on {} (tried {:?})",
                series.title,
                self.provider.name(),
                titles
            );
            summary.series_not_found += 1;
            progress_callback(ProgressEvent::SeriesNotFound {
                title: series.title.clone(),
            });
            return Ok(());
        };

        progress_callback(ProgressEvent::ListingFound {
            title: listing.title.clone(),
            entry_count: listing.entries.len(),
        });

        for entry in &listing.entries {
            let Some(episode) = resolve_episode(
                &entry.display_name,
                self.provider.numbering(),
                &bundle.episodes,
                self.config.episode_number_width,
            ) else {
                log::warn!("No episode number in {:?}, skipping", entry.display_name);
                summary.skipped += 1;
                progress_callback(ProgressEvent::EpisodeSkipped {
                    display_name: entry.display_name.clone(),
                    reason: SkipReason::NoEpisodeNumber,
                });
                continue;
            };

            if !episode.matched {
                log::warn!(
                    "No canonical metadata for episode {} of {}, using {:?}",
                    episode.number,
                    series.title,
                    episode.name
                );
            }

            if self.pipeline.is_done(series, &episode) {
                summary.already_done += 1;
                progress_callback(ProgressEvent::EpisodeAlreadyDone {
                    number: episode.number,
                    destination: self.pipeline.destination(series, &episode),
                });
                continue;
            }

            let renditions = self.provider.resolve_renditions(entry)?;
            let Some(best) = select_best(&renditions)? else {
                log::warn!(
                    "No rendition available for episode {} of {}, skipping",
                    episode.number,
                    series.title
                );
                summary.skipped += 1;
                progress_callback(ProgressEvent::EpisodeSkipped {
                    display_name: entry.display_name.clone(),
                    reason: SkipReason::NoRendition,
                });
                continue;
            };

            match self.pipeline.process(series, &episode, &best, progress_callback) {
                Ok(EpisodeOutcome::Delivered { destination, bytes }) => {
                    summary.delivered += 1;
                    summary.delivered_bytes += bytes;
                    progress_callback(ProgressEvent::EpisodeDelivered {
                        number: episode.number,
                        destination,
                        bytes,
                    });
                }
                Ok(EpisodeOutcome::AlreadyDone { destination }) => {
                    summary.already_done += 1;
                    progress_callback(ProgressEvent::EpisodeAlreadyDone {
                        number: episode.number,
                        destination,
                    });
                }
                Err(error) => {
                    if error.is_tagging_failure() {
                        if let Err(cache_error) = self.metadata.invalidate(&request.id) {
                            log::error!(
                                "Failed to invalidate metadata cache of {}: {}",
                                request.id,
                                cache_error
                            );
                        }
                    }

                    return Err(CourierError::Pipeline {
                        series_title: series.title.clone(),
                        number: episode.number,
                        source: error,
                    });
                }
            }
        }

        progress_callback(ProgressEvent::SeriesComplete {
            title: series.title.clone(),
        });

        Ok(())
    }

    /// Tries the candidate titles in order, the first listing found wins
    fn find_listing(
        &self,
        titles: &[String],
        progress_callback: &mut dyn FnMut(ProgressEvent),
    ) -> Result<Option<Listing>, CourierError> {
        for title in titles {
            progress_callback(ProgressEvent::SearchingProvider {
                provider: self.provider.name(),
                title: title.clone(),
            });

            if let Some(listing) = self.provider.search(title)? {
                return Ok(Some(listing));
            }
        }

        Ok(None)
    }
}

/// Runs all configured series with the production collaborators
///
/// Metadata comes from Jikan, videos from the configured provider, tags are
/// written with AtomicParsley.
///
/// # Examples
///
/// ```no_run
/// use episode_courier::{Config, ProgressEvent, run};
/// use std::path::Path;
///
/// let config = Config::load(Path::new("config.toml")).unwrap();
/// let summary = run(&config, |event| {
///     if let ProgressEvent::EpisodeDelivered { destination, .. } = event {
///         println!("Delivered {}", destination.display());
///     }
/// })
/// .unwrap();
/// println!("{} episode(s) delivered", summary.delivered);
/// ```
pub fn run<F>(config: &Config, progress_callback: F) -> Result<RunSummary, CourierError>
where
    F: FnMut(ProgressEvent),
{
    let transport = HttpTransport::new()?;

    let store = match &config.cache_directory {
        Some(directory) => FileStore::open(directory)?,
        None => FileStore::open_default()?,
    };
    log::debug!("Using cache directory {}", store.cache_dir().display());

    let jikan = JikanProvider::new(&transport)
        .with_base_url(config.metadata.base_url.as_str())
        .with_request_interval(Duration::from_millis(config.metadata.request_interval_ms));
    let metadata = CachedMetadataProvider::new(jikan, FreshnessCache::new(store.clone()));

    let provider: Box<dyn VideoProvider + '_> = match config.provider {
        ProviderKind::RawHttp => Box::new(
            RawHttpProvider::new(&transport, FreshnessCache::new(store))
                .with_base_url(config.raw_http.base_url.as_str()),
        ),
        ProviderKind::Catalog => Box::new(CatalogProvider::open(
            &transport,
            FreshnessCache::new(store),
            &config.catalog.index_path,
        )?),
    };

    let pipeline = DownloadPipeline::new(
        &transport,
        AtomicParsleyTagger::new(config.tagger.program.as_str()),
        FilesystemCompletionIndex,
        PipelineLayout {
            output_dir: config.output_directory.clone(),
            final_dir: config.final_directory.clone(),
            number_width: config.episode_number_width,
        },
    );

    Courier::new(config, metadata, provider, pipeline).deliver_series(progress_callback)
}
