//! Download and tag pipeline
//!
//! Delivers one episode into the library: artwork fetch, video fetch, tagging
//! and atomic placement, each step gated on the previous one. An episode whose
//! final file already exists is never touched again.

use crate::ProgressEvent;
use crate::episode_matcher::ResolvedEpisode;
use crate::file_operations::{CompletionIndex, FileOperationError, final_destination, place_atomically};
use crate::metadata_retrieval::SeriesMetadata;
use crate::quality::BestRendition;
use crate::tagging::{EpisodeTags, Tagger, TaggingError};
use crate::temp::WorkingSlot;
use crate::transport::{Transport, TransportError};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while delivering an episode
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The tag set could not be derived from the series metadata
    #[error("Cannot derive tags: {0}")]
    Tags(#[source] TaggingError),

    /// The working files could not be prepared
    #[error("Failed to prepare working files in {path}: {source}")]
    WorkingSlot { path: PathBuf, source: io::Error },

    #[error("Failed to fetch artwork: {0}")]
    Artwork(#[source] TransportError),

    #[error("Failed to fetch video: {0}")]
    Video(#[source] TransportError),

    /// The downloaded payload is not a video container
    #[error("Download from {locator} is not a video file")]
    NotAVideo { locator: String },

    /// The external tagging tool failed
    #[error("Tagging failed: {0}")]
    Tagging(#[source] TaggingError),

    #[error("Failed to place episode: {0}")]
    Placement(#[from] FileOperationError),
}

impl PipelineError {
    /// True for failures of the tagging tool itself
    pub fn is_tagging_failure(&self) -> bool {
        matches!(self, PipelineError::Tagging(_))
    }
}

/// Result of delivering one episode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeOutcome {
    /// The final file existed before, nothing was done
    AlreadyDone { destination: PathBuf },
    /// The episode was downloaded, tagged and placed
    Delivered { destination: PathBuf, bytes: u64 },
}

/// Directories and naming rules of the pipeline
#[derive(Debug, Clone)]
pub struct PipelineLayout {
    /// Where the working files live
    pub output_dir: PathBuf,
    /// Root of the final library
    pub final_dir: PathBuf,
    /// Zero padding of episode numbers
    pub number_width: usize,
}

/// The multi-stage episode delivery pipeline
pub struct DownloadPipeline<T, G, C>
where
    T: Transport,
    G: Tagger,
    C: CompletionIndex,
{
    transport: T,
    tagger: G,
    completion: C,
    layout: PipelineLayout,
}

impl<T, G, C> DownloadPipeline<T, G, C>
where
    T: Transport,
    G: Tagger,
    C: CompletionIndex,
{
    pub fn new(transport: T, tagger: G, completion: C, layout: PipelineLayout) -> Self {
        Self {
            transport,
            tagger,
            completion,
            layout,
        }
    }

    /// Deterministic library path of an episode
    pub fn destination(&self, series: &SeriesMetadata, episode: &ResolvedEpisode) -> PathBuf {
        final_destination(
            &self.layout.final_dir,
            &series.title,
            episode.number,
            &episode.name,
            self.layout.number_width,
        )
    }

    /// Returns true if the episode has been delivered before
    pub fn is_done(&self, series: &SeriesMetadata, episode: &ResolvedEpisode) -> bool {
        self.completion.is_complete(&self.destination(series, episode))
    }

    /// Delivers one episode into the library
    ///
    /// Returns once the final file is in place, or immediately if it already
    /// was. Any error leaves the library untouched.
    pub fn process(
        &self,
        series: &SeriesMetadata,
        episode: &ResolvedEpisode,
        rendition: &BestRendition,
        on_event: &mut dyn FnMut(ProgressEvent),
    ) -> Result<EpisodeOutcome, PipelineError> {
        let destination = self.destination(series, episode);

        if self.completion.is_complete(&destination) {
            log::debug!("{} already exists, skipping", destination.display());
            return Ok(EpisodeOutcome::AlreadyDone { destination });
        }

        // Fails on unmapped classifications before any download starts
        let tags = EpisodeTags::new(series, episode).map_err(PipelineError::Tags)?;

        let slot = WorkingSlot::acquire(&self.layout.output_dir).map_err(|e| {
            PipelineError::WorkingSlot {
                path: self.layout.output_dir.clone(),
                source: e,
            }
        })?;

        on_event(ProgressEvent::FetchingArtwork {
            url: series.artwork_url.clone(),
        });
        self.transport
            .download(&series.artwork_url, slot.artwork(), &mut |_| {})
            .map_err(PipelineError::Artwork)?;

        on_event(ProgressEvent::DownloadingEpisode {
            number: episode.number,
            name: episode.name.clone(),
            quality: rendition.quality,
            destination: destination.clone(),
        });
        let bytes = self
            .transport
            .download(&rendition.locator, slot.video(), &mut |progress| {
                on_event(ProgressEvent::Transfer(progress))
            })
            .map_err(PipelineError::Video)?;

        if !is_video_file(slot.video()) {
            return Err(PipelineError::NotAVideo {
                locator: rendition.locator.clone(),
            });
        }

        on_event(ProgressEvent::TaggingEpisode {
            number: episode.number,
        });
        self.tagger
            .tag(slot.video(), slot.artwork(), &tags)
            .map_err(PipelineError::Tagging)?;

        place_atomically(slot.video(), &destination)?;
        log::info!("Delivered {}", destination.display());

        Ok(EpisodeOutcome::Delivered { destination, bytes })
    }
}

/// Analyzes a file to determine if it's a video file
///
/// Only reads the first 8KB of the file.
fn is_video_file(file_path: &Path) -> bool {
    const BUFFER_SIZE: usize = 8192;

    let mut file = match File::open(file_path) {
        Ok(f) => f,
        Err(_) => return false,
    };

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let bytes_read = match file.read(&mut buffer) {
        Ok(n) => n,
        Err(_) => return false,
    };
    buffer.truncate(bytes_read);

    infer::is_video(&buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_operations::FilesystemCompletionIndex;
    use crate::quality::Quality;
    use crate::test_support::{
        ARTWORK_URL, FakeTagger, FakeTransport, Journal, MP4_BYTES, series_metadata,
    };
    use std::fs;

    struct Fixture {
        dir: tempfile::TempDir,
        journal: Journal,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                journal: Journal::default(),
            }
        }

        fn layout(&self) -> PipelineLayout {
            PipelineLayout {
                output_dir: self.dir.path().join("output"),
                final_dir: self.dir.path().join("library"),
                number_width: 2,
            }
        }

        fn transport(&self, video: &[u8]) -> FakeTransport {
            FakeTransport::default()
                .with_journal(self.journal.clone())
                .with_download(ARTWORK_URL, b"\xFF\xD8\xFF\xE0jpeg")
                .with_download("https://cdn.test/ep3-1080.mp4", video)
        }

        fn pipeline(
            &self,
            transport: FakeTransport,
            tagger: FakeTagger,
        ) -> DownloadPipeline<FakeTransport, FakeTagger, FilesystemCompletionIndex> {
            DownloadPipeline::new(transport, tagger, FilesystemCompletionIndex, self.layout())
        }
    }

    fn episode() -> ResolvedEpisode {
        ResolvedEpisode {
            number: 3,
            name: "A Dim Light".to_string(),
            synopsis: "Synopsis.".to_string(),
            matched: true,
        }
    }

    fn rendition() -> BestRendition {
        BestRendition {
            quality: Quality::P1080,
            locator: "https://cdn.test/ep3-1080.mp4".to_string(),
        }
    }

    #[test]
    fn test_delivers_episode_in_order() {
        let fixture = Fixture::new();
        let tagger = FakeTagger::default().with_journal(fixture.journal.clone());
        let pipeline = fixture.pipeline(fixture.transport(MP4_BYTES), tagger);
        let mut events = Vec::new();

        let outcome = pipeline
            .process(&series_metadata(), &episode(), &rendition(), &mut |event| {
                events.push(event)
            })
            .unwrap();

        let destination = fixture
            .dir
            .path()
            .join("library/Shingeki no Kyojin/03 A Dim Light.mp4");
        assert_eq!(
            outcome,
            EpisodeOutcome::Delivered {
                destination: destination.clone(),
                bytes: MP4_BYTES.len() as u64,
            }
        );
        assert_eq!(fs::read(&destination).unwrap(), MP4_BYTES);
        assert_eq!(
            fixture.journal.entries(),
            vec![
                format!("download {ARTWORK_URL}"),
                "download https://cdn.test/ep3-1080.mp4".to_string(),
                "tag A Dim Light".to_string(),
            ]
        );
        assert!(events.iter().any(|e| matches!(e, ProgressEvent::Transfer(_))));

        // Working files are gone after placement
        assert!(!fixture.layout().output_dir.join("episode.mp4").exists());
        assert!(!fixture.layout().output_dir.join("artwork.jpg").exists());
    }

    #[test]
    fn test_existing_destination_short_circuits() {
        let fixture = Fixture::new();
        let tagger = FakeTagger::default().with_journal(fixture.journal.clone());
        let pipeline = fixture.pipeline(fixture.transport(MP4_BYTES), tagger);

        let first = pipeline
            .process(&series_metadata(), &episode(), &rendition(), &mut |_| {})
            .unwrap();
        let side_effects = fixture.journal.entries().len();

        let second = pipeline
            .process(&series_metadata(), &episode(), &rendition(), &mut |_| {})
            .unwrap();

        let EpisodeOutcome::Delivered { destination, .. } = first else {
            panic!("first run should deliver");
        };
        assert_eq!(second, EpisodeOutcome::AlreadyDone { destination });
        assert_eq!(fixture.journal.entries().len(), side_effects);
        assert!(pipeline.is_done(&series_metadata(), &episode()));
    }

    #[test]
    fn test_unmapped_classification_aborts_before_downloading() {
        let fixture = Fixture::new();
        let pipeline = fixture.pipeline(fixture.transport(MP4_BYTES), FakeTagger::default());
        let mut series = series_metadata();
        series.classification = "Unknown".to_string();

        let err = pipeline
            .process(&series, &episode(), &rendition(), &mut |_| {})
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Tags(TaggingError::UnrecognizedClassification(_))
        ));
        assert!(fixture.journal.entries().is_empty());
    }

    #[test]
    fn test_tagging_failure_leaves_library_untouched() {
        let fixture = Fixture::new();
        let pipeline = fixture.pipeline(fixture.transport(MP4_BYTES), FakeTagger::failing());

        let err = pipeline
            .process(&series_metadata(), &episode(), &rendition(), &mut |_| {})
            .unwrap_err();

        assert!(err.is_tagging_failure());
        assert!(!pipeline.is_done(&series_metadata(), &episode()));
    }

    #[test]
    fn test_non_video_payload_is_rejected() {
        let fixture = Fixture::new();
        let tagger = FakeTagger::default().with_journal(fixture.journal.clone());
        let pipeline = fixture.pipeline(fixture.transport(b"<html>403</html>"), tagger);

        let err = pipeline
            .process(&series_metadata(), &episode(), &rendition(), &mut |_| {})
            .unwrap_err();

        assert!(matches!(err, PipelineError::NotAVideo { .. }));
        assert!(!fixture.journal.entries().iter().any(|e| e.starts_with("tag")));
    }

    #[test]
    fn test_missing_artwork_stops_pipeline() {
        let fixture = Fixture::new();
        let transport = FakeTransport::default()
            .with_journal(fixture.journal.clone())
            .with_download("https://cdn.test/ep3-1080.mp4", MP4_BYTES);
        let pipeline = fixture.pipeline(transport, FakeTagger::default());

        let err = pipeline
            .process(&series_metadata(), &episode(), &rendition(), &mut |_| {})
            .unwrap_err();

        assert!(matches!(err, PipelineError::Artwork(_)));
        assert_eq!(fixture.journal.entries(), vec![format!("download {ARTWORK_URL}")]);
    }
}
