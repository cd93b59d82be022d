//! Fakes and fixtures shared by the unit tests

use crate::episode_matcher::EpisodeNumbering;
use crate::metadata_retrieval::{
    CanonicalEpisode, MetadataProvider, MetadataRetrievalError, SeriesBundle, SeriesMetadata,
};
use crate::quality::VideoRendition;
use crate::tagging::{EpisodeTags, Tagger, TaggingError};
use crate::transport::{TransferProgress, Transport, TransportError};
use crate::video_provider::{
    EpisodeSource, Listing, ProviderError, ScrapedEpisodeEntry, VideoProvider,
};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

pub(crate) const ARTWORK_URL: &str = "https://img.test/16498l.jpg";

/// Smallest header `infer` recognises as an MP4 container
pub(crate) const MP4_BYTES: &[u8] =
    b"\x00\x00\x00\x20ftypisom\x00\x00\x02\x00isomiso2avc1mp41\x00\x00\x00\x08free";

/// Ordered record of side effects across several fakes
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub(crate) fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

pub(crate) fn series_metadata() -> SeriesMetadata {
    SeriesMetadata {
        id: "16498".to_string(),
        title: "Shingeki no Kyojin".to_string(),
        alternate_titles: vec!["Attack on Titan".to_string()],
        synopsis: "Humanity fights back.".to_string(),
        genres: vec!["Action".to_string(), "Drama".to_string()],
        classification: "PG-13 - Teens 13 or older".to_string(),
        aired: "Apr 7, 2013 to Sep 29, 2013".to_string(),
        episode_count: 25,
        artwork_url: ARTWORK_URL.to_string(),
    }
}

pub(crate) fn series_bundle() -> SeriesBundle {
    let names = ["To You, in 2000 Years", "That Day", "A Dim Light"];

    SeriesBundle {
        series: series_metadata(),
        episodes: names
            .iter()
            .enumerate()
            .map(|(index, name)| CanonicalEpisode {
                number: index + 1,
                name: name.to_string(),
                synopsis: format!("Synopsis of {name}."),
            })
            .collect(),
    }
}

/// Transport serving canned pages and downloads
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeTransport {
    pages: HashMap<String, String>,
    downloads: HashMap<String, Vec<u8>>,
    requests: Rc<RefCell<Vec<String>>>,
    journal: Journal,
}

impl FakeTransport {
    pub(crate) fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub(crate) fn with_download(mut self, url: &str, payload: &[u8]) -> Self {
        self.downloads.insert(url.to_string(), payload.to_vec());
        self
    }

    pub(crate) fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Every URL requested so far, in order
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    fn not_found(url: &str) -> TransportError {
        TransportError::HttpStatus {
            url: url.to_string(),
            status: 404,
        }
    }
}

impl Transport for FakeTransport {
    fn get_text(&self, url: &str) -> Result<String, TransportError> {
        self.requests.borrow_mut().push(url.to_string());
        self.journal.push(format!("get {url}"));

        self.pages.get(url).cloned().ok_or_else(|| Self::not_found(url))
    }

    fn download(
        &self,
        url: &str,
        target: &Path,
        on_progress: &mut dyn FnMut(TransferProgress),
    ) -> Result<u64, TransportError> {
        self.requests.borrow_mut().push(url.to_string());
        self.journal.push(format!("download {url}"));

        let payload = self.downloads.get(url).ok_or_else(|| Self::not_found(url))?;
        fs::write(target, payload).map_err(|e| TransportError::WriteFailed {
            path: target.to_path_buf(),
            source: e,
        })?;

        let size = payload.len() as u64;
        on_progress(TransferProgress::measure(size, Some(size), Duration::from_secs(1)));

        Ok(size)
    }
}

/// Tagger recording its invocations
///
/// Clones share the record of tag sets.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeTagger {
    fail: bool,
    journal: Journal,
    tagged: Rc<RefCell<Vec<EpisodeTags>>>,
}

impl FakeTagger {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Every tag set written so far, in order
    pub(crate) fn tagged(&self) -> Vec<EpisodeTags> {
        self.tagged.borrow().clone()
    }
}

impl Tagger for FakeTagger {
    fn tag(&self, video: &Path, _artwork: &Path, tags: &EpisodeTags) -> Result<(), TaggingError> {
        self.journal.push(format!("tag {}", tags.title));
        self.tagged.borrow_mut().push(tags.clone());

        if self.fail {
            return Err(TaggingError::ToolFailed {
                program: "FakeTagger".to_string(),
                path: video.to_path_buf(),
                code: Some(1),
                stderr: "corrupt atom".to_string(),
            });
        }

        Ok(())
    }
}

/// Video provider serving canned listings
///
/// Display names carry leading episode numbers unless configured otherwise.
#[derive(Debug, Default)]
pub(crate) struct FakeVideoProvider {
    listings: HashMap<String, Listing>,
    numbering: Option<EpisodeNumbering>,
    journal: Journal,
}

impl FakeVideoProvider {
    pub(crate) fn with_numbering(mut self, numbering: EpisodeNumbering) -> Self {
        self.numbering = Some(numbering);
        self
    }

    pub(crate) fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Lists `episodes` as `(display name, renditions)` under `title`
    pub(crate) fn with_listing(mut self, title: &str, episodes: Vec<(&str, Vec<VideoRendition>)>) -> Self {
        let entries = episodes
            .into_iter()
            .map(|(display_name, renditions)| ScrapedEpisodeEntry {
                display_name: display_name.to_string(),
                source: EpisodeSource::Listed(renditions),
            })
            .collect();

        self.listings.insert(
            title.to_string(),
            Listing {
                title: title.to_string(),
                url: format!("https://videos.test/{title}"),
                entries,
            },
        );
        self
    }
}

impl VideoProvider for FakeVideoProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn numbering(&self) -> EpisodeNumbering {
        self.numbering.unwrap_or(EpisodeNumbering::LeadingNumber)
    }

    fn search(&self, title: &str) -> Result<Option<Listing>, ProviderError> {
        self.journal.push(format!("search {title}"));
        Ok(self.listings.get(title).cloned())
    }

    fn resolve_renditions(
        &self,
        entry: &ScrapedEpisodeEntry,
    ) -> Result<Vec<VideoRendition>, ProviderError> {
        self.journal.push(format!("resolve {}", entry.display_name));

        match &entry.source {
            EpisodeSource::Listed(renditions) => Ok(renditions.clone()),
            EpisodeSource::Remote { .. } => Err(ProviderError::ForeignEntry {
                provider: self.name(),
                display_name: entry.display_name.clone(),
            }),
        }
    }
}

/// Metadata provider returning fixed bundles and counting fetches
///
/// Clones share the fetch counter.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeMetadataProvider {
    bundles: HashMap<String, SeriesBundle>,
    fetches: Rc<Cell<usize>>,
}

impl FakeMetadataProvider {
    pub(crate) fn with_bundle(mut self, bundle: SeriesBundle) -> Self {
        self.bundles.insert(bundle.series.id.clone(), bundle);
        self
    }

    /// Number of upstream fetches so far
    pub(crate) fn fetches(&self) -> usize {
        self.fetches.get()
    }
}

impl MetadataProvider for FakeMetadataProvider {
    fn fetch_series(&self, series_id: &str) -> Result<SeriesBundle, MetadataRetrievalError> {
        self.fetches.set(self.fetches.get() + 1);

        self.bundles.get(series_id).cloned().ok_or_else(|| {
            MetadataRetrievalError::InvalidData(format!("unknown series {series_id}"))
        })
    }
}
