//! Working file management module
//!
//! Each episode is staged through one fixed pair of working files inside the
//! output directory. The slot is reused by every episode, which is only sound
//! because episodes are processed strictly one after another.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const ARTWORK_FILE: &str = "artwork.jpg";
const VIDEO_FILE: &str = "episode.mp4";

/// Guard for the shared working files, cleaning them up when dropped
#[derive(Debug)]
pub(crate) struct WorkingSlot {
    artwork: PathBuf,
    video: PathBuf,
}

impl WorkingSlot {
    /// Acquires the slot in `output_dir`, discarding leftovers of an earlier run
    pub(crate) fn acquire(output_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(output_dir)?;

        let slot = Self {
            artwork: output_dir.join(ARTWORK_FILE),
            video: output_dir.join(VIDEO_FILE),
        };
        slot.clear();

        Ok(slot)
    }

    /// Path the series artwork is staged at
    pub(crate) fn artwork(&self) -> &Path {
        &self.artwork
    }

    /// Path the episode video is staged and tagged at
    pub(crate) fn video(&self) -> &Path {
        &self.video
    }

    fn clear(&self) {
        // Silently ignore errors, most of the time the files do not exist
        let _ = fs::remove_file(&self.artwork);
        let _ = fs::remove_file(&self.video);
    }
}

impl Drop for WorkingSlot {
    fn drop(&mut self) {
        self.clear();
    }
}
