use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extension of every file placed in the library
pub const VIDEO_EXTENSION: &str = "mp4";

/// Errors that can occur during file operations
#[derive(Debug, Error)]
pub enum FileOperationError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory { path: PathBuf, source: io::Error },

    #[error("Failed to move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("Destination has no parent directory: {0}")]
    MissingParent(PathBuf),
}

/// Sanitizes a string for use as a file or directory name
///
/// Replaces double quotes and colons with underscores. Path separators are
/// replaced as well so a title can never escape its directory. Every other
/// character is kept as is.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | ':' | '/' | '\\' => '_',
            c => c,
        })
        .collect()
}

/// Formats the library file name of an episode, e.g. `03 A Dim Light.mp4`
pub fn format_filename(episode_number: usize, episode_name: &str, number_width: usize) -> String {
    format!(
        "{:0width$} {}.{}",
        episode_number,
        sanitize_filename(episode_name),
        VIDEO_EXTENSION,
        width = number_width
    )
}

/// Computes the final library path of an episode
///
/// `<final_dir>/<series title>/<NN> <episode name>.mp4`
pub fn final_destination(
    final_dir: &Path,
    series_title: &str,
    episode_number: usize,
    episode_name: &str,
    number_width: usize,
) -> PathBuf {
    final_dir
        .join(sanitize_filename(series_title))
        .join(format_filename(episode_number, episode_name, number_width))
}

/// Durable record of which episodes have been delivered
pub trait CompletionIndex {
    /// Returns true if the episode at `destination` is already done
    fn is_complete(&self, destination: &Path) -> bool;
}

/// Completion index backed by the library itself: a file at the destination
/// path is the proof of completion
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemCompletionIndex;

impl CompletionIndex for FilesystemCompletionIndex {
    fn is_complete(&self, destination: &Path) -> bool {
        destination.is_file()
    }
}

/// Moves a staged file into its final location
///
/// Creates the destination directory if needed. A plain rename is used where
/// possible; across file systems the file is first copied next to the
/// destination and then renamed, so the destination never holds a partial
/// file.
pub fn place_atomically(staged: &Path, destination: &Path) -> Result<(), FileOperationError> {
    let parent = destination
        .parent()
        .ok_or_else(|| FileOperationError::MissingParent(destination.to_path_buf()))?;

    fs::create_dir_all(parent).map_err(|e| FileOperationError::CreateDirectory {
        path: parent.to_path_buf(),
        source: e,
    })?;

    match fs::rename(staged, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            copy_then_rename(staged, destination)
        }
        Err(e) => Err(FileOperationError::Move {
            from: staged.to_path_buf(),
            to: destination.to_path_buf(),
            source: e,
        }),
    }
}

fn copy_then_rename(staged: &Path, destination: &Path) -> Result<(), FileOperationError> {
    let partial = destination.with_extension(format!("{VIDEO_EXTENSION}.part"));
    let move_failed = |e| FileOperationError::Move {
        from: staged.to_path_buf(),
        to: destination.to_path_buf(),
        source: e,
    };

    if let Err(e) = fs::copy(staged, &partial).and_then(|_| fs::rename(&partial, destination)) {
        let _ = fs::remove_file(&partial);
        return Err(move_failed(e));
    }

    fs::remove_file(staged).map_err(move_failed)
}
