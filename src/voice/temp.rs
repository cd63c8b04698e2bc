//! Scoped temporary audio files
//!
//! Bridges in-memory audio to services and devices that need a file path.
//! Every file is removed when its handle is dropped; a file that cannot be
//! removed yet (still held open by a device) is queued and removed by
//! [`purge_deferred`] at process teardown.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tempfile::TempPath;

use crate::Result;

/// Paths whose deletion failed and is retried at exit
static DEFERRED: OnceLock<Mutex<Vec<PathBuf>>> = OnceLock::new();

fn deferred() -> &'static Mutex<Vec<PathBuf>> {
    DEFERRED.get_or_init(|| Mutex::new(Vec::new()))
}

/// Uniquely named, initially empty file under the system temp directory
#[derive(Debug)]
pub struct TempAudioFile {
    path: Option<TempPath>,
}

impl TempAudioFile {
    /// Create a new empty file whose name ends with `suffix` (e.g. ".wav")
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created
    pub fn create(suffix: &str) -> Result<Self> {
        Self::create_in(&std::env::temp_dir(), suffix)
    }

    /// Like [`TempAudioFile::create`], but inside `dir`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created
    pub fn create_in(dir: &Path, suffix: &str) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("neon-")
            .suffix(suffix)
            .tempfile_in(dir)?;

        // Drop our handle so services and devices can open the path themselves
        let path = file.into_temp_path();
        tracing::trace!(path = %path.display(), "created temp audio file");

        Ok(Self { path: Some(path) })
    }

    /// Path of the staged file
    #[must_use]
    pub fn path(&self) -> &Path {
        // Only None after drop
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Remove the file now instead of at end of scope
    pub fn close(mut self) {
        if let Some(path) = self.path.take() {
            remove(path);
        }
    }
}

impl Drop for TempAudioFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            remove(path);
        }
    }
}

fn remove(path: TempPath) {
    let owned = path.to_path_buf();
    match path.close() {
        Ok(()) => tracing::trace!(path = %owned.display(), "removed temp audio file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(
                path = %owned.display(),
                error = %e,
                "resource cleanup warning: temp file still in use, deferring removal to exit"
            );
            defer_removal(owned);
        }
    }
}

/// Queue a path for removal at process teardown
pub fn defer_removal(path: PathBuf) {
    if let Ok(mut queue) = deferred().lock() {
        queue.push(path);
    }
}

/// Remove every deferred path; call once before the process exits
///
/// Returns the number of files removed. Failures are logged and dropped,
/// there is no further retry.
pub fn purge_deferred() -> usize {
    let paths = deferred()
        .lock()
        .map(|mut queue| std::mem::take(&mut *queue))
        .unwrap_or_default();

    let mut removed = 0;
    for path in paths {
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove deferred temp file");
            }
        }
    }

    if removed > 0 {
        tracing::debug!(removed, "purged deferred temp files");
    }
    removed
}
