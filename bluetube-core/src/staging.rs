//! Bookkeeping for files in the staging directory.
//!
//! Several work queues may share one staged file (see
//! [`crate::cache::DownloadCache`]), so nothing is deleted while a pass is
//! running. Stages only mark files as disposable; [`StagingLedger::finish`]
//! deletes them at the end, sparing any file a backlog entity still points to.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Where files that failed to convert are kept for manual inspection.
pub const NOT_CONVERTED_DIR: &str = "[not yet converted files]";

#[derive(Debug)]
pub struct StagingLedger {
    staging_dir: PathBuf,
    disposable: BTreeSet<PathBuf>,
    kept: HashSet<PathBuf>,
}

impl StagingLedger {
    pub fn new(staging_dir: &Path) -> Self {
        Self {
            staging_dir: staging_dir.to_path_buf(),
            disposable: BTreeSet::new(),
            kept: HashSet::new(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.staging_dir.join(NOT_CONVERTED_DIR)
    }

    /// Marks a staged file for deletion at the end of the pass.
    pub fn dispose(&mut self, path: &Path) {
        self.disposable.insert(path.to_path_buf());
    }

    /// Protects a staged file from deletion for the rest of the pass, e.g.
    /// one waiting for `bluetube send`.
    pub fn keep(&mut self, path: &Path) {
        self.kept.insert(path.to_path_buf());
    }

    pub fn is_disposed(&self, path: &Path) -> bool {
        self.disposable.contains(path)
    }

    /// Keeps a copy of `path` in the quarantine directory and marks the
    /// original for deletion. Returns the quarantined copy.
    pub fn quarantine(&mut self, path: &Path) -> io::Result<PathBuf> {
        let dir = self.quarantine_dir();
        fs::create_dir_all(&dir)?;
        let name = path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no file name"))?;
        let target = unused_path(&dir.join(name));
        fs::copy(path, &target)?;
        self.dispose(path);
        Ok(target)
    }

    /// Deletes every disposable file that is neither kept nor in `retained`.
    /// Returns how many files were removed.
    pub fn finish(self, retained: &HashSet<PathBuf>) -> usize {
        let mut removed = 0;
        let spared = |p: &PathBuf| retained.contains(p) || self.kept.contains(p);
        for path in self.disposable.iter().filter(|p| !spared(*p)) {
            match fs::remove_file(path) {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed staged file");
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Cannot remove staged file"),
            }
        }
        removed
    }
}

/// `path` itself if nothing is there yet, otherwise the first free
/// `stem (n).ext` next to it. Staged files are never overwritten.
pub fn unused_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());
    (1u32..)
        .map(|n| match &extension {
            Some(ext) => parent.join(format!("{stem} ({n}).{ext}")),
            None => parent.join(format!("{stem} ({n})")),
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Files waiting directly in the staging directory, skipping partial
/// downloads and the quarantine directory.
pub fn staged_files(staging_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(staging_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let partial = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "part" || e == "ytdl");
        if !partial {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
