//! Run-scoped download cache.
//!
//! Two profiles of one playlist often ask for the very same download. The
//! cache maps the exact [`DownloadInvocation`] (program, options and link) to
//! the file it produced, so the second request reuses the file instead of
//! downloading again. It lives for one pipeline pass and is never persisted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::contract::DownloadInvocation;

#[derive(Debug, Default)]
pub struct DownloadCache {
    entries: HashMap<DownloadInvocation, PathBuf>,
}

impl DownloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The staged file of an earlier identical invocation, if it is still there.
    pub fn get(&self, invocation: &DownloadInvocation) -> Option<&Path> {
        self.entries
            .get(invocation)
            .map(PathBuf::as_path)
            .filter(|p| p.exists())
    }

    pub fn insert(&mut self, invocation: DownloadInvocation, path: PathBuf) {
        self.entries.insert(invocation, path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
