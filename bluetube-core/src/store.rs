//! The playlist store: authors and their playlists in one JSON file.
//!
//! The file is read lazily on first access and kept in memory for the rest
//! of the process. `add`, `remove` and `update` write through immediately;
//! the pipeline uses [`EntryStore::replace_all`] followed by a single
//! [`EntryStore::sync`] at the end of a run. Every write replaces the whole
//! file atomically (temp file + rename).

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::model::{AuthorPlaylists, Playlist};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    feeds: Vec<AuthorPlaylists>,
}

pub struct EntryStore {
    path: PathBuf,
    feeds: Option<Vec<AuthorPlaylists>>,
}

impl EntryStore {
    pub const FILE_NAME: &'static str = "bluetube.json";

    /// A store kept in `dir`. Nothing is read until the first access.
    pub fn open(dir: &Path) -> Self {
        Self {
            path: dir.join(Self::FILE_NAME),
            feeds: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All authors with their playlists, in store order.
    pub fn get_all(&mut self) -> Result<&[AuthorPlaylists], StoreError> {
        Ok(self.pull_if_needed()?.as_slice())
    }

    pub fn get_playlist(
        &mut self,
        author: &str,
        title: &str,
    ) -> Result<Option<&Playlist>, StoreError> {
        Ok(self
            .pull_if_needed()?
            .iter()
            .find(|a| a.author == author)
            .and_then(|a| a.playlists.iter().find(|p| p.title == title)))
    }

    pub fn has(&mut self, author: &str, title: &str) -> Result<bool, StoreError> {
        Ok(self.get_playlist(author, title)?.is_some())
    }

    /// Adds a playlist under `author` and persists.
    pub fn add(&mut self, author: &str, playlist: Playlist) -> Result<(), StoreError> {
        if self.has(author, &playlist.title)? {
            return Err(StoreError::DuplicateEntry {
                author: author.to_string(),
                title: playlist.title,
            });
        }
        let feeds = self.pull_if_needed()?;
        info!(author, title = %playlist.title, "[STORE] Adding playlist");
        match feeds.iter_mut().find(|a| a.author == author) {
            Some(a) => a.playlists.push(playlist),
            None => feeds.push(AuthorPlaylists {
                author: author.to_string(),
                playlists: vec![playlist],
            }),
        }
        self.push()
    }

    /// Removes a playlist, and its author once no playlist is left.
    /// Returns `false` when there was nothing to remove.
    pub fn remove(&mut self, author: &str, title: &str) -> Result<bool, StoreError> {
        let feeds = self.pull_if_needed()?;
        let Some(a_idx) = feeds.iter().position(|a| a.author == author) else {
            warn!(author, title, "[STORE] Nothing to remove");
            return Ok(false);
        };
        let playlists = &mut feeds[a_idx].playlists;
        let Some(p_idx) = playlists.iter().position(|p| p.title == title) else {
            warn!(author, title, "[STORE] Nothing to remove");
            return Ok(false);
        };
        playlists.remove(p_idx);
        if playlists.is_empty() {
            feeds.remove(a_idx);
        }
        info!(author, title, "[STORE] Removed playlist");
        self.push()?;
        Ok(true)
    }

    /// Applies `edit` to one playlist and persists.
    pub fn update<F>(&mut self, author: &str, title: &str, edit: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Playlist),
    {
        let playlist = self
            .pull_if_needed()?
            .iter_mut()
            .find(|a| a.author == author)
            .and_then(|a| a.playlists.iter_mut().find(|p| p.title == title))
            .ok_or_else(|| StoreError::NotFound {
                author: author.to_string(),
                title: title.to_string(),
            })?;
        edit(playlist);
        self.push()
    }

    /// Replaces the in-memory collection; nothing is written until [`sync`](Self::sync).
    pub fn replace_all(&mut self, feeds: Vec<AuthorPlaylists>) {
        self.feeds = Some(feeds);
    }

    /// Writes the in-memory collection.
    pub fn sync(&mut self) -> Result<(), StoreError> {
        if self.feeds.is_none() {
            debug!("[STORE] Nothing loaded, nothing to sync");
            return Ok(());
        }
        self.push()
    }

    fn pull_if_needed(&mut self) -> Result<&mut Vec<AuthorPlaylists>, StoreError> {
        if self.feeds.is_none() {
            let feeds = self.pull()?;
            self.feeds = Some(feeds);
        }
        Ok(self.feeds.get_or_insert_with(Vec::new))
    }

    fn pull(&self) -> Result<Vec<AuthorPlaylists>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "[STORE] No store yet, starting empty");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let file: StoreFile =
            serde_json::from_str(&content).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })?;
        debug!(
            path = %self.path.display(),
            authors = file.feeds.len(),
            "[STORE] Loaded store"
        );
        Ok(file.feeds)
    }

    fn push(&self) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let feeds = self.feeds.clone().unwrap_or_default();
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(io_err)?;

        let json = serde_json::to_string_pretty(&StoreFile { feeds }).map_err(|source| {
            StoreError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        debug!(path = %self.path.display(), "[STORE] Store written");
        Ok(())
    }
}
