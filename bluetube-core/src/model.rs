//! Persisted data model: authors, playlists and feed entities.
//!
//! A [`Playlist`] is identified by its `(author, title)` pair and carries the
//! watermark (`last_update`), the requested [`OutputFormat`], the profiles it
//! is subscribed to and a per-profile backlog of entities that failed in a
//! previous run. Run-scoped work lives in [`crate::fanout::WorkQueue`], never
//! in the playlist itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// What the user wants to end up with for a playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Audio,
    Video,
}

impl OutputFormat {
    /// Parses the short forms used on the command line (`a`, `v`) as well as
    /// the full names.
    pub fn from_char(s: &str) -> Option<Self> {
        match s {
            "a" | "audio" => Some(OutputFormat::Audio),
            "v" | "video" => Some(OutputFormat::Video),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Audio => write!(f, "audio"),
            OutputFormat::Video => write!(f, "video"),
        }
    }
}

/// Where an entity's media currently lives.
///
/// Before download the link is the remote page of the video. Once a file has
/// been staged it becomes `Local`, still remembering the origin so a failed
/// entity can be fetched again on a later run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityLink {
    Remote { url: String },
    Local { path: PathBuf, origin: String },
}

/// One feed item moving through select → download → convert → deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub title: String,
    pub link: EntityLink,
    /// Publication time, Unix seconds.
    pub published: i64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub author: String,
    /// How many runs this entity has already failed in.
    #[serde(default)]
    pub attempts: u32,
}

impl Entity {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        published: i64,
        summary: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            link: EntityLink::Remote { url: url.into() },
            published,
            summary: summary.into(),
            author: author.into(),
            attempts: 0,
        }
    }

    /// The remote URL this entity was published under.
    pub fn origin(&self) -> &str {
        match &self.link {
            EntityLink::Remote { url } => url,
            EntityLink::Local { origin, .. } => origin,
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        match &self.link {
            EntityLink::Local { path, .. } => Some(path),
            EntityLink::Remote { .. } => None,
        }
    }

    /// Points the entity at a staged file.
    pub fn stage(&mut self, path: PathBuf) {
        let origin = self.origin().to_string();
        self.link = EntityLink::Local { path, origin };
    }

    /// Forgets the staged file and points back at the origin.
    pub fn unstage(&mut self) {
        if let EntityLink::Local { origin, .. } = &self.link {
            self.link = EntityLink::Remote {
                url: origin.clone(),
            };
        }
    }
}

/// A subscribed feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub title: String,
    pub url: String,
    pub output_format: OutputFormat,
    /// Watermark, Unix seconds. Only entries published after it are new.
    pub last_update: i64,
    pub profiles: Vec<String>,
    #[serde(default)]
    pub failed_entities: BTreeMap<String, Vec<Entity>>,
}

impl Playlist {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        output_format: OutputFormat,
        profiles: Vec<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            output_format,
            last_update: 0,
            profiles,
            failed_entities: BTreeMap::new(),
        }
    }

    /// Appends failed entities to a profile's backlog.
    pub fn add_failed_entities(&mut self, profile: &str, entities: Vec<Entity>) {
        if entities.is_empty() {
            return;
        }
        self.failed_entities
            .entry(profile.to_string())
            .or_default()
            .extend(entities);
    }

    /// Removes and returns a profile's backlog.
    pub fn take_failed_entities(&mut self, profile: &str) -> Vec<Entity> {
        self.failed_entities.remove(profile).unwrap_or_default()
    }

    /// Switches the output format and points staged backlog entities back at
    /// their origin. Returns the released staged files for the caller to
    /// delete.
    pub fn set_output_format(&mut self, format: OutputFormat) -> Vec<PathBuf> {
        if self.output_format == format {
            return Vec::new();
        }
        self.output_format = format;
        let mut released = Vec::new();
        for entity in self.failed_entities.values_mut().flatten() {
            if let Some(path) = entity.local_path() {
                released.push(path.to_path_buf());
                entity.unstage();
            }
        }
        released
    }

    pub fn backlog_len(&self) -> usize {
        self.failed_entities.values().map(Vec::len).sum()
    }
}

/// All playlists of one author, the unit the store is keyed by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorPlaylists {
    pub author: String,
    pub playlists: Vec<Playlist>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_and_unstage_keep_origin() {
        let mut e = Entity::new("t", "https://example.com/v=1", 10, "", "a");
        e.stage(PathBuf::from("/tmp/x.mp4"));
        assert_eq!(e.origin(), "https://example.com/v=1");
        assert_eq!(e.local_path(), Some(Path::new("/tmp/x.mp4")));

        e.unstage();
        assert_eq!(
            e.link,
            EntityLink::Remote {
                url: "https://example.com/v=1".into()
            }
        );
    }

    #[test]
    fn format_change_unstages_the_backlog() {
        let mut pl = Playlist::new("t", "u", OutputFormat::Video, vec!["p".into()]);
        let mut staged = Entity::new("a", "https://v/1", 1, "", "");
        staged.stage(PathBuf::from("/tmp/a.mp4"));
        pl.add_failed_entities("p", vec![staged, Entity::new("b", "https://v/2", 2, "", "")]);

        assert!(pl.set_output_format(OutputFormat::Video).is_empty());
        assert!(pl.failed_entities["p"][0].local_path().is_some());

        let released = pl.set_output_format(OutputFormat::Audio);
        assert_eq!(released, vec![PathBuf::from("/tmp/a.mp4")]);
        assert_eq!(pl.output_format, OutputFormat::Audio);
        assert!(pl.failed_entities["p"].iter().all(|e| e.local_path().is_none()));
        assert_eq!(pl.failed_entities["p"][0].origin(), "https://v/1");
    }

    #[test]
    fn backlog_is_taken_once() {
        let mut pl = Playlist::new("t", "u", OutputFormat::Video, vec!["p".into()]);
        pl.add_failed_entities("p", vec![Entity::new("a", "l", 1, "", "")]);
        pl.add_failed_entities("p", vec![]);
        assert_eq!(pl.backlog_len(), 1);
        assert_eq!(pl.take_failed_entities("p").len(), 1);
        assert!(pl.take_failed_entities("p").is_empty());
        assert!(pl.failed_entities.is_empty());
    }
}
