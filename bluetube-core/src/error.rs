use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading or writing the playlist store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot access the store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse the store at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("the playlist {title} by {author} has already existed")]
    DuplicateEntry { author: String, title: String },
    #[error("\"{title}\" by \"{author}\" not found")]
    NotFound { author: String, title: String },
}

/// Errors from loading and validating profile definitions.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("error while decoding TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("the base profile [{0}] with audio and video output formats not found")]
    BaseProfileMissing(String),
    #[error("profile \"{profile}\": {reason}")]
    Configuration { profile: String, reason: String },
}

/// Errors from resolving or reading a feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(
        "misformatted URL of the youtube list: {0}\n\
         Should be https://www.youtube.com/watch?v=XXX&list=XXX for a playlist,\n\
         or https://www.youtube.com/channel/XXX for a channel."
    )]
    MisformattedUrl(String),
    #[error("cannot fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("malformed feed: {0}")]
    Malformed(String),
}

/// Errors from running an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("the tool \"{0}\" is not found in PATH")]
    NotFound(String),
    #[error("{tool} exited with {status}")]
    Failed { tool: String, status: String },
    #[error("{tool} produced no output file")]
    NoOutput { tool: String },
    #[error("{tool} produced {count} files, expected one")]
    AmbiguousOutput { tool: String, count: usize },
    #[error("I/O error around {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from a delivery channel.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("device {0} is not found")]
    DeviceNotFound(String),
    #[error("cannot connect to {device}: {reason}")]
    Connect { device: String, reason: String },
    #[error("I/O error while delivering to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal errors of a pipeline pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cannot prepare the staging directory {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
