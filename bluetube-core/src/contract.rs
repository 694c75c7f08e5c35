//! # contract: the collaborators the pipeline drives
//!
//! The pipeline never talks to the network, spawns a process or reads the
//! terminal itself. Everything external is reached through the traits below,
//! which the `bluetube` binary implements for real (HTTP, yt-dlp, ffmpeg,
//! obexftp, stdin) and tests replace with `mockall` mocks.
//!
//! ## Invocations
//! [`DownloadInvocation`] and [`ConvertInvocation`] are built by the core, so
//! the exact command line is known before anything runs. The download
//! invocation doubles as the key of the run-scoped cache
//! ([`crate::cache::DownloadCache`]).
//!
//! ## Mocking
//! All traits are annotated for `mockall`; the mocks are exported with the
//! default `test-export-mocks` feature.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use mockall::automock;

use crate::error::{DeliveryError, FeedError, ToolError};
use crate::model::Entity;

/// A fetched feed: its own metadata plus the entries in feed order.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub title: String,
    pub author: String,
    pub entries: Vec<Entity>,
}

/// Reads a feed by URL.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Feed, FeedError>;
}

/// Decides whether a new entity should be fetched.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Selector: Send + Sync {
    async fn select(&self, entity: &Entity) -> bool;
}

/// The exact command line of one download.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DownloadInvocation {
    pub program: String,
    pub options: Vec<String>,
    pub link: String,
}

impl DownloadInvocation {
    /// Arguments after the program name.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.options.clone();
        args.push(self.link.clone());
        args
    }
}

impl fmt::Display for DownloadInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.program, self.args().join(" "))
    }
}

/// Runs a download and reports the staged file.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Runs the invocation. On success returns the single file it produced,
    /// already moved into the staging directory. On failure nothing of the
    /// attempt is left behind.
    async fn download(&self, invocation: &DownloadInvocation) -> Result<PathBuf, ToolError>;
}

/// The exact command line of one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertInvocation {
    pub program: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub codec_args: Vec<String>,
}

impl ConvertInvocation {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            self.input.display().to_string(),
            "-y".to_string(),
            "-hide_banner".to_string(),
        ];
        args.extend(self.codec_args.iter().cloned());
        args.push(self.output.display().to_string());
        args
    }
}

impl fmt::Display for ConvertInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.program, self.args().join(" "))
    }
}

/// Transcodes a staged file.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, invocation: &ConvertInvocation) -> Result<(), ToolError>;
}

/// A resolved wireless device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub channel: u16,
}

/// Reaches paired wireless devices.
///
/// A device is discovered once per run and then connected and disconnected
/// around every batch.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Returns `None` when the device cannot be found.
    async fn discover(&self, device_id: &str) -> Result<Option<Device>, DeliveryError>;

    async fn connect(&self, device: &Device) -> Result<(), DeliveryError>;

    /// Sends the files and returns those that arrived.
    async fn send(&self, device: &Device, files: &[PathBuf]) -> Vec<PathBuf>;

    async fn disconnect(&self, device: &Device);
}

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Info(String),
    Success(String),
    Warn(String),
    Error(String),
}

impl Event {
    pub fn info(msg: impl Into<String>) -> Self {
        Event::Info(msg.into())
    }

    pub fn success(msg: impl Into<String>) -> Self {
        Event::Success(msg.into())
    }

    pub fn warn(msg: impl Into<String>) -> Self {
        Event::Warn(msg.into())
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Event::Error(msg.into())
    }
}

/// Receives user-visible notifications.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait EventListener: Send + Sync {
    fn notify(&self, event: Event);
}
