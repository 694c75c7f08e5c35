//! yt-dlp as the [`Downloader`].
//!
//! Every invocation runs in its own temporary directory inside the staging
//! directory. The single file it leaves there is moved up into the staging
//! directory under a name no other staged file has; the temporary directory, partial files included, goes away on
//! drop whatever the outcome.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use bluetube_core::contract::{DownloadInvocation, Downloader};
use bluetube_core::error::ToolError;
use bluetube_core::staging::unused_path;
use regex::Regex;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::executor::CommandExecutor;

const EMOJI_REPLACEMENT: &str = "\u{25A1}";

fn emoji_pattern() -> &'static Option<Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"[\x{1F000}-\x{1FAFF}\x{2600}-\x{27BF}\x{2B00}-\x{2BFF}\x{FE0F}\x{200D}]",
        )
        .ok()
    })
}

/// Replaces emoji in a file name, which some devices refuse.
pub fn deemojify(name: &str) -> String {
    match emoji_pattern() {
        Some(re) => re.replace_all(name, EMOJI_REPLACEMENT).into_owned(),
        None => name.to_string(),
    }
}

pub struct YtDlpDownloader {
    executor: CommandExecutor,
    staging_dir: PathBuf,
    available: OnceCell<bool>,
}

impl YtDlpDownloader {
    pub fn new(executor: CommandExecutor, staging_dir: PathBuf) -> Self {
        Self {
            executor,
            staging_dir,
            available: OnceCell::new(),
        }
    }

    async fn check_available(&self, program: &str) -> Result<(), ToolError> {
        let available = *self
            .available
            .get_or_init(|| self.executor.command_exists(program, 2))
            .await;
        if available {
            Ok(())
        } else {
            Err(ToolError::NotFound(program.to_string()))
        }
    }
}

fn produced_files(dir: &Path, tool: &str) -> Result<Vec<PathBuf>, ToolError> {
    let io = |source| ToolError::Io {
        tool: tool.to_string(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io)? {
        let path = entry.map_err(io)?.path();
        let partial = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "part" || e == "ytdl");
        if path.is_file() && !partial {
            files.push(path);
        }
    }
    Ok(files)
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn download(&self, invocation: &DownloadInvocation) -> Result<PathBuf, ToolError> {
        let tool = invocation.program.as_str();
        self.check_available(tool).await?;

        let io = |source| ToolError::Io {
            tool: tool.to_string(),
            source,
        };
        fs::create_dir_all(&self.staging_dir).map_err(io)?;
        let workdir = tempfile::Builder::new()
            .prefix(".download-")
            .tempdir_in(&self.staging_dir)
            .map_err(io)?;

        info!(command = %invocation, "[DOWNLOAD] Running downloader");
        self.executor
            .call(tool, &invocation.args(), Some(workdir.path()))
            .await?;

        let mut files = produced_files(workdir.path(), tool)?;
        let file = match files.len() {
            0 => return Err(ToolError::NoOutput { tool: tool.to_string() }),
            1 => files.remove(0),
            count => {
                return Err(ToolError::AmbiguousOutput {
                    tool: tool.to_string(),
                    count,
                })
            }
        };

        let name = file
            .file_name()
            .map(|n| deemojify(&n.to_string_lossy()))
            .ok_or_else(|| ToolError::NoOutput { tool: tool.to_string() })?;
        let target = unused_path(&self.staging_dir.join(name));
        fs::rename(&file, &target).map_err(io)?;
        debug!(path = %target.display(), "[DOWNLOAD] Staged");
        Ok(target)
    }
}
