//! Runs external programs.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;

use bluetube_core::error::ToolError;
use tokio::process::Command;
use tracing::{debug, warn};

const URL_OPENER: &str = "xdg-open";

#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    verbose: bool,
}

fn spawn_error(program: &str, e: std::io::Error) -> ToolError {
    if e.kind() == ErrorKind::NotFound {
        ToolError::NotFound(program.to_string())
    } else {
        ToolError::Io {
            tool: program.to_string(),
            source: e,
        }
    }
}

impl CommandExecutor {
    /// In verbose mode the tools write straight to the terminal.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Runs `program` to completion; a non-zero exit is an error.
    pub async fn call(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<(), ToolError> {
        debug!(program, ?args, ?cwd, "Running command");
        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null());
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        if self.verbose {
            let status = command
                .status()
                .await
                .map_err(|e| spawn_error(program, e))?;
            return if status.success() {
                Ok(())
            } else {
                Err(ToolError::Failed {
                    tool: program.to_string(),
                    status: status.to_string(),
                })
            };
        }

        let output = command
            .output()
            .await
            .map_err(|e| spawn_error(program, e))?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(program, status = %output.status, stderr = %stderr.trim(), "Command failed");
            Err(ToolError::Failed {
                tool: program.to_string(),
                status: output.status.to_string(),
            })
        }
    }

    /// Runs `program` and returns its standard output.
    pub async fn output(&self, program: &str, args: &[String]) -> Result<String, ToolError> {
        debug!(program, ?args, "Capturing command output");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| spawn_error(program, e))?;
        if !output.status.success() {
            return Err(ToolError::Failed {
                tool: program.to_string(),
                status: output.status.to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Whether `name` runs with its version flag (`--version`, or
    /// `-version` when `dashes` is 1).
    pub async fn command_exists(&self, name: &str, dashes: usize) -> bool {
        let flag = format!("{}version", "-".repeat(dashes));
        let status = Command::new(name)
            .arg(flag)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        matches!(status, Ok(s) if s.success())
    }

    /// Starts `program` without waiting for it.
    pub fn spawn_detached(&self, program: &str, args: &[String]) -> Result<(), ToolError> {
        debug!(program, ?args, "Spawning detached command");
        std::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| spawn_error(program, e))
    }

    pub fn open_url(&self, url: &str) -> Result<(), ToolError> {
        self.spawn_detached(URL_OPENER, &[url.to_string()])
    }

    /// Opens `path` in the user's editor and waits for it to close.
    pub async fn edit(&self, editor: &str, path: &Path) -> Result<(), ToolError> {
        let mut parts = editor.split_whitespace();
        let program = parts.next().unwrap_or(editor);
        let status = Command::new(program)
            .args(parts)
            .arg(path)
            .status()
            .await
            .map_err(|e| spawn_error(program, e))?;
        if status.success() {
            Ok(())
        } else {
            Err(ToolError::Failed {
                tool: program.to_string(),
                status: status.to_string(),
            })
        }
    }
}
