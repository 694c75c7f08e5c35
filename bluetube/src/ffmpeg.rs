use std::fs;

use async_trait::async_trait;
use bluetube_core::contract::{ConvertInvocation, Converter};
use bluetube_core::error::ToolError;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::executor::CommandExecutor;

/// ffmpeg as the [`Converter`].
pub struct FfmpegConverter {
    executor: CommandExecutor,
    available: OnceCell<bool>,
}

impl FfmpegConverter {
    pub fn new(executor: CommandExecutor) -> Self {
        Self {
            executor,
            available: OnceCell::new(),
        }
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    async fn convert(&self, invocation: &ConvertInvocation) -> Result<(), ToolError> {
        let tool = invocation.program.as_str();
        // ffmpeg only knows `-version`
        let available = *self
            .available
            .get_or_init(|| self.executor.command_exists(tool, 1))
            .await;
        if !available {
            return Err(ToolError::NotFound(tool.to_string()));
        }

        info!(command = %invocation, "[CONVERT] Running converter");
        let result = self.executor.call(tool, &invocation.args(), None).await;
        if result.is_err() && invocation.output.exists() {
            if let Err(e) = fs::remove_file(&invocation.output) {
                warn!(path = %invocation.output.display(), error = %e, "[CONVERT] Cannot remove partial output");
            }
        }
        result
    }
}
