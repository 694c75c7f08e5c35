use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Settings of one pipeline pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Exclusive working directory for downloads and conversions.
    pub staging_dir: PathBuf,
    /// Runs an entity may fail in before it is dropped from the backlog.
    pub max_attempts: u32,
}

impl PipelineSettings {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    pub fn new(staging_dir: PathBuf) -> Self {
        Self {
            staging_dir,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            staging_dir = %self.staging_dir.display(),
            max_attempts = self.max_attempts,
            "Loaded pipeline settings"
        );
        debug!(?self, "Pipeline settings (full debug)");
    }
}
