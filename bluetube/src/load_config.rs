//! `load_config`: locates the bluetube home and reads `configs.toml`.
//!
//! The home directory is `$BLUETUBE_HOME`, or `~/.bluetube` when unset. It
//! holds the application settings, the profile definitions and the playlist
//! store. Missing settings and profile files are created from the templates
//! shipped with the binary, so a fresh install works out of the box.
//!
//! Errors are `anyhow` errors with the offending path attached; they end up
//! at the CLI boundary.

use anyhow::{anyhow, Context, Result};
use bluetube_core::config::PipelineSettings;
use bluetube_core::profiles::Profiles;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

pub const HOME_ENV: &str = "BLUETUBE_HOME";
pub const CONFIG_FILE: &str = "configs.toml";
const HOME_DIR_NAME: &str = ".bluetube";
const DEFAULT_EDITOR: &str = "vi";

const CONFIG_TEMPLATE: &str = include_str!("../templates/configs.toml");
const PROFILES_TEMPLATE: &str = include_str!("../templates/profiles.toml");

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    editor: Option<String>,
    media_player: Option<String>,
    staging_dir: Option<PathBuf>,
    max_attempts: Option<u32>,
}

/// Settings of the application, resolved against the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub home: PathBuf,
    pub editor: String,
    pub media_player: Option<String>,
    pub staging_dir: PathBuf,
    pub max_attempts: u32,
}

impl AppConfig {
    pub fn profiles_path(&self) -> PathBuf {
        self.home.join(Profiles::FILE_NAME)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            staging_dir: self.staging_dir.clone(),
            max_attempts: self.max_attempts,
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            home = %self.home.display(),
            staging_dir = %self.staging_dir.display(),
            editor = %self.editor,
            media_player = ?self.media_player,
            max_attempts = self.max_attempts,
            "Loaded application config"
        );
    }
}

/// `$BLUETUBE_HOME`, or `~/.bluetube`.
pub fn bluetube_home() -> Result<PathBuf> {
    if let Some(home) = env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|h| h.join(HOME_DIR_NAME))
        .ok_or_else(|| anyhow!("cannot find the home directory, set {HOME_ENV}"))
}

/// Creates the home directory and any missing template files.
pub fn ensure_home(home: &Path) -> Result<()> {
    fs::create_dir_all(home)
        .with_context(|| format!("cannot create the bluetube home {}", home.display()))?;
    for (name, template) in [
        (CONFIG_FILE, CONFIG_TEMPLATE),
        (Profiles::FILE_NAME, PROFILES_TEMPLATE),
    ] {
        let path = home.join(name);
        if !path.exists() {
            fs::write(&path, template)
                .with_context(|| format!("cannot write {}", path.display()))?;
            info!(path = %path.display(), "Created from template");
        }
    }
    Ok(())
}

/// Reads `configs.toml` from `home`.
pub fn load_config(home: &Path) -> Result<AppConfig> {
    let path = home.join(CONFIG_FILE);
    info!(config_path = ?path, "Loading configuration from file");

    let raw: RawConfig = match fs::read_to_string(&path) {
        Ok(content) => toml::from_str(&content).map_err(|e| {
            error!(error = %e, config_path = ?path, "Failed to parse config TOML");
            anyhow!("cannot parse {}: {e}", path.display())
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(config_path = ?path, "No config file, using defaults");
            RawConfig::default()
        }
        Err(e) => {
            error!(error = %e, config_path = ?path, "Failed to read config file");
            return Err(anyhow!("cannot read {}: {e}", path.display()));
        }
    };

    let editor = env::var("EDITOR")
        .ok()
        .filter(|e| !e.trim().is_empty())
        .or(raw.editor)
        .unwrap_or_else(|| DEFAULT_EDITOR.to_string());
    let staging_dir = raw
        .staging_dir
        .unwrap_or_else(|| env::temp_dir().join("bluetube"));
    let max_attempts = match raw.max_attempts {
        Some(0) => return Err(anyhow!("{}: max_attempts must be at least 1", path.display())),
        Some(n) => n,
        None => PipelineSettings::DEFAULT_MAX_ATTEMPTS,
    };

    Ok(AppConfig {
        home: home.to_path_buf(),
        editor,
        media_player: raw.media_player.filter(|p| !p.trim().is_empty()),
        staging_dir,
        max_attempts,
    })
}
