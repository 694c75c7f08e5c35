//! Profiles: named bundles of download, convert and send options.
//!
//! The TOML file holds a base bundle `[__download__]` plus any number of named
//! bundles. Each named bundle is the base overlaid with its own sections; the
//! overlay is shallow, so a section present in the bundle replaces the base
//! section as a whole.
//!
//! ```toml
//! [__download__]
//!   [__download__.audio]
//!   output_format = "mp3"
//!   [__download__.video]
//!   output_format = "best[ext=mp4][height<=480]/best"
//!
//! [phone]
//!   [phone.convert]
//!   output_format = "3gp"
//!   codecs_options = "-c:v h263 -s 352x288"
//!   [phone.send]
//!   bluetooth_device_id = "00:11:22:33:44:55"
//! ```
//!
//! Validation happens on load, before any work starts, and fails with a
//! [`ProfileError`] naming the offending bundle.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ProfileError;

const DEVICE_ID_PATTERN: &str = r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioOptions {
    pub output_format: Option<String>,
    /// yt-dlp audio quality, 0 (best) to 9 (worst).
    pub quality: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoOptions {
    /// yt-dlp format selector.
    pub output_format: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertOptions {
    /// Target container, used as the converted file's extension.
    pub output_format: Option<String>,
    /// Extra converter arguments, whitespace separated.
    #[serde(default)]
    pub codecs_options: String,
}

impl ConvertOptions {
    pub fn codec_args(&self) -> Vec<String> {
        self.codecs_options
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    pub bluetooth_device_id: Option<String>,
    pub local_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub audio: Option<AudioOptions>,
    pub video: Option<VideoOptions>,
    pub convert: Option<ConvertOptions>,
    pub send: Option<SendOptions>,
}

impl Profile {
    fn overlay(self, base: &Profile) -> Profile {
        Profile {
            audio: self.audio.or_else(|| base.audio.clone()),
            video: self.video.or_else(|| base.video.clone()),
            convert: self.convert.or_else(|| base.convert.clone()),
            send: self.send.or_else(|| base.send.clone()),
        }
    }
}

/// The resolved profiles of one run.
#[derive(Debug, Clone)]
pub struct Profiles {
    profiles: BTreeMap<String, Profile>,
}

impl Profiles {
    pub const FILE_NAME: &'static str = "profiles.toml";
    pub const BASE_PROFILE: &'static str = "__download__";

    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        info!(path = %path.display(), "[PROFILES] Loading profiles");
        let content = fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ProfileError> {
        let mut raw: BTreeMap<String, Profile> = toml::from_str(content)?;
        verify(&raw)?;

        let base = raw
            .remove(Self::BASE_PROFILE)
            .ok_or_else(|| ProfileError::BaseProfileMissing(Self::BASE_PROFILE.to_string()))?;
        let profiles: BTreeMap<String, Profile> = raw
            .into_iter()
            .map(|(name, p)| (name, p.overlay(&base)))
            .collect();
        debug!(profiles = ?profiles.keys().collect::<Vec<_>>(), "[PROFILES] Profiles resolved");
        Ok(Self { profiles })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn check_profile(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn get_audio_options(&self, name: &str) -> Option<&AudioOptions> {
        self.profiles.get(name)?.audio.as_ref()
    }

    pub fn get_video_options(&self, name: &str) -> Option<&VideoOptions> {
        self.profiles.get(name)?.video.as_ref()
    }

    pub fn get_convert_options(&self, name: &str) -> Option<&ConvertOptions> {
        self.profiles.get(name)?.convert.as_ref()
    }

    pub fn get_send_options(&self, name: &str) -> Option<&SendOptions> {
        self.profiles.get(name)?.send.as_ref()
    }
}

fn verify(raw: &BTreeMap<String, Profile>) -> Result<(), ProfileError> {
    check_base_download_configurations(raw)?;
    for (name, profile) in raw {
        check_convert_configuration(name, profile)?;
        check_send_configuration(name, profile)?;
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn check_base_download_configurations(
    raw: &BTreeMap<String, Profile>,
) -> Result<(), ProfileError> {
    let missing = || ProfileError::BaseProfileMissing(Profiles::BASE_PROFILE.to_string());
    let base = raw.get(Profiles::BASE_PROFILE).ok_or_else(missing)?;
    let audio_ok = base.audio.as_ref().is_some_and(|a| non_empty(&a.output_format));
    let video_ok = base.video.as_ref().is_some_and(|v| non_empty(&v.output_format));
    if audio_ok && video_ok {
        Ok(())
    } else {
        Err(missing())
    }
}

fn check_convert_configuration(name: &str, profile: &Profile) -> Result<(), ProfileError> {
    match &profile.convert {
        Some(convert) if !non_empty(&convert.output_format) => {
            Err(ProfileError::Configuration {
                profile: name.to_string(),
                reason: "no required \"convert.output_format\"".to_string(),
            })
        }
        _ => Ok(()),
    }
}

fn check_send_configuration(name: &str, profile: &Profile) -> Result<(), ProfileError> {
    let Some(send) = &profile.send else {
        return Ok(());
    };
    let config_err = |reason: String| ProfileError::Configuration {
        profile: name.to_string(),
        reason,
    };
    if let Some(local_path) = &send.local_path {
        if !local_path.exists() {
            return Err(config_err(format!(
                "local path {} does not exist",
                local_path.display()
            )));
        }
        if !local_path.is_dir() {
            return Err(config_err(format!(
                "local path {} must be a directory",
                local_path.display()
            )));
        }
    }
    if let Some(device_id) = &send.bluetooth_device_id {
        static DEVICE_ID: OnceLock<Option<Regex>> = OnceLock::new();
        let valid = DEVICE_ID
            .get_or_init(|| Regex::new(DEVICE_ID_PATTERN).ok())
            .as_ref()
            .is_some_and(|re| re.is_match(device_id));
        if !valid {
            return Err(config_err(format!(
                "bluetooth device id \"{device_id}\" should look like 00:11:22:33:44:55"
            )));
        }
    }
    Ok(())
}
