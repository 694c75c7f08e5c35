//! Download stage.
//!
//! The invocation is built here from the playlist's output format and the
//! profile's options, then looked up in the run-scoped cache before the
//! [`crate::contract::Downloader`] is asked to run it.

use tracing::{debug, error, info};

use crate::contract::{DownloadInvocation, Event};
use crate::model::{Entity, OutputFormat};
use crate::pipeline::{PipelineContext, RunState, StageOutcome};
use crate::profiles::{AudioOptions, VideoOptions};

pub const DOWNLOADER: &str = "yt-dlp";

/// Ignore user config files, keep going on per-item errors, mark as watched.
const POLICY_OPTIONS: [&str; 3] = ["--ignore-config", "--ignore-errors", "--mark-watched"];
const DEFAULT_AUDIO_QUALITY: &str = "9";

/// Downloader options for one output format.
pub fn download_options(
    format: OutputFormat,
    audio: Option<&AudioOptions>,
    video: Option<&VideoOptions>,
) -> Vec<String> {
    let mut options: Vec<String> = POLICY_OPTIONS.iter().map(|o| o.to_string()).collect();
    match format {
        OutputFormat::Audio => {
            if let Some(audio_format) = audio.and_then(|a| a.output_format.as_deref()) {
                let quality = audio
                    .and_then(|a| a.quality.as_deref())
                    .unwrap_or(DEFAULT_AUDIO_QUALITY);
                options.push("--extract-audio".to_string());
                options.push(format!("--audio-format={audio_format}"));
                options.push(format!("--audio-quality={quality}"));
            }
        }
        OutputFormat::Video => {
            if let Some(expr) = video.and_then(|v| v.output_format.as_deref()) {
                options.push("--format".to_string());
                options.push(expr.to_string());
            }
        }
    }
    options
}

pub fn build_invocation(
    format: OutputFormat,
    audio: Option<&AudioOptions>,
    video: Option<&VideoOptions>,
    link: &str,
) -> DownloadInvocation {
    DownloadInvocation {
        program: DOWNLOADER.to_string(),
        options: download_options(format, audio, video),
        link: link.to_string(),
    }
}

/// Stages a file for every entity. Entities that still have a staged file
/// from an earlier run pass straight through.
pub async fn download_stage(
    ctx: &PipelineContext<'_>,
    run: &mut RunState,
    profile: &str,
    format: OutputFormat,
    items: Vec<Entity>,
) -> StageOutcome {
    let audio = ctx.profiles.get_audio_options(profile);
    let video = ctx.profiles.get_video_options(profile);
    let mut outcome = StageOutcome::default();

    for mut entity in items {
        if let Some(path) = entity.local_path() {
            if path.exists() {
                debug!(title = %entity.title, path = %path.display(), "[DOWNLOAD] Already staged");
                outcome.succeeded.push(entity);
                continue;
            }
            entity.unstage();
        }

        let invocation = build_invocation(format, audio, video, entity.origin());
        if let Some(path) = run.cache.get(&invocation) {
            info!(title = %entity.title, path = %path.display(), "[DOWNLOAD] Reusing file from this run");
            entity.stage(path.to_path_buf());
            outcome.succeeded.push(entity);
            continue;
        }

        ctx.notify(Event::info(format!("downloading \"{}\"", entity.title)));
        match ctx.downloader.download(&invocation).await {
            Ok(path) => {
                info!(title = %entity.title, path = %path.display(), "[DOWNLOAD] Downloaded");
                run.cache.insert(invocation, path.clone());
                entity.stage(path);
                outcome.succeeded.push(entity);
            }
            Err(e) => {
                error!(title = %entity.title, error = %e, command = %invocation, "[DOWNLOAD] Failed");
                ctx.notify(Event::error(format!(
                    "cannot download \"{}\": {e}",
                    entity.title
                )));
                outcome.failed.push(entity);
            }
        }
    }
    outcome
}
