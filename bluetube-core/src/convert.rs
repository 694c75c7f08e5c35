//! Convert stage, video only.
//!
//! Audio is already extracted in the requested codec by the downloader. A
//! video whose staged file already carries the target extension is passed
//! through untouched.

use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::contract::{ConvertInvocation, Event};
use crate::model::{Entity, OutputFormat};
use crate::pipeline::{PipelineContext, RunState, StageOutcome};
use crate::profiles::ConvertOptions;
use crate::staging::unused_path;

pub const CONVERTER: &str = "ffmpeg";

/// The conversion of `input`, or `None` if it already has the target format.
pub fn build_invocation(input: &Path, options: &ConvertOptions) -> Option<ConvertInvocation> {
    let target = options.output_format.as_deref()?.trim();
    let current = input.extension().and_then(|e| e.to_str()).unwrap_or("");
    if current.eq_ignore_ascii_case(target) {
        return None;
    }
    Some(ConvertInvocation {
        program: CONVERTER.to_string(),
        input: input.to_path_buf(),
        output: input.with_extension(target),
        codec_args: options.codec_args(),
    })
}

pub async fn convert_stage(
    ctx: &PipelineContext<'_>,
    run: &mut RunState,
    profile: &str,
    format: OutputFormat,
    items: Vec<Entity>,
) -> StageOutcome {
    let options = match (format, ctx.profiles.get_convert_options(profile)) {
        (OutputFormat::Video, Some(options)) => options,
        _ => {
            return StageOutcome {
                succeeded: items,
                failed: Vec::new(),
            }
        }
    };

    let mut outcome = StageOutcome::default();
    for mut entity in items {
        let Some(input) = entity.local_path().map(Path::to_path_buf) else {
            // the download stage stages every entity it lets through
            warn!(title = %entity.title, "[CONVERT] Entity has no staged file");
            outcome.failed.push(entity);
            continue;
        };
        let Some(mut invocation) = build_invocation(&input, options) else {
            debug!(title = %entity.title, "[CONVERT] Conversion is not needed");
            outcome.succeeded.push(entity);
            continue;
        };
        // a sibling profile may have converted the same source already
        invocation.output = unused_path(&invocation.output);

        ctx.notify(Event::info(format!("converting \"{}\"", entity.title)));
        match ctx.converter.convert(&invocation).await {
            Ok(()) => {
                info!(title = %entity.title, output = %invocation.output.display(), "[CONVERT] Converted");
                run.ledger.dispose(&input);
                entity.stage(invocation.output);
                outcome.succeeded.push(entity);
            }
            Err(e) => {
                error!(title = %entity.title, error = %e, command = %invocation, "[CONVERT] Failed");
                run.ledger.dispose(&invocation.output);
                ctx.notify(Event::error(format!(
                    "cannot convert \"{}\": {e}",
                    entity.title
                )));
                match run.ledger.quarantine(&input) {
                    Ok(kept) => ctx.notify(Event::info(format!(
                        "Check {} after the script is done.",
                        kept.display()
                    ))),
                    Err(e) => {
                        warn!(path = %input.display(), error = %e, "[CONVERT] Cannot quarantine source")
                    }
                }
                entity.unstage();
                outcome.failed.push(entity);
            }
        }
    }
    outcome
}
