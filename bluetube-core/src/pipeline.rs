//! The pipeline driver: download → convert → deliver for one work queue.
//!
//! Collaborators are passed in a [`PipelineContext`]; everything that lives
//! for exactly one pass (download cache, staging ledger, device sessions) is
//! kept in a [`RunState`] owned by the caller.

use tracing::{info, warn};

use crate::cache::DownloadCache;
use crate::config::PipelineSettings;
use crate::contract::{
    Converter, DeviceLink, Downloader, Event, EventListener, FeedSource, Selector,
};
use crate::convert::convert_stage;
use crate::deliver::{deliver_stage, DeviceSessions};
use crate::download::download_stage;
use crate::fanout::WorkQueue;
use crate::model::{Entity, OutputFormat};
use crate::profiles::Profiles;
use crate::staging::StagingLedger;

/// Everything a pass talks to.
pub struct PipelineContext<'a> {
    pub feeds: &'a dyn FeedSource,
    pub selector: &'a dyn Selector,
    pub downloader: &'a dyn Downloader,
    pub converter: &'a dyn Converter,
    pub device_link: &'a dyn DeviceLink,
    pub listener: &'a dyn EventListener,
    pub profiles: &'a Profiles,
    pub settings: &'a PipelineSettings,
}

impl PipelineContext<'_> {
    pub fn notify(&self, event: Event) {
        self.listener.notify(event);
    }
}

/// State shared by all work queues of one pass.
#[derive(Debug)]
pub struct RunState {
    pub cache: DownloadCache,
    pub ledger: StagingLedger,
    pub sessions: DeviceSessions,
}

impl RunState {
    pub fn new(settings: &PipelineSettings) -> Self {
        Self {
            cache: DownloadCache::new(),
            ledger: StagingLedger::new(&settings.staging_dir),
            sessions: DeviceSessions::default(),
        }
    }
}

/// Entities of one stage split by outcome.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StageOutcome {
    pub succeeded: Vec<Entity>,
    pub failed: Vec<Entity>,
}

/// What became of a work queue.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct QueueOutcome {
    pub done: usize,
    /// Entities to append to the profile's backlog.
    pub failed: Vec<Entity>,
    /// Entities that reached the attempt limit and were dropped.
    pub dropped: Vec<Entity>,
}

/// Runs one work queue through all three stages.
pub async fn drive_queue(
    ctx: &PipelineContext<'_>,
    run: &mut RunState,
    playlist: &str,
    format: OutputFormat,
    queue: WorkQueue,
) -> QueueOutcome {
    let WorkQueue { profile, items } = queue;
    if items.is_empty() {
        return QueueOutcome::default();
    }
    info!(playlist, profile = %profile, items = items.len(), "[PIPELINE] Driving work queue");
    ctx.notify(Event::info(format!(
        "{playlist} [{profile}]: {} to process",
        items.len()
    )));

    let downloaded = download_stage(ctx, run, &profile, format, items).await;
    let converted = convert_stage(ctx, run, &profile, format, downloaded.succeeded).await;
    let delivered = deliver_stage(ctx, run, &profile, converted.succeeded).await;

    let failed: Vec<Entity> = downloaded
        .failed
        .into_iter()
        .chain(converted.failed)
        .chain(delivered.failed)
        .collect();

    let mut outcome = QueueOutcome {
        done: delivered.succeeded.len(),
        ..QueueOutcome::default()
    };
    for mut entity in failed {
        entity.attempts += 1;
        if entity.attempts >= ctx.settings.max_attempts {
            warn!(
                playlist,
                profile = %profile,
                title = %entity.title,
                attempts = entity.attempts,
                "[PIPELINE] Giving up on entity"
            );
            ctx.notify(Event::warn(format!(
                "giving up on \"{}\" after {} attempts",
                entity.title, entity.attempts
            )));
            if let Some(path) = entity.local_path() {
                run.ledger.dispose(path);
            }
            outcome.dropped.push(entity);
        } else {
            outcome.failed.push(entity);
        }
    }
    info!(
        playlist,
        profile = %profile,
        done = outcome.done,
        failed = outcome.failed.len(),
        dropped = outcome.dropped.len(),
        "[PIPELINE] Work queue finished"
    );
    outcome
}
