//! One full pass: fetch → select → fan out → drive → commit.
//!
//! The pass works on a copy of the store's playlists. Nothing is written back
//! until every work queue is finished; then the whole collection replaces the
//! stored one in a single sync. A pass that is interrupted before that point
//! leaves the store as it was, so the next run simply asks again.
//!
//! # Phases
//! 1. Playlists subscribed to an undefined profile are skipped up front.
//! 2. All remaining feeds are fetched concurrently.
//! 3. Selection runs for every playlist before any download starts.
//! 4. Each (playlist, profile) queue is driven through
//!    [`crate::pipeline::drive_queue`]; failures refill that profile's backlog.
//! 5. Commit, then release staged files no backlog refers to.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::contract::Event;
use crate::delta::DeltaProcessor;
use crate::error::SyncError;
use crate::fanout::{fan_out, missing_profiles};
use crate::model::{AuthorPlaylists, Entity};
use crate::pipeline::{drive_queue, PipelineContext, RunState};
use crate::store::EntryStore;

/// Counters of one pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub playlists: usize,
    pub skipped: usize,
    pub shown: usize,
    pub chosen: usize,
    pub done: usize,
    pub failed: usize,
    pub dropped: usize,
    pub removed_files: usize,
}

pub async fn synchronise(
    store: &mut EntryStore,
    ctx: &PipelineContext<'_>,
) -> Result<RunReport, SyncError> {
    info!("[SYNC] Starting pipeline pass");
    let mut feeds: Vec<AuthorPlaylists> = store.get_all()?.to_vec();
    let mut report = RunReport::default();

    let staging_dir = &ctx.settings.staging_dir;
    fs::create_dir_all(staging_dir).map_err(|source| SyncError::Staging {
        path: staging_dir.clone(),
        source,
    })?;

    let mut active: Vec<(usize, usize)> = Vec::new();
    for (a, author) in feeds.iter().enumerate() {
        for (p, playlist) in author.playlists.iter().enumerate() {
            report.playlists += 1;
            let missing = missing_profiles(playlist, ctx.profiles);
            if missing.is_empty() {
                active.push((a, p));
                continue;
            }
            warn!(author = %author.author, playlist = %playlist.title, ?missing, "[SYNC] Skipping playlist");
            ctx.notify(Event::error(format!(
                "{}: profile(s) {} not found, the playlist is skipped",
                playlist.title,
                missing.join(", ")
            )));
            report.skipped += 1;
        }
    }
    if report.playlists == 0 {
        ctx.notify(Event::info("no playlists to process"));
    }

    info!(playlists = active.len(), "[SYNC] Fetching feeds");
    let fetched = join_all(
        active
            .iter()
            .map(|&(a, p)| ctx.feeds.fetch(&feeds[a].playlists[p].url)),
    )
    .await;

    let mut chosen: Vec<Vec<Entity>> = Vec::with_capacity(active.len());
    for (&(a, p), result) in active.iter().zip(fetched) {
        let author = feeds[a].author.clone();
        let playlist = &mut feeds[a].playlists[p];
        let entries = match result {
            Ok(feed) => feed.entries,
            Err(e) => {
                error!(playlist = %playlist.title, error = %e, "[SYNC] Feed unavailable");
                ctx.notify(Event::error(format!("{}: {e}", playlist.title)));
                Vec::new()
            }
        };

        let mut delta = DeltaProcessor::new(playlist.last_update);
        if !delta.compare(entries).is_empty() {
            ctx.notify(Event::info(format!("{author} - {}", playlist.title)));
        }
        let delta = delta.select(ctx.selector).await;
        info!(
            playlist = %playlist.title,
            shown = delta.shown,
            chosen = delta.chosen.len(),
            last_update = delta.last_update,
            "[SYNC] Selection done"
        );
        playlist.last_update = delta.last_update;
        report.shown += delta.shown;
        report.chosen += delta.chosen.len();
        chosen.push(delta.chosen);
    }

    let mut run = RunState::new(ctx.settings);
    for (&(a, p), chosen) in active.iter().zip(chosen) {
        let playlist = &mut feeds[a].playlists[p];
        let title = playlist.title.clone();
        let format = playlist.output_format;
        for queue in fan_out(playlist, &chosen) {
            let profile = queue.profile.clone();
            let outcome = drive_queue(ctx, &mut run, &title, format, queue).await;
            report.done += outcome.done;
            report.failed += outcome.failed.len();
            report.dropped += outcome.dropped.len();
            playlist.add_failed_entities(&profile, outcome.failed);
        }
    }

    let retained: HashSet<PathBuf> = feeds
        .iter()
        .flat_map(|a| &a.playlists)
        .flat_map(|p| p.failed_entities.values().flatten())
        .filter_map(|e| e.local_path().map(|p| p.to_path_buf()))
        .collect();

    store.replace_all(feeds);
    store.sync()?;
    info!(path = %store.path().display(), "[SYNC] Store committed");

    report.removed_files = run.ledger.finish(&retained);
    info!(?report, "[SYNC] Pass finished");
    Ok(report)
}
