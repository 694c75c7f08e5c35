//! The command line interface of bluetube.
//!
//! Without a subcommand one pipeline pass runs: fetch every playlist, ask
//! about new entries, then download, convert and deliver them. The other
//! subcommands maintain the playlist store and the profile file.
//!
//! All decisions live in `bluetube-core`; this module wires the real
//! collaborators (HTTP, yt-dlp, ffmpeg, obexftp, the terminal) into it.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{anyhow, bail, Context, Result};
use bluetube_core::contract::{Event, EventListener, FeedSource};
use bluetube_core::deliver::send_staged;
use bluetube_core::error::ProfileError;
use bluetube_core::feed::feed_url_for;
use bluetube_core::model::{OutputFormat, Playlist};
use bluetube_core::pipeline::PipelineContext;
use bluetube_core::profiles::Profiles;
use bluetube_core::store::EntryStore;
use bluetube_core::synchronise::synchronise;
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};

use crate::console::ConsoleListener;
use crate::executor::CommandExecutor;
use crate::feed_source::HttpFeedSource;
use crate::ffmpeg::FfmpegConverter;
use crate::load_config::{bluetube_home, ensure_home, load_config, AppConfig};
use crate::obex::ObexLink;
use crate::selector::ConsoleSelector;
use crate::ytdlp::YtDlpDownloader;

const DEFAULT_PROFILE: &str = "profile_1";
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    OutputFormat::from_char(s).ok_or_else(|| format!("expected a (audio) or v (video), got {s}"))
}

/// bluetube: download new videos of your playlists and send them to a
/// device or a directory.
#[derive(Parser, Debug)]
#[clap(name = "bluetube", version)]
pub struct Cli {
    /// Accept every new entry without asking
    #[clap(short, long)]
    pub yes: bool,

    /// Print debug logs and the output of external tools
    #[clap(short, long, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Subscribe to a playlist or a channel
    Add {
        /// A playlist, channel or feed URL
        url: String,
        /// a for audio, v for video
        #[clap(short = 't', long = "type", value_parser = parse_format, default_value = "v")]
        format: OutputFormat,
        /// Profiles to process the playlist with
        #[clap(short, long = "profile", num_args = 1.., default_values_t = [DEFAULT_PROFILE.to_string()])]
        profiles: Vec<String>,
    },
    /// Show the subscribed playlists
    List,
    /// Unsubscribe from a playlist
    Remove {
        #[clap(short, long)]
        author: String,
        #[clap(short, long)]
        playlist: String,
    },
    /// Change a subscribed playlist
    Edit {
        #[clap(short, long)]
        author: String,
        #[clap(short, long)]
        playlist: String,
        /// New output format: a or v
        #[clap(short = 't', long = "type", value_parser = parse_format)]
        format: Option<OutputFormat>,
        /// Replace the profile list
        #[clap(long, num_args = 1..)]
        profiles: Option<Vec<String>>,
        /// Forget the entries that failed in previous runs
        #[clap(short, long)]
        reset_failed: bool,
        /// Move the last update back by this many days
        #[clap(long)]
        days_back: Option<u32>,
    },
    /// Deliver the files left in the staging directory
    Send {
        #[clap(short, long)]
        profile: String,
    },
    /// Open the profile file in the editor
    EditProfiles,
}

pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let home = bluetube_home()?;
    ensure_home(&home)?;
    let config = load_config(&home)?;
    config.trace_loaded();
    let executor = CommandExecutor::new(cli.verbose);
    let listener = ConsoleListener;

    match cli.command {
        None => run_pass(&config, &executor, &listener, cli.yes).await,
        Some(Commands::Add {
            url,
            format,
            profiles,
        }) => add(&config, &executor, &listener, &url, format, profiles).await,
        Some(Commands::List) => list(&config),
        Some(Commands::Remove { author, playlist }) => {
            let mut store = EntryStore::open(&config.home);
            if store.remove(&author, &playlist)? {
                listener.notify(Event::success(format!("{playlist} by {author} removed")));
            } else {
                listener.notify(Event::warn(format!("\"{playlist}\" by \"{author}\" not found")));
            }
            Ok(())
        }
        Some(Commands::Edit {
            author,
            playlist,
            format,
            profiles,
            reset_failed,
            days_back,
        }) => {
            if let Some(names) = &profiles {
                let defined = load_profiles(&config, &executor).await?;
                ensure_defined(&defined, names)?;
            }
            let mut store = EntryStore::open(&config.home);
            let mut released = Vec::new();
            store.update(&author, &playlist, |p| {
                if let Some(format) = format {
                    released = p.set_output_format(format);
                }
                if let Some(names) = profiles {
                    p.profiles = names;
                    p.failed_entities.retain(|k, _| p.profiles.contains(k));
                }
                if reset_failed {
                    p.failed_entities.clear();
                }
                if let Some(days) = days_back {
                    p.last_update = (p.last_update - i64::from(days) * SECONDS_PER_DAY).max(0);
                }
            })?;
            for path in released {
                match std::fs::remove_file(&path) {
                    Ok(()) => tracing::debug!(path = %path.display(), "Removed staged file of the old format"),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "Cannot remove staged file"),
                }
            }
            listener.notify(Event::success(format!("{playlist} by {author} updated")));
            Ok(())
        }
        Some(Commands::Send { profile }) => {
            let profiles = load_profiles(&config, &executor).await?;
            ensure_defined(&profiles, std::slice::from_ref(&profile))?;
            let options = profiles
                .get_send_options(&profile)
                .ok_or_else(|| anyhow!("the profile {profile} has no send section"))?;
            let link = ObexLink::new(executor.clone());
            let delivery = send_staged(&config.staging_dir, options, &link, &listener).await?;
            listener.notify(Event::success(format!(
                "{} file(s) delivered, {} left",
                delivery.delivered.len(),
                delivery.partial.len() + delivery.undelivered.len()
            )));
            Ok(())
        }
        Some(Commands::EditProfiles) => {
            executor.edit(&config.editor, &config.profiles_path()).await?;
            Profiles::load(&config.profiles_path())?;
            listener.notify(Event::success("profiles are valid"));
            Ok(())
        }
    }
}

fn ensure_defined(profiles: &Profiles, names: &[String]) -> Result<()> {
    let missing: Vec<&str> = names
        .iter()
        .filter(|n| !profiles.check_profile(n))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        bail!("profile(s) not found: {}", missing.join(", "))
    }
}

fn confirm(question: &str) -> bool {
    if !io::stdin().is_terminal() {
        return false;
    }
    print!("{question} [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim(), "y" | "yes" | "н" | "Н")
}

/// Loads the profiles. On a broken file the user gets one chance to fix it
/// in the editor.
async fn load_profiles(config: &AppConfig, executor: &CommandExecutor) -> Result<Profiles> {
    let path = config.profiles_path();
    let first: ProfileError = match Profiles::load(&path) {
        Ok(profiles) => return Ok(profiles),
        Err(e) => e,
    };
    ConsoleListener.notify(Event::error(first.to_string()));
    if !confirm(&format!("Edit {} now?", path.display())) {
        return Err(first.into());
    }
    executor.edit(&config.editor, &path).await?;
    Profiles::load(&path).with_context(|| format!("{} is still invalid", path.display()))
}

async fn run_pass(
    config: &AppConfig,
    executor: &CommandExecutor,
    listener: &ConsoleListener,
    yes: bool,
) -> Result<()> {
    let profiles = load_profiles(config, executor).await?;
    let settings = config.pipeline_settings();
    settings.trace_loaded();

    let feeds = HttpFeedSource::new()?;
    let selector = ConsoleSelector::new(yes, config.media_player.clone(), executor.clone());
    let downloader = YtDlpDownloader::new(executor.clone(), settings.staging_dir.clone());
    let converter = FfmpegConverter::new(executor.clone());
    let device_link = ObexLink::new(executor.clone());
    let ctx = PipelineContext {
        feeds: &feeds,
        selector: &selector,
        downloader: &downloader,
        converter: &converter,
        device_link: &device_link,
        listener,
        profiles: &profiles,
        settings: &settings,
    };

    let mut store = EntryStore::open(&config.home);
    tokio::select! {
        result = synchronise(&mut store, &ctx) => {
            let report = result?;
            tracing::info!(command = "run", ?report, "Pipeline pass complete");
            listener.notify(Event::success(format!(
                "done: {} delivered, {} to retry, {} dropped",
                report.done, report.failed, report.dropped
            )));
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            listener.notify(Event::warn("interrupted, nothing was saved"));
            bail!("interrupted")
        }
    }
}

async fn add(
    config: &AppConfig,
    executor: &CommandExecutor,
    listener: &ConsoleListener,
    url: &str,
    format: OutputFormat,
    profile_names: Vec<String>,
) -> Result<()> {
    let feed_url = feed_url_for(url)?;
    let profiles = load_profiles(config, executor).await?;
    ensure_defined(&profiles, &profile_names)?;

    let feed = HttpFeedSource::new()?.fetch(&feed_url).await?;
    let author = if feed.author.is_empty() {
        feed.title.clone()
    } else {
        feed.author.clone()
    };
    let playlist = Playlist::new(feed.title.clone(), feed_url, format, profile_names);
    EntryStore::open(&config.home).add(&author, playlist)?;
    listener.notify(Event::success(format!("{} by {author} added", feed.title)));
    Ok(())
}

fn format_time(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn list(config: &AppConfig) -> Result<()> {
    let mut store = EntryStore::open(&config.home);
    let all = store.get_all()?;
    if all.is_empty() {
        println!("no playlists, add one with `bluetube add URL`");
    }
    for author in all {
        println!("{}", author.author);
        for playlist in &author.playlists {
            println!(
                "    {} (last update: {}, {}, profiles: {})",
                playlist.title,
                format_time(playlist.last_update),
                playlist.output_format,
                playlist.profiles.join(", ")
            );
            for (profile, failed) in &playlist.failed_entities {
                if !failed.is_empty() {
                    println!("        {profile}: {} to retry", failed.len());
                }
            }
        }
    }
    Ok(())
}
