//! Delivery to a profile's channels: a paired wireless device, a local
//! directory, or both.
//!
//! A file counts as delivered only when every configured channel accepted
//! it. Files that made it through some channels but not all are reported and
//! kept, and their entities go back to the backlog to be retried on all
//! channels.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::contract::{Device, DeviceLink, Event, EventListener};
use crate::error::DeliveryError;
use crate::model::Entity;
use crate::pipeline::{PipelineContext, RunState, StageOutcome};
use crate::profiles::SendOptions;
use crate::staging::staged_files;

/// Copies files into a directory, creating it when absent.
#[derive(Debug, Clone)]
pub struct LocalPathSender {
    dir: PathBuf,
}

impl LocalPathSender {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the files that were copied. Failures are logged per file.
    pub fn send(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>, DeliveryError> {
        fs::create_dir_all(&self.dir).map_err(|source| DeliveryError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let mut copied = Vec::with_capacity(files.len());
        for file in files {
            let Some(name) = file.file_name() else {
                warn!(path = %file.display(), "[DELIVER] Not a file path");
                continue;
            };
            let target = self.dir.join(name);
            match fs::copy(file, &target) {
                Ok(_) => {
                    debug!(from = %file.display(), to = %target.display(), "[DELIVER] Copied");
                    copied.push(file.clone());
                }
                Err(e) => {
                    warn!(from = %file.display(), to = %target.display(), error = %e, "[DELIVER] Copy failed")
                }
            }
        }
        Ok(copied)
    }
}

/// Devices discovered during this run, including those that were not found.
#[derive(Debug, Default)]
pub struct DeviceSessions {
    known: HashMap<String, Option<Device>>,
}

impl DeviceSessions {
    /// Discovers a device on first use; later calls reuse the answer.
    pub async fn resolve(
        &mut self,
        link: &dyn DeviceLink,
        listener: &dyn EventListener,
        device_id: &str,
    ) -> Option<Device> {
        if let Some(known) = self.known.get(device_id) {
            return known.clone();
        }
        let found = match link.discover(device_id).await {
            Ok(Some(device)) => {
                info!(id = %device.id, name = %device.name, channel = device.channel, "[DELIVER] Device found");
                Some(device)
            }
            Ok(None) => {
                listener.notify(Event::warn(format!("device {device_id} is not found")));
                None
            }
            Err(e) => {
                listener.notify(Event::warn(e.to_string()));
                None
            }
        };
        self.known.insert(device_id.to_string(), found.clone());
        found
    }
}

/// Outcome of delivering a batch of files.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Delivery {
    /// Accepted by every configured channel.
    pub delivered: Vec<PathBuf>,
    /// Accepted by some channels only.
    pub partial: Vec<PathBuf>,
    pub undelivered: Vec<PathBuf>,
}

impl Delivery {
    pub fn is_delivered(&self, path: &Path) -> bool {
        self.delivered.iter().any(|p| p == path)
    }
}

async fn send_to_device(
    link: &dyn DeviceLink,
    sessions: &mut DeviceSessions,
    listener: &dyn EventListener,
    device_id: &str,
    files: &[PathBuf],
) -> Vec<PathBuf> {
    let Some(device) = sessions.resolve(link, listener, device_id).await else {
        return Vec::new();
    };
    if let Err(e) = link.connect(&device).await {
        listener.notify(Event::warn(e.to_string()));
        return Vec::new();
    }
    listener.notify(Event::info(format!(
        "sending {} file(s) to {}",
        files.len(),
        device.name
    )));
    let sent = link.send(&device, files).await;
    link.disconnect(&device).await;
    sent
}

/// Sends `files` through every channel of `options`.
pub async fn deliver_files(
    options: &SendOptions,
    files: &[PathBuf],
    link: &dyn DeviceLink,
    sessions: &mut DeviceSessions,
    listener: &dyn EventListener,
) -> Delivery {
    let mut unique: Vec<PathBuf> = Vec::with_capacity(files.len());
    for file in files {
        if !unique.contains(file) {
            unique.push(file.clone());
        }
    }

    let mut channels: Vec<HashSet<PathBuf>> = Vec::new();
    if let Some(device_id) = &options.bluetooth_device_id {
        let sent = send_to_device(link, sessions, listener, device_id, &unique).await;
        channels.push(sent.into_iter().collect());
    }
    if let Some(dir) = &options.local_path {
        let copied = match LocalPathSender::new(dir).send(&unique) {
            Ok(copied) => copied,
            Err(e) => {
                listener.notify(Event::warn(e.to_string()));
                Vec::new()
            }
        };
        channels.push(copied.into_iter().collect());
    }

    let mut delivery = Delivery::default();
    for file in unique {
        let accepted = channels.iter().filter(|c| c.contains(&file)).count();
        if !channels.is_empty() && accepted == channels.len() {
            delivery.delivered.push(file);
        } else if accepted > 0 {
            delivery.partial.push(file);
        } else {
            delivery.undelivered.push(file);
        }
    }
    delivery
}

/// Delivers the staged files of a work queue.
pub async fn deliver_stage(
    ctx: &PipelineContext<'_>,
    run: &mut RunState,
    profile: &str,
    items: Vec<Entity>,
) -> StageOutcome {
    let options = ctx
        .profiles
        .get_send_options(profile)
        .filter(|o| o.bluetooth_device_id.is_some() || o.local_path.is_some());
    let Some(options) = options else {
        debug!(profile, "[DELIVER] No send section, files stay staged");
        for path in items.iter().filter_map(Entity::local_path) {
            run.ledger.keep(path);
        }
        return StageOutcome {
            succeeded: items,
            failed: Vec::new(),
        };
    };
    if items.is_empty() {
        return StageOutcome::default();
    }

    let files: Vec<PathBuf> = items
        .iter()
        .filter_map(|e| e.local_path().map(Path::to_path_buf))
        .collect();
    let delivery = deliver_files(
        options,
        &files,
        ctx.device_link,
        &mut run.sessions,
        ctx.listener,
    )
    .await;

    let mut outcome = StageOutcome::default();
    for entity in items {
        let Some(path) = entity.local_path().map(Path::to_path_buf) else {
            outcome.failed.push(entity);
            continue;
        };
        if delivery.is_delivered(&path) {
            run.ledger.dispose(&path);
            ctx.notify(Event::success(format!("delivered \"{}\"", entity.title)));
            outcome.succeeded.push(entity);
        } else {
            if delivery.partial.contains(&path) {
                warn!(profile, path = %path.display(), "[DELIVER] Partially delivered");
                ctx.notify(Event::warn(format!(
                    "\"{}\" reached only some destinations of {profile}, will retry",
                    entity.title
                )));
            } else {
                ctx.notify(Event::error(format!("cannot deliver \"{}\"", entity.title)));
            }
            outcome.failed.push(entity);
        }
    }
    outcome
}

/// Delivers whatever waits in the staging directory and deletes the files
/// that reached every channel.
pub async fn send_staged(
    staging_dir: &Path,
    options: &SendOptions,
    link: &dyn DeviceLink,
    listener: &dyn EventListener,
) -> Result<Delivery, DeliveryError> {
    let files = staged_files(staging_dir).map_err(|source| DeliveryError::Io {
        path: staging_dir.to_path_buf(),
        source,
    })?;
    if files.is_empty() {
        listener.notify(Event::info("nothing to send"));
        return Ok(Delivery::default());
    }
    let mut sessions = DeviceSessions::default();
    let delivery = deliver_files(options, &files, link, &mut sessions, listener).await;
    for file in &delivery.delivered {
        if let Err(e) = fs::remove_file(file) {
            warn!(path = %file.display(), error = %e, "[DELIVER] Cannot remove delivered file");
        }
    }
    for file in &delivery.partial {
        listener.notify(Event::warn(format!(
            "{} reached only some destinations",
            file.display()
        )));
    }
    Ok(delivery)
}
