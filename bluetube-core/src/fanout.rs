//! Fan-out of chosen entities into one work queue per subscribed profile.

use tracing::debug;

use crate::model::{Entity, Playlist};
use crate::profiles::Profiles;

/// The run-scoped work of one (playlist, profile) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkQueue {
    pub profile: String,
    pub items: Vec<Entity>,
}

/// Profiles the playlist is subscribed to that are not defined.
pub fn missing_profiles(playlist: &Playlist, profiles: &Profiles) -> Vec<String> {
    playlist
        .profiles
        .iter()
        .filter(|name| !profiles.check_profile(name))
        .cloned()
        .collect()
}

/// Builds one queue per profile: that profile's backlog first, then its own
/// copy of the chosen entities. The backlog is taken out of the playlist.
///
/// Repeated profile names yield a single queue.
pub fn fan_out(playlist: &mut Playlist, chosen: &[Entity]) -> Vec<WorkQueue> {
    let mut queues: Vec<WorkQueue> = Vec::with_capacity(playlist.profiles.len());
    let names = playlist.profiles.clone();
    for name in names {
        if queues.iter().any(|q| q.profile == name) {
            continue;
        }
        let mut items = playlist.take_failed_entities(&name);
        let backlog = items.len();
        items.extend(chosen.iter().cloned());
        debug!(
            playlist = %playlist.title,
            profile = %name,
            backlog,
            fresh = chosen.len(),
            "[FANOUT] Work queue built"
        );
        queues.push(WorkQueue {
            profile: name,
            items,
        });
    }
    queues
}
