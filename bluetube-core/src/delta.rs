//! Delta processing: which fetched entries are new, and which of those the
//! user wants.
//!
//! Every entry published after the playlist's watermark is a candidate and is
//! shown to the [`Selector`] exactly once. The watermark then moves to the
//! newest candidate whether it was accepted or not, so a rejected entry is
//! never offered again.

use std::fmt;

use tracing::{debug, info};

use crate::contract::Selector;
use crate::model::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaState {
    Fetching,
    Comparing,
    AwaitingSelection,
    Updated,
}

impl fmt::Display for DeltaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeltaState::Fetching => "fetching",
            DeltaState::Comparing => "comparing",
            DeltaState::AwaitingSelection => "awaiting-selection",
            DeltaState::Updated => "updated",
        };
        f.write_str(name)
    }
}

/// Result of one playlist's selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    pub chosen: Vec<Entity>,
    /// The new watermark, never lower than the old one.
    pub last_update: i64,
    /// Number of candidates shown to the selector.
    pub shown: usize,
}

/// Walks one playlist through `Fetching → Comparing → AwaitingSelection →
/// Updated`.
#[derive(Debug)]
pub struct DeltaProcessor {
    state: DeltaState,
    last_update: i64,
    candidates: Vec<Entity>,
}

impl DeltaProcessor {
    pub fn new(last_update: i64) -> Self {
        Self {
            state: DeltaState::Fetching,
            last_update,
            candidates: Vec::new(),
        }
    }

    pub fn state(&self) -> DeltaState {
        self.state
    }

    fn transition(&mut self, next: DeltaState) {
        debug!(from = %self.state, to = %next, "[DELTA] State change");
        self.state = next;
    }

    /// Keeps the entries newer than the watermark, in feed order.
    pub fn compare(&mut self, entries: Vec<Entity>) -> &[Entity] {
        self.transition(DeltaState::Comparing);
        let watermark = self.last_update;
        self.candidates = entries
            .into_iter()
            .filter(|e| e.published > watermark)
            .collect();
        self.transition(DeltaState::AwaitingSelection);
        &self.candidates
    }

    /// Asks the selector about every candidate and raises the watermark.
    pub async fn select(mut self, selector: &dyn Selector) -> Delta {
        if self.state == DeltaState::Fetching {
            // nothing was fetched: the watermark stays
            self.transition(DeltaState::Comparing);
            self.transition(DeltaState::AwaitingSelection);
        }
        let candidates = std::mem::take(&mut self.candidates);
        let shown = candidates.len();
        let mut new_last_update = self.last_update;
        let mut chosen = Vec::new();

        for entity in candidates {
            new_last_update = new_last_update.max(entity.published);
            if selector.select(&entity).await {
                info!(title = %entity.title, "[DELTA] Entity chosen");
                chosen.push(entity);
            } else {
                debug!(title = %entity.title, "[DELTA] Entity rejected");
            }
        }

        self.transition(DeltaState::Updated);
        Delta {
            chosen,
            last_update: new_last_update,
            shown,
        }
    }
}

/// Computes the delta of one playlist in a single call.
pub async fn compute_delta(
    last_update: i64,
    entries: Vec<Entity>,
    selector: &dyn Selector,
) -> Delta {
    let mut processor = DeltaProcessor::new(last_update);
    processor.compare(entries);
    processor.select(selector).await
}
