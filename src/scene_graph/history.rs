use std::collections::VecDeque;

use crate::{
    scene_graph::renderable::{PoseUpdate, Renderable},
    time::{Duration, Time},
    transforms::TransformTree,
};

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub receive_time: Time,
    pub message_time: Time,
    pub renderable: Renderable,
}

/// Decay-windowed render history of one topic. With a decay time of zero only the latest
/// entry is kept.
#[derive(Debug, Clone, Default)]
pub struct RenderObjectHistory {
    entries: VecDeque<HistoryEntry>,
    decay_time: Duration,
}

impl RenderObjectHistory {
    pub fn new(decay_time: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            decay_time,
        }
    }

    pub fn decay_time(&self) -> Duration {
        self.decay_time
    }

    /// Changing the decay time to zero collapses the history to its latest entry.
    pub fn set_decay_time(&mut self, decay_time: Duration) {
        self.decay_time = decay_time;
        if decay_time == 0 {
            self.clear_history();
        }
    }

    /// Appends when decaying, otherwise replaces the latest entry.
    pub fn add_history_entry(&mut self, entry: HistoryEntry) {
        if self.decay_time == 0 {
            self.entries.clear();
        }
        self.entries.push_back(entry);
    }

    /// Drops entries with `message_time + decay_time < current_time`, always keeping the latest.
    pub fn update_history_from_current_time(&mut self, current_time: Time) {
        let Some(latest) = self.entries.pop_back() else {
            return;
        };
        let decay_time = self.decay_time;
        self.entries
            .retain(|entry| entry.message_time.saturating_add(decay_time) >= current_time);
        self.entries.push_back(latest);
    }

    /// Re-resolves every retained entry. Returns false if any entry is missing a transform.
    pub fn update_poses(
        &mut self,
        tree: &TransformTree,
        render_frame_id: &str,
        fixed_frame_id: &str,
        current_time: Time,
    ) -> bool {
        let mut all_resolved = true;
        for entry in &mut self.entries {
            let update = entry.renderable.update_pose(
                tree,
                render_frame_id,
                fixed_frame_id,
                current_time,
            );
            all_resolved &= update == PoseUpdate::Resolved;
        }
        all_resolved
    }

    /// Collapses the history to its latest entry.
    pub fn clear_history(&mut self) {
        while self.entries.len() > 1 {
            self.entries.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn latest_mut(&mut self) -> Option<&mut HistoryEntry> {
        self.entries.back_mut()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut HistoryEntry> {
        self.entries.iter_mut()
    }

    pub fn renderables(&self) -> impl Iterator<Item = &Renderable> {
        self.entries.iter().map(|entry| &entry.renderable)
    }

    pub fn renderables_mut(&mut self) -> impl Iterator<Item = &mut Renderable> {
        self.entries.iter_mut().map(|entry| &mut entry.renderable)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
