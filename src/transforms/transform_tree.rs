use std::collections::{BTreeMap, HashMap};

use crate::{
    time::{Duration, Time},
    transforms::{
        coordinate_frame::{
            CoordinateFrame, DEFAULT_MAX_CAPACITY_PER_FRAME, DEFAULT_MAX_STORAGE_TIME,
        },
        transform::{Pose, Transform},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddTransformResult {
    Noop,
    Updated,
    CycleDetected,
}

/// One entry of [`TransformTree::frame_list`], in depth-first order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameListEntry {
    pub id: String,
    pub depth: usize,
}

/// Strips the leading `/` some publishers put in front of frame ids.
pub fn normalize_frame_id(frame_id: &str) -> &str {
    frame_id.strip_prefix('/').unwrap_or(frame_id)
}

/// A forest of coordinate frames linked by time-stamped transforms.
#[derive(Debug, Clone)]
pub struct TransformTree {
    frames: HashMap<String, CoordinateFrame>,
    max_delta: Duration,
    max_capacity_per_frame: usize,
    max_storage_time: Duration,
}

impl Default for TransformTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformTree {
    pub fn new() -> Self {
        Self {
            frames: HashMap::new(),
            max_delta: Duration::MAX,
            max_capacity_per_frame: DEFAULT_MAX_CAPACITY_PER_FRAME,
            max_storage_time: DEFAULT_MAX_STORAGE_TIME,
        }
    }

    /// How far outside of an edge's recorded history a lookup may reach before the edge
    /// counts as missing.
    pub fn set_max_delta(&mut self, max_delta: Duration) {
        self.max_delta = max_delta;
    }

    pub fn max_delta(&self) -> Duration {
        self.max_delta
    }

    pub fn set_history_limits(&mut self, max_capacity_per_frame: usize, max_storage_time: Duration) {
        self.max_capacity_per_frame = max_capacity_per_frame;
        self.max_storage_time = max_storage_time;
        for frame in self.frames.values_mut() {
            frame.set_limits(max_capacity_per_frame, max_storage_time);
        }
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn has_frame(&self, frame_id: &str) -> bool {
        self.frames.contains_key(frame_id)
    }

    pub fn frame(&self, frame_id: &str) -> Option<&CoordinateFrame> {
        self.frames.get(frame_id)
    }

    pub fn frames(&self) -> impl Iterator<Item = &CoordinateFrame> {
        self.frames.values()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Registers a frame without any transforms. Returns true if the frame is new.
    pub fn add_coordinate_frame(&mut self, frame_id: &str) -> bool {
        if self.frames.contains_key(frame_id) {
            return false;
        }
        self.get_or_create_frame(frame_id);
        true
    }

    fn get_or_create_frame(&mut self, frame_id: &str) -> &mut CoordinateFrame {
        let (capacity, storage) = (self.max_capacity_per_frame, self.max_storage_time);
        self.frames.entry(frame_id.to_string()).or_insert_with(|| {
            let mut frame = CoordinateFrame::new(frame_id);
            frame.set_limits(capacity, storage);
            frame
        })
    }

    /// Records the transform from `child_frame_id` into `parent_frame_id` at `stamp`.
    pub fn add_transform(
        &mut self,
        parent_frame_id: &str,
        child_frame_id: &str,
        stamp: Time,
        transform: Transform,
    ) -> AddTransformResult {
        if parent_frame_id == child_frame_id || self.is_ancestor(child_frame_id, parent_frame_id) {
            return AddTransformResult::CycleDetected;
        }

        let mut updated = !self.has_frame(child_frame_id) || !self.has_frame(parent_frame_id);
        self.get_or_create_frame(parent_frame_id);
        let child = self.get_or_create_frame(child_frame_id);
        if child.parent_id() != Some(parent_frame_id) {
            child.set_parent(parent_frame_id);
            updated = true;
        }
        child.add_transform(stamp, transform);

        if updated {
            AddTransformResult::Updated
        } else {
            AddTransformResult::Noop
        }
    }

    /// Removes a single sample. Returns true if the sample existed.
    pub fn remove_transform(&mut self, child_frame_id: &str, parent_frame_id: &str, stamp: Time) -> bool {
        match self.frames.get_mut(child_frame_id) {
            Some(frame) if frame.parent_id() == Some(parent_frame_id) => {
                frame.remove_transform(stamp)
            }
            _ => false,
        }
    }

    /// True if `ancestor_id` is reachable by walking parents up from `frame_id`.
    pub fn is_ancestor(&self, ancestor_id: &str, frame_id: &str) -> bool {
        let mut current = self.frames.get(frame_id).and_then(|f| f.parent_id());
        let mut steps = 0;
        while let Some(id) = current {
            if id == ancestor_id {
                return true;
            }
            steps += 1;
            if steps > self.frames.len() {
                break;
            }
            current = self.frames.get(id).and_then(|f| f.parent_id());
        }
        false
    }

    /// The topmost ancestor of `frame_id`, or `frame_id` itself for a root.
    pub fn root_of<'a>(&'a self, frame_id: &'a str) -> Option<&'a str> {
        let mut frame = self.frames.get(frame_id)?;
        let mut steps = 0;
        while let Some(parent) = frame.parent_id().and_then(|id| self.frames.get(id)) {
            frame = parent;
            steps += 1;
            if steps > self.frames.len() {
                break;
            }
        }
        Some(frame.id())
    }

    /// Composes the transform that maps points in `child_id` into `ancestor_id` at `time`.
    pub fn transform_to_ancestor(&self, ancestor_id: &str, child_id: &str, time: Time) -> Option<Transform> {
        let mut accumulated = Transform::IDENTITY;
        let mut current = child_id;
        let mut steps = 0;
        while current != ancestor_id {
            let frame = self.frames.get(current)?;
            let parent_id = frame.parent_id()?;
            let edge = frame.transform_at(time, self.max_delta)?;
            accumulated = edge * accumulated;
            current = parent_id;
            steps += 1;
            if steps > self.frames.len() {
                return None;
            }
        }
        Some(accumulated)
    }

    /// Resolves `input`, expressed in `src_frame_id` at `src_time`, into `render_frame_id` at
    /// `dst_time`, using `fixed_frame_id` as the shared reference. Returns `None` if any edge
    /// along either path is missing.
    pub fn apply(
        &self,
        input: &Pose,
        render_frame_id: &str,
        fixed_frame_id: &str,
        src_frame_id: &str,
        dst_time: Time,
        src_time: Time,
    ) -> Option<Pose> {
        if src_frame_id == render_frame_id && src_time == dst_time {
            return self.has_frame(src_frame_id).then_some(*input);
        }

        let fixed_from_src = self.transform_to_ancestor(fixed_frame_id, src_frame_id, src_time)?;
        let fixed_from_render =
            self.transform_to_ancestor(fixed_frame_id, render_frame_id, dst_time)?;
        let render_from_src = fixed_from_render.inverse() * fixed_from_src;
        Some(render_from_src.apply_to_pose(input))
    }

    /// Frame ids in hierarchical order: roots sorted by id, each followed by its descendants.
    pub fn frame_list(&self) -> Vec<FrameListEntry> {
        let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut roots = Vec::new();
        for frame in self.frames.values() {
            match frame.parent_id() {
                Some(parent) if self.frames.contains_key(parent) => {
                    children.entry(parent).or_default().push(frame.id())
                }
                _ => roots.push(frame.id()),
            }
        }
        roots.sort_unstable();
        for list in children.values_mut() {
            list.sort_unstable();
        }

        let mut out = Vec::with_capacity(self.frames.len());
        let mut stack: Vec<(&str, usize)> = roots.into_iter().rev().map(|id| (id, 0)).collect();
        while let Some((id, depth)) = stack.pop() {
            out.push(FrameListEntry {
                id: id.to_string(),
                depth,
            });
            if let Some(kids) = children.get(id) {
                stack.extend(kids.iter().rev().map(|kid| (*kid, depth + 1)));
            }
        }
        out
    }

    /// Number of frames below `frame_id`.
    pub fn descendant_count(&self, frame_id: &str) -> usize {
        self.frames
            .keys()
            .filter(|id| self.is_ancestor(frame_id, id))
            .count()
    }
}
