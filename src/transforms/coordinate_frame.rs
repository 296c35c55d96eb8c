use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use crate::{
    time::{self, Duration, Time},
    transforms::transform::Transform,
};

pub const DEFAULT_MAX_CAPACITY_PER_FRAME: usize = 50_000;
pub const DEFAULT_MAX_STORAGE_TIME: Duration = 10 * time::NANOS_PER_SEC;

/// A named frame and the time-stamped history of its transform into its parent.
#[derive(Debug, Clone)]
pub struct CoordinateFrame {
    id: String,
    parent_id: Option<String>,
    transforms: BTreeMap<Time, Transform>,
    max_capacity: usize,
    max_storage_time: Duration,
}

/// The pair of samples bracketing a lookup time. Both are the same sample on an exact hit
/// or when the lookup is clamped to one end of the history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestTransforms {
    pub lower: (Time, Transform),
    pub upper: (Time, Transform),
}

impl ClosestTransforms {
    pub fn interpolate(&self, time: Time) -> Transform {
        let (lower_time, lower) = self.lower;
        let (upper_time, upper) = self.upper;
        if lower_time == upper_time {
            return lower;
        }
        Transform::interpolate(&lower, &upper, time::fraction(lower_time, upper_time, time))
    }
}

impl CoordinateFrame {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            transforms: BTreeMap::new(),
            max_capacity: DEFAULT_MAX_CAPACITY_PER_FRAME,
            max_storage_time: DEFAULT_MAX_STORAGE_TIME,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    /// Re-parenting discards the history recorded against the previous parent.
    pub(crate) fn set_parent(&mut self, parent_id: &str) {
        if self.parent_id.as_deref() != Some(parent_id) {
            self.transforms.clear();
            self.parent_id = Some(parent_id.to_string());
        }
    }

    pub(crate) fn set_limits(&mut self, max_capacity: usize, max_storage_time: Duration) {
        self.max_capacity = max_capacity.max(1);
        self.max_storage_time = max_storage_time;
        self.prune();
    }

    pub fn transform_count(&self) -> usize {
        self.transforms.len()
    }

    pub fn transforms(&self) -> impl Iterator<Item = (Time, &Transform)> {
        self.transforms.iter().map(|(time, tf)| (*time, tf))
    }

    pub fn latest_time(&self) -> Option<Time> {
        self.transforms.last_key_value().map(|(time, _)| *time)
    }

    /// Inserts a sample, replacing any sample at the same timestamp.
    pub(crate) fn add_transform(&mut self, time: Time, transform: Transform) {
        self.transforms.insert(time, transform);
        self.prune();
    }

    pub(crate) fn remove_transform(&mut self, time: Time) -> bool {
        self.transforms.remove(&time).is_some()
    }

    fn prune(&mut self) {
        while self.transforms.len() > self.max_capacity {
            self.transforms.pop_first();
        }

        let Some(latest) = self.latest_time() else {
            return;
        };
        let cutoff = latest.saturating_sub(self.max_storage_time);
        while let Some((&oldest, _)) = self.transforms.first_key_value() {
            if oldest >= cutoff || oldest == latest {
                break;
            }
            self.transforms.pop_first();
        }
    }

    /// Finds the samples bracketing `time`. Outside the recorded range the nearest sample is
    /// used only if it lies within `max_delta` of `time`.
    pub fn find_closest_transforms(&self, time: Time, max_delta: Duration) -> Option<ClosestTransforms> {
        let (&first_time, first) = self.transforms.first_key_value()?;

        if self.transforms.len() == 1 {
            let within = first_time.abs_diff(time) <= max_delta;
            return within.then_some(ClosestTransforms {
                lower: (first_time, *first),
                upper: (first_time, *first),
            });
        }

        let Some((&lower_time, lower)) = self.transforms.range(..=time).next_back() else {
            // Every sample is after the requested time
            return (first_time - time <= max_delta).then_some(ClosestTransforms {
                lower: (first_time, *first),
                upper: (first_time, *first),
            });
        };

        if lower_time == time {
            return Some(ClosestTransforms {
                lower: (lower_time, *lower),
                upper: (lower_time, *lower),
            });
        }

        match self.transforms.range((Excluded(time), Unbounded)).next() {
            Some((&upper_time, upper)) => Some(ClosestTransforms {
                lower: (lower_time, *lower),
                upper: (upper_time, *upper),
            }),
            // Every sample is before the requested time
            None => (time - lower_time <= max_delta).then_some(ClosestTransforms {
                lower: (lower_time, *lower),
                upper: (lower_time, *lower),
            }),
        }
    }

    /// The interpolated transform from this frame into its parent at `time`.
    pub fn transform_at(&self, time: Time, max_delta: Duration) -> Option<Transform> {
        self.find_closest_transforms(time, max_delta)
            .map(|closest| closest.interpolate(time))
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;

    fn frame_with(samples: &[(Time, f64)]) -> CoordinateFrame {
        let mut frame = CoordinateFrame::new("child");
        frame.set_parent("parent");
        for (time, x) in samples {
            frame.add_transform(*time, Transform::from_translation(DVec3::new(*x, 0.0, 0.0)));
        }
        frame
    }

    #[test]
    fn exact_timestamp_returns_recorded_sample() {
        let frame = frame_with(&[(0, 0.0), (10, 10.0), (20, 3.25)]);
        let tf = frame.transform_at(20, u64::MAX).unwrap();
        assert_eq!(tf.translation, DVec3::new(3.25, 0.0, 0.0));
        let tf = frame.transform_at(10, 0).unwrap();
        assert_eq!(tf.translation, DVec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn interpolates_between_samples() {
        let frame = frame_with(&[(0, 0.0), (10, 10.0)]);
        let tf = frame.transform_at(5, 0).unwrap();
        assert!(tf.translation.abs_diff_eq(DVec3::new(5.0, 0.0, 0.0), 1e-12));
    }

    #[test]
    fn staleness_is_bounded_by_max_delta() {
        let frame = frame_with(&[(100, 1.0), (200, 2.0)]);
        assert!(frame.transform_at(50, 10).is_none());
        assert!(frame.transform_at(95, 10).is_some());
        assert!(frame.transform_at(260, 50).is_none());
        assert_eq!(
            frame.transform_at(240, 50).unwrap().translation,
            DVec3::new(2.0, 0.0, 0.0)
        );
    }

    #[test]
    fn same_timestamp_overwrites() {
        let frame = frame_with(&[(5, 1.0), (5, 7.0)]);
        assert_eq!(frame.transform_count(), 1);
        assert_eq!(frame.transform_at(5, 0).unwrap().translation.x, 7.0);
    }

    #[test]
    fn history_is_bounded() {
        let mut frame = frame_with(&[]);
        frame.set_limits(5, u64::MAX);
        for time in 0..10 {
            frame.add_transform(time, Transform::IDENTITY);
        }
        assert_eq!(frame.transform_count(), 5);
        assert_eq!(frame.transforms().next().unwrap().0, 5);

        frame.set_limits(100, 2);
        assert_eq!(frame.transforms().map(|(t, _)| t).collect::<Vec<_>>(), vec![7, 8, 9]);
    }

    #[test]
    fn reparenting_drops_history() {
        let mut frame = frame_with(&[(1, 1.0)]);
        frame.set_parent("parent");
        assert_eq!(frame.transform_count(), 1);
        frame.set_parent("other");
        assert_eq!(frame.transform_count(), 0);
        assert_eq!(frame.parent_id(), Some("other"));
    }
}
