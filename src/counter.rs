//! Single-line crossing counter.
//!
//! A `CrossingCounter` watches one line for one crossing polarity. It keeps,
//! per identity, the last centroid seen once that identity has been on the
//! approach side of the line. A crossing completes when the stored baseline
//! is at or before the line and the current centroid is strictly beyond it
//! (both widened by the tolerance offset).
//!
//! Baselines are only created on the approach side, so an object that first
//! appears already past the line never counts. After every check the
//! baseline is moved to the current centroid: a second crossing in the same
//! direction needs a fresh approach.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{Axis, BoundingBox, Direction};
use crate::observation::Identity;

/// Static configuration of one counting line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineConfig {
    pub axis: Axis,
    pub direction: Direction,
    /// Pixel coordinate of the line along the axis the counter reads.
    pub line_position: i64,
    /// Margin applied on both sides of the crossing test. Zero gives no
    /// protection against centroid jitter around the line.
    #[serde(default)]
    pub tolerance_offset: u32,
}

impl LineConfig {
    pub fn new(axis: Axis, direction: Direction, line_position: i64) -> Self {
        Self {
            axis,
            direction,
            line_position,
            tolerance_offset: 0,
        }
    }

    pub fn with_tolerance(mut self, tolerance_offset: u32) -> Self {
        self.tolerance_offset = tolerance_offset;
        self
    }

    fn on_approach_side(&self, centroid: i64) -> bool {
        match self.direction {
            Direction::Positive => centroid < self.line_position,
            Direction::Negative => centroid > self.line_position,
        }
    }

    // Centroids stay within the i32 pixel range and the offset is a u32, so
    // these sums cannot overflow.
    fn completes_crossing(&self, baseline: i64, centroid: i64) -> bool {
        let offset = i64::from(self.tolerance_offset);
        let line = self.line_position;
        match self.direction {
            Direction::Positive => baseline + offset <= line && line < centroid - offset,
            Direction::Negative => baseline - offset >= line && line > centroid + offset,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Baseline {
    position: i64,
    last_seen_frame: u64,
}

/// Crossing detector for one line and one direction.
#[derive(Clone, Debug)]
pub struct CrossingCounter {
    config: LineConfig,
    baselines: HashMap<Identity, Baseline>,
    total: u64,
    frame: u64,
    max_absent_frames: Option<u64>,
}

impl CrossingCounter {
    pub fn new(config: LineConfig) -> Self {
        Self {
            config,
            baselines: HashMap::new(),
            total: 0,
            frame: 0,
            max_absent_frames: None,
        }
    }

    /// Evict an identity's baseline once it has gone unobserved for more than
    /// `max_absent_frames` calls to [`advance_frame`](Self::advance_frame).
    pub fn with_expiry(mut self, max_absent_frames: u64) -> Self {
        self.max_absent_frames = Some(max_absent_frames);
        self
    }

    pub fn config(&self) -> &LineConfig {
        &self.config
    }

    /// Feed one observation. Returns true iff this call completed a crossing.
    pub fn count(&mut self, bbox: &BoundingBox, identity: Identity) -> bool {
        let centroid = bbox.centroid(self.config.axis);
        let frame = self.frame;

        if self.config.on_approach_side(centroid) {
            self.baselines.insert(
                identity,
                Baseline {
                    position: centroid,
                    last_seen_frame: frame,
                },
            );
        }

        let Some(baseline) = self.baselines.get_mut(&identity) else {
            return false;
        };

        let crossed = self.config.completes_crossing(baseline.position, centroid);
        baseline.position = centroid;
        baseline.last_seen_frame = frame;

        if crossed {
            self.total += 1;
        }
        crossed
    }

    /// Number of crossings detected so far.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Advance the frame clock and drop expired baselines.
    ///
    /// Returns the number of evicted identities.
    pub fn advance_frame(&mut self) -> usize {
        self.frame += 1;
        let Some(max_absent) = self.max_absent_frames else {
            return 0;
        };
        let now = self.frame;
        let before = self.baselines.len();
        self.baselines
            .retain(|_, baseline| now - baseline.last_seen_frame <= max_absent);
        before - self.baselines.len()
    }

    /// Forget all baselines. The running total is kept.
    pub fn reset_baselines(&mut self) {
        self.baselines.clear();
    }

    pub fn tracked_identities(&self) -> usize {
        self.baselines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertical(direction: Direction) -> CrossingCounter {
        CrossingCounter::new(LineConfig::new(Axis::Vertical, direction, 500))
    }

    /// Box of width 40 centered on `cx` horizontally.
    fn at_x(cx: i64) -> BoundingBox {
        BoundingBox::new(cx - 20, 100, cx + 20, 140).unwrap()
    }

    fn feed(counter: &mut CrossingCounter, id: i64, xs: &[i64]) -> Vec<bool> {
        xs.iter()
            .map(|&x| counter.count(&at_x(x), Identity::Tracked(id)))
            .collect()
    }

    #[test]
    fn positive_crossing_counts_once() {
        let mut counter = vertical(Direction::Positive);
        assert_eq!(counter.total(), 0);
        assert_eq!(feed(&mut counter, 1, &[400, 600]), vec![false, true]);
        assert_eq!(counter.total(), 1);
    }

    #[test]
    fn reverse_motion_never_counts_positive() {
        let mut counter = vertical(Direction::Positive);
        assert_eq!(feed(&mut counter, 1, &[600, 400]), vec![false, false]);
        assert_eq!(counter.total(), 0);
    }

    #[test]
    fn object_first_seen_past_line_never_counts() {
        let mut counter = vertical(Direction::Positive);
        assert_eq!(
            feed(&mut counter, 1, &[600, 650, 700, 900]),
            vec![false; 4]
        );
        assert_eq!(counter.tracked_identities(), 0);
        assert_eq!(counter.total(), 0);
    }

    #[test]
    fn stationary_object_never_counts() {
        let mut counter = vertical(Direction::Positive);
        assert_eq!(feed(&mut counter, 1, &[450; 5]), vec![false; 5]);
        assert_eq!(counter.total(), 0);
    }

    #[test]
    fn negative_crossing_counts_right_to_left() {
        let mut counter = vertical(Direction::Negative);
        assert_eq!(feed(&mut counter, 9, &[600, 400]), vec![false, true]);
        assert_eq!(feed(&mut counter, 10, &[400, 600]), vec![false, false]);
        assert_eq!(counter.total(), 1);
    }

    #[test]
    fn landing_exactly_on_line_is_not_yet_a_crossing() {
        let mut counter = vertical(Direction::Positive);
        // 500 is not strictly beyond the line; the crossing completes at 501.
        assert_eq!(feed(&mut counter, 1, &[480, 500, 501]), vec![false, false, true]);
        assert_eq!(counter.total(), 1);
    }

    #[test]
    fn baseline_moves_after_crossing_so_repeat_needs_new_approach() {
        let mut counter = vertical(Direction::Positive);
        assert_eq!(
            feed(&mut counter, 1, &[400, 600, 700, 650]),
            vec![false, true, false, false]
        );
        // Back onto the approach side, then across again.
        assert_eq!(feed(&mut counter, 1, &[450, 550]), vec![false, true]);
        assert_eq!(counter.total(), 2);
    }

    #[test]
    fn zero_offset_counts_jitter_around_line() {
        let mut counter = vertical(Direction::Positive);
        let fired = feed(&mut counter, 1, &[498, 502, 499, 503]);
        assert_eq!(fired, vec![false, true, false, true]);
        assert_eq!(counter.total(), 2);
    }

    #[test]
    fn tolerance_offset_absorbs_jitter() {
        let mut counter = CrossingCounter::new(
            LineConfig::new(Axis::Vertical, Direction::Positive, 500).with_tolerance(5),
        );
        assert_eq!(
            feed(&mut counter, 1, &[498, 502, 499, 503]),
            vec![false; 4]
        );
        // A decisive move from well before the line still counts.
        assert_eq!(feed(&mut counter, 1, &[480, 520]), vec![false, true]);
        assert_eq!(counter.total(), 1);
    }

    #[test]
    fn tolerance_applies_to_negative_direction() {
        let mut counter = CrossingCounter::new(
            LineConfig::new(Axis::Vertical, Direction::Negative, 500).with_tolerance(10),
        );
        assert_eq!(feed(&mut counter, 1, &[505, 495]), vec![false, false]);
        assert_eq!(feed(&mut counter, 2, &[520, 480]), vec![false, true]);
    }

    #[test]
    fn horizontal_line_reads_vertical_centroid() {
        let mut counter =
            CrossingCounter::new(LineConfig::new(Axis::Horizontal, Direction::Positive, 300));
        let above = BoundingBox::new(900, 250, 1000, 290).unwrap();
        let below = BoundingBox::new(0, 300, 100, 340).unwrap();
        assert!(!counter.count(&above, Identity::Tracked(4)));
        assert!(counter.count(&below, Identity::Tracked(4)));
    }

    #[test]
    fn identities_are_independent() {
        let mut counter = vertical(Direction::Positive);
        assert!(!counter.count(&at_x(400), Identity::Tracked(1)));
        // A different identity showing up past the line borrows nothing.
        assert!(!counter.count(&at_x(600), Identity::Tracked(2)));
        assert!(counter.count(&at_x(600), Identity::Tracked(1)));
        assert_eq!(counter.total(), 1);
    }

    #[test]
    fn replay_after_reset_reproduces_total() {
        let track = [420, 470, 530, 480, 460, 510, 700, 300, 520];
        let mut counter = vertical(Direction::Positive);
        feed(&mut counter, 3, &track);
        let first = counter.total();
        assert_eq!(first, 3);

        counter.reset_baselines();
        feed(&mut counter, 3, &track);
        assert_eq!(counter.total(), first * 2);
    }

    #[test]
    fn expiry_evicts_absent_identities() {
        let mut counter = vertical(Direction::Positive).with_expiry(2);
        counter.count(&at_x(400), Identity::Tracked(1));
        counter.count(&at_x(410), Identity::Tracked(2));
        assert_eq!(counter.advance_frame(), 0);

        counter.count(&at_x(420), Identity::Tracked(2));
        assert_eq!(counter.advance_frame(), 0);
        assert_eq!(counter.advance_frame(), 1);
        assert_eq!(counter.tracked_identities(), 1);

        // Identity 1 lost its baseline, so reappearing past the line is silent.
        assert!(!counter.count(&at_x(600), Identity::Tracked(1)));
        assert!(counter.count(&at_x(600), Identity::Tracked(2)));
    }

    #[test]
    fn without_expiry_baselines_persist() {
        let mut counter = vertical(Direction::Positive);
        counter.count(&at_x(400), Identity::Tracked(1));
        for _ in 0..1000 {
            assert_eq!(counter.advance_frame(), 0);
        }
        assert!(counter.count(&at_x(600), Identity::Tracked(1)));
    }
}
