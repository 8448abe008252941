//! In-memory source for tests and demos.

use std::collections::VecDeque;

use anyhow::Result;

use super::{ObservationSource, SourceStats};
use crate::observation::TrackedFrame;

#[derive(Clone, Debug, Default)]
pub struct ScriptedSource {
    frames: VecDeque<TrackedFrame>,
    stats: SourceStats,
}

impl ScriptedSource {
    pub fn new(frames: impl IntoIterator<Item = TrackedFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            stats: SourceStats::default(),
        }
    }

    pub fn push(&mut self, frame: TrackedFrame) {
        self.frames.push_back(frame);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl ObservationSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn next_frame(&mut self) -> Result<Option<TrackedFrame>> {
        let frame = self.frames.pop_front();
        if let Some(frame) = &frame {
            self.stats.record(frame);
        }
        Ok(frame)
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}
