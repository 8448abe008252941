//! Observation ingestion sources.
//!
//! Detection and tracking run upstream; this layer only reads their output.
//! Sources produce one `TrackedFrame` per video frame:
//! - JSON lines from a local file or stdin (`JsonLinesSource`)
//! - An in-memory queue (`ScriptedSource`) for tests and demos
//!
//! Sources do not validate geometry. Bounding boxes are checked when the
//! frame loop turns raw observations into `Observation`s, so the invalid-input
//! policy lives in one place.

pub mod jsonl;
pub mod scripted;

use anyhow::Result;

use crate::observation::TrackedFrame;

pub use jsonl::JsonLinesSource;
pub use scripted::ScriptedSource;

/// A stream of tracked frames.
pub trait ObservationSource {
    /// Source identifier for logs.
    fn name(&self) -> &str;

    /// Next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<TrackedFrame>>;

    fn stats(&self) -> SourceStats;
}

/// Statistics for a source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_read: u64,
    pub observations_read: u64,
}

impl SourceStats {
    pub(crate) fn record(&mut self, frame: &TrackedFrame) {
        self.frames_read += 1;
        self.observations_read += frame.objects.len() as u64;
    }
}
