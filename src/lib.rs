//! Crossline
//!
//! Counts tracked objects crossing a virtual line, per object class and per
//! crossing direction. Detection and tracking happen upstream; this crate
//! consumes per-frame `(bbox, identity, class)` observations.
//!
//! # Architecture
//!
//! Counting is an explicit, owned object graph with no process-wide state:
//!
//! 1. **`CrossingCounter`**: one line, one direction, a per-identity baseline
//!    map and a running total. The decision function is `count`.
//! 2. **`ClassCounterRegistry`**: validated class labels → ordered counters;
//!    `dispatch` fans an observation out, `aggregate` sums a class.
//! 3. **`FrameProcessor`**: owns the registry, validates each frame, applies
//!    the invalid-input policy and advances baseline expiry.
//!
//! # Module Structure
//!
//! - `geometry`: `BoundingBox`, `Axis`, `Direction`, `GeometryError`
//! - `observation`: `Identity`, `Observation`, tracker wire types
//! - `counter`: `CrossingCounter`, `LineConfig`
//! - `registry`: `ClassCounterRegistry`, `ClassLabel`, totals
//! - `ingest`: observation sources (JSON lines, scripted)
//! - `pipeline`: frame loop and crossing events
//! - `config`: `crosscountd` configuration (file + env)

pub mod config;
pub mod counter;
pub mod geometry;
pub mod ingest;
pub mod observation;
pub mod pipeline;
pub mod registry;

pub use config::CounterdConfig;
pub use counter::{CrossingCounter, LineConfig};
pub use geometry::{Axis, BoundingBox, Direction, GeometryError};
pub use ingest::{JsonLinesSource, ObservationSource, ScriptedSource, SourceStats};
pub use observation::{Identity, Observation, RawObservation, TrackedFrame};
pub use pipeline::{CrossingEvent, FrameProcessor, FrameReport, InvalidInputPolicy};
pub use registry::{ClassCounterRegistry, ClassLabel, ClassTotals, UnknownIdentityPolicy};
