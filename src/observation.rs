//! Tracked observations as delivered by the upstream detector/tracker.
//!
//! `RawObservation` and `TrackedFrame` mirror the wire shape (float box,
//! optional integer id, free-form label). `Observation` is the validated form
//! the counting core consumes.

use serde::{Deserialize, Serialize};

use crate::geometry::{BoundingBox, GeometryError};

/// Identity token supplied by the tracker.
///
/// Trackers that lose an object report `-1` (or no id at all); both map to
/// `Unknown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<i64>", into = "Option<i64>")]
pub enum Identity {
    Tracked(i64),
    Unknown,
}

impl Identity {
    pub const SENTINEL: i64 = -1;

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl From<i64> for Identity {
    fn from(raw: i64) -> Self {
        if raw < 0 {
            Self::Unknown
        } else {
            Self::Tracked(raw)
        }
    }
}

impl From<Option<i64>> for Identity {
    fn from(raw: Option<i64>) -> Self {
        raw.map(Identity::from).unwrap_or(Self::Unknown)
    }
}

impl From<Identity> for Option<i64> {
    fn from(identity: Identity) -> Self {
        match identity {
            Identity::Tracked(id) => Some(id),
            Identity::Unknown => None,
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tracked(id) => write!(f, "{}", id),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One object on one frame, exactly as the tracker reported it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawObservation {
    /// `[x1, y1, x2, y2]` in pixels.
    pub bbox: [f64; 4],
    #[serde(default = "unknown_identity")]
    pub id: Identity,
    #[serde(rename = "class")]
    pub class_label: String,
}

fn unknown_identity() -> Identity {
    Identity::Unknown
}

/// All tracker output for a single video frame.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrackedFrame {
    /// Frame sequence number assigned by the producer, if any.
    #[serde(default)]
    pub frame: Option<u64>,
    #[serde(default)]
    pub objects: Vec<RawObservation>,
}

/// Validated observation.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub bbox: BoundingBox,
    pub identity: Identity,
    pub class_label: String,
}

impl Observation {
    pub fn new(bbox: BoundingBox, identity: Identity, class_label: &str) -> Self {
        Self {
            bbox,
            identity,
            class_label: class_label.to_string(),
        }
    }
}

impl TryFrom<&RawObservation> for Observation {
    type Error = GeometryError;

    fn try_from(raw: &RawObservation) -> Result<Self, Self::Error> {
        Ok(Self {
            bbox: BoundingBox::from_f64(raw.bbox)?,
            identity: raw.id,
            class_label: raw.class_label.clone(),
        })
    }
}
