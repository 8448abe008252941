//! Counting-line geometry.
//!
//! `BoundingBox` is the only way pixel coordinates enter the counting core.
//! Its fields are private and every constructor validates ordering, the
//! pixel range (and finiteness for float input), so a counter never sees a
//! box whose centroid would be meaningless. Coordinates are limited to the
//! `i32` range; every sum a counter computes then fits in `i64`.
//!
//! ```compile_fail
//! use crossline::BoundingBox;
//!
//! let bbox = BoundingBox { x1: 10, y1: 0, x2: 0, y2: 5 };
//! ```

use serde::{Deserialize, Serialize};

/// Which image axis the counting line is perpendicular to.
///
/// A `Vertical` line is crossed by horizontal motion, so counters read the
/// horizontal centroid of a box; `Horizontal` reads the vertical centroid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Vertical,
    Horizontal,
}

impl Axis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vertical => "vertical",
            Self::Horizontal => "horizontal",
        }
    }
}

impl std::str::FromStr for Axis {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vertical" => Ok(Self::Vertical),
            "horizontal" => Ok(Self::Horizontal),
            other => Err(anyhow::anyhow!(
                "axis must be 'vertical' or 'horizontal', got '{}'",
                other
            )),
        }
    }
}

/// Crossing polarity detected by a counter.
///
/// `Positive` approaches from below the line position (left, or top in image
/// coordinates) and finishes beyond it; `Negative` is the reverse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Ok(Self::Positive),
            "negative" => Ok(Self::Negative),
            other => Err(anyhow::anyhow!(
                "direction must be 'positive' or 'negative', got '{}'",
                other
            )),
        }
    }
}

/// Input-validation failure for box coordinates.
#[derive(Clone, Debug, PartialEq)]
pub enum GeometryError {
    /// A float coordinate was NaN or infinite.
    NonFinite { coords: [f64; 4] },
    /// `min >= max` on the named axis.
    Unordered { axis: char, min: i64, max: i64 },
    /// A coordinate lies outside the supported pixel range.
    OutOfRange { value: f64 },
}

/// Smallest accepted pixel coordinate.
pub const MIN_COORDINATE: i64 = i32::MIN as i64;
/// Largest accepted pixel coordinate.
pub const MAX_COORDINATE: i64 = i32::MAX as i64;

impl std::fmt::Display for GeometryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFinite { coords } => write!(
                f,
                "invalid geometry: non-finite bounding box coordinates {:?}",
                coords
            ),
            Self::Unordered { axis, min, max } => write!(
                f,
                "invalid geometry: bounding box requires {axis}1 < {axis}2 (got {axis}1={min}, {axis}2={max})"
            ),
            Self::OutOfRange { value } => write!(
                f,
                "invalid geometry: coordinate {} outside [{}, {}]",
                value, MIN_COORDINATE, MAX_COORDINATE
            ),
        }
    }
}

impl std::error::Error for GeometryError {}

/// Axis-aligned box in pixel coordinates, `x1 < x2` and `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    x1: i64,
    y1: i64,
    x2: i64,
    y2: i64,
}

impl BoundingBox {
    pub fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> Result<Self, GeometryError> {
        if let Some(&value) = [x1, y1, x2, y2]
            .iter()
            .find(|c| !(MIN_COORDINATE..=MAX_COORDINATE).contains(*c))
        {
            return Err(GeometryError::OutOfRange {
                value: value as f64,
            });
        }
        if x1 >= x2 {
            return Err(GeometryError::Unordered {
                axis: 'x',
                min: x1,
                max: x2,
            });
        }
        if y1 >= y2 {
            return Err(GeometryError::Unordered {
                axis: 'y',
                min: y1,
                max: y2,
            });
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Build from detector float output. Coordinates are truncated toward
    /// zero, the same as casting tracker output to integer pixels.
    ///
    /// Truncation happens before the ordering check, so a sub-pixel box such
    /// as `[10.2, 0.0, 10.8, 1.0]` collapses to `x1 == x2` and is rejected as
    /// `Unordered`.
    pub fn from_f64(coords: [f64; 4]) -> Result<Self, GeometryError> {
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(GeometryError::NonFinite { coords });
        }
        let range = MIN_COORDINATE as f64..=MAX_COORDINATE as f64;
        if let Some(&value) = coords.iter().find(|c| !range.contains(&c.trunc())) {
            return Err(GeometryError::OutOfRange { value });
        }
        let [x1, y1, x2, y2] = coords.map(|c| c.trunc() as i64);
        Self::new(x1, y1, x2, y2)
    }

    pub fn x1(&self) -> i64 {
        self.x1
    }

    pub fn y1(&self) -> i64 {
        self.y1
    }

    pub fn x2(&self) -> i64 {
        self.x2
    }

    pub fn y2(&self) -> i64 {
        self.y2
    }

    pub fn width(&self) -> i64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i64 {
        self.y2 - self.y1
    }

    /// Midpoint along the coordinate read for `axis`, flooring division.
    pub fn centroid(&self, axis: Axis) -> i64 {
        match axis {
            Axis::Vertical => (self.x1 + self.x2).div_euclid(2),
            Axis::Horizontal => (self.y1 + self.y2).div_euclid(2),
        }
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = GeometryError;

    fn try_from(coords: [f64; 4]) -> Result<Self, Self::Error> {
        Self::from_f64(coords)
    }
}
