//! Error types.

use crate::map::{JunctionId, PointId};
use crate::SlotId;
use thiserror::Error;

/// A problem with the road graph, detected while it is being built.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MapError {
    #[error("the traffic map contains no points")]
    Empty,
    #[error("point id {0} appears more than once")]
    DuplicatePoint(PointId),
    #[error("point at index {index} has id {id}; ids must be dense array indices")]
    SparsePoint { index: usize, id: PointId },
    #[error("point {point} links to missing point {target}")]
    DanglingLink { point: PointId, target: PointId },
    #[error("point {0} is not the previous point of its next point")]
    BrokenChain(PointId),
    #[error("junction {0} refers to a missing point")]
    BadJunction(JunctionId),
    #[error("junction {junction} has probability {probability}, outside [0, 1]")]
    BadProbability { junction: JunctionId, probability: f64 },
    #[error("point {0} already starts or ends another junction")]
    JunctionConflict(PointId),
    #[error("spline `{0}` does not exist")]
    UnknownSpline(String),
    #[error("spline `{name}` has no point {index}")]
    UnknownPoint { name: String, index: usize },
    #[error("`{0}` is not a `<spline>@<index>` reference")]
    BadReference(String),
    #[error("point {0} is already connected")]
    AlreadyConnected(PointId),
    #[error("spline `{0}` is defined twice")]
    DuplicateSpline(String),
    #[error("spline `{0}` needs at least two points")]
    ShortSpline(String),
}

/// An invalid configuration value.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("lane width {lane_width} m must be at least 1.05 times the detection radius {radius} m")]
    LaneWidthTooSmall { lane_width: f64, radius: f64 },
    #[error("`{0}` has its minimum above its maximum")]
    InvertedRange(&'static str),
    #[error("`{name}` must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("hourly traffic density needs 24 values, got {0}")]
    DensitySchedule(usize),
    #[error("`{0}` must be at least `{1}`")]
    Ordering(&'static str, &'static str),
}

/// Any error produced by the traffic core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrafficError {
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("point {0} has no next point")]
    DeadEnd(PointId),
    #[error("unknown slot {0:?}")]
    UnknownSlot(SlotId),
}
