//! The road graph: spline points chained into lanes, cross-linked by
//! junctions and adjacent-lane links.

use crate::error::MapError;
use crate::math::{normalize_or_zero, Point3d, Vector3d};
use arrayvec::ArrayVec;
use cgmath::prelude::*;
use self::kdtree::KdTree;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub use builder::{ConnectionDef, JunctionConfig, JunctionDef, LaneLinkDef, PointData, TrafficMapBuilder};
pub use lanes::{AdjacentLaneDetector, MIN_WIDTH_FACTOR};

mod builder;
#[cfg(test)]
pub(crate) mod fixtures;
mod kdtree;
mod lanes;

/// The maximum number of parallel lanes reported by [TrafficMap::lanes].
pub const MAX_LANES: usize = 8;

/// Unique ID of a [SplinePoint]; also its index in the map's point array.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointId(pub u32);

/// Unique ID of a [Junction]; also its index in the map's junction array.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JunctionId(pub u32);

impl PointId {
    /// Creates an ID from an array index.
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// The array index of the point.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl JunctionId {
    /// Creates an ID from an array index.
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// The array index of the junction.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for JunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "J{}", self.0)
    }
}

/// Which turn indicator a vehicle shows.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Indicator {
    #[default]
    None,
    Left,
    Right,
}

/// A node on the road graph.
#[derive(Clone, Debug, PartialEq)]
pub struct SplinePoint {
    /// The point ID.
    pub id: PointId,
    /// The world space position.
    pub position: Point3d,
    /// The next point along the lane.
    pub next: Option<PointId>,
    /// The previous point along the lane.
    pub previous: Option<PointId>,
    /// The point on the adjacent lane to the left.
    pub left: Option<PointId>,
    /// The point on the adjacent lane to the right.
    pub right: Option<PointId>,
    /// The junction that branches off at this point.
    pub junction_start: Option<JunctionId>,
    /// The junction that merges in at this point.
    pub junction_end: Option<JunctionId>,
    /// The radius of the road's curvature at this point in m.
    pub radius: f64,
    /// The grip-limited cornering speed at this point in m/s,
    /// before any per-vehicle cornering factor is applied.
    pub max_cornering_speed: f64,
    /// The road camber in radians.
    pub camber: f64,
    /// The distance to the next point in m, or zero at the end of a chain.
    pub length: f64,
}

impl SplinePoint {
    /// Creates an unlinked point.
    pub fn new(id: PointId, position: Point3d) -> Self {
        Self {
            id,
            position,
            next: None,
            previous: None,
            left: None,
            right: None,
            junction_start: None,
            junction_end: None,
            radius: f64::INFINITY,
            max_cornering_speed: f64::INFINITY,
            camber: 0.0,
            length: 0.0,
        }
    }

    fn links(&self) -> impl Iterator<Item = PointId> {
        [self.next, self.previous, self.left, self.right]
            .into_iter()
            .flatten()
    }
}

/// A probabilistic branch from one point of the graph to another.
#[derive(Clone, Debug, PartialEq)]
pub struct Junction {
    /// The junction ID.
    pub id: JunctionId,
    /// The point where vehicles leave their lane.
    pub start: PointId,
    /// The point where vehicles arrive.
    pub end: PointId,
    /// The probability that a vehicle takes the junction.
    pub probability: f64,
    /// The indicator shown by vehicles taking the junction.
    pub indicate_when_taken: Indicator,
    /// The indicator shown by vehicles passing the junction.
    pub indicate_when_not_taken: Indicator,
    /// How far before the start vehicles begin to indicate, in m.
    pub indicate_distance_pre: f64,
    /// How far after the end vehicles stop indicating, in m.
    pub indicate_distance_post: f64,
}

/// A named chain of points, usually one lane of road.
#[derive(Clone, Debug, PartialEq)]
pub struct TrafficSpline {
    /// The spline's name, used in `<spline>@<index>` references.
    pub name: String,
    /// The points of the spline in driving order.
    pub points: Vec<PointId>,
    /// Whether the last point links back to the first.
    pub closed: bool,
}

/// The road graph with its spatial index.
///
/// Built once at load time; read-only for the rest of the server's life.
pub struct TrafficMap {
    points: Vec<SplinePoint>,
    junctions: Vec<Junction>,
    splines: Vec<TrafficSpline>,
    spline_names: HashMap<String, usize>,
    tree: KdTree,
}

impl TrafficMap {
    /// Creates a map from its raw parts, validating the graph invariants.
    pub fn new(
        points: Vec<SplinePoint>,
        junctions: Vec<Junction>,
        splines: Vec<TrafficSpline>,
    ) -> Result<Self, MapError> {
        if points.is_empty() {
            return Err(MapError::Empty);
        }
        validate_ids(&points)?;
        validate_links(&points)?;
        validate_junctions(&points, &junctions)?;

        let mut spline_names = HashMap::with_capacity(splines.len());
        for (idx, spline) in splines.iter().enumerate() {
            if spline_names.insert(spline.name.clone(), idx).is_some() {
                return Err(MapError::DuplicateSpline(spline.name.clone()));
            }
            if let Some(bad) = spline.points.iter().find(|id| id.index() >= points.len()) {
                return Err(MapError::DanglingLink {
                    point: spline.points[0],
                    target: *bad,
                });
            }
        }

        let tree = KdTree::new(points.iter().map(|p| (p.position, p.id)));

        Ok(Self {
            points,
            junctions,
            splines,
            spline_names,
            tree,
        })
    }

    /// The number of points in the map.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the map has no points. Always false for a validated map.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// All points, indexed by [PointId].
    pub fn points(&self) -> &[SplinePoint] {
        &self.points
    }

    /// Gets the point with the given ID.
    pub fn point(&self, id: PointId) -> &SplinePoint {
        &self.points[id.index()]
    }

    /// All junctions, indexed by [JunctionId].
    pub fn junctions(&self) -> &[Junction] {
        &self.junctions
    }

    /// Gets the junction with the given ID.
    pub fn junction(&self, id: JunctionId) -> &Junction {
        &self.junctions[id.index()]
    }

    /// All splines in load order.
    pub fn splines(&self) -> &[TrafficSpline] {
        &self.splines
    }

    /// Gets a spline by name.
    pub fn spline(&self, name: &str) -> Option<&TrafficSpline> {
        self.spline_names.get(name).map(|idx| &self.splines[*idx])
    }

    /// Resolves a `<spline>@<index>` reference to a point.
    pub fn resolve(&self, reference: &str) -> Result<PointId, MapError> {
        let (name, index) = parse_reference(reference)?;
        let spline = self
            .spline(name)
            .ok_or_else(|| MapError::UnknownSpline(name.to_string()))?;
        spline
            .points
            .get(index)
            .copied()
            .ok_or_else(|| MapError::UnknownPoint {
                name: name.to_string(),
                index,
            })
    }

    /// The point vehicles are sent to when they run off the end of the graph:
    /// the first point of the first spline.
    pub fn origin(&self) -> PointId {
        self.splines
            .first()
            .and_then(|s| s.points.first())
            .copied()
            .unwrap_or(PointId(0))
    }

    /// Finds the point nearest to `position`.
    /// Returns its ID and the squared distance to it.
    pub fn nearest(&self, position: Point3d) -> Option<(PointId, f64)> {
        self.tree.nearest(position)
    }

    /// A unit vector in the direction of travel at the given point.
    pub fn forward_vector(&self, id: PointId) -> Vector3d {
        let point = self.point(id);
        if let Some(next) = point.next {
            normalize_or_zero(self.point(next).position - point.position)
        } else if let Some(prev) = point.previous {
            normalize_or_zero(point.position - self.point(prev).position)
        } else {
            Vector3d::new(0.0, 0.0, 0.0)
        }
    }

    /// Whether traffic at two points travels in the same general direction.
    pub fn is_same_direction(&self, a: PointId, b: PointId) -> bool {
        self.forward_vector(a).dot(self.forward_vector(b)) > 0.0
    }

    /// The parallel lanes at a point that carry traffic in the same direction,
    /// ordered left to right. Always contains `id` itself.
    pub fn lanes(&self, id: PointId) -> ArrayVec<PointId, MAX_LANES> {
        let mut leftmost = id;
        let mut steps = 0;
        while let Some(left) = self.point(leftmost).left {
            if left == id || steps >= MAX_LANES || !self.is_same_direction(id, left) {
                break;
            }
            leftmost = left;
            steps += 1;
        }

        let mut lanes = ArrayVec::new();
        let mut current = Some(leftmost);
        while let Some(lane) = current {
            if lanes.is_full() || lanes.contains(&lane) || !self.is_same_direction(id, lane) {
                break;
            }
            lanes.push(lane);
            current = self.point(lane).right;
        }
        if !lanes.contains(&id) {
            lanes.clear();
            lanes.push(id);
        }
        lanes
    }

    /// Applies lane links computed by the [AdjacentLaneDetector].
    pub(crate) fn set_lane_links(&mut self, links: Vec<(Option<PointId>, Option<PointId>)>) {
        for (point, (left, right)) in self.points.iter_mut().zip(links) {
            if point.left.is_none() {
                point.left = left;
            }
            if point.right.is_none() {
                point.right = right;
            }
        }
    }
}

/// Splits a `<spline>@<index>` reference.
pub(crate) fn parse_reference(reference: &str) -> Result<(&str, usize), MapError> {
    let bad = || MapError::BadReference(reference.to_string());
    let (name, index) = reference.rsplit_once('@').ok_or_else(bad)?;
    let index = index.trim().parse().map_err(|_| bad())?;
    Ok((name.trim(), index))
}

fn validate_ids(points: &[SplinePoint]) -> Result<(), MapError> {
    let mut seen = vec![false; points.len()];
    for (index, point) in points.iter().enumerate() {
        match seen.get_mut(point.id.index()) {
            Some(true) => return Err(MapError::DuplicatePoint(point.id)),
            Some(flag) => *flag = true,
            None => return Err(MapError::SparsePoint { index, id: point.id }),
        }
    }
    if let Some((index, point)) = points
        .iter()
        .enumerate()
        .find(|(index, point)| point.id.index() != *index)
    {
        return Err(MapError::SparsePoint { index, id: point.id });
    }
    Ok(())
}

fn validate_links(points: &[SplinePoint]) -> Result<(), MapError> {
    for point in points {
        if let Some(target) = point.links().find(|id| id.index() >= points.len()) {
            return Err(MapError::DanglingLink {
                point: point.id,
                target,
            });
        }
        if let Some(next) = point.next {
            if points[next.index()].previous != Some(point.id) {
                return Err(MapError::BrokenChain(point.id));
            }
        }
        if let Some(prev) = point.previous {
            if points[prev.index()].next != Some(point.id) {
                return Err(MapError::BrokenChain(prev));
            }
        }
    }
    Ok(())
}

fn validate_junctions(points: &[SplinePoint], junctions: &[Junction]) -> Result<(), MapError> {
    let mut starts = vec![None; points.len()];
    let mut ends = vec![None; points.len()];
    for (idx, junction) in junctions.iter().enumerate() {
        if junction.id.index() != idx
            || junction.start.index() >= points.len()
            || junction.end.index() >= points.len()
        {
            return Err(MapError::BadJunction(junction.id));
        }
        if !(0.0..=1.0).contains(&junction.probability) {
            return Err(MapError::BadProbability {
                junction: junction.id,
                probability: junction.probability,
            });
        }
        if starts[junction.start.index()].replace(junction.id).is_some() {
            return Err(MapError::JunctionConflict(junction.start));
        }
        if ends[junction.end.index()].replace(junction.id).is_some() {
            return Err(MapError::JunctionConflict(junction.end));
        }
    }
    for point in points {
        if point.junction_start != starts[point.id.index()]
            || point.junction_end != ends[point.id.index()]
        {
            return Err(MapError::JunctionConflict(point.id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::fixtures::*;
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn chains_are_consistent() {
        let map = two_lane_road(50, 10.0);
        for point in map.points() {
            if let Some(next) = point.next {
                assert_eq!(map.point(next).previous, Some(point.id));
            }
            if let Some(prev) = point.previous {
                assert_eq!(map.point(prev).next, Some(point.id));
            }
        }
    }

    #[test]
    fn duplicate_ids_are_fatal() {
        let a = SplinePoint::new(PointId(0), Point3d::new(0.0, 0.0, 0.0));
        let b = SplinePoint::new(PointId(0), Point3d::new(0.0, 0.0, 1.0));
        let result = TrafficMap::new(vec![a, b], vec![], vec![]);
        assert_eq!(result.err(), Some(MapError::DuplicatePoint(PointId(0))));
    }

    #[test]
    fn broken_chain_is_fatal() {
        let mut a = SplinePoint::new(PointId(0), Point3d::new(0.0, 0.0, 0.0));
        let b = SplinePoint::new(PointId(1), Point3d::new(0.0, 0.0, 1.0));
        a.next = Some(PointId(1));
        let result = TrafficMap::new(vec![a, b], vec![], vec![]);
        assert_eq!(result.err(), Some(MapError::BrokenChain(PointId(0))));
    }

    #[test]
    fn nearest_point() {
        let map = straight_road(20, 10.0);
        let (id, dist2) = map.nearest(Point3d::new(1.0, 0.0, 54.0)).unwrap();
        assert_eq!(id, PointId(5));
        assert_approx_eq!(dist2, 17.0);
    }

    #[test]
    fn resolves_references() {
        let map = two_lane_road(10, 10.0);
        assert_eq!(map.resolve("right@3").unwrap(), map.spline("right").unwrap().points[3]);
        assert!(matches!(map.resolve("right@30"), Err(MapError::UnknownPoint { .. })));
        assert!(matches!(map.resolve("nowhere@1"), Err(MapError::UnknownSpline(_))));
        assert!(matches!(map.resolve("right"), Err(MapError::BadReference(_))));
    }

    #[test]
    fn forward_vector_at_chain_end() {
        let map = straight_road(5, 10.0);
        let last = PointId(4);
        assert_approx_eq!(map.forward_vector(last).z, 1.0);
        assert!(map.is_same_direction(PointId(0), last));
    }
}
