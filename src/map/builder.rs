use super::{
    parse_reference, Indicator, Junction, JunctionId, PointId, SplinePoint, TrafficMap,
    TrafficSpline,
};
use crate::error::MapError;
use crate::math::{circumradius, max_cornering_speed, Point3d};
use cgmath::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Source data for a single spline point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointData {
    /// The world space position.
    pub position: Point3d,
    /// The road camber in radians.
    pub camber: f64,
}

impl From<Point3d> for PointData {
    fn from(position: Point3d) -> Self {
        Self {
            position,
            camber: 0.0,
        }
    }
}

/// Junctions, connections and lane links to add to a loaded map.
/// Points are named with `<spline>@<index>` references.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct JunctionConfig {
    pub junctions: Vec<JunctionDef>,
    pub connections: Vec<ConnectionDef>,
    pub lanes: Vec<LaneLinkDef>,
}

/// A junction between two named points.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JunctionDef {
    pub start: String,
    pub end: String,
    pub probability: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub indicate_when_taken: Indicator,
    #[cfg_attr(feature = "serde", serde(default))]
    pub indicate_when_not_taken: Indicator,
    #[cfg_attr(feature = "serde", serde(default))]
    pub indicate_distance_pre: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub indicate_distance_post: f64,
}

/// Continues the chain ending at `from` with the chain starting at `to`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectionDef {
    pub from: String,
    pub to: String,
}

/// Declares that `left` is the lane to the left of `right`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LaneLinkDef {
    pub left: String,
    pub right: String,
}

/// Assembles a [TrafficMap] from splines produced by a track loader.
#[derive(Default)]
pub struct TrafficMapBuilder {
    points: Vec<SplinePoint>,
    junctions: Vec<Junction>,
    splines: Vec<TrafficSpline>,
    names: HashMap<String, usize>,
}

impl TrafficMapBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a spline through the given positions and returns the ID of its first point.
    pub fn add_spline(
        &mut self,
        name: &str,
        positions: &[Point3d],
        closed: bool,
    ) -> Result<PointId, MapError> {
        let points = positions.iter().copied().map(PointData::from).collect::<Vec<_>>();
        self.add_spline_points(name, &points, closed)
    }

    /// Adds a spline and returns the ID of its first point.
    /// Consecutive points are chained; a closed spline also links its last point to its first.
    pub fn add_spline_points(
        &mut self,
        name: &str,
        points: &[PointData],
        closed: bool,
    ) -> Result<PointId, MapError> {
        if self.names.contains_key(name) {
            return Err(MapError::DuplicateSpline(name.to_string()));
        }
        if points.len() < 2 {
            return Err(MapError::ShortSpline(name.to_string()));
        }

        let first = self.points.len();
        let ids = (first..first + points.len())
            .map(PointId::new)
            .collect::<Vec<_>>();

        for (idx, (data, id)) in points.iter().zip(&ids).enumerate() {
            let mut point = SplinePoint::new(*id, data.position);
            point.camber = data.camber;
            point.previous = idx.checked_sub(1).map(|i| ids[i]);
            point.next = ids.get(idx + 1).copied();
            self.points.push(point);
        }
        if closed {
            let (head, tail) = (ids[0], ids[ids.len() - 1]);
            self.points[tail.index()].next = Some(head);
            self.points[head.index()].previous = Some(tail);
        }

        self.names.insert(name.to_string(), self.splines.len());
        self.splines.push(TrafficSpline {
            name: name.to_string(),
            points: ids,
            closed,
        });
        Ok(PointId::new(first))
    }

    /// Resolves a `<spline>@<index>` reference to a point.
    pub fn resolve(&self, reference: &str) -> Result<PointId, MapError> {
        let (name, index) = parse_reference(reference)?;
        let spline = self
            .names
            .get(name)
            .map(|idx| &self.splines[*idx])
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

    /// Adds a junction from `start` to `end` that is taken with the given probability.
    pub fn add_junction(
        &mut self,
        start: PointId,
        end: PointId,
        probability: f64,
    ) -> Result<JunctionId, MapError> {
        self.add_junction_with(Junction {
            id: JunctionId::new(self.junctions.len()),
            start,
            end,
            probability,
            indicate_when_taken: Indicator::None,
            indicate_when_not_taken: Indicator::None,
            indicate_distance_pre: 0.0,
            indicate_distance_post: 0.0,
        })
    }

    /// Adds a fully specified junction. Its `id` is reassigned.
    pub fn add_junction_with(&mut self, mut junction: Junction) -> Result<JunctionId, MapError> {
        let id = JunctionId::new(self.junctions.len());
        junction.id = id;
        if !(0.0..=1.0).contains(&junction.probability) {
            return Err(MapError::BadProbability {
                junction: id,
                probability: junction.probability,
            });
        }
        let [start, end] = [junction.start, junction.end].map(|p| p.index());
        if start >= self.points.len() || end >= self.points.len() {
            return Err(MapError::BadJunction(id));
        }
        if self.points[start].junction_start.is_some() {
            return Err(MapError::JunctionConflict(junction.start));
        }
        if self.points[end].junction_end.is_some() {
            return Err(MapError::JunctionConflict(junction.end));
        }
        self.points[start].junction_start = Some(id);
        self.points[end].junction_end = Some(id);
        self.junctions.push(junction);
        Ok(id)
    }

    /// Continues the chain ending at `from` with the chain starting at `to`.
    pub fn connect(&mut self, from: PointId, to: PointId) -> Result<(), MapError> {
        self.check_link(from, to)?;
        if self.points[from.index()].next.is_some() {
            return Err(MapError::AlreadyConnected(from));
        }
        if self.points[to.index()].previous.is_some() {
            return Err(MapError::AlreadyConnected(to));
        }
        self.points[from.index()].next = Some(to);
        self.points[to.index()].previous = Some(from);
        Ok(())
    }

    /// Records that `left` is the lane to the left of `right`.
    /// Explicit links take precedence over detected ones.
    pub fn link_lanes(&mut self, left: PointId, right: PointId) -> Result<(), MapError> {
        self.check_link(left, right)?;
        self.points[left.index()].right = Some(right);
        self.points[right.index()].left = Some(left);
        Ok(())
    }

    /// Fails unless both ends of a link between `a` and `b` exist.
    fn check_link(&self, a: PointId, b: PointId) -> Result<(), MapError> {
        let exists = |id: PointId| id.index() < self.points.len();
        match (exists(a), exists(b)) {
            (true, true) => Ok(()),
            (true, false) => Err(MapError::DanglingLink { point: a, target: b }),
            _ => Err(MapError::DanglingLink { point: b, target: a }),
        }
    }

    /// Applies a junction configuration document.
    pub fn apply_config(&mut self, config: &JunctionConfig) -> Result<(), MapError> {
        for def in &config.connections {
            let (from, to) = (self.resolve(&def.from)?, self.resolve(&def.to)?);
            self.connect(from, to)?;
        }
        for def in &config.lanes {
            let (left, right) = (self.resolve(&def.left)?, self.resolve(&def.right)?);
            self.link_lanes(left, right)?;
        }
        for def in &config.junctions {
            let (start, end) = (self.resolve(&def.start)?, self.resolve(&def.end)?);
            self.add_junction_with(Junction {
                id: JunctionId::new(0),
                start,
                end,
                probability: def.probability,
                indicate_when_taken: def.indicate_when_taken,
                indicate_when_not_taken: def.indicate_when_not_taken,
                indicate_distance_pre: def.indicate_distance_pre,
                indicate_distance_post: def.indicate_distance_post,
            })?;
        }
        Ok(())
    }

    /// Derives segment lengths and curvature, then validates and freezes the map.
    pub fn build(mut self) -> Result<TrafficMap, MapError> {
        let geometry = self
            .points
            .iter()
            .map(|point| {
                let pos = |id: PointId| self.points.get(id.index()).map(|p| p.position);
                let next = point.next.and_then(pos);
                let prev = point.previous.and_then(pos);
                let length = next.map(|n| n.distance(point.position)).unwrap_or(0.0);
                let radius = match (prev, next) {
                    (Some(p), Some(n)) => circumradius(p, point.position, n),
                    _ => f64::INFINITY,
                };
                (length, radius)
            })
            .collect::<Vec<_>>();

        for (point, (length, radius)) in self.points.iter_mut().zip(geometry) {
            point.length = length;
            point.radius = radius;
            point.max_cornering_speed = max_cornering_speed(radius, 1.0);
        }

        TrafficMap::new(self.points, self.junctions, self.splines)
    }
}
