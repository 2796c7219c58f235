use super::{PointId, SplinePoint, TrafficMap};
use crate::config::AiParams;
use crate::error::ConfigError;
use crate::math::rot_left;
use log::{debug, info};
use rayon::prelude::*;

/// Lane widths must exceed the detection radius by this factor,
/// so that a point can never detect itself.
pub const MIN_WIDTH_FACTOR: f64 = 1.05;

/// Discovers which points of distinct splines are adjacent lanes of the same road.
#[derive(Clone, Copy, Debug)]
pub struct AdjacentLaneDetector {
    lane_width: f64,
    detection_radius: f64,
    two_way: bool,
}

/// Lane links found for a single point: `(left, right)`.
type LaneLinks = (Option<PointId>, Option<PointId>);

impl AdjacentLaneDetector {
    /// Creates a detector.
    ///
    /// # Parameters
    /// * `lane_width` - The distance between the centre lines of adjacent lanes in m
    /// * `detection_radius` - How far a neighbouring point may sit from its expected position in m
    /// * `two_way` - Whether lanes carrying traffic in the opposite direction are linked too
    pub fn new(lane_width: f64, detection_radius: f64, two_way: bool) -> Result<Self, ConfigError> {
        if detection_radius <= 0.0 {
            return Err(ConfigError::NotPositive {
                name: "lane_detection_radius",
                value: detection_radius,
            });
        }
        if lane_width < MIN_WIDTH_FACTOR * detection_radius {
            return Err(ConfigError::LaneWidthTooSmall {
                lane_width,
                radius: detection_radius,
            });
        }
        Ok(Self {
            lane_width,
            detection_radius,
            two_way,
        })
    }

    /// Creates a detector from the traffic parameters.
    pub fn from_params(params: &AiParams) -> Result<Self, ConfigError> {
        Self::new(
            params.lane_width,
            params.lane_detection_radius,
            params.two_way_traffic,
        )
    }

    /// Links adjacent lanes throughout the map, keeping any links already present.
    /// Returns the number of links added.
    pub fn detect(&self, map: &mut TrafficMap) -> usize {
        // Each point only reads the map, so the pass runs in parallel
        let shared = &*map;
        let links = shared
            .points()
            .par_iter()
            .map(|point| self.detect_point(shared, point))
            .collect::<Vec<_>>();

        let added = links
            .iter()
            .map(|(l, r)| l.is_some() as usize + r.is_some() as usize)
            .sum();
        map.set_lane_links(links);
        info!(
            "Adjacent lane detection linked {} lanes across {} points",
            added,
            map.len()
        );
        added
    }

    /// Finds the left and right neighbours of a single point.
    /// Only sides without an existing link are searched.
    fn detect_point(&self, map: &TrafficMap, point: &SplinePoint) -> LaneLinks {
        if point.next.is_none() {
            return (None, None);
        }
        let left_dir = rot_left(map.forward_vector(point.id));
        let find = |sign: f64| {
            let target = point.position + left_dir * (sign * self.lane_width);
            let (id, dist2) = map.nearest(target)?;
            if id == point.id || dist2 > self.detection_radius * self.detection_radius {
                return None;
            }
            if map.is_same_direction(point.id, id) || self.two_way {
                Some(id)
            } else {
                debug!("Ignoring opposing lane {} next to {}", id, point.id);
                None
            }
        };
        let left = point.left.is_none().then(|| find(1.0)).flatten();
        let right = point.right.is_none().then(|| find(-1.0)).flatten();
        (left, right)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::map::fixtures::*;
    use crate::map::TrafficMapBuilder;
    use crate::math::Point3d;
    use cgmath::prelude::*;

    #[test]
    fn rejects_narrow_lanes() {
        assert!(matches!(
            AdjacentLaneDetector::new(2.0, 2.0, false),
            Err(ConfigError::LaneWidthTooSmall { .. })
        ));
        assert!(AdjacentLaneDetector::new(2.1, 2.0, false).is_ok());
    }

    #[test]
    fn links_parallel_lanes() {
        let map = two_lane_road(30, 10.0);
        let left = map.spline("left").unwrap();
        let right = map.spline("right").unwrap();
        for (l, r) in left.points.iter().zip(&right.points).take(29) {
            assert_eq!(map.point(*r).left, Some(*l));
            assert_eq!(map.point(*l).right, Some(*r));
            assert_eq!(map.point(*l).left, None);
            assert_eq!(map.point(*r).right, None);
        }
    }

    #[test]
    fn links_long_roads_in_order() {
        let n = 5_000;
        let line = |x: f64| (0..n).map(|i| Point3d::new(x, 0.0, 5.0 * i as f64)).collect::<Vec<_>>();
        let mut builder = TrafficMapBuilder::new();
        builder.add_spline("right", &line(0.0), false).unwrap();
        builder.add_spline("left", &line(LANE_WIDTH), false).unwrap();
        let mut map = builder.build().unwrap();
        let detector = AdjacentLaneDetector::new(LANE_WIDTH, DETECTION_RADIUS, false).unwrap();
        assert_eq!(detector.detect(&mut map), 2 * (n - 1));
        for i in 0..n - 1 {
            assert_eq!(map.point(PointId::new(i)).left, Some(PointId::new(n + i)));
        }
        // Already linked, so a second pass finds nothing new
        assert_eq!(detector.detect(&mut map), 0);
    }

    #[test]
    fn lane_distances_match_width() {
        let map = two_lane_road(30, 10.0);
        let (width, radius) = (LANE_WIDTH, DETECTION_RADIUS);
        for point in map.points() {
            for other in [point.left, point.right].into_iter().flatten() {
                let dist = point.position.distance(map.point(other).position);
                assert!(dist >= width - radius && dist <= width + radius);
            }
        }
    }

    fn opposing_road(two_way: bool) -> TrafficMap {
        let mut builder = TrafficMapBuilder::new();
        let north = (0..20)
            .map(|i| Point3d::new(0.0, 0.0, 10.0 * i as f64))
            .collect::<Vec<_>>();
        let south = (0..20)
            .rev()
            .map(|i| Point3d::new(3.0, 0.0, 10.0 * i as f64))
            .collect::<Vec<_>>();
        builder.add_spline("north", &north, false).unwrap();
        builder.add_spline("south", &south, false).unwrap();
        let mut map = builder.build().unwrap();
        AdjacentLaneDetector::new(LANE_WIDTH, DETECTION_RADIUS, two_way)
            .unwrap()
            .detect(&mut map);
        map
    }

    #[test]
    fn opposing_lanes_need_two_way_traffic() {
        let map = opposing_road(false);
        assert!(map.points().iter().all(|p| p.left.is_none() && p.right.is_none()));

        let map = opposing_road(true);
        let north = map.resolve("north@5").unwrap();
        let south = map.resolve("south@14").unwrap();
        assert_eq!(map.point(north).left, Some(south));
        assert_eq!(map.point(south).left, Some(north));
        assert_eq!(map.lanes(north).as_slice(), &[north]);
    }

    #[test]
    fn keeps_explicit_links() {
        let mut builder = TrafficMapBuilder::new();
        let a = (0..5).map(|i| Point3d::new(0.0, 0.0, 10.0 * i as f64)).collect::<Vec<_>>();
        let b = (0..5).map(|i| Point3d::new(3.0, 0.0, 10.0 * i as f64)).collect::<Vec<_>>();
        let c = (0..5).map(|i| Point3d::new(50.0, 0.0, 10.0 * i as f64)).collect::<Vec<_>>();
        builder.add_spline("a", &a, false).unwrap();
        builder.add_spline("b", &b, false).unwrap();
        builder.add_spline("c", &c, false).unwrap();
        let (a0, c0) = (builder.resolve("a@0").unwrap(), builder.resolve("c@0").unwrap());
        builder.link_lanes(c0, a0).unwrap();
        let mut map = builder.build().unwrap();
        AdjacentLaneDetector::new(LANE_WIDTH, DETECTION_RADIUS, false)
            .unwrap()
            .detect(&mut map);
        assert_eq!(map.point(a0).left, Some(c0));
        assert_eq!(map.point(a0).right, None);
        assert_eq!(map.point(map.resolve("a@1").unwrap()).left, map.resolve("b@1").ok());
    }
}
