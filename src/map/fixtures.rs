//! Small road graphs shared by the unit tests.

use super::{AdjacentLaneDetector, PointId, TrafficMap, TrafficMapBuilder};
use crate::math::Point3d;

pub const LANE_WIDTH: f64 = 3.0;
pub const DETECTION_RADIUS: f64 = 2.0;

fn line(x: f64, n: usize, spacing: f64) -> Vec<Point3d> {
    (0..n)
        .map(|i| Point3d::new(x, 0.0, spacing * i as f64))
        .collect()
}

/// A single lane heading along +z, named `main`, with ids `0..n`.
pub fn straight_road(n: usize, spacing: f64) -> TrafficMap {
    let mut builder = TrafficMapBuilder::new();
    builder.add_spline("main", &line(0.0, n, spacing), false).unwrap();
    builder.build().unwrap()
}

/// Two lanes heading along +z: `right` at x = 0 and `left` at x = `LANE_WIDTH`.
pub fn two_lane_road(n: usize, spacing: f64) -> TrafficMap {
    let mut builder = TrafficMapBuilder::new();
    builder.add_spline("right", &line(0.0, n, spacing), false).unwrap();
    builder
        .add_spline("left", &line(LANE_WIDTH, n, spacing), false)
        .unwrap();
    let mut map = builder.build().unwrap();
    AdjacentLaneDetector::new(LANE_WIDTH, DETECTION_RADIUS, false)
        .unwrap()
        .detect(&mut map);
    map
}

/// A `main` lane of 40 points with an `exit` lane of 20 points branching off
/// at `main@10` with the given probability, and an `entry` junction from
/// `exit@19` back onto `main@30`.
pub fn forked_road(probability: f64) -> TrafficMap {
    let mut builder = TrafficMapBuilder::new();
    builder.add_spline("main", &line(0.0, 40, 10.0), false).unwrap();
    let exit = (0..20)
        .map(|i| Point3d::new(30.0, 0.0, 100.0 + 10.0 * i as f64))
        .collect::<Vec<_>>();
    builder.add_spline("exit", &exit, false).unwrap();
    let (start, end) = (builder.resolve("main@10").unwrap(), builder.resolve("exit@0").unwrap());
    builder.add_junction(start, end, probability).unwrap();
    let (start, end) = (builder.resolve("exit@19").unwrap(), builder.resolve("main@30").unwrap());
    builder.add_junction(start, end, 1.0).unwrap();
    builder.build().unwrap()
}

/// A closed square loop of side `side` with points every `spacing` m, named `ring`.
pub fn ring_road(side: f64, spacing: f64) -> TrafficMap {
    let mut builder = TrafficMapBuilder::new();
    builder.add_spline("ring", &ring_points(side, spacing), true).unwrap();
    builder.build().unwrap()
}

/// Points around a square starting at the origin, heading along +x first.
fn ring_points(side: f64, spacing: f64) -> Vec<Point3d> {
    let per_side = (side / spacing) as usize;
    let corners = [
        (Point3d::new(0.0, 0.0, 0.0), [1.0, 0.0]),
        (Point3d::new(side, 0.0, 0.0), [0.0, 1.0]),
        (Point3d::new(side, 0.0, side), [-1.0, 0.0]),
        (Point3d::new(0.0, 0.0, side), [0.0, -1.0]),
    ];
    corners
        .iter()
        .flat_map(|(corner, [dx, dz])| {
            (0..per_side).map(move |i| {
                let d = spacing * i as f64;
                Point3d::new(corner.x + dx * d, 0.0, corner.z + dz * d)
            })
        })
        .collect()
}

/// Shorthand for a point ID.
pub fn pid(index: usize) -> PointId {
    PointId::new(index)
}

/// A closed 200-point `main` square loop of side 250 m with a 10-point
/// `ramp` running beside the second side from `main@50` to `main@100`. The exit onto
/// the ramp is taken with the given probability; the merge back always is.
pub fn looped_ramp(exit_probability: f64) -> TrafficMap {
    let mut builder = TrafficMapBuilder::new();
    let main = ring_points(250.0, 5.0);
    builder.add_spline("main", &main, true).unwrap();
    let ramp = (0..10)
        .map(|i| Point3d::new(240.0, 0.0, 10.0 + 25.0 * i as f64))
        .collect::<Vec<_>>();
    builder.add_spline("ramp", &ramp, false).unwrap();
    let (start, end) = (builder.resolve("main@50").unwrap(), builder.resolve("ramp@0").unwrap());
    builder.add_junction(start, end, exit_probability).unwrap();
    let (start, end) = (builder.resolve("ramp@9").unwrap(), builder.resolve("main@100").unwrap());
    builder.add_junction(start, end, 1.0).unwrap();
    builder.build().unwrap()
}
