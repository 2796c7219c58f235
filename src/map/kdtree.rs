use super::PointId;
use crate::math::Point3d;
use cgmath::prelude::*;

/// A static 3-d tree over the positions of the map's points.
///
/// The nodes are stored implicitly: the median of each slice is the
/// subtree root, with the lower half to its left and the upper half to its right.
pub(crate) struct KdTree {
    nodes: Vec<(Point3d, PointId)>,
}

impl KdTree {
    /// Builds the tree.
    pub fn new(points: impl IntoIterator<Item = (Point3d, PointId)>) -> Self {
        let mut nodes = points.into_iter().collect::<Vec<_>>();
        build(&mut nodes, 0);
        Self { nodes }
    }

    /// Finds the point nearest to `target`, returning its ID and squared distance.
    pub fn nearest(&self, target: Point3d) -> Option<(PointId, f64)> {
        let mut best = None;
        search(&self.nodes, 0, target, &mut best);
        best
    }
}

fn coord(point: Point3d, axis: usize) -> f64 {
    match axis {
        0 => point.x,
        1 => point.y,
        _ => point.z,
    }
}

fn build(nodes: &mut [(Point3d, PointId)], depth: usize) {
    if nodes.len() <= 1 {
        return;
    }
    let axis = depth % 3;
    let mid = nodes.len() / 2;
    nodes.select_nth_unstable_by(mid, |a, b| coord(a.0, axis).total_cmp(&coord(b.0, axis)));
    let (lower, upper) = nodes.split_at_mut(mid);
    build(lower, depth + 1);
    build(&mut upper[1..], depth + 1);
}

fn search(
    nodes: &[(Point3d, PointId)],
    depth: usize,
    target: Point3d,
    best: &mut Option<(PointId, f64)>,
) {
    if nodes.is_empty() {
        return;
    }
    let mid = nodes.len() / 2;
    let (pos, id) = nodes[mid];
    let dist2 = pos.distance2(target);
    if best.map_or(true, |(_, d)| dist2 < d) {
        *best = Some((id, dist2));
    }

    let axis = depth % 3;
    let delta = coord(target, axis) - coord(pos, axis);
    let (near, far) = if delta < 0.0 {
        (&nodes[..mid], &nodes[mid + 1..])
    } else {
        (&nodes[mid + 1..], &nodes[..mid])
    };

    search(near, depth + 1, target, best);
    if best.map_or(true, |(_, d)| delta * delta < d) {
        search(far, depth + 1, target, best);
    }
}
