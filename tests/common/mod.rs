#![allow(dead_code)]

use ai_traffic::map::{TrafficMap, TrafficMapBuilder};
use ai_traffic::math::{Point3d, Vector3d};
use ai_traffic::{AiMode, AiParams, CarStatus, SlotId, TrafficWorld};
use std::sync::Arc;

/// A single open lane of `n` points heading along +z.
pub fn chain(n: usize, spacing: f64) -> TrafficMap {
    let points = (0..n)
        .map(|i| Point3d::new(0.0, 0.0, spacing * i as f64))
        .collect::<Vec<_>>();
    let mut builder = TrafficMapBuilder::new();
    builder.add_spline("main", &points, false).unwrap();
    builder.build().unwrap()
}

/// A closed square loop starting at the origin and heading along +x first.
pub fn ring(side: f64, spacing: f64) -> TrafficMap {
    let per_side = (side / spacing) as usize;
    let corners = [
        (Point3d::new(0.0, 0.0, 0.0), [1.0, 0.0]),
        (Point3d::new(side, 0.0, 0.0), [0.0, 1.0]),
        (Point3d::new(side, 0.0, side), [-1.0, 0.0]),
        (Point3d::new(0.0, 0.0, side), [0.0, -1.0]),
    ];
    let points = corners
        .iter()
        .flat_map(|(corner, [dx, dz])| {
            (0..per_side).map(move |i| {
                let d = spacing * i as f64;
                Point3d::new(corner.x + dx * d, 0.0, corner.z + dz * d)
            })
        })
        .collect::<Vec<_>>();
    let mut builder = TrafficMapBuilder::new();
    builder.add_spline("ring", &points, true).unwrap();
    builder.build().unwrap()
}

/// A world with `players` human slots followed by `ai` AI-only slots.
pub fn world(map: TrafficMap, params: AiParams, players: usize, ai: usize) -> (TrafficWorld, Vec<SlotId>) {
    let mut world = TrafficWorld::new(Arc::new(map), params).unwrap();
    let mut ids = (0..players)
        .map(|_| world.add_slot("player", "", AiMode::None))
        .collect::<Vec<_>>();
    ids.extend((0..ai).map(|i| world.add_slot("traffic", &format!("skin{}", i), AiMode::Fixed)));
    (world, ids)
}

pub fn car(position: Point3d, velocity: Vector3d) -> CarStatus {
    CarStatus {
        position,
        velocity,
        ..Default::default()
    }
}
