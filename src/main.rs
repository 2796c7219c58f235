use ai_traffic::cgmath::prelude::*;
use ai_traffic::map::{AdjacentLaneDetector, PointId, TrafficMap, TrafficMapBuilder};
use ai_traffic::math::Point3d;
use ai_traffic::{
    init_logging, AiMode, AiParams, CarStatus, SlotEvent, SlotId, TrafficError, TrafficSimulation,
    TrafficWorld,
};
use clap::Parser;
use log::info;
use std::sync::Arc;
use std::time::Instant;

const RING_SIDE: f64 = 2000.0; // m
const POINT_SPACING: f64 = 5.0; // m
const PLAYER_SPEED: f64 = 25.0; // m/s
const FRAME: f64 = 0.05; // s

/// Drives AI traffic around a two-lane ring road with simulated players
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
    /// Simulated session length in seconds
    #[arg(long, default_value_t = 120)]
    seconds: u64,
    /// Number of simulated human players
    #[arg(long, default_value_t = 2)]
    players: usize,
    /// Number of AI controlled car slots
    #[arg(long, default_value_t = 8)]
    slots: usize,
    /// Seed for the random decisions of the traffic
    #[arg(long)]
    seed: Option<u64>,
}

/// A closed square lane `inset` m inside the outer edge of the ring.
fn ring_lane(inset: f64) -> Vec<Point3d> {
    let side = RING_SIDE - 2.0 * inset;
    let per_side = (side / POINT_SPACING) as usize;
    let spacing = side / per_side as f64;
    let corners = [
        (Point3d::new(inset, 0.0, inset), [1.0, 0.0]),
        (Point3d::new(inset + side, 0.0, inset), [0.0, 1.0]),
        (Point3d::new(inset + side, 0.0, inset + side), [-1.0, 0.0]),
        (Point3d::new(inset, 0.0, inset + side), [0.0, -1.0]),
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

fn build_map(params: &AiParams) -> Result<TrafficMap, TrafficError> {
    let mut builder = TrafficMapBuilder::new();
    builder.add_spline("outer", &ring_lane(0.0), true)?;
    builder.add_spline("inner", &ring_lane(params.lane_width), true)?;
    let mut map = builder.build()?;
    let links = AdjacentLaneDetector::from_params(params)?.detect(&mut map);
    info!("Linked {} adjacent lane points", links);
    Ok(map)
}

/// A human player circling the outer lane.
struct Player {
    slot: SlotId,
    distance: f64,
}

impl Player {
    fn status(&self, map: &TrafficMap, lane: &[PointId]) -> CarStatus {
        let point = lane[(self.distance / POINT_SPACING) as usize % lane.len()];
        CarStatus {
            position: map.point(point).position,
            velocity: map.forward_vector(point) * PLAYER_SPEED,
            ..Default::default()
        }
    }
}

fn run(args: &Args) -> Result<(), TrafficError> {
    let params = AiParams {
        seed: args.seed,
        ..Default::default()
    };
    let map = Arc::new(build_map(&params)?);
    let lane = map
        .spline("outer")
        .map(|spline| spline.points.clone())
        .unwrap_or_default();

    let mut world = TrafficWorld::new(Arc::clone(&map), params)?;
    let mut players = (0..args.players)
        .map(|i| Player {
            slot: world.add_slot("player", "", AiMode::None),
            distance: i as f64 * RING_SIDE,
        })
        .collect::<Vec<_>>();
    for i in 0..args.slots {
        world.add_slot("traffic", &format!("skin_{}", i % 3), AiMode::Fixed);
    }

    let mut sim = TrafficSimulation::new(Arc::new(world));
    let events = sim.event_sender();
    for player in &players {
        // The receiver lives as long as the simulation
        let _ = events.send(SlotEvent::Connected(player.slot));
    }

    let frames = (args.seconds as f64 / FRAME) as usize;
    let started = Instant::now();
    for frame in 0..frames {
        let now = sim.now();
        for player in players.iter_mut() {
            player.distance += PLAYER_SPEED * FRAME;
            let _ = events.send(SlotEvent::PositionUpdate {
                slot: player.slot,
                status: player.status(&map, &lane),
                timestamp: now,
            });
        }
        sim.step(FRAME);

        if frame % 200 == 0 {
            let statuses = sim.world().ai_statuses();
            let mean_speed = statuses
                .iter()
                .map(|(_, status)| status.velocity.magnitude())
                .sum::<f64>()
                / statuses.len().max(1) as f64;
            info!(
                "t = {:>5.1} s: {} AI vehicles, mean speed {:.1} km/h",
                sim.now() as f64 / 1000.0,
                statuses.len(),
                mean_speed * 3.6
            );
        }
    }

    let elapsed = started.elapsed();
    info!(
        "Simulated {} s in {:?} ({:.0}x real time)",
        args.seconds,
        elapsed,
        args.seconds as f64 / elapsed.as_secs_f64().max(1e-9)
    );
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(err) = run(&args) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
