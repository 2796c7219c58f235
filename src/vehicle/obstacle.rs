use super::{AiSnapshot, AiState, STOPPED_SPEED};
use crate::config::AiParams;
use crate::map::{PointId, TrafficMap};
use crate::math::{braking_distance, horizontal_angle_deg, max_cornering_speed, Point3d, Vector3d};
use crate::util::{Interval, Millis};
use crate::SlotId;
use cgmath::prelude::*;
use std::collections::HashMap;

/// The speed vehicles creep at behind a slower obstacle.
const WALKING_SPEED: f64 = 7.0 / 3.6; // m/s

/// Extra distance beyond twice the braking distance to look ahead.
const LOOKAHEAD_MARGIN: f64 = 20.0; // m

/// The lookahead never walks further than this many points.
const MAX_LOOKAHEAD_POINTS: usize = 256;

/// Players within this horizontal angle of a vehicle's heading are obstacles.
const PLAYER_CONE_HALF_ANGLE: f64 = 15.0; // degrees

/// How long a vehicle ignores obstacles once it has given up waiting.
const IGNORE_OBSTACLES_FOR: Millis = 10_000; // ms

/// Delay between stopping and honking.
const HONK_DELAY: Interval<Millis> = Interval::new(3_000, 7_000);

/// How long the horn sounds.
const HONK_DURATION: Interval<Millis> = Interval::new(500, 1_500);

/// An active human player, as seen by obstacle detection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerSnapshot {
    pub slot: SlotId,
    pub position: Point3d,
    pub velocity: Vector3d,
}

/// The slowest AI vehicle at each point of the graph.
#[derive(Clone, Debug, Default)]
pub struct Occupancy {
    points: HashMap<PointId, AiSnapshot>,
}

impl Occupancy {
    /// Indexes the given vehicles by their current point.
    pub fn new(states: impl IntoIterator<Item = AiSnapshot>) -> Self {
        let mut points: HashMap<PointId, AiSnapshot> = HashMap::new();
        for state in states {
            points
                .entry(state.current_point)
                .and_modify(|slowest| {
                    if state.current_speed < slowest.current_speed {
                        *slowest = state;
                    }
                })
                .or_insert(state);
        }
        Self { points }
    }

    /// The slowest vehicle at a point.
    pub fn get(&self, point: PointId) -> Option<&AiSnapshot> {
        self.points.get(&point)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Everything one obstacle detection tick reacts to, copied up front so that
/// no vehicle is locked while another is evaluated.
#[derive(Clone, Debug, Default)]
pub struct ObstacleContext {
    pub occupancy: Occupancy,
    pub players: Vec<PlayerSnapshot>,
}

impl ObstacleContext {
    pub fn new(states: impl IntoIterator<Item = AiSnapshot>, players: Vec<PlayerSnapshot>) -> Self {
        Self {
            occupancy: Occupancy::new(states),
            players,
        }
    }
}

/// The result of walking the road ahead.
struct Lookahead {
    /// The nearest AI vehicle ahead and the gap to it in m.
    vehicle: Option<(AiSnapshot, f64)>,
    /// The lowest cornering speed the vehicle must brake for in m/s.
    corner_speed: f64,
}

impl AiState {
    /// Chooses a target speed from the obstacles ahead.
    ///
    /// # Parameters
    /// * `map` - The road graph
    /// * `params` - The traffic parameters
    /// * `ctx` - Copies of the other vehicles and players
    /// * `now` - The current session time
    pub fn detect_obstacles(
        &mut self,
        map: &TrafficMap,
        params: &AiParams,
        ctx: &ObstacleContext,
        now: Millis,
    ) {
        if !self.initialized {
            return;
        }
        let acceleration = self.profile.acceleration;
        let mut deceleration = self.profile.deceleration;

        if now < self.ignore_obstacles_until {
            self.set_target_speed(self.max_speed, deceleration, acceleration);
            return;
        }
        self.track_stop(params, now);

        let lookahead = self.look_ahead(map, &ctx.occupancy);
        let player = self.nearest_player(&ctx.players);
        let ai_distance = lookahead.vehicle.map_or(f64::INFINITY, |(_, d)| d);
        let player_distance = player.map_or(f64::INFINITY, |(_, d)| d);

        let speed = self.speed.current();
        let window = |obstacle_speed: f64, distance: f64| {
            obstacle_speed < speed
                && distance < 2.0 * braking_distance(speed - obstacle_speed, deceleration) + LOOKAHEAD_MARGIN
        };

        let mut target = self.initial_max_speed;
        let mut max_speed = self.initial_max_speed;
        let mut has_obstacle = false;

        if ai_distance < self.min_obstacle_distance || player_distance < self.min_obstacle_distance {
            target = 0.0;
            has_obstacle = true;
        } else if let Some((player_speed, distance)) = player.filter(|_| player_distance < ai_distance) {
            let player_speed = if player_speed < STOPPED_SPEED { 0.0 } else { player_speed };
            if window(player_speed, distance) {
                target = WALKING_SPEED.max(player_speed);
                has_obstacle = true;
            }
        } else if let Some((other, distance)) = lookahead.vehicle {
            let other_target = other.current_speed.min(other.target_speed);
            if window(other_target, distance) {
                target = WALKING_SPEED.max(other_target);
                has_obstacle = true;
            }
            if other.target_speed >= other.current_speed {
                max_speed = other.current_speed.max(speed).min(self.initial_max_speed);
            }
        }

        target = target.min(lookahead.corner_speed);
        if target < speed && !has_obstacle {
            deceleration *= self.profile.cornering_brake_force_factor;
        }
        self.max_speed = max_speed;
        self.set_target_speed(target.min(max_speed), deceleration, acceleration);
    }

    /// Stop, honk and give-up bookkeeping.
    fn track_stop(&mut self, params: &AiParams, now: Millis) {
        if self.speed.current() >= STOPPED_SPEED {
            self.stopped_since = None;
            self.honk = None;
            return;
        }
        let since = *self.stopped_since.get_or_insert(now);
        if self.honk.is_none() {
            let start = since + HONK_DELAY.sample(&mut self.rng);
            let end = start + HONK_DURATION.sample(&mut self.rng);
            self.honk = Some(Interval::new(start, end));
        }
        if now - since > params.ignore_obstacles_after {
            self.ignore_obstacles_until = now + IGNORE_OBSTACLES_FOR;
            self.stopped_since = None;
        }
    }

    /// Walks the vehicle's own route ahead, looking for other vehicles,
    /// corners and junctions to indicate for.
    fn look_ahead(&mut self, map: &TrafficMap, occupancy: &Occupancy) -> Lookahead {
        let speed = self.speed.current();
        let max_distance = 2.0 * braking_distance(speed, self.profile.deceleration) + LOOKAHEAD_MARGIN;
        let corner_decel = self.profile.deceleration * self.profile.cornering_brake_force_factor;
        let forward = map.forward_vector(self.current_point);

        let mut result = Lookahead {
            vehicle: None,
            corner_speed: f64::INFINITY,
        };
        let mut point = self.current_point;
        let mut travelled = -self.progress;

        for _ in 0..MAX_LOOKAHEAD_POINTS {
            if travelled > max_distance {
                break;
            }
            if let Some(other) = occupancy.get(point).filter(|o| o.id != self.id) {
                let ahead = point != self.current_point
                    || forward.dot(other.position - self.status.position) > 0.0;
                if ahead {
                    let gap = self.status.position.distance(other.position)
                        - self.profile.vehicle_length_pre
                        - other.length_post;
                    result.vehicle = Some((*other, gap));
                    break;
                }
            }

            let spline_point = map.point(point);
            if point != self.current_point {
                let corner = max_cornering_speed(spline_point.radius, self.profile.cornering_speed_factor);
                let needed = braking_distance(speed - corner, corner_decel)
                    * self.profile.cornering_brake_distance_factor;
                if corner < speed && needed > travelled {
                    result.corner_speed = result.corner_speed.min(corner);
                }
            }
            if let Some(junction) = spline_point.junction_start {
                let info = map.junction(junction);
                if self.next_junction.is_none() && travelled < info.indicate_distance_pre {
                    self.indicator = if self.evaluator.will_take_junction(map, junction) {
                        info.indicate_when_taken
                    } else {
                        info.indicate_when_not_taken
                    };
                    self.next_junction = Some(junction);
                    self.junction_passed = false;
                }
            }

            let Some(next) = self.evaluator.try_next(map, point) else {
                break;
            };
            // The step may take a junction rather than the chain's own segment
            travelled += spline_point.position.distance(map.point(next).position);
            point = next;
        }
        result
    }

    /// The nearest active player in the cone ahead of the vehicle.
    /// Returns the player's speed and the gap to it in m.
    fn nearest_player(&self, players: &[PlayerSnapshot]) -> Option<(f64, f64)> {
        let forward = self.status.velocity;
        let forward = if forward.magnitude2() > 0.0 {
            forward
        } else {
            let yaw = self.status.rotation.x;
            Vector3d::new(-yaw.sin(), 0.0, yaw.cos())
        };
        players
            .iter()
            .filter(|p| p.slot != self.slot)
            .filter(|p| horizontal_angle_deg(forward, p.position - self.status.position) < PLAYER_CONE_HALF_ANGLE)
            .map(|p| (p, self.status.position.distance2(p.position)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(p, d2)| (p.velocity.magnitude(), d2.sqrt() - self.profile.vehicle_length_pre))
    }
}
