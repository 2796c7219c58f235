use self::acceleration::SpeedModel;
use crate::config::{AiParams, DrivingProfile};
use crate::error::TrafficError;
use crate::evaluator::JunctionEvaluator;
use crate::map::{Indicator, JunctionId, PointId, TrafficMap};
use crate::math::{lerp, normalize_or_zero, yaw_pitch, CatmullRom, Point3d, Vector3d};
use crate::util::{Interval, Millis};
use crate::SlotId;
use cgmath::prelude::*;
use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::sync::atomic::{AtomicU64, Ordering};

pub use obstacle::{ObstacleContext, Occupancy, PlayerSnapshot};
pub use status::{AiSnapshot, CarStatus, StatusFlags};

mod acceleration;
mod obstacle;
mod status;

/// Below this speed a vehicle counts as stopped, in m/s.
pub(crate) const STOPPED_SPEED: f64 = 0.1; // m/s

static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(0);

/// Process-wide unique ID of an [AiState].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(u64);

impl StateId {
    fn next() -> Self {
        Self(NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// One simulated vehicle walking the road graph.
///
/// A state is created once per pool entry and recycled by teleporting it,
/// never destroyed. It is inert while uninitialized.
#[derive(Clone, Debug)]
pub struct AiState {
    id: StateId,
    /// The slot owning this state.
    slot: SlotId,
    profile: DrivingProfile,
    /// The latest networking snapshot.
    status: CarStatus,
    initialized: bool,
    /// The point at the start of the current segment.
    current_point: PointId,
    /// The point at the end of the current segment.
    next_point: PointId,
    /// Distance travelled along the current segment in m.
    progress: f64,
    /// Length of the current segment in m.
    segment_length: f64,
    start_tangent: Vector3d,
    end_tangent: Vector3d,
    speed: SpeedModel,
    /// Current speed cap in m/s; lowered while following a slower vehicle.
    max_speed: f64,
    /// The speed cap chosen at spawn in m/s.
    initial_max_speed: f64,
    spawn_protection_ends: Millis,
    safety_distance_squared: f64,
    min_obstacle_distance: f64,
    /// Session time of the last kinematics update.
    last_tick: Millis,
    evaluator: JunctionEvaluator,
    rng: StdRng,
    /// When the vehicle last came to a stop, if it is stopped.
    stopped_since: Option<Millis>,
    ignore_obstacles_until: Millis,
    /// When the horn sounds during the current stop.
    honk: Option<Interval<Millis>>,
    indicator: Indicator,
    /// The junction the indicator refers to.
    next_junction: Option<JunctionId>,
    junction_passed: bool,
    /// Distance left to drive before the indicator is switched off, in m.
    end_indicator_distance: f64,
}

impl AiState {
    /// Creates an uninitialized state.
    ///
    /// # Parameters
    /// * `slot` - The slot that owns the state
    /// * `profile` - The slot's driving profile
    /// * `params` - The traffic parameters
    /// * `seed` - Seeds the state's random decisions
    pub fn new(slot: SlotId, profile: DrivingProfile, params: &AiParams, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let evaluator = JunctionEvaluator::new(rng.gen());
        Self {
            id: StateId::next(),
            slot,
            profile,
            status: CarStatus::default(),
            initialized: false,
            current_point: PointId(0),
            next_point: PointId(0),
            progress: 0.0,
            segment_length: 0.0,
            start_tangent: Vector3d::new(0.0, 0.0, 0.0),
            end_tangent: Vector3d::new(0.0, 0.0, 0.0),
            speed: SpeedModel::default(),
            max_speed: params.max_speed,
            initial_max_speed: params.max_speed,
            spawn_protection_ends: 0,
            safety_distance_squared: params.safety_distance.min.powi(2),
            min_obstacle_distance: params.min_obstacle_distance,
            last_tick: 0,
            evaluator,
            rng,
            stopped_since: None,
            ignore_obstacles_until: 0,
            honk: None,
            indicator: Indicator::None,
            next_junction: None,
            junction_passed: false,
            end_indicator_distance: 0.0,
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    /// The slot that owns this state.
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn profile(&self) -> &DrivingProfile {
        &self.profile
    }

    /// The latest networking snapshot.
    pub fn status(&self) -> &CarStatus {
        &self.status
    }

    /// Whether the state is currently placed on the road.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The point at the start of the segment the vehicle is on.
    pub fn current_point(&self) -> PointId {
        self.current_point
    }

    /// Distance travelled along the current segment in m.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn position(&self) -> Point3d {
        self.status.position
    }

    pub fn current_speed(&self) -> f64 {
        self.speed.current()
    }

    pub fn target_speed(&self) -> f64 {
        self.speed.target()
    }

    /// The signed acceleration in m/s<sup>2</sup>.
    pub fn acceleration(&self) -> f64 {
        self.speed.acc()
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn initial_max_speed(&self) -> f64 {
        self.initial_max_speed
    }

    /// Until when the state may not be recycled.
    pub fn spawn_protection_ends(&self) -> Millis {
        self.spawn_protection_ends
    }

    pub fn safety_distance_squared(&self) -> f64 {
        self.safety_distance_squared
    }

    pub fn indicator(&self) -> Indicator {
        self.indicator
    }

    /// Copies the parts of the state other vehicles react to.
    pub fn snapshot(&self) -> AiSnapshot {
        AiSnapshot {
            id: self.id,
            slot: self.slot,
            current_point: self.current_point,
            position: self.status.position,
            current_speed: self.speed.current(),
            target_speed: self.speed.target(),
            length_post: self.profile.vehicle_length_post,
            safety_distance_squared: self.safety_distance_squared,
        }
    }

    /// Takes the vehicle off the road until it is teleported again.
    pub fn despawn(&mut self) {
        self.initialized = false;
        self.speed.stop();
    }

    /// Sets the speed the vehicle ramps towards.
    ///
    /// # Parameters
    /// * `target` - The target speed in m/s
    /// * `deceleration` - Deceleration used if the target is below the current speed
    /// * `acceleration` - Acceleration used if the target is above the current speed
    pub fn set_target_speed(&mut self, target: f64, deceleration: f64, acceleration: f64) {
        self.speed.set_target(target, deceleration, acceleration);
    }

    /// Places the vehicle at the start of the segment beginning at `point`.
    ///
    /// # Parameters
    /// * `map` - The road graph
    /// * `params` - The traffic parameters
    /// * `point` - The spawn point, which must have a next point
    /// * `now` - The current session time
    /// * `reset_speed` - Whether to pick a fresh cruising speed and colour
    pub fn teleport(
        &mut self,
        map: &TrafficMap,
        params: &AiParams,
        point: PointId,
        now: Millis,
        reset_speed: bool,
    ) -> Result<(), TrafficError> {
        self.evaluator.clear();
        let next = self
            .evaluator
            .try_next(map, point)
            .ok_or(TrafficError::DeadEnd(point))?;

        self.current_point = point;
        self.next_point = next;
        self.progress = 0.0;
        self.segment_length = map.point(point).position.distance(map.point(next).position);
        self.calc_tangents(map);

        if reset_speed {
            self.randomize_speed(map, params, point);
            if self.profile.allow_color_change && self.profile.color_variants > 1 {
                self.status.color_variant = self.rng.gen_range(0..self.profile.color_variants);
            }
        }

        self.spawn_protection_ends = now + params.spawn_protection.sample(&mut self.rng);
        self.safety_distance_squared = params.safety_distance.sample(&mut self.rng).powi(2);
        self.min_obstacle_distance = params.min_obstacle_distance;
        self.stopped_since = None;
        self.ignore_obstacles_until = 0;
        self.honk = None;
        self.indicator = Indicator::None;
        self.next_junction = None;
        self.junction_passed = false;
        self.end_indicator_distance = 0.0;

        self.initialized = true;
        self.last_tick = now;
        self.refresh_status(map, params, now);
        Ok(())
    }

    /// Picks a cruising speed around the configured maximum,
    /// with a bonus in lanes that have a lane to their right.
    fn randomize_speed(&mut self, map: &TrafficMap, params: &AiParams, point: PointId) {
        let fast_lane = map
            .point(point)
            .right
            .is_some_and(|right| map.is_same_direction(point, right));
        let base = params.max_speed + if fast_lane { params.fast_lane_offset } else { 0.0 };
        let spread = 0.5 * params.max_speed_variation;
        let factor = Normal::new(1.0, 0.5 * spread)
            .map_or(1.0, |distr| distr.sample(&mut self.rng))
            .clamp(1.0 - spread, 1.0 + spread);
        self.max_speed = base * factor;
        self.initial_max_speed = self.max_speed;
        self.speed = SpeedModel::cruising(self.max_speed);
    }

    /// Advances the vehicle to the session time `now`.
    ///
    /// A vehicle that runs off the end of the graph is restarted at the map origin.
    pub fn update(
        &mut self,
        map: &TrafficMap,
        params: &AiParams,
        now: Millis,
    ) -> Result<(), TrafficError> {
        if !self.initialized {
            return Ok(());
        }
        let dt = now.saturating_sub(self.last_tick) as f64 / 1000.0;
        self.last_tick = now;

        self.progress += self.speed.integrate(dt, self.max_speed);
        while self.progress > self.segment_length {
            self.progress -= self.segment_length;
            let Some(next) = self.evaluator.try_next(map, self.next_point) else {
                let origin = map.origin();
                warn!(
                    "AI vehicle of slot {:?} reached a dead end at {}, restarting at {}",
                    self.slot, self.next_point, origin
                );
                return self.teleport(map, params, origin, now, false);
            };
            self.pass_point(map, self.next_point);
            self.current_point = self.next_point;
            self.next_point = next;
            self.segment_length = map
                .point(self.current_point)
                .position
                .distance(map.point(next).position);
        }

        self.calc_tangents(map);
        self.refresh_status(map, params, now);
        Ok(())
    }

    /// Indicator bookkeeping as the vehicle moves onto `point`.
    fn pass_point(&mut self, map: &TrafficMap, point: PointId) {
        if self.junction_passed {
            self.end_indicator_distance -= self.segment_length;
            if self.end_indicator_distance < 0.0 {
                self.indicator = Indicator::None;
                self.next_junction = None;
                self.junction_passed = false;
            }
            return;
        }
        let Some(id) = self.next_junction else {
            return;
        };
        let junction = map.junction(id);
        let exit = if self.evaluator.will_take_junction(map, id) {
            Some(junction.end)
        } else {
            map.point(junction.start).next
        };
        if exit == Some(point) {
            self.junction_passed = true;
            self.end_indicator_distance = junction.indicate_distance_post;
        }
    }

    /// Recomputes the Catmull-Rom tangents of the current segment,
    /// falling back to one-sided differences at chain ends.
    fn calc_tangents(&mut self, map: &TrafficMap) {
        let cur = map.point(self.current_point).position;
        let next = map.point(self.next_point).position;
        let prev = self.evaluator.try_previous(map, self.current_point);
        let after = self.evaluator.try_next(map, self.next_point);

        let chord = (next - cur) * 0.5;
        self.start_tangent = prev.map_or(chord, |p| (next - map.point(p).position) * 0.5);
        self.end_tangent = after.map_or(chord, |n| (map.point(n).position - cur) * 0.5);
    }

    /// Recomputes the networking snapshot from the vehicle's place on the road.
    fn refresh_status(&mut self, map: &TrafficMap, params: &AiParams, now: Millis) {
        let cur = map.point(self.current_point);
        let next = map.point(self.next_point);
        let t = if self.segment_length > 0.0 {
            (self.progress / self.segment_length).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let sample = CatmullRom::new(cur.position, next.position, self.start_tangent, self.end_tangent)
            .sample(t);
        let dir = normalize_or_zero(sample.tan);
        let (yaw, pitch) = yaw_pitch(dir);
        let roll = lerp(cur.camber, next.camber, t);
        let speed = self.speed.current();

        let mut flags = StatusFlags::NONE;
        if self.honk.is_some_and(|window| window.contains(now)) {
            flags |= StatusFlags::HORN;
        }
        match self.indicator {
            Indicator::Left => flags |= StatusFlags::INDICATE_LEFT,
            Indicator::Right => flags |= StatusFlags::INDICATE_RIGHT,
            Indicator::None => {}
        }

        let tyre_speed = if self.profile.tyre_diameter > 0.0 {
            (speed / (0.5 * self.profile.tyre_diameter)) as f32
        } else {
            0.0
        };
        let rpm_fraction = if params.max_speed > 0.0 {
            (speed / params.max_speed).clamp(0.0, 1.0)
        } else {
            0.0
        };

        self.status = CarStatus {
            timestamp: now,
            position: sample.pos + Vector3d::new(0.0, self.profile.spline_height_offset, 0.0),
            rotation: Vector3d::new(yaw, pitch, roll),
            velocity: dir * speed,
            tyre_angular_speed: [tyre_speed; 4],
            engine_rpm: lerp(params.idle_engine_rpm, params.max_engine_rpm, rpm_fraction) as u16,
            gear: if speed < STOPPED_SPEED { 1 } else { 2 },
            steer_angle: 127,
            wheel_angle: 127,
            flags,
            color_variant: self.status.color_variant,
        };
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::map::fixtures::*;
    use assert_approx_eq::assert_approx_eq;
    use slotmap::KeyData;

    fn new_state(params: &AiParams, seed: u64) -> AiState {
        let slot = SlotId::from(KeyData::from_ffi(1));
        AiState::new(slot, DrivingProfile::from_params(params), params, seed)
    }

    #[test]
    fn teleport_places_vehicle() {
        let map = straight_road(10, 10.0);
        let params = AiParams::default();
        let mut state = new_state(&params, 1);
        assert!(!state.is_initialized());

        state.teleport(&map, &params, pid(3), 1_000, true).unwrap();
        assert!(state.is_initialized());
        assert_eq!(state.current_point(), pid(3));
        assert_approx_eq!(state.position().z, 30.0);
        assert_approx_eq!(state.status().rotation.x, 0.0);
        assert_eq!(state.status().timestamp, 1_000);
        assert!(params.spawn_protection.contains(state.spawn_protection_ends() - 1_000));
        let spread = 0.5 * params.max_speed_variation * params.max_speed;
        assert!((state.max_speed() - params.max_speed).abs() <= spread + 1e-9);
        assert_eq!(state.current_speed(), state.max_speed());

        assert_eq!(
            state.teleport(&map, &params, pid(9), 1_000, true),
            Err(TrafficError::DeadEnd(pid(9)))
        );
    }

    #[test]
    fn drives_along_the_road() {
        let map = straight_road(50, 10.0);
        let params = AiParams::default();
        let mut state = new_state(&params, 2);
        state.teleport(&map, &params, pid(0), 0, true).unwrap();
        let speed = state.current_speed();
        state.update(&map, &params, 2_000).unwrap();
        assert_approx_eq!(state.position().z, 2.0 * speed, 1e-6);
        assert_eq!(state.current_point(), pid((2.0 * speed / 10.0) as usize));
        assert_approx_eq!(state.status().velocity.z, speed, 1e-6);
    }

    #[test]
    fn speed_stays_in_bounds() {
        let map = ring_road(200.0, 5.0);
        let params = AiParams::default();
        let mut rng = StdRng::from_seed(*b"Vegemite sandwhich is not fun...");
        let mut state = new_state(&params, 3);
        state.teleport(&map, &params, pid(0), 0, true).unwrap();
        for tick in 1..2_000u64 {
            if tick % 10 == 0 {
                let target = rng.gen_range(-10.0..60.0);
                state.set_target_speed(target, params.default_deceleration, params.default_acceleration);
            }
            state.update(&map, &params, tick * 50).unwrap();
            assert!(state.current_speed() >= 0.0);
            assert!(state.current_speed() <= state.max_speed());
        }
    }

    #[test]
    fn laps_with_a_ramp_follow_the_graph() {
        let params = AiParams::default();
        for exit_probability in [1.0, 0.5] {
            let map = looped_ramp(exit_probability);
            for seed in 0..5 {
                let mut state = new_state(&params, seed);
                state
                    .teleport(&map, &params, map.resolve("main@60").unwrap(), 0, true)
                    .unwrap();
                let mut point = state.current_point();
                for tick in 1..5_000u64 {
                    state.update(&map, &params, tick * 50).unwrap();
                    let current = state.current_point();
                    if current != point {
                        let from = map.point(point);
                        let via_junction = from.junction_start.map(|j| map.junction(j).end);
                        assert!(
                            from.next == Some(current) || via_junction == Some(current),
                            "jumped from {} to {} at tick {}",
                            point,
                            current,
                            tick
                        );
                        point = current;
                    }
                }
            }
        }
    }

    #[test]
    fn dead_end_restarts_at_origin() {
        let map = straight_road(5, 10.0);
        let params = AiParams::default();
        let mut state = new_state(&params, 4);
        state.teleport(&map, &params, pid(3), 0, true).unwrap();
        state.update(&map, &params, 1_000).unwrap();
        assert!(state.is_initialized());
        assert_eq!(state.current_point(), map.origin());
        assert_approx_eq!(state.position().z, 0.0);
    }

    #[test]
    fn despawn_stops_updates() {
        let map = straight_road(10, 10.0);
        let params = AiParams::default();
        let mut state = new_state(&params, 5);
        state.teleport(&map, &params, pid(1), 0, true).unwrap();
        state.despawn();
        assert!(!state.is_initialized());
        assert_eq!(state.current_speed(), 0.0);
        let before = *state.status();
        state.update(&map, &params, 5_000).unwrap();
        assert_eq!(*state.status(), before);
    }

    #[test]
    fn colour_variants() {
        let map = straight_road(10, 10.0);
        let params = AiParams::default();
        let mut profile = DrivingProfile::from_params(&params);
        profile.allow_color_change = true;
        profile.color_variants = 4;
        let slot = SlotId::from(KeyData::from_ffi(1));
        let mut state = AiState::new(slot, profile, &params, 6);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            state.teleport(&map, &params, pid(0), 0, true).unwrap();
            seen.insert(state.status().color_variant);
        }
        assert_eq!(seen.len(), 4);
    }
}
