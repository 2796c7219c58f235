//! Traffic parameters and per-car overrides.

use crate::error::ConfigError;
use crate::map::MIN_WIDTH_FACTOR;
use crate::math::lerp;
use crate::util::{Interval, Millis};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tunable parameters of the traffic simulation.
///
/// Distances are in m, speeds in m/s, accelerations in m/s<sup>2</sup>
/// and times in ms unless noted otherwise.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct AiParams {
    /// Distance between the centre lines of adjacent lanes.
    pub lane_width: f64,
    /// Tolerance when matching a point to the expected position of an adjacent lane.
    pub lane_detection_radius: f64,
    /// Whether lanes carrying oncoming traffic are linked as neighbours.
    pub two_way_traffic: bool,
    /// Number of AI vehicles to aim for per connected player.
    pub ai_per_player_target_count: usize,
    /// Hard cap on the number of AI vehicles.
    pub max_ai_target_count: usize,
    /// Multiplier applied to `ai_per_player_target_count`.
    pub traffic_density: f64,
    /// Optional density for each hour of the day, interpolated between hours.
    /// Overrides `traffic_density` when present.
    pub hourly_traffic_density: Option<Vec<f64>>,
    /// How many points ahead of or behind a player new vehicles spawn.
    pub spawn_distance_points: Interval<usize>,
    /// Players farther than this from any point are off the traffic network.
    pub max_player_distance_to_spline: f64,
    /// Vehicles within this distance of a player are never recycled.
    pub player_radius: f64,
    /// How far ahead along its velocity a player's position is projected.
    pub player_position_offset: f64,
    /// Players idle for longer than this no longer attract traffic.
    pub player_afk_timeout: Millis,
    /// States of the same slot closer than this travelling the same way are despawned.
    pub min_state_distance: f64,
    /// A state may not spawn within this distance of another state of its slot.
    pub state_spawn_distance: f64,
    /// A state may not spawn within this distance of a player.
    pub spawn_safety_distance_to_player: f64,
    /// Range of each vehicle's personal safety distance.
    pub safety_distance: Interval<f64>,
    /// Range of the spawn protection period.
    pub spawn_protection: Interval<Millis>,
    /// The base cruising speed.
    pub max_speed: f64,
    /// Relative spread of cruising speeds around `max_speed`, e.g. 0.15 for ±7.5 %.
    pub max_speed_variation: f64,
    /// Bonus cruising speed in fast lanes.
    pub fast_lane_offset: f64,
    /// Default acceleration of AI vehicles.
    pub default_acceleration: f64,
    /// Default deceleration of AI vehicles.
    pub default_deceleration: f64,
    /// Fraction of the available grip used when cornering.
    pub cornering_speed_factor: f64,
    /// Multiplier on the braking distance before corners.
    pub cornering_brake_distance_factor: f64,
    /// Fraction of the deceleration used when braking for corners.
    pub cornering_brake_force_factor: f64,
    /// Obstacles closer than this bring a vehicle to a stop.
    pub min_obstacle_distance: f64,
    /// Vehicles stopped for longer than this ignore obstacles for a while.
    pub ignore_obstacles_after: Millis,
    /// Vehicle kinematics update interval.
    pub update_interval: Millis,
    /// Obstacle detection interval.
    pub obstacle_interval: Millis,
    /// Spawn orchestration interval.
    pub behavior_interval: Millis,
    /// Engine speed when stationary, in rpm.
    pub idle_engine_rpm: f64,
    /// Engine speed at `max_speed`, in rpm.
    pub max_engine_rpm: f64,
    /// Default tyre diameter.
    pub tyre_diameter: f64,
    /// Records spawn decisions for the debug overlay.
    pub debug_overlay: bool,
    /// Seed for all random decisions; drawn from entropy when absent.
    pub seed: Option<u64>,
    /// Per-model and per-skin overrides.
    pub car_overrides: Vec<CarOverrides>,
}

impl Default for AiParams {
    fn default() -> Self {
        Self {
            lane_width: 3.0,
            lane_detection_radius: 2.0,
            two_way_traffic: false,
            ai_per_player_target_count: 10,
            max_ai_target_count: 300,
            traffic_density: 1.0,
            hourly_traffic_density: None,
            spawn_distance_points: Interval::new(100, 400),
            max_player_distance_to_spline: 7.0,
            player_radius: 200.0,
            player_position_offset: 100.0,
            player_afk_timeout: 10_000,
            min_state_distance: 200.0,
            state_spawn_distance: 1000.0,
            spawn_safety_distance_to_player: 150.0,
            safety_distance: Interval::new(20.0, 70.0),
            spawn_protection: Interval::new(4_000, 8_000),
            max_speed: 80.0 / 3.6,
            max_speed_variation: 0.15,
            fast_lane_offset: 10.0 / 3.6,
            default_acceleration: 2.5,
            default_deceleration: 8.5,
            cornering_speed_factor: 0.65,
            cornering_brake_distance_factor: 3.0,
            cornering_brake_force_factor: 0.5,
            min_obstacle_distance: 15.0,
            ignore_obstacles_after: 10_000,
            update_interval: 50,
            obstacle_interval: 100,
            behavior_interval: 500,
            idle_engine_rpm: 800.0,
            max_engine_rpm: 3000.0,
            tyre_diameter: 0.65,
            debug_overlay: false,
            seed: None,
            car_overrides: vec![],
        }
    }
}

impl AiParams {
    /// Checks the parameters for values the simulation cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("lane_width", self.lane_width),
            ("lane_detection_radius", self.lane_detection_radius),
            ("max_speed", self.max_speed),
            ("default_acceleration", self.default_acceleration),
            ("default_deceleration", self.default_deceleration),
            ("cornering_speed_factor", self.cornering_speed_factor),
            ("cornering_brake_force_factor", self.cornering_brake_force_factor),
            ("update_interval", self.update_interval as f64),
            ("obstacle_interval", self.obstacle_interval as f64),
            ("behavior_interval", self.behavior_interval as f64),
        ];
        if let Some((name, value)) = positive.into_iter().find(|(_, v)| !(*v > 0.0)) {
            return Err(ConfigError::NotPositive { name, value });
        }
        if self.traffic_density < 0.0 {
            return Err(ConfigError::NotPositive {
                name: "traffic_density",
                value: self.traffic_density,
            });
        }
        if self.lane_width < MIN_WIDTH_FACTOR * self.lane_detection_radius {
            return Err(ConfigError::LaneWidthTooSmall {
                lane_width: self.lane_width,
                radius: self.lane_detection_radius,
            });
        }
        if !self.spawn_distance_points.is_ordered() {
            return Err(ConfigError::InvertedRange("spawn_distance_points"));
        }
        if !self.safety_distance.is_ordered() {
            return Err(ConfigError::InvertedRange("safety_distance"));
        }
        if !self.spawn_protection.is_ordered() {
            return Err(ConfigError::InvertedRange("spawn_protection"));
        }
        if self.state_spawn_distance < self.min_state_distance {
            return Err(ConfigError::Ordering("state_spawn_distance", "min_state_distance"));
        }
        if let Some(hours) = &self.hourly_traffic_density {
            if hours.len() != 24 {
                return Err(ConfigError::DensitySchedule(hours.len()));
            }
        }
        Ok(())
    }

    /// The traffic density at the given time of day.
    ///
    /// # Parameters
    /// * `hour` - Fractional hour of the day in `[0, 24)`
    pub fn density_at(&self, hour: f64) -> f64 {
        match &self.hourly_traffic_density {
            Some(hours) if hours.len() == 24 => {
                let hour = hour.rem_euclid(24.0);
                let idx = hour.floor() as usize % 24;
                let next = (idx + 1) % 24;
                lerp(hours[idx], hours[next], hour.fract())
            }
            _ => self.traffic_density,
        }
    }

    /// The driving profile for a car, applying any matching overrides.
    /// A skin-specific override takes precedence over a model-wide one.
    pub fn profile_for(&self, model: &str, skin: &str) -> DrivingProfile {
        let mut profile = DrivingProfile::from_params(self);
        let model_wide = self
            .car_overrides
            .iter()
            .filter(|o| o.model == model && o.skin.is_none());
        let skin_specific = self
            .car_overrides
            .iter()
            .filter(|o| o.model == model && o.skin.as_deref() == Some(skin));
        for overrides in model_wide.chain(skin_specific) {
            overrides.apply(&mut profile);
        }
        profile
    }
}

/// Whether a slot may be driven by the AI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AiMode {
    /// Only humans drive this slot.
    #[default]
    None,
    /// The AI drives this slot while no human occupies it.
    Auto,
    /// Only the AI drives this slot.
    Fixed,
}

/// The lanes a car may spawn in, counted from the left.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AllowedLanes {
    pub left: bool,
    pub middle: bool,
    pub right: bool,
}

impl Default for AllowedLanes {
    fn default() -> Self {
        Self {
            left: true,
            middle: true,
            right: true,
        }
    }
}

impl AllowedLanes {
    /// Whether the lane at `index` of `count` parallel lanes is allowed.
    pub fn allows(&self, index: usize, count: usize) -> bool {
        if count <= 1 {
            return true;
        }
        if index == 0 {
            self.left
        } else if index + 1 == count {
            self.right
        } else {
            self.middle
        }
    }
}

/// Overrides for cars of one model, optionally restricted to one skin.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct CarOverrides {
    pub model: String,
    pub skin: Option<String>,
    pub acceleration: Option<f64>,
    pub deceleration: Option<f64>,
    pub cornering_speed_factor: Option<f64>,
    pub cornering_brake_distance_factor: Option<f64>,
    pub cornering_brake_force_factor: Option<f64>,
    pub spline_height_offset: Option<f64>,
    pub vehicle_length_pre: Option<f64>,
    pub vehicle_length_post: Option<f64>,
    pub tyre_diameter: Option<f64>,
    pub allow_color_change: Option<bool>,
    pub color_variants: Option<u8>,
    pub allowed_lanes: Option<AllowedLanes>,
    pub max_overbooking: Option<usize>,
}

impl CarOverrides {
    fn apply(&self, profile: &mut DrivingProfile) {
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(value) = self.$field { profile.$field = value; })*
            };
        }
        set!(
            acceleration,
            deceleration,
            cornering_speed_factor,
            cornering_brake_distance_factor,
            cornering_brake_force_factor,
            spline_height_offset,
            vehicle_length_pre,
            vehicle_length_post,
            tyre_diameter,
            allow_color_change,
            color_variants,
            allowed_lanes
        );
        if let Some(max) = self.max_overbooking {
            profile.max_overbooking = Some(max);
        }
    }
}

/// The resolved driving behaviour of one car slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrivingProfile {
    pub acceleration: f64,
    pub deceleration: f64,
    pub cornering_speed_factor: f64,
    pub cornering_brake_distance_factor: f64,
    pub cornering_brake_force_factor: f64,
    /// Height of the car's origin above the spline.
    pub spline_height_offset: f64,
    /// Distance from the car's origin to its front bumper.
    pub vehicle_length_pre: f64,
    /// Distance from the car's origin to its rear bumper.
    pub vehicle_length_post: f64,
    pub tyre_diameter: f64,
    pub allow_color_change: bool,
    /// Number of colour variants to pick from when colour changes are allowed.
    pub color_variants: u8,
    pub allowed_lanes: AllowedLanes,
    /// Upper bound on the number of states in the slot's pool.
    pub max_overbooking: Option<usize>,
}

impl DrivingProfile {
    /// The default profile.
    pub fn from_params(params: &AiParams) -> Self {
        Self {
            acceleration: params.default_acceleration,
            deceleration: params.default_deceleration,
            cornering_speed_factor: params.cornering_speed_factor,
            cornering_brake_distance_factor: params.cornering_brake_distance_factor,
            cornering_brake_force_factor: params.cornering_brake_force_factor,
            spline_height_offset: 0.0,
            vehicle_length_pre: 2.0,
            vehicle_length_post: 2.0,
            tyre_diameter: params.tyre_diameter,
            allow_color_change: false,
            color_variants: 1,
            allowed_lanes: AllowedLanes::default(),
            max_overbooking: None,
        }
    }
}
