use super::StateId;
use crate::map::PointId;
use crate::math::{Point3d, Vector3d};
use crate::util::Millis;
use crate::SlotId;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// Light, indicator and horn flags of a car, as broadcast to clients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatusFlags(pub u32);

impl StatusFlags {
    pub const NONE: Self = Self(0);
    pub const LIGHTS_ON: Self = Self(1 << 5);
    pub const HORN: Self = Self(1 << 6);
    pub const HAZARDS: Self = Self(1 << 13);
    pub const INDICATE_LEFT: Self = Self(1 << 14);
    pub const INDICATE_RIGHT: Self = Self(1 << 15);

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for StatusFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for StatusFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

/// The networking-facing snapshot of a car.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CarStatus {
    /// Session time the snapshot was taken at.
    pub timestamp: Millis,
    pub position: Point3d,
    /// Yaw, pitch and roll in radians.
    pub rotation: Vector3d,
    /// Velocity in m/s.
    pub velocity: Vector3d,
    /// Angular speed of each tyre in rad/s.
    pub tyre_angular_speed: [f32; 4],
    pub engine_rpm: u16,
    pub gear: u8,
    /// Steering angle, with 127 meaning straight ahead.
    pub steer_angle: u8,
    /// Front wheel angle, with 127 meaning straight ahead.
    pub wheel_angle: u8,
    pub flags: StatusFlags,
    pub color_variant: u8,
}

impl Default for CarStatus {
    fn default() -> Self {
        Self {
            timestamp: 0,
            position: Point3d::new(0.0, 0.0, 0.0),
            rotation: Vector3d::new(0.0, 0.0, 0.0),
            velocity: Vector3d::new(0.0, 0.0, 0.0),
            tyre_angular_speed: [0.0; 4],
            engine_rpm: 0,
            gear: 1,
            steer_angle: 127,
            wheel_angle: 127,
            flags: StatusFlags::NONE,
            color_variant: 0,
        }
    }
}

/// A copy of the parts of an initialized AI vehicle that other vehicles react to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AiSnapshot {
    pub id: StateId,
    pub slot: SlotId,
    pub current_point: PointId,
    pub position: Point3d,
    pub current_speed: f64,
    pub target_speed: f64,
    /// Distance from the vehicle's origin to its rear bumper.
    pub length_post: f64,
    pub safety_distance_squared: f64,
}
