use super::{Point3d, Vector3d};
use cgmath::prelude::*;
use std::f64::consts::FRAC_PI_2;

/// Gravitational acceleration in m/s<sup>2</sup>.
pub const GRAVITY: f64 = 9.81;

/// Rotates a vector 90 degrees to the left about the vertical axis,
/// dropping its vertical component. The result is normalised, or zero
/// if the vector is vertical.
pub fn rot_left(vec: Vector3d) -> Vector3d {
    normalize_or_zero(Vector3d::new(vec.z, 0.0, -vec.x))
}

/// Normalises a vector, returning the zero vector if it has no length.
pub fn normalize_or_zero(vec: Vector3d) -> Vector3d {
    let mag = vec.magnitude();
    if mag > 1e-9 {
        vec / mag
    } else {
        Vector3d::new(0.0, 0.0, 0.0)
    }
}

/// The distance needed to shed `speed_delta` m/s at a constant `deceleration`.
///
/// # Parameters
/// * `speed_delta` - The change in speed in m/s
/// * `deceleration` - A positive deceleration in m/s<sup>2</sup>
pub fn braking_distance(speed_delta: f64, deceleration: f64) -> f64 {
    if deceleration <= 0.0 {
        return f64::INFINITY;
    }
    speed_delta * speed_delta / (2.0 * deceleration)
}

/// The highest speed a vehicle can take a corner of the given `radius` at.
///
/// # Parameters
/// * `radius` - The corner radius in m
/// * `factor` - The fraction of the available grip a vehicle is willing to use
pub fn max_cornering_speed(radius: f64, factor: f64) -> f64 {
    (GRAVITY * radius * factor).max(0.0).sqrt()
}

/// Computes the radius of the circle through three points.
/// Returns infinity if the points are collinear.
pub fn circumradius(a: Point3d, b: Point3d, c: Point3d) -> f64 {
    let ab = b - a;
    let bc = c - b;
    let ca = a - c;
    let area2 = ab.cross(-ca).magnitude();
    if area2 < 1e-9 {
        return f64::INFINITY;
    }
    (ab.magnitude() * bc.magnitude() * ca.magnitude()) / (2.0 * area2)
}

/// Converts a direction vector to a yaw and pitch in radians.
///
/// The yaw is zero when heading along the positive z-axis;
/// the pitch is positive when heading uphill.
pub fn yaw_pitch(dir: Vector3d) -> (f64, f64) {
    let yaw = f64::atan2(dir.z, dir.x) - FRAC_PI_2;
    let flat = (dir.x * dir.x + dir.z * dir.z).sqrt();
    let pitch = -(f64::atan2(flat, dir.y) - FRAC_PI_2);
    (yaw, pitch)
}

/// The horizontal angle between two vectors in degrees, in `[0, 180]`.
pub fn horizontal_angle_deg(a: Vector3d, b: Vector3d) -> f64 {
    let a = normalize_or_zero(Vector3d::new(a.x, 0.0, a.z));
    let b = normalize_or_zero(Vector3d::new(b.x, 0.0, b.z));
    if a.magnitude2() < 0.5 || b.magnitude2() < 0.5 {
        return 180.0;
    }
    a.dot(b).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Linearly interpolates between `a` and `b`.
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn left_of_forward() {
        let left = rot_left(Vector3d::new(0.0, 0.0, 1.0));
        assert_approx_eq!(left.x, 1.0);
        assert_approx_eq!(left.z, 0.0);
        let left = rot_left(Vector3d::new(2.0, 5.0, 0.0));
        assert_approx_eq!(left.z, -1.0);
        assert_approx_eq!(left.y, 0.0);
    }

    #[test]
    fn braking() {
        assert_approx_eq!(braking_distance(20.0, 8.0), 25.0);
        assert_approx_eq!(braking_distance(0.0, 8.0), 0.0);
        assert!(braking_distance(1.0, 0.0).is_infinite());
    }

    #[test]
    fn circle_through_points() {
        let r = circumradius(
            Point3d::new(10.0, 0.0, 0.0),
            Point3d::new(0.0, 0.0, 10.0),
            Point3d::new(-10.0, 0.0, 0.0),
        );
        assert_approx_eq!(r, 10.0);
        let r = circumradius(
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(0.0, 0.0, 1.0),
            Point3d::new(0.0, 0.0, 2.0),
        );
        assert!(r.is_infinite());
    }

    #[test]
    fn yaw_of_axes() {
        let (yaw, pitch) = yaw_pitch(Vector3d::new(0.0, 0.0, 1.0));
        assert_approx_eq!(yaw, 0.0);
        assert_approx_eq!(pitch, 0.0);
        let (_, pitch) = yaw_pitch(Vector3d::new(0.0, 1.0, 1.0));
        assert_approx_eq!(pitch, std::f64::consts::FRAC_PI_4);
    }

    #[test]
    fn angles() {
        let fwd = Vector3d::new(0.0, 0.0, 1.0);
        assert_approx_eq!(horizontal_angle_deg(fwd, Vector3d::new(0.0, 3.0, 4.0)), 0.0);
        assert_approx_eq!(horizontal_angle_deg(fwd, Vector3d::new(1.0, 0.0, 0.0)), 90.0);
        assert_approx_eq!(horizontal_angle_deg(fwd, -fwd), 180.0);
    }
}
