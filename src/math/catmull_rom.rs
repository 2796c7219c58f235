use super::{Point3d, Vector3d};
use cgmath::prelude::*;

/// A cubic Hermite segment between two spline points, with Catmull-Rom tangents.
#[derive(Clone, Copy, Debug)]
pub struct CatmullRom {
    start: Point3d,
    end: Point3d,
    start_tan: Vector3d,
    end_tan: Vector3d,
}

/// The result of sampling a [CatmullRom] segment.
#[derive(Clone, Copy, Debug)]
pub struct CurveSample {
    /// The position on the segment.
    pub pos: Point3d,
    /// The derivative of the position with respect to `t`.
    /// Not normalised; its magnitude is roughly the segment length.
    pub tan: Vector3d,
}

impl CatmullRom {
    /// Creates a segment from its end points and the tangents at each end.
    pub const fn new(start: Point3d, end: Point3d, start_tan: Vector3d, end_tan: Vector3d) -> Self {
        Self {
            start,
            end,
            start_tan,
            end_tan,
        }
    }

    /// Samples the segment at `t`, which is clamped to `[0, 1]`.
    pub fn sample(&self, t: f64) -> CurveSample {
        let t = t.clamp(0.0, 1.0);
        let t2 = t * t;
        let t3 = t2 * t;

        let s = self.start.to_vec();
        let e = self.end.to_vec();

        let pos = (2.0 * t3 - 3.0 * t2 + 1.0) * s
            + (t3 - 2.0 * t2 + t) * self.start_tan
            + (-2.0 * t3 + 3.0 * t2) * e
            + (t3 - t2) * self.end_tan;

        let tan = (6.0 * t2 - 6.0 * t) * s
            + (3.0 * t2 - 4.0 * t + 1.0) * self.start_tan
            + (-6.0 * t2 + 6.0 * t) * e
            + (3.0 * t2 - 2.0 * t) * self.end_tan;

        CurveSample {
            pos: Point3d::from_vec(pos),
            tan,
        }
    }
}
