//! Mathematical structs and functions.

use cgmath::{Point3, Vector3};
pub use catmull_rom::{CatmullRom, CurveSample};
pub use util::*;

mod catmull_rom;
mod util;

/// A 3D point. The y-axis points up.
pub type Point3d = Point3<f64>;

/// A 3D vector. The y-axis points up.
pub type Vector3d = Vector3<f64>;
