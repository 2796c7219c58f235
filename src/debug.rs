use crate::math::Point3d;
#[cfg(feature = "debug")]
use serde_json::{json, Value};

// Shapes recorded by the current thread, drained once per tick
#[cfg(feature = "debug")]
thread_local!(
    static DEBUG_FRAME: std::cell::RefCell<Vec<Value>> = Default::default();
);

#[cfg(feature = "debug")]
fn coords(p: Point3d) -> Value {
    json!([p.x, p.y, p.z])
}

/// Records a named line segment for the overlay. A no-op without the `debug` feature.
#[allow(unused)]
pub fn debug_line(name: &str, p1: Point3d, p2: Point3d) {
    #[cfg(feature = "debug")]
    DEBUG_FRAME.with(|frame| {
        frame.borrow_mut().push(json!({
            "type": "line",
            "name": name,
            "p1": coords(p1),
            "p2": coords(p2),
        }))
    })
}

/// Records a named sphere for the overlay.
#[allow(unused)]
pub fn debug_sphere(name: &str, centre: Point3d, radius: f64) {
    #[cfg(feature = "debug")]
    DEBUG_FRAME.with(|frame| {
        frame.borrow_mut().push(json!({
            "type": "sphere",
            "name": name,
            "centre": coords(centre),
            "radius": radius,
        }))
    })
}

/// Takes everything recorded on this thread since the last call, as a JSON array.
#[cfg(feature = "debug")]
pub fn take_debug_frame() -> Value {
    Value::Array(DEBUG_FRAME.with(|frame| frame.take()))
}
