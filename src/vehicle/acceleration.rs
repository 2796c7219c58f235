/// The 1-D speed model of an AI vehicle: speed ramps linearly towards
/// a target at a constant acceleration and never overshoots it.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpeedModel {
    /// The current speed in m/s.
    current: f64,
    /// The speed being ramped towards in m/s.
    target: f64,
    /// The signed acceleration in m/s<sup>2</sup>, zero once the target is reached.
    acc: f64,
}

impl SpeedModel {
    /// Creates a model cruising at `speed`.
    pub fn cruising(speed: f64) -> Self {
        Self {
            current: speed,
            target: speed,
            acc: 0.0,
        }
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn acc(&self) -> f64 {
        self.acc
    }

    /// Sets a new target speed.
    ///
    /// # Parameters
    /// * `target` - The speed to ramp towards in m/s
    /// * `deceleration` - A positive deceleration used when slowing down
    /// * `acceleration` - A positive acceleration used when speeding up
    pub fn set_target(&mut self, target: f64, deceleration: f64, acceleration: f64) {
        self.target = target.max(0.0);
        self.acc = if self.target < self.current {
            -deceleration
        } else if self.target > self.current {
            acceleration
        } else {
            0.0
        };
    }

    /// Advances the model by `dt` seconds, keeping the speed within `[0, max_speed]`.
    /// Returns the distance travelled in m.
    pub fn integrate(&mut self, dt: f64, max_speed: f64) -> f64 {
        let start = self.current;
        if self.acc != 0.0 {
            self.current += self.acc * dt;
            let reached = (self.acc > 0.0 && self.current >= self.target)
                || (self.acc < 0.0 && self.current <= self.target);
            if reached {
                self.current = self.target;
                self.acc = 0.0;
            }
        }
        self.current = self.current.clamp(0.0, max_speed.max(0.0));
        0.5 * (start + self.current) * dt
    }

    /// Brings the vehicle to an immediate halt.
    pub fn stop(&mut self) {
        *self = Self::default();
    }
}
