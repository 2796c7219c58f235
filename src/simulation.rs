use crate::behavior::{AiBehavior, SlotEvent};
#[cfg(feature = "debug")]
use crate::debug::take_debug_frame;
use crate::util::Millis;
use crate::world::TrafficWorld;
use crossbeam_channel::Sender;
use log::error;
use std::sync::Arc;

/// Drives the three traffic activities from a single game loop.
///
/// Each activity runs whenever its configured interval has elapsed,
/// so results are deterministic for a given seed and sequence of steps.
pub struct TrafficSimulation {
    world: Arc<TrafficWorld>,
    behavior: AiBehavior,
    /// The session time in s.
    time: f64,
    /// The current frame of simulation.
    frame: usize,
    /// The time since the last kinematics update in s.
    update_acc: f64,
    /// The time since the last obstacle detection in s.
    obstacle_acc: f64,
    /// The time since the last orchestrator tick in s.
    behavior_acc: f64,
    /// Debugging information from the previously simulated frame.
    #[cfg(feature = "debug")]
    debug: serde_json::Value,
}

impl TrafficSimulation {
    /// Creates a simulation starting at session time zero.
    pub fn new(world: Arc<TrafficWorld>) -> Self {
        let behavior = AiBehavior::new(Arc::clone(&world));
        Self {
            world,
            behavior,
            time: 0.0,
            frame: 0,
            update_acc: f64::INFINITY,
            obstacle_acc: f64::INFINITY,
            behavior_acc: f64::INFINITY,
            #[cfg(feature = "debug")]
            debug: serde_json::Value::Null,
        }
    }

    pub fn world(&self) -> &Arc<TrafficWorld> {
        &self.world
    }

    pub fn behavior(&self) -> &AiBehavior {
        &self.behavior
    }

    pub fn behavior_mut(&mut self) -> &mut AiBehavior {
        &mut self.behavior
    }

    /// A handle for reporting slot events.
    pub fn event_sender(&self) -> Sender<SlotEvent> {
        self.behavior.event_sender()
    }

    /// The session time in ms.
    pub fn now(&self) -> Millis {
        (self.time * 1000.0).round() as Millis
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Advances the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        self.time += dt;
        self.update_acc += dt;
        self.obstacle_acc += dt;
        self.behavior_acc += dt;

        self.run_behavior();
        self.detect_obstacles();
        self.update_vehicles();
        self.frame += 1;

        #[cfg(feature = "debug")]
        {
            self.debug = take_debug_frame();
        }
    }

    /// Gets the debugging information for the previously simulated frame as JSON array.
    #[cfg(feature = "debug")]
    pub fn debug(&mut self) -> serde_json::Value {
        self.debug.clone()
    }

    /// Spawns vehicles and rebalances overbooking.
    fn run_behavior(&mut self) {
        let interval = self.world.params().behavior_interval as f64 / 1000.0;
        if self.behavior_acc < interval {
            return;
        } else {
            self.behavior_acc = 0.0;
        }
        let now = self.now();
        if let Err(err) = self.behavior.tick(now) {
            error!("AI behavior tick at {} ms failed: {}", now, err);
        }
    }

    /// Chooses target speeds.
    fn detect_obstacles(&mut self) {
        let interval = self.world.params().obstacle_interval as f64 / 1000.0;
        if self.obstacle_acc < interval {
            return;
        } else {
            self.obstacle_acc = 0.0;
        }
        self.world.detect_obstacles(self.now());
    }

    /// Moves the vehicles.
    fn update_vehicles(&mut self) {
        let interval = self.world.params().update_interval as f64 / 1000.0;
        if self.update_acc < interval {
            return;
        } else {
            self.update_acc = 0.0;
        }
        self.world.update(self.now());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{AiMode, AiParams};
    use crate::map::fixtures::*;
    use crate::vehicle::CarStatus;

    #[test]
    fn runs_activities_at_their_rates() {
        let params = AiParams {
            seed: Some(3),
            ..Default::default()
        };
        let mut world = TrafficWorld::new(Arc::new(ring_road(2000.0, 5.0)), params).unwrap();
        let player = world.add_slot("car", "", AiMode::None);
        world.add_slot("car", "", AiMode::Fixed);
        let world = Arc::new(world);
        let mut sim = TrafficSimulation::new(world.clone());
        let events = sim.event_sender();
        events.send(SlotEvent::Connected(player)).unwrap();

        for _ in 0..100 {
            let now = sim.now();
            events
                .send(SlotEvent::PositionUpdate {
                    slot: player,
                    status: CarStatus::default(),
                    timestamp: now,
                })
                .unwrap();
            sim.step(0.02);
        }
        assert_eq!(sim.frame(), 100);
        assert_eq!(sim.now(), 2_000);
        let statuses = world.ai_statuses();
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].1.timestamp >= 1_950);
    }
}
