use crate::config::{AiMode, AiParams};
use crate::error::TrafficError;
use crate::map::TrafficMap;
use crate::math::{normalize_or_zero, Point3d};
use crate::slot::{EntrySlot, PlayerStatus};
use crate::util::Millis;
use crate::vehicle::{AiSnapshot, CarStatus, ObstacleContext, PlayerSnapshot};
use crate::SlotId;
use log::{error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slotmap::SlotMap;
use std::sync::Arc;

/// The road graph, the car slots and the parameters shared by every
/// simulation activity.
///
/// Slots are added while setting up the session; afterwards the world is
/// shared immutably and all per-slot state lives behind the slots' own locks.
pub struct TrafficWorld {
    map: Arc<TrafficMap>,
    slots: SlotMap<SlotId, EntrySlot>,
    params: AiParams,
    seeds: StdRng,
}

impl TrafficWorld {
    /// Creates a world with no slots.
    pub fn new(map: Arc<TrafficMap>, params: AiParams) -> Result<Self, TrafficError> {
        params.validate()?;
        let seeds = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        info!(
            "Traffic world created with {} points in {} splines",
            map.len(),
            map.splines().len()
        );
        Ok(Self {
            map,
            slots: SlotMap::with_key(),
            params,
            seeds,
        })
    }

    /// Adds a car slot.
    ///
    /// # Parameters
    /// * `model` - The car model
    /// * `skin` - The car skin
    /// * `ai_mode` - Whether and when the AI drives the slot
    pub fn add_slot(&mut self, model: &str, skin: &str, ai_mode: AiMode) -> SlotId {
        let seed = self.seeds.gen();
        let params = &self.params;
        self.slots
            .insert_with_key(|id| EntrySlot::new(id, model, skin, ai_mode, params, seed))
    }

    pub fn map(&self) -> &TrafficMap {
        &self.map
    }

    /// A shared handle to the road graph.
    pub fn map_arc(&self) -> Arc<TrafficMap> {
        Arc::clone(&self.map)
    }

    pub fn params(&self) -> &AiParams {
        &self.params
    }

    pub fn slot(&self, id: SlotId) -> Result<&EntrySlot, TrafficError> {
        self.slots.get(id).ok_or(TrafficError::UnknownSlot(id))
    }

    /// Returns an iterator over all slots.
    pub fn slots(&self) -> impl Iterator<Item = &EntrySlot> {
        self.slots.values()
    }

    /// Returns an iterator over the slots currently driven by the AI.
    pub fn ai_slots(&self) -> impl Iterator<Item = &EntrySlot> {
        self.slots.values().filter(|slot| slot.is_ai_controlled())
    }

    /// The number of slots driven by humans who are connected.
    pub fn connected_players(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| !slot.is_ai_controlled() && slot.player().is_some())
            .count()
    }

    /// The human players that have reported a position recently.
    pub fn active_players(&self, now: Millis) -> Vec<(SlotId, PlayerStatus)> {
        self.slots
            .iter()
            .filter(|(_, slot)| !slot.is_ai_controlled())
            .filter_map(|(id, slot)| slot.player().map(|player| (id, player)))
            .filter(|(_, player)| {
                player.has_sent_first_update
                    && now.saturating_sub(player.last_active) < self.params.player_afk_timeout
            })
            .collect()
    }

    /// Copies of all AI vehicles on the road.
    pub fn ai_snapshots(&self) -> Vec<AiSnapshot> {
        self.ai_slots().flat_map(|slot| slot.snapshots()).collect()
    }

    /// The networking snapshots of all AI vehicles on the road.
    pub fn ai_statuses(&self) -> Vec<(SlotId, CarStatus)> {
        self.ai_slots()
            .flat_map(|slot| {
                let id = slot.id();
                slot.statuses().into_iter().map(move |status| (id, status))
            })
            .collect()
    }

    /// Advances every AI vehicle to the session time `now`.
    /// A failing slot is logged and does not stop the others.
    pub fn update(&self, now: Millis) {
        for slot in self.ai_slots() {
            if let Err(err) = slot.update(&self.map, &self.params, now) {
                error!("Updating AI vehicles of slot {:?} failed: {}", slot.id(), err);
            }
        }
    }

    /// Lets every AI vehicle choose its target speed from the vehicles
    /// and players around it.
    pub fn detect_obstacles(&self, now: Millis) {
        let players = self
            .active_players(now)
            .into_iter()
            .map(|(slot, player)| PlayerSnapshot {
                slot,
                position: player.status.position,
                velocity: player.status.velocity,
            })
            .collect();
        let ctx = ObstacleContext::new(self.ai_snapshots(), players);
        for slot in self.ai_slots() {
            slot.detect_obstacles(&self.map, &self.params, &ctx, now);
        }
    }
}

/// The point a player is projected to, ahead along its velocity.
pub(crate) fn offset_position(player: &PlayerStatus, offset: f64) -> Point3d {
    player.status.position + normalize_or_zero(player.status.velocity) * offset
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::map::fixtures::*;
    use crate::math::Vector3d;
    use crate::util::lock;

    fn world() -> TrafficWorld {
        let params = AiParams {
            seed: Some(1),
            ..Default::default()
        };
        TrafficWorld::new(Arc::new(straight_road(500, 10.0)), params).unwrap()
    }

    #[test]
    fn rejects_invalid_params() {
        let params = AiParams {
            lane_width: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            TrafficWorld::new(Arc::new(straight_road(5, 10.0)), params),
            Err(TrafficError::Config(_))
        ));
    }

    #[test]
    fn active_players_exclude_afk() {
        let mut world = world();
        let a = world.add_slot("car", "", AiMode::None);
        let b = world.add_slot("car", "", AiMode::Auto);
        let c = world.add_slot("car", "", AiMode::None);
        world.slot(a).unwrap().update_player(CarStatus::default(), 1_000);
        world.slot(c).unwrap().update_player(CarStatus::default(), 20_000);
        world.slot(b).unwrap().update_player(CarStatus::default(), 20_000);

        let active = world.active_players(25_000);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0, c);
        assert_eq!(world.connected_players(), 2);
    }

    #[test]
    fn ticks_move_and_stop_vehicles() {
        let mut world = world();
        let id = world.add_slot("car", "", AiMode::Fixed);
        let slot = world.slot(id).unwrap();
        slot.set_overbooking(2, world.params());
        let states = slot.states();
        lock(&states[0]).teleport(world.map(), world.params(), pid(10), 0, true).unwrap();
        lock(&states[1]).teleport(world.map(), world.params(), pid(11), 0, false).unwrap();

        world.detect_obstacles(100);
        assert_eq!(lock(&states[0]).target_speed(), 0.0);
        world.update(100);
        assert!(lock(&states[0]).position().z > 100.0);
        assert_eq!(world.ai_statuses().len(), 2);
    }

    #[test]
    fn player_offset() {
        let player = PlayerStatus {
            status: CarStatus {
                position: Point3d::new(1.0, 0.0, 1.0),
                velocity: Vector3d::new(0.0, 0.0, 30.0),
                ..Default::default()
            },
            last_active: 0,
            has_sent_first_update: true,
        };
        let pos = offset_position(&player, 100.0);
        assert_eq!(pos, Point3d::new(1.0, 0.0, 101.0));
    }
}
