use crate::config::AiMode;
use crate::debug::{debug_line, debug_sphere};
use crate::error::TrafficError;
use crate::evaluator::JunctionEvaluator;
use crate::map::{PointId, TrafficMap};
use crate::math::Point3d;
use crate::slot::{PlayerStatus, SharedState};
use crate::util::{lock, Millis};
use crate::vehicle::{AiSnapshot, CarStatus};
use crate::world::{offset_position, TrafficWorld};
use crate::{AiParams, SlotId};
use cgmath::prelude::*;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, trace, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// While a spawn point is unsafe, the search moves this many points further on.
const SPAWN_SEARCH_STEP_POINTS: usize = 5;

/// The spawn search gives up after this many steps.
const SPAWN_SEARCH_MAX_STEPS: usize = 20;

/// Overbooking is recomputed at least this often.
const REBALANCE_INTERVAL: Millis = 60_000; // ms

/// A change in a slot's human occupancy, reported by the connection layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SlotEvent {
    /// A human took the slot.
    Connected(SlotId),
    /// The slot's human left.
    Disconnected(SlotId),
    /// The slot's human reported a position.
    PositionUpdate {
        slot: SlotId,
        status: CarStatus,
        timestamp: Millis,
    },
}

/// Decides where AI vehicles appear, and how many each slot owns.
pub struct AiBehavior {
    world: Arc<TrafficWorld>,
    rng: StdRng,
    sender: Sender<SlotEvent>,
    events: Receiver<SlotEvent>,
    /// The current traffic density multiplier.
    density: f64,
    /// When overbooking was last recomputed.
    last_rebalance: Option<Millis>,
    needs_rebalance: bool,
}

impl AiBehavior {
    pub fn new(world: Arc<TrafficWorld>) -> Self {
        let params = world.params();
        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };
        let density = params.traffic_density;
        let (sender, events) = unbounded();
        Self {
            world,
            rng,
            sender,
            events,
            density,
            last_rebalance: None,
            needs_rebalance: true,
        }
    }

    /// A handle for reporting slot events. Events are handled on the next tick.
    pub fn event_sender(&self) -> Sender<SlotEvent> {
        self.sender.clone()
    }

    pub fn world(&self) -> &Arc<TrafficWorld> {
        &self.world
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    /// Overrides the traffic density multiplier.
    pub fn set_traffic_density(&mut self, density: f64) {
        if (density - self.density).abs() > f64::EPSILON {
            self.density = density.max(0.0);
            self.needs_rebalance = true;
        }
    }

    /// Applies the hourly density schedule for the given time of day.
    ///
    /// # Parameters
    /// * `hour` - Fractional hour of the day in `[0, 24)`
    pub fn set_time_of_day(&mut self, hour: f64) {
        let density = self.world.params().density_at(hour);
        self.set_traffic_density(density);
    }

    /// Runs one orchestrator tick: handles slot events, rebalances overbooking
    /// if needed and spawns vehicles near players. Returns the number spawned.
    pub fn tick(&mut self, now: Millis) -> Result<usize, TrafficError> {
        self.drain_events();
        let due = self
            .last_rebalance
            .map_or(true, |last| now.saturating_sub(last) >= REBALANCE_INTERVAL);
        if self.needs_rebalance || due {
            self.adjust_overbooking();
            self.last_rebalance = Some(now);
            self.needs_rebalance = false;
        }
        self.spawn(now)
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            let id = match event {
                SlotEvent::Connected(id) | SlotEvent::Disconnected(id) => id,
                SlotEvent::PositionUpdate { slot, .. } => slot,
            };
            let slot = match self.world.slot(id) {
                Ok(slot) => slot,
                Err(err) => {
                    warn!("Ignoring {:?}: {}", event, err);
                    continue;
                }
            };
            match event {
                SlotEvent::Connected(_) => {
                    if !slot.set_ai_controlled(false) {
                        warn!("Slot {:?} is reserved for the AI", id);
                        continue;
                    }
                    slot.set_player(Some(PlayerStatus::default()));
                    self.needs_rebalance = true;
                }
                SlotEvent::Disconnected(_) => {
                    slot.set_player(None);
                    if slot.ai_mode() != AiMode::None {
                        slot.set_ai_controlled(true);
                    }
                    self.needs_rebalance = true;
                }
                SlotEvent::PositionUpdate {
                    status, timestamp, ..
                } => slot.update_player(status, timestamp),
            }
        }
    }

    /// Recomputes how many states each AI slot owns from the number of
    /// connected players and the traffic density. Returns the new total.
    pub fn adjust_overbooking(&mut self) -> usize {
        let params = self.world.params();
        let slots = self.world.ai_slots().collect::<Vec<_>>();
        if slots.is_empty() {
            debug!("No AI slots, overbooking unchanged");
            return 0;
        }

        let per_player = (params.ai_per_player_target_count as f64 * self.density).round() as usize;
        let players = self.world.connected_players();
        let total = (players * per_player.min(slots.len())).min(params.max_ai_target_count);

        let caps = slots
            .iter()
            .map(|slot| slot.profile().max_overbooking)
            .collect::<Vec<_>>();
        let targets = distribute(total, &caps);
        for (slot, target) in slots.iter().zip(&targets) {
            slot.set_overbooking(*target, params);
        }
        let assigned = targets.iter().sum();
        debug!(
            "Overbooking: {} AI vehicles for {} players over {} slots",
            assigned,
            players,
            slots.len()
        );
        assigned
    }

    /// Spawns AI vehicles near the active players.
    fn spawn(&mut self, now: Millis) -> Result<usize, TrafficError> {
        let world = Arc::clone(&self.world);
        let map = world.map();
        let params = world.params();

        let mut initialized = vec![];
        let mut candidates = vec![];
        for slot in world.ai_slots() {
            slot.remove_unsafe_states(map, params);
            let (placed, waiting) = slot.split_states();
            initialized.extend(placed.into_iter().map(|state| (slot.id(), state)));
            candidates.extend(waiting.into_iter().map(|state| (slot.id(), state)));
        }

        let players = world.active_players(now);
        if players.is_empty() {
            return Ok(0);
        }
        let offsets = players
            .iter()
            .map(|(_, player)| offset_position(player, params.player_position_offset))
            .collect::<Vec<_>>();

        // Distances between every placed state and every player
        let keep_alive = params.player_radius * params.player_radius;
        let mut player_min = vec![f64::INFINITY; players.len()];
        let mut recyclable = vec![];
        for (slot, state) in initialized {
            let (position, protected_until) = {
                let state = lock(&state);
                (state.position(), state.spawn_protection_ends())
            };
            let mut state_min = f64::INFINITY;
            for (offset, player_min) in offsets.iter().zip(player_min.iter_mut()) {
                let dist2 = position.distance2(*offset);
                state_min = state_min.min(dist2);
                *player_min = player_min.min(dist2);
            }
            if state_min > keep_alive && now > protected_until {
                recyclable.push((state_min, slot, state));
            }
        }
        recyclable.sort_by(|a, b| b.0.total_cmp(&a.0));
        candidates.extend(recyclable.into_iter().map(|(_, slot, state)| (slot, state)));

        let mut order = (0..players.len()).collect::<Vec<_>>();
        order.sort_by(|a, b| player_min[*b].total_cmp(&player_min[*a]));

        let mut ai = world.ai_snapshots();
        let player_positions = players
            .iter()
            .map(|(_, player)| player.status.position)
            .collect::<Vec<_>>();

        let mut spawned = 0;
        while !order.is_empty() && !candidates.is_empty() {
            let (player_slot, player) = &players[order.remove(self.pick_player(order.len()))];
            let Some(point) = self.spawn_point(map, params, player, &ai, &player_positions) else {
                trace!("No spawn point found for player slot {:?}", player_slot);
                continue;
            };
            let chosen = candidates.iter().position(|(slot, state)| {
                world
                    .slot(*slot)
                    .is_ok_and(|slot| slot.can_spawn_state(map, params, state, point))
            });
            let Some(index) = chosen else {
                trace!("No AI vehicle may spawn at {}", point);
                continue;
            };
            let (slot, state) = candidates.remove(index);
            let mut state = lock(&state);
            state.teleport(map, params, point, now, true)?;
            ai.push(state.snapshot());
            spawned += 1;
            trace!(
                "Spawned AI vehicle of slot {:?} at {} near player slot {:?}",
                slot,
                point,
                player_slot
            );
            if params.debug_overlay {
                let position = map.point(point).position;
                debug_line("spawn", player.status.position, position);
                debug_sphere("spawn_safety", position, state.safety_distance_squared().sqrt());
            }
        }
        Ok(spawned)
    }

    /// Picks an index into a list of `n` players, favouring the front of the
    /// list: index `i` has weight `n - i`.
    fn pick_player(&mut self, n: usize) -> usize {
        WeightedIndex::new((0..n).map(|i| n - i)).map_or(0, |weights| weights.sample(&mut self.rng))
    }

    /// Finds a point to spawn a vehicle for a player: some way ahead along
    /// the player's direction of travel, clear of other traffic.
    fn spawn_point(
        &mut self,
        map: &TrafficMap,
        params: &AiParams,
        player: &PlayerStatus,
        ai: &[AiSnapshot],
        players: &[Point3d],
    ) -> Option<PointId> {
        let (nearest, dist2) = map.nearest(player.status.position)?;
        if dist2 > params.max_player_distance_to_spline.powi(2) {
            return None;
        }

        let distance = params.spawn_distance_points.sample(&mut self.rng) as isize;
        let forward = map.forward_vector(nearest).dot(player.status.velocity) >= 0.0;
        let direction = if forward { 1 } else { -1 };
        let mut evaluator = JunctionEvaluator::stateless(self.rng.gen());
        let mut point = evaluator.traverse(map, nearest, direction * distance)?;

        let mut steps = 0;
        while !is_position_safe(map, params, point, ai, players) {
            if steps == SPAWN_SEARCH_MAX_STEPS {
                return None;
            }
            point = evaluator.next(map, point, SPAWN_SEARCH_STEP_POINTS)?;
            steps += 1;
        }

        let lanes = map.lanes(point);
        let lane = lanes[self.rng.gen_range(0..lanes.len())];
        map.point(lane).next.map(|_| lane)
    }
}

/// Whether a vehicle may appear at `point` without landing inside another
/// vehicle's safety distance or too close to a player.
fn is_position_safe(
    map: &TrafficMap,
    params: &AiParams,
    point: PointId,
    ai: &[AiSnapshot],
    players: &[Point3d],
) -> bool {
    let position = map.point(point).position;
    let player_dist2 = params.spawn_safety_distance_to_player.powi(2);
    let blocked_by_ai = ai.iter().any(|state| {
        state.position.distance2(position) < state.safety_distance_squared
            && map.is_same_direction(state.current_point, point)
    });
    let blocked_by_player = players
        .iter()
        .any(|player| player.distance2(position) < player_dist2);
    !blocked_by_ai && !blocked_by_player
}

/// Splits `total` as evenly as possible over slots with optional caps.
/// The first slots receive the remainder; whatever a capped slot cannot
/// take is shared among the others.
pub(crate) fn distribute(total: usize, caps: &[Option<usize>]) -> Vec<usize> {
    let mut targets = vec![0; caps.len()];
    let mut open = (0..caps.len())
        .filter(|i| caps[*i] != Some(0))
        .collect::<Vec<_>>();
    let mut remaining = total;
    while remaining > 0 && !open.is_empty() {
        let base = remaining / open.len();
        let rest = remaining % open.len();
        let mut surplus = 0;
        for (k, i) in open.iter().enumerate() {
            let want = base + usize::from(k < rest);
            let room = caps[*i].map_or(usize::MAX, |cap| cap - targets[*i]);
            let give = want.min(room);
            targets[*i] += give;
            surplus += want - give;
        }
        open.retain(|i| caps[*i].map_or(true, |cap| targets[*i] < cap));
        remaining = surplus;
    }
    targets
}
