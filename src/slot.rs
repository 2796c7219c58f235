use crate::config::{AiMode, AiParams, DrivingProfile};
use crate::error::TrafficError;
use crate::map::{PointId, TrafficMap};
use crate::util::{lock, read, write, Millis};
use crate::vehicle::{AiSnapshot, AiState, CarStatus, ObstacleContext};
use crate::SlotId;
use cgmath::prelude::*;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// A vehicle state shared between the simulation activities.
pub type SharedState = Arc<Mutex<AiState>>;

/// What the server knows about the human driving a slot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlayerStatus {
    pub status: CarStatus,
    /// Session time of the last position update.
    pub last_active: Millis,
    pub has_sent_first_update: bool,
}

/// One car slot of the session, with the pool of AI vehicle states it
/// drives while no human occupies it.
pub struct EntrySlot {
    id: SlotId,
    model: String,
    skin: String,
    ai_mode: AiMode,
    profile: DrivingProfile,
    ai_controlled: AtomicBool,
    /// The pool. Structural changes take the write lock.
    states: RwLock<Vec<SharedState>>,
    /// How many states the pool should hold.
    target_overbooking: AtomicUsize,
    player: Mutex<Option<PlayerStatus>>,
    seeds: Mutex<StdRng>,
}

impl EntrySlot {
    /// Creates a slot with an empty pool.
    ///
    /// # Parameters
    /// * `id` - The slot ID
    /// * `model` - The car model
    /// * `skin` - The car skin
    /// * `ai_mode` - Whether and when the AI drives the slot
    /// * `params` - The traffic parameters, including per-model overrides
    /// * `seed` - Seeds the states created for this slot
    pub fn new(
        id: SlotId,
        model: &str,
        skin: &str,
        ai_mode: AiMode,
        params: &AiParams,
        seed: u64,
    ) -> Self {
        Self {
            id,
            model: model.to_string(),
            skin: skin.to_string(),
            ai_mode,
            profile: params.profile_for(model, skin),
            ai_controlled: AtomicBool::new(ai_mode != AiMode::None),
            states: RwLock::new(vec![]),
            target_overbooking: AtomicUsize::new(0),
            player: Mutex::new(None),
            seeds: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn skin(&self) -> &str {
        &self.skin
    }

    pub fn ai_mode(&self) -> AiMode {
        self.ai_mode
    }

    /// The driving profile resolved for this slot's model and skin.
    pub fn profile(&self) -> &DrivingProfile {
        &self.profile
    }

    /// Whether the AI currently drives this slot.
    pub fn is_ai_controlled(&self) -> bool {
        self.ai_controlled.load(Ordering::Acquire)
    }

    /// Hands the slot to the AI or to a human. Handing it to a human takes
    /// every AI vehicle of the slot off the road.
    /// Returns false if the slot's AI mode forbids the change.
    pub fn set_ai_controlled(&self, ai: bool) -> bool {
        let allowed = match self.ai_mode {
            AiMode::None => !ai,
            AiMode::Auto => true,
            AiMode::Fixed => ai,
        };
        if !allowed {
            return false;
        }
        if self.ai_controlled.swap(ai, Ordering::AcqRel) != ai {
            debug!(
                "Slot {:?} ({}) is now {} controlled",
                self.id,
                self.model,
                if ai { "AI" } else { "player" }
            );
            if !ai {
                self.despawn_all();
            }
        }
        true
    }

    /// The human driving the slot, if any.
    pub fn player(&self) -> Option<PlayerStatus> {
        *lock(&self.player)
    }

    pub fn set_player(&self, player: Option<PlayerStatus>) {
        *lock(&self.player) = player;
    }

    /// Records a position update from the slot's human driver.
    pub fn update_player(&self, status: CarStatus, now: Millis) {
        let mut player = lock(&self.player);
        let player = player.get_or_insert_with(PlayerStatus::default);
        player.status = status;
        player.last_active = now;
        player.has_sent_first_update = true;
    }

    /// How many states the pool should hold.
    pub fn target_overbooking(&self) -> usize {
        self.target_overbooking.load(Ordering::Acquire)
    }

    /// The number of states currently in the pool.
    pub fn len(&self) -> usize {
        read(&self.states).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.states).is_empty()
    }

    /// Sets how many states the pool should hold. The pool grows at once;
    /// excess states are removed as they come up for respawning.
    ///
    /// # Parameters
    /// * `count` - The target number of states
    /// * `params` - The traffic parameters used to create new states
    pub fn set_overbooking(&self, count: usize, params: &AiParams) {
        let mut states = write(&self.states);
        self.target_overbooking.store(count, Ordering::Release);
        if states.len() < count {
            let mut seeds = lock(&self.seeds);
            let new = count - states.len();
            states.extend((0..new).map(|_| {
                let state = AiState::new(self.id, self.profile, params, seeds.gen());
                Arc::new(Mutex::new(state))
            }));
        }
        debug!(
            "Slot {:?} overbooking set to {} ({} states)",
            self.id,
            count,
            states.len()
        );
    }

    /// Clones the list of states.
    pub fn states(&self) -> Vec<SharedState> {
        read(&self.states).clone()
    }

    /// Splits the pool into initialized and uninitialized states.
    pub fn split_states(&self) -> (Vec<SharedState>, Vec<SharedState>) {
        read(&self.states)
            .iter()
            .cloned()
            .partition(|state| lock(state).is_initialized())
    }

    /// The networking snapshots of all initialized states.
    pub fn statuses(&self) -> Vec<CarStatus> {
        read(&self.states)
            .iter()
            .filter_map(|state| {
                let state = lock(state);
                state.is_initialized().then(|| *state.status())
            })
            .collect()
    }

    /// Copies of all initialized states for obstacle detection.
    pub fn snapshots(&self) -> Vec<AiSnapshot> {
        read(&self.states)
            .iter()
            .filter_map(|state| {
                let state = lock(state);
                state.is_initialized().then(|| state.snapshot())
            })
            .collect()
    }

    /// Takes every state off the road.
    pub fn despawn_all(&self) {
        for state in read(&self.states).iter() {
            lock(state).despawn();
        }
    }

    /// Advances every state of the pool.
    /// All states are updated even if some fail; the first error is returned.
    pub fn update(&self, map: &TrafficMap, params: &AiParams, now: Millis) -> Result<(), TrafficError> {
        let mut result = Ok(());
        for state in read(&self.states).iter() {
            let outcome = lock(state).update(map, params, now);
            if result.is_ok() {
                result = outcome;
            }
        }
        result
    }

    /// Runs obstacle detection for every state of the pool.
    pub fn detect_obstacles(&self, map: &TrafficMap, params: &AiParams, ctx: &ObstacleContext, now: Millis) {
        for state in read(&self.states).iter() {
            lock(state).detect_obstacles(map, params, ctx, now);
        }
    }

    /// Whether `state` may spawn at `point`.
    ///
    /// A state at or beyond the target overbooking is despawned and removed
    /// from the pool instead. The caller must not hold the state's lock.
    pub fn can_spawn_state(
        &self,
        map: &TrafficMap,
        params: &AiParams,
        state: &SharedState,
        point: PointId,
    ) -> bool {
        let index = read(&self.states).iter().position(|s| Arc::ptr_eq(s, state));
        let Some(index) = index else {
            return false;
        };
        if index >= self.target_overbooking() {
            let mut states = write(&self.states);
            // The pool may have changed while no lock was held
            match states.iter().position(|s| Arc::ptr_eq(s, state)) {
                Some(index) if index >= self.target_overbooking() => {
                    lock(&states[index]).despawn();
                    states.remove(index);
                    debug!("Removed surplus state from slot {:?}", self.id);
                    return false;
                }
                Some(_) => {}
                None => return false,
            }
        }

        let position = map.point(point).position;
        let min_dist2 = params.state_spawn_distance * params.state_spawn_distance;
        let too_close = read(&self.states).iter().any(|other| {
            if Arc::ptr_eq(other, state) {
                return false;
            }
            let other = lock(other);
            other.is_initialized()
                && other.position().distance2(position) < min_dist2
                && map.is_same_direction(other.current_point(), point)
        });
        if too_close {
            return false;
        }

        let lanes = map.lanes(point);
        let lane = lanes.iter().position(|id| *id == point).unwrap_or(0);
        self.profile.allowed_lanes.allows(lane, lanes.len())
    }

    /// Despawns one of every pair of initialized states that are closer than
    /// `min_state_distance` and travel the same way. Returns the number despawned.
    pub fn remove_unsafe_states(&self, map: &TrafficMap, params: &AiParams) -> usize {
        let states = read(&self.states);
        let mut placed = states
            .iter()
            .map(|state| {
                let state = lock(state);
                state
                    .is_initialized()
                    .then(|| (state.position(), state.current_point()))
            })
            .collect::<SmallVec<[_; 8]>>();

        let min_dist2 = params.min_state_distance * params.min_state_distance;
        let mut removed = 0;
        for i in 0..placed.len() {
            let Some((pos_a, point_a)) = placed[i] else {
                continue;
            };
            for j in (i + 1)..placed.len() {
                let Some((pos_b, point_b)) = placed[j] else {
                    continue;
                };
                if pos_a.distance2(pos_b) < min_dist2 && map.is_same_direction(point_a, point_b) {
                    lock(&states[j]).despawn();
                    placed[j] = None;
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            debug!("Despawned {} unsafe states of slot {:?}", removed, self.id);
        }
        removed
    }
}
