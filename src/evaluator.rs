use crate::map::{JunctionId, PointId, TrafficMap};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Walks the road graph on behalf of a single caller, deciding at random
/// whether to take each junction it meets.
///
/// Decisions are remembered, so a caller that walks forward and then back
/// again retraces its own route, and two queries about the same fork agree.
/// Separate evaluators decide independently.
#[derive(Clone, Debug)]
pub struct JunctionEvaluator {
    /// Whether each junction seen so far is taken.
    decisions: HashMap<JunctionId, bool>,
    /// Whether decisions are remembered at all.
    memoize: bool,
    rng: StdRng,
}

impl JunctionEvaluator {
    /// Creates an evaluator that remembers its junction decisions.
    pub fn new(seed: u64) -> Self {
        Self {
            decisions: HashMap::new(),
            memoize: true,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates an evaluator for one-off queries, which decides afresh every
    /// time it meets a junction.
    pub fn stateless(seed: u64) -> Self {
        Self {
            memoize: false,
            ..Self::new(seed)
        }
    }

    /// Forgets all junction decisions.
    pub fn clear(&mut self) {
        self.decisions.clear();
    }

    /// Whether the walk takes the given junction, deciding it now if necessary.
    pub fn will_take_junction(&mut self, map: &TrafficMap, junction: JunctionId) -> bool {
        if let Some(taken) = self.decisions.get(&junction) {
            return *taken;
        }
        let probability = map.junction(junction).probability.clamp(0.0, 1.0);
        let taken = self.rng.gen_bool(probability);
        self.record(junction, taken);
        taken
    }

    /// Steps one point forward, or returns `None` at a dead end.
    pub fn try_next(&mut self, map: &TrafficMap, id: PointId) -> Option<PointId> {
        let point = map.point(id);
        if let Some(junction) = point.junction_start {
            // A junction leaving the end of a chain is the only way on
            if point.next.is_none() || self.will_take_junction(map, junction) {
                self.record(junction, true);
                return Some(map.junction(junction).end);
            }
        }
        let next = point.next?;
        // Arriving along the chain means any junction ending here was not taken,
        // unless it was already decided
        if let Some(junction) = map.point(next).junction_end {
            self.infer(junction, false);
        }
        Some(next)
    }

    /// Steps one point backward, or returns `None` at the start of a chain.
    pub fn try_previous(&mut self, map: &TrafficMap, id: PointId) -> Option<PointId> {
        let point = map.point(id);
        if let Some(junction) = point.junction_end {
            if point.previous.is_none() || self.will_take_junction(map, junction) {
                self.record(junction, true);
                return Some(map.junction(junction).start);
            }
        }
        let previous = point.previous?;
        if let Some(junction) = map.point(previous).junction_start {
            self.infer(junction, false);
        }
        Some(previous)
    }

    /// Walks `count` points forward.
    ///
    /// # Parameters
    /// * `map` - The road graph
    /// * `id` - The starting point
    /// * `count` - The number of points to advance
    pub fn next(&mut self, map: &TrafficMap, id: PointId, count: usize) -> Option<PointId> {
        (0..count).try_fold(id, |id, _| self.try_next(map, id))
    }

    /// Walks `count` points backward.
    pub fn previous(&mut self, map: &TrafficMap, id: PointId, count: usize) -> Option<PointId> {
        (0..count).try_fold(id, |id, _| self.try_previous(map, id))
    }

    /// Walks forward for a positive `count` and backward for a negative one.
    pub fn traverse(&mut self, map: &TrafficMap, id: PointId, count: isize) -> Option<PointId> {
        if count >= 0 {
            self.next(map, id, count.unsigned_abs())
        } else {
            self.previous(map, id, count.unsigned_abs())
        }
    }

    fn record(&mut self, junction: JunctionId, taken: bool) {
        if self.memoize {
            self.decisions.insert(junction, taken);
        }
    }

    /// Records a decision implied by the route, keeping any earlier one.
    fn infer(&mut self, junction: JunctionId, taken: bool) {
        if self.memoize {
            self.decisions.entry(junction).or_insert(taken);
        }
    }
}
