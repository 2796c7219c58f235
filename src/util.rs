//! Miscellaneous utility structs and functions.

use log::warn;
use rand::distributions::uniform::SampleUniform;
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A timestamp or duration in milliseconds of session time.
pub type Millis = u64;

/// An interval on the real number line.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    /// Creates a new interval.
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: PartialOrd> Interval<T> {
    /// Returns true if this interval contains the value.
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }

    /// Returns true if `min` does not exceed `max`.
    pub fn is_ordered(&self) -> bool {
        self.min <= self.max
    }
}

impl<T: std::ops::Sub<T, Output = T> + Copy> Interval<T> {
    /// Gets the magnitude of the interval.
    pub fn length(&self) -> T {
        self.max - self.min
    }
}

impl<T: SampleUniform + PartialOrd + Copy> Interval<T> {
    /// Draws a uniformly distributed value from the closed interval.
    pub fn sample(&self, rng: &mut impl Rng) -> T {
        if self.min < self.max {
            rng.gen_range(self.min..=self.max)
        } else {
            self.min
        }
    }
}

impl<T: Debug> Debug for Interval<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interval({:?}, {:?})", &self.min, &self.max)
    }
}

/// Acquires a shared lock, recovering the data if a previous holder panicked.
pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|err| {
        warn!("Recovered poisoned read lock");
        PoisonError::into_inner(err)
    })
}

/// Acquires an exclusive lock, recovering the data if a previous holder panicked.
pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|err| {
        warn!("Recovered poisoned write lock");
        PoisonError::into_inner(err)
    })
}

/// Acquires a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| {
        warn!("Recovered poisoned mutex");
        PoisonError::into_inner(err)
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn sample_stays_inside() {
        let mut rng = rand::rngs::StdRng::from_seed(*b"Vegemite sandwhich is not fun...");
        let range = Interval::new(4_000u64, 8_000);
        for _ in 0..1000 {
            assert!(range.contains(range.sample(&mut rng)));
        }
        let point = Interval::new(2.5, 2.5);
        assert_eq!(point.sample(&mut rng), 2.5);
    }

    #[test]
    fn ordering() {
        assert!(Interval::new(1, 2).is_ordered());
        assert!(!Interval::new(3.0, 2.0).is_ordered());
        assert_eq!(Interval::new(10, 25).length(), 15);
    }
}
