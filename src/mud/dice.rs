//! Dice rolling seam for the rules engine.
//!
//! Every random decision in combat goes through [`Roller`] so that a round can be
//! replayed with a scripted sequence in tests and driven by a real RNG in play.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait Roller: Send {
    /// Roll an integer in `low..=high`. Implementations return `low` when the range is empty.
    fn roll(&mut self, low: i32, high: i32) -> i32;

    /// Roll a d100 and succeed at or below `percent`.
    fn chance(&mut self, percent: i32) -> bool {
        self.roll(1, 100) <= percent
    }

    /// Pick a shuffled order for `len` elements.
    fn shuffled_indices(&mut self, len: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..len).collect();
        // Fisher-Yates over our own roll so scripted rollers stay in control.
        for i in (1..len).rev() {
            let j = self.roll(0, i as i32) as usize;
            order.swap(i, j.min(i));
        }
        order
    }
}

/// Production roller backed by `StdRng`.
pub struct RandRoller {
    rng: StdRng,
}

impl RandRoller {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Roller for RandRoller {
    fn roll(&mut self, low: i32, high: i32) -> i32 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..=high)
    }
}

/// Replays a fixed list of results, then falls back to a constant.
///
/// Each scripted value is clamped into the requested range so a script written for
/// one die can't produce an impossible face on another.
#[derive(Debug, Clone)]
pub struct ScriptedRolls {
    queue: VecDeque<i32>,
    fallback: i32,
    consumed: usize,
}

impl ScriptedRolls {
    pub fn new(rolls: impl IntoIterator<Item = i32>) -> Self {
        Self {
            queue: rolls.into_iter().collect(),
            fallback: 100,
            consumed: 0,
        }
    }

    /// Value returned (clamped) once the script runs dry.
    pub fn with_fallback(mut self, fallback: i32) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

impl Roller for ScriptedRolls {
    fn roll(&mut self, low: i32, high: i32) -> i32 {
        if high <= low {
            return low;
        }
        self.consumed += 1;
        let value = self.queue.pop_front().unwrap_or(self.fallback);
        value.clamp(low, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_rolls_replay_then_fall_back() {
        let mut dice = ScriptedRolls::new([3, 250, -4]).with_fallback(7);
        assert_eq!(dice.roll(1, 4), 3);
        assert_eq!(dice.roll(1, 100), 100);
        assert_eq!(dice.roll(1, 100), 1);
        assert_eq!(dice.roll(1, 10), 7);
        assert_eq!(dice.roll(5, 5), 5);
        assert_eq!(dice.consumed(), 4);
        assert_eq!(dice.remaining(), 0);
    }

    #[test]
    fn rand_roller_stays_in_range() {
        let mut dice = RandRoller::seeded(42);
        for _ in 0..500 {
            let v = dice.roll(2, 5);
            assert!((2..=5).contains(&v));
        }
        assert_eq!(dice.roll(9, 9), 9);
        assert_eq!(dice.roll(9, 3), 9);
    }

    #[test]
    fn shuffled_indices_is_a_permutation() {
        let mut dice = RandRoller::seeded(7);
        let mut order = dice.shuffled_indices(6);
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
        assert!(dice.shuffled_indices(0).is_empty());
    }
}
