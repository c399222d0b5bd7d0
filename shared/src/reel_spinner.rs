use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::game_definition::{GameDefinition, SymbolId};

/// `outcome[reel][row]`, `rows_per_reel` symbols per reel with row 0 as the buffer row.
pub type ReelOutcome = Vec<Vec<SymbolId>>;

/// Source of reel outcomes. Implementations hold no memory of previous spins.
pub trait ReelSpinner: Send + Sync {
    fn spin(&self, def: &GameDefinition) -> ReelOutcome;
}

/// Draws every cell independently and uniformly from `1..=symbols_count`.
pub fn spin_with<R: Rng + ?Sized>(def: &GameDefinition, rng: &mut R) -> ReelOutcome {
    let rows = def.rows_per_reel();
    let symbols = def.symbols_count();
    (0..def.reels_count())
        .map(|_| (0..rows).map(|_| rng.gen_range(1..=symbols)).collect())
        .collect()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngSpinner;

impl ReelSpinner for ThreadRngSpinner {
    fn spin(&self, def: &GameDefinition) -> ReelOutcome {
        spin_with(def, &mut rand::thread_rng())
    }
}

/// Reproducible spinner for replaying a session from a known seed.
pub struct SeededSpinner {
    rng: Mutex<StdRng>,
}

impl SeededSpinner {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl ReelSpinner for SeededSpinner {
    fn spin(&self, def: &GameDefinition) -> ReelOutcome {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        spin_with(def, &mut *rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::GameRegistry;

    #[test]
    fn test_outcome_shape_and_symbol_range() {
        let registry = GameRegistry::builtin().unwrap();
        let spinner = ThreadRngSpinner;
        for def in registry.iter() {
            for _ in 0..200 {
                let outcome = spinner.spin(def);
                assert_eq!(outcome.len(), def.reels_count());
                for reel in &outcome {
                    assert_eq!(reel.len(), def.window_height() + 1);
                    assert!(reel.iter().all(|&s| (1..=def.symbols_count()).contains(&s)));
                }
            }
        }
    }

    #[test]
    fn test_seeded_spinner_is_repeatable() {
        let registry = GameRegistry::builtin().unwrap();
        let def = registry.get("rock-climber").unwrap();
        let first = SeededSpinner::new(42);
        let second = SeededSpinner::new(42);
        for _ in 0..10 {
            assert_eq!(first.spin(&def), second.spin(&def));
        }
    }

    #[test]
    fn test_every_symbol_is_drawn() {
        let registry = GameRegistry::builtin().unwrap();
        let def = registry.get("egyptian-treasures").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = vec![false; def.symbols_count() as usize + 1];
        for _ in 0..100 {
            for reel in spin_with(&def, &mut rng) {
                for symbol in reel {
                    seen[symbol as usize] = true;
                }
            }
        }
        assert!(!seen[0]);
        assert!(seen[1..].iter().all(|&s| s));
    }
}
