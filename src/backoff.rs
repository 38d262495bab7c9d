//! Pauses between failed lock attempts.
//!
//! Two workers that fail at the same moment and retry after the same pause
//! can keep colliding forever (livelock). `Jitter` breaks the symmetry with a
//! random spin count; `Yield` is the plain cooperative version.

use rand::rngs::ThreadRng;
use rand::Rng;
use serde::Deserialize;
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Give up the time slice and nothing else.
    Yield,
    /// Exponential spin, then yield (crossbeam's `Backoff::snooze`).
    Snooze,
    /// Random number of spin hints in `0..=max_spins`, then yield.
    Jitter { max_spins: u32 },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Jitter { max_spins: 64 }
    }
}

impl BackoffStrategy {
    /// Per-transfer backoff state. Create one for each transfer call.
    pub fn start(self) -> Backoff {
        Backoff {
            strategy: self,
            snooze: crossbeam::utils::Backoff::new(),
            rng: None,
        }
    }
}

pub struct Backoff {
    strategy: BackoffStrategy,
    snooze: crossbeam::utils::Backoff,
    rng: Option<ThreadRng>,
}

impl Backoff {
    pub fn pause(&mut self) {
        match self.strategy {
            BackoffStrategy::Yield => thread::yield_now(),
            BackoffStrategy::Snooze => self.snooze.snooze(),
            BackoffStrategy::Jitter { max_spins } => {
                let spins = self
                    .rng
                    .get_or_insert_with(rand::thread_rng)
                    .gen_range(0..=max_spins);
                for _ in 0..spins {
                    std::hint::spin_loop();
                }
                thread::yield_now();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        backoff: BackoffStrategy,
    }

    #[test]
    fn test_default_is_randomized() {
        assert!(matches!(
            BackoffStrategy::default(),
            BackoffStrategy::Jitter { .. }
        ));
    }

    #[test]
    fn test_parse_from_toml() {
        let parsed: Wrapper = toml::from_str("backoff = { kind = \"yield\" }").unwrap();
        assert_eq!(parsed.backoff, BackoffStrategy::Yield);

        let parsed: Wrapper =
            toml::from_str("[backoff]\nkind = \"jitter\"\nmax_spins = 8\n").unwrap();
        assert_eq!(parsed.backoff, BackoffStrategy::Jitter { max_spins: 8 });
    }

    #[test]
    fn test_every_strategy_returns() {
        for strategy in [
            BackoffStrategy::Yield,
            BackoffStrategy::Snooze,
            BackoffStrategy::Jitter { max_spins: 0 },
            BackoffStrategy::Jitter { max_spins: 16 },
        ] {
            let mut backoff = strategy.start();
            for _ in 0..20 {
                backoff.pause();
            }
        }
    }
}
