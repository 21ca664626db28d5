//! Random-walk price source.

use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use solefeed_core::{PriceAlert, PriceSourceKind, MAX_PRICE_CENTS};

use super::{PriceSource, PriceSourceError};

/// Smallest move, in percent.
pub const MIN_CHANGE_PERCENT: i64 = 5;

/// Largest move, in percent.
pub const MAX_CHANGE_PERCENT: i64 = 15;

/// Probability that a move is downward.
pub const DECREASE_PROBABILITY: f64 = 0.6;

/// Simulated prices never go below $10.00.
pub const MIN_PRICE_CENTS: i64 = 1000;

/// Moves the last known price by a random 5-15 %, more often down than up,
/// staying within `MIN_PRICE_CENTS..=MAX_PRICE_CENTS`.
pub struct SimulatedPriceSource {
    rng: Mutex<StdRng>,
}

impl SimulatedPriceSource {
    /// Seed from the OS.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sequence, for tests.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn next_price(&self, current_cents: i64) -> i64 {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let percent = rng.gen_range(MIN_CHANGE_PERCENT..=MAX_CHANGE_PERCENT);
        let current = i128::from(current_cents);
        let delta = current * i128::from(percent) / 100;

        let next = if rng.gen_bool(DECREASE_PROBABILITY) {
            current - delta
        } else {
            current + delta
        };
        let next = next.clamp(i128::from(MIN_PRICE_CENTS), i128::from(MAX_PRICE_CENTS));
        i64::try_from(next).unwrap_or(MAX_PRICE_CENTS)
    }
}

impl Default for SimulatedPriceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceSource for SimulatedPriceSource {
    fn kind(&self) -> PriceSourceKind {
        PriceSourceKind::Simulated
    }

    async fn quote(&self, alert: &PriceAlert) -> Result<Option<i64>, PriceSourceError> {
        Ok(Some(self.next_price(alert.current_price_cents)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_stay_within_band() {
        let source = SimulatedPriceSource::seeded(7);
        for _ in 0..500 {
            let next = source.next_price(10_000);
            let delta = (next - 10_000).abs();
            assert!((500..=1500).contains(&delta), "delta {delta} out of band");
        }
    }

    #[test]
    fn decreases_are_more_common() {
        let source = SimulatedPriceSource::seeded(42);
        let downs = (0..2000).filter(|_| source.next_price(10_000) < 10_000).count();
        // 60% expected; allow generous slack.
        assert!((1000..1400).contains(&downs), "downs = {downs}");
    }

    #[test]
    fn floored_at_minimum() {
        let source = SimulatedPriceSource::seeded(1);
        for _ in 0..100 {
            assert!(source.next_price(1000) >= MIN_PRICE_CENTS);
        }
    }

    #[test]
    fn huge_stored_price_is_clamped() {
        let source = SimulatedPriceSource::seeded(3);
        for _ in 0..100 {
            let next = source.next_price(i64::MAX / 4);
            assert!((MIN_PRICE_CENTS..=MAX_PRICE_CENTS).contains(&next));
        }
    }
}
