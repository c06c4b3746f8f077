//! Weighted random instance selection
//!
//! Selection probability is proportional to weight. Weights never drop below
//! [`MIN_WEIGHT`](super::record::MIN_WEIGHT), so an instance that has been
//! failing stays reachable, just less often, and recovers on its own once it
//! starts succeeding again.

use rand::Rng;

use super::record::ServiceRecord;

/// Picks one record out of a healthy set
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedSelector;

impl WeightedSelector {
    pub fn new() -> Self {
        Self
    }

    /// Pick a record with the thread-local RNG
    pub fn select<'a>(&self, candidates: &'a [ServiceRecord]) -> Option<&'a ServiceRecord> {
        self.select_with(candidates, &mut rand::thread_rng())
    }

    /// Pick a record with the given RNG.
    ///
    /// Returns `None` only for an empty slice. A non-positive weight total
    /// falls back to the first candidate.
    pub fn select_with<'a, R: Rng + ?Sized>(
        &self,
        candidates: &'a [ServiceRecord],
        rng: &mut R,
    ) -> Option<&'a ServiceRecord> {
        let first = candidates.first()?;

        let total: f64 = candidates.iter().map(|r| r.weight).sum();
        if total.is_nan() || total <= 0.0 {
            return Some(first);
        }

        let target = rng.gen::<f64>() * total;
        let mut running = 0.0;
        for candidate in candidates {
            running += candidate.weight;
            if running >= target {
                return Some(candidate);
            }
        }

        // Accumulated rounding left the running sum just short of the target
        candidates.last()
    }
}
