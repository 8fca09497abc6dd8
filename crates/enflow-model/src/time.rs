//! Time-index bookkeeping for operational models.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// An ordered, zero-based set of timesteps with a fixed duration per step.
///
/// `previous(0)` wraps to the last timestep, which makes storage levels
/// cyclic across the horizon by default: the end-of-horizon level feeds the
/// balance of step 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeIndex {
    n_steps: usize,
    /// Duration of one step in hours.
    timeincrement: f64,
}

impl TimeIndex {
    pub fn new(n_steps: usize, timeincrement_hours: f64) -> Self {
        assert!(n_steps > 0, "a time index needs at least one step");
        Self {
            n_steps,
            timeincrement: timeincrement_hours,
        }
    }

    /// Build a time index from a step frequency.
    pub fn with_frequency(n_steps: usize, frequency: Duration) -> Self {
        Self::new(n_steps, frequency.num_seconds() as f64 / 3600.0)
    }

    pub fn len(&self) -> usize {
        self.n_steps
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn steps(&self) -> std::ops::Range<usize> {
        0..self.n_steps
    }

    pub fn last(&self) -> usize {
        self.n_steps - 1
    }

    /// The timestep before `t`, wrapping step 0 to the last step.
    pub fn previous(&self, t: usize) -> usize {
        if t == 0 {
            self.n_steps - 1
        } else {
            t - 1
        }
    }

    /// Duration of one step in hours.
    pub fn timeincrement(&self) -> f64 {
        self.timeincrement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_wraps_to_last_step() {
        let time = TimeIndex::new(3, 1.0);
        assert_eq!(time.previous(0), 2);
        assert_eq!(time.previous(1), 0);
        assert_eq!(time.previous(2), 1);
    }

    #[test]
    fn frequency_converts_to_hours() {
        let time = TimeIndex::with_frequency(24, Duration::minutes(15));
        assert_eq!(time.len(), 24);
        assert!((time.timeincrement() - 0.25).abs() < 1e-12);
    }

    #[test]
    #[should_panic]
    fn empty_horizon_is_rejected() {
        TimeIndex::new(0, 1.0);
    }
}
