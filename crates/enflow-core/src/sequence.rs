//! Scalar-or-series parameter broadcasting.
//!
//! Most component parameters (efficiencies, losses, fraction limits) can be
//! given either per timestep or as a single value that holds over the whole
//! horizon. [`Sequence`] unifies the two: an explicit series is read by
//! index, a constant is a pure function of the index and never runs out of
//! values.

use serde::{Deserialize, Serialize};

/// A time-indexed parameter series.
///
/// `Fixed` holds explicit per-timestep values whose insertion order is the
/// time order. `Constant` broadcasts one value over an arbitrary horizon;
/// reading it never fails, at any index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Sequence {
    /// Explicit per-timestep values.
    Fixed(Vec<f64>),
    /// One value broadcast over an unknown-in-advance horizon.
    Constant(f64),
}

impl Sequence {
    /// Value at timestep `t`.
    ///
    /// Total for a `Constant`; panics for a `Fixed` series read past its
    /// end, which is a caller bug (series shorter than the model horizon).
    pub fn value(&self, t: usize) -> f64 {
        match self {
            Sequence::Fixed(values) => values[t],
            Sequence::Constant(value) => *value,
        }
    }

    /// Length of an explicit series, `None` for an unbounded constant.
    pub fn len(&self) -> Option<usize> {
        match self {
            Sequence::Fixed(values) => Some(values.len()),
            Sequence::Constant(_) => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Sequence::Constant(_))
    }

    /// Whether the series provides values for a horizon of `n` steps.
    pub fn covers(&self, n: usize) -> bool {
        match self {
            Sequence::Fixed(values) => values.len() >= n,
            Sequence::Constant(_) => true,
        }
    }

    /// Sum of the first `n` values.
    pub fn sum(&self, n: usize) -> f64 {
        (0..n).map(|t| self.value(t)).sum()
    }
}

impl From<f64> for Sequence {
    fn from(value: f64) -> Self {
        Sequence::Constant(value)
    }
}

impl From<Vec<f64>> for Sequence {
    fn from(values: Vec<f64>) -> Self {
        Sequence::Fixed(values)
    }
}

impl From<&[f64]> for Sequence {
    fn from(values: &[f64]) -> Self {
        Sequence::Fixed(values.to_vec())
    }
}
