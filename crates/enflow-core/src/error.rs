//! Unified error types for the enflow crates
//!
//! This module provides a common error type [`EnflowError`] used across
//! topology construction, component validation and model assembly.
//! Domain-specific failures are represented as variants so callers can
//! distinguish configuration mistakes from solver-side failures at API
//! boundaries.

use thiserror::Error;

/// Unified error type for all enflow operations.
#[derive(Error, Debug)]
pub enum EnflowError {
    /// Contradictory component configuration detected at construction time
    /// (e.g. a fixed nominal size together with an investment descriptor).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parameter-consistency errors raised while deriving coefficients.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An investment-sized element lacks its per-unit cost.
    #[error("Missing economic data: {0}")]
    MissingCost(String),

    /// Malformed topology (missing edges, unconnected buses, etc.)
    #[error("Network error: {0}")]
    Network(String),

    /// Solver failures, passed through from the backend unmodified.
    #[error("Solver error: {0}")]
    Solver(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using EnflowError.
pub type EnflowResult<T> = Result<T, EnflowError>;

// Conversion from anyhow::Error
impl From<anyhow::Error> for EnflowError {
    fn from(err: anyhow::Error) -> Self {
        EnflowError::Other(err.to_string())
    }
}

// Conversion from string-like types for convenience
impl From<String> for EnflowError {
    fn from(s: String) -> Self {
        EnflowError::Other(s)
    }
}

impl From<&str> for EnflowError {
    fn from(s: &str) -> Self {
        EnflowError::Other(s.to_string())
    }
}
