//! Engine error kinds
//!
//! Validation errors are raised at construction time. Analysis-time
//! insufficiency distinguishes "no data at all" from "not enough data" so
//! callers can tell a broken pipeline apart from a site that simply needs
//! more assessments.

use thiserror::Error;

/// Errors produced by the risk engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    /// An ABC component outside [1,5] or not an integer
    #[error("invalid ABC component {component}: {value} (must be an integer in 1..=5)")]
    InvalidComponent { component: char, value: f64 },

    /// A magnitude outside [3,15] or inconsistent with its components.
    /// Indicates an upstream logic bug rather than bad user input.
    #[error("invalid magnitude {0} (must be A+B+C within 3..=15)")]
    InvalidMagnitude(i64),

    /// Some data exists, but fewer points (or sites) than the operation requires
    #[error("insufficient data: {required} required, {actual} available")]
    InsufficientData { required: usize, actual: usize },

    /// No matching records at all
    #[error("no assessment data")]
    NoData,
}

impl RiskError {
    /// Classify a point count against a minimum, yielding `NoData` for zero
    pub fn for_count(actual: usize, required: usize) -> Option<RiskError> {
        if actual == 0 {
            Some(RiskError::NoData)
        } else if actual < required {
            Some(RiskError::InsufficientData { required, actual })
        } else {
            None
        }
    }
}

pub type Result<T> = std::result::Result<T, RiskError>;
