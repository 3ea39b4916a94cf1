//! ABC-scale risk scoring
//!
//! Global invariants enforced:
//! - Deterministic, pure risk calculations
//! - Priority bands partition the magnitude range [3,15] with no gaps
//! - Uncertainty adjustment is monotonic and saturates at the top band

use crate::assessment::AbcScore;
use crate::error::{Result, RiskError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Smallest valid magnitude (1+1+1)
pub const MIN_MAGNITUDE: u8 = 3;

/// Largest valid magnitude (5+5+5)
pub const MAX_MAGNITUDE: u8 = 15;

/// Inclusive lower bounds of each band above `low`
const MEDIUM_HIGH_FLOOR: u8 = 4;
const HIGH_FLOOR: u8 = 7;
const VERY_HIGH_FLOOR: u8 = 10;
const EXTREMELY_HIGH_FLOOR: u8 = 13;

/// Priority classification, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Low,
    MediumHigh,
    High,
    VeryHigh,
    ExtremelyHigh,
}

impl Priority {
    /// All priorities in ascending order
    pub const ALL: [Priority; 5] = [
        Priority::Low,
        Priority::MediumHigh,
        Priority::High,
        Priority::VeryHigh,
        Priority::ExtremelyHigh,
    ];

    /// Ordinal weight: low=1 … extremely-high=5
    pub fn weight(self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::MediumHigh => 2,
            Priority::High => 3,
            Priority::VeryHigh => 4,
            Priority::ExtremelyHigh => 5,
        }
    }

    /// Inverse of [`Priority::weight`], saturating at both ends
    pub fn from_weight(weight: u8) -> Priority {
        match weight {
            0 | 1 => Priority::Low,
            2 => Priority::MediumHigh,
            3 => Priority::High,
            4 => Priority::VeryHigh,
            _ => Priority::ExtremelyHigh,
        }
    }

    /// Move `steps` bands toward more urgent, capped at extremely-high
    pub fn escalate(self, steps: u8) -> Priority {
        Priority::from_weight(self.weight().saturating_add(steps))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::MediumHigh => "medium-high",
            Priority::High => "high",
            Priority::VeryHigh => "very-high",
            Priority::ExtremelyHigh => "extremely-high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assessor confidence attached to an assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UncertaintyLevel {
    Low,
    Medium,
    High,
}

impl UncertaintyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UncertaintyLevel::Low => "low",
            UncertaintyLevel::Medium => "medium",
            UncertaintyLevel::High => "high",
        }
    }
}

impl FromStr for UncertaintyLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(UncertaintyLevel::Low),
            "medium" => Ok(UncertaintyLevel::Medium),
            "high" => Ok(UncertaintyLevel::High),
            other => Err(format!("unknown uncertainty level: {}", other)),
        }
    }
}

/// How uncertainty raises a priority.
///
/// Two policies are in use and they disagree for `medium` uncertainty, so
/// there is deliberately no default: the caller names one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EscalationPolicy {
    /// One band up, only for `high` uncertainty
    HighUncertaintyStep,
    /// Full uncertainty × priority matrix; `medium` also escalates the lower bands
    UncertaintyMatrix,
}

impl EscalationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationPolicy::HighUncertaintyStep => "high-uncertainty-step",
            EscalationPolicy::UncertaintyMatrix => "uncertainty-matrix",
        }
    }
}

impl FromStr for EscalationPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "high-uncertainty-step" => Ok(EscalationPolicy::HighUncertaintyStep),
            "uncertainty-matrix" => Ok(EscalationPolicy::UncertaintyMatrix),
            other => Err(format!("unknown escalation policy: {}", other)),
        }
    }
}

/// Complete score for one set of ABC inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RiskScore {
    pub magnitude: u8,
    pub base_priority: Priority,
    pub adjusted_priority: Priority,
}

fn check_component(component: char, value: i32) -> Result<u8> {
    if (1..=5).contains(&value) {
        Ok(value as u8)
    } else {
        Err(RiskError::InvalidComponent {
            component,
            value: f64::from(value),
        })
    }
}

/// Magnitude = A + B + C, each component in [1,5]
pub fn magnitude(a: i32, b: i32, c: i32) -> Result<u8> {
    Ok(check_component('A', a)? + check_component('B', b)? + check_component('C', c)?)
}

/// Reject magnitudes outside [3,15]
pub fn check_magnitude(magnitude: i64) -> Result<u8> {
    if (i64::from(MIN_MAGNITUDE)..=i64::from(MAX_MAGNITUDE)).contains(&magnitude) {
        Ok(magnitude as u8)
    } else {
        Err(RiskError::InvalidMagnitude(magnitude))
    }
}

/// Map a magnitude to its base priority band
///
/// Bands (lower bound inclusive):
/// - 13..=15 extremely-high
/// - 10..=12 very-high
/// - 7..=9 high
/// - 4..=6 medium-high
/// - 3 low
pub fn base_priority(magnitude: u8) -> Priority {
    debug_assert!(
        (MIN_MAGNITUDE..=MAX_MAGNITUDE).contains(&magnitude),
        "magnitude {} outside 3..=15",
        magnitude
    );

    if magnitude >= EXTREMELY_HIGH_FLOOR {
        Priority::ExtremelyHigh
    } else if magnitude >= VERY_HIGH_FLOOR {
        Priority::VeryHigh
    } else if magnitude >= HIGH_FLOOR {
        Priority::High
    } else if magnitude >= MEDIUM_HIGH_FLOOR {
        Priority::MediumHigh
    } else {
        Priority::Low
    }
}

/// Raise a priority according to assessment uncertainty.
///
/// Never lowers a priority and never goes past extremely-high.
pub fn adjust_for_uncertainty(
    priority: Priority,
    uncertainty: UncertaintyLevel,
    policy: EscalationPolicy,
) -> Priority {
    let steps = match policy {
        EscalationPolicy::HighUncertaintyStep => match uncertainty {
            UncertaintyLevel::High => 1,
            UncertaintyLevel::Low | UncertaintyLevel::Medium => 0,
        },
        EscalationPolicy::UncertaintyMatrix => matrix_steps(priority, uncertainty),
    };
    priority.escalate(steps)
}

/// Escalation steps for the uncertainty matrix
///
/// | uncertainty | low | medium-high | high | very-high | extremely-high |
/// |-------------|-----|-------------|------|-----------|----------------|
/// | low         | 0   | 0           | 0    | 0         | 0              |
/// | medium      | 1   | 1           | 0    | 0         | 0              |
/// | high        | 2   | 1           | 1    | 1         | 0              |
fn matrix_steps(priority: Priority, uncertainty: UncertaintyLevel) -> u8 {
    match (uncertainty, priority) {
        (UncertaintyLevel::Low, _) => 0,
        (UncertaintyLevel::Medium, Priority::Low | Priority::MediumHigh) => 1,
        (UncertaintyLevel::Medium, _) => 0,
        (UncertaintyLevel::High, Priority::Low) => 2,
        (UncertaintyLevel::High, Priority::ExtremelyHigh) => 0,
        (UncertaintyLevel::High, _) => 1,
    }
}

/// Score validated ABC inputs under the given policy
pub fn score(abc: AbcScore, uncertainty: UncertaintyLevel, policy: EscalationPolicy) -> RiskScore {
    let magnitude = abc.magnitude();
    let base = base_priority(magnitude);
    RiskScore {
        magnitude,
        base_priority: base,
        adjusted_priority: adjust_for_uncertainty(base, uncertainty, policy),
    }
}
