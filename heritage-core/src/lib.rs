//! Heritage core library - ABC risk scoring and temporal trend analysis for heritage sites

// Global invariants enforced in this crate:
// - Magnitude is always A + B + C with every component in [1,5]
// - Priority bands are fixed; uncertainty may only raise a priority
// - No global mutable state; assessments are read, never modified
// - No randomness or clocks; dates come from the assessments themselves
// - Identical input yields identical output (parallel work is collected in input order)

pub mod aggregates;
pub mod assessment;
pub mod compare;
pub mod config;
pub mod error;
pub mod evolution;
pub mod report;
pub mod risk;
pub mod series;
pub mod sites;
pub mod source;
pub mod trends;

pub use assessment::{AbcScore, RiskAssessment, ThreatType};
pub use config::ResolvedConfig;
pub use error::RiskError;
pub use report::{render_json, SiteReport};
pub use risk::{EscalationPolicy, Priority, RiskScore, UncertaintyLevel};
pub use series::Metric;
pub use sites::{SiteDirectory, SiteNameResolver};
pub use source::{AssessmentLog, AssessmentSource, JsonFileSource};

use serde::{Deserialize, Serialize};

/// Tunable thresholds shared by the trend, comparison and evolution analyzers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AnalysisSettings {
    /// Slope dead band as a fraction of the observed value range per day span
    pub trend_epsilon_ratio: f64,
    /// Number of forecast points appended to a trend
    pub forecast_horizon: usize,
    /// Mean magnitude difference between early and recent windows that counts as a change
    pub evolution_margin: f64,
    /// Magnitude at or above which a run of assessments is a critical period
    pub critical_magnitude: u8,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            trend_epsilon_ratio: 0.1,
            forecast_horizon: 3,
            evolution_margin: 1.0,
            critical_magnitude: 9,
        }
    }
}
