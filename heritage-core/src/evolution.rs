//! Threat evolution - per-threat timeline, escalation pattern, critical periods
//!
//! Global invariants enforced:
//! - Timeline is ascending by assessment date (ties keep input order)
//! - Critical periods are maximal contiguous runs at or above the threshold
//! - Fewer than two timeline entries always classify as stable

use crate::assessment::{RiskAssessment, ThreatType};
use crate::risk::Priority;
use crate::AnalysisSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Escalation pattern of a threat over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvolutionPattern {
    Escalating,
    Improving,
    Stable,
}

impl EvolutionPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvolutionPattern::Escalating => "escalating",
            EvolutionPattern::Improving => "improving",
            EvolutionPattern::Stable => "stable",
        }
    }
}

/// One assessment on a threat timeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TimelineEntry {
    pub date: DateTime<Utc>,
    pub magnitude: u8,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Contiguous run of high-magnitude assessments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct CriticalPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reason: String,
    pub peak_magnitude: u8,
}

/// How one threat developed at one site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ThreatEvolution {
    pub threat_type: ThreatType,
    pub site_id: String,
    pub site_name: String,
    pub timeline: Vec<TimelineEntry>,
    pub evolution: EvolutionPattern,
    pub critical_periods: Vec<CriticalPeriod>,
}

/// Trace a threat at a site through its assessments
pub fn analyze(
    assessments: &[RiskAssessment],
    site_id: &str,
    site_name: &str,
    threat: ThreatType,
    settings: &AnalysisSettings,
) -> ThreatEvolution {
    let mut matching: Vec<&RiskAssessment> = assessments
        .iter()
        .filter(|a| a.site_id() == site_id && a.threat_type() == threat)
        .collect();
    matching.sort_by_key(|a| a.assessment_date());

    let timeline: Vec<TimelineEntry> = matching
        .into_iter()
        .map(|a| TimelineEntry {
            date: a.assessment_date(),
            magnitude: a.magnitude(),
            priority: a.priority(),
            assessor: a.assessor().map(str::to_string),
            notes: a.notes().map(str::to_string),
        })
        .collect();

    let evolution = classify_evolution(&timeline, settings.evolution_margin);
    let critical_periods = critical_periods(&timeline, threat, settings.critical_magnitude);

    tracing::debug!(
        site_id,
        threat = threat.as_str(),
        entries = timeline.len(),
        periods = critical_periods.len(),
        evolution = evolution.as_str(),
        "analyzed threat evolution"
    );

    ThreatEvolution {
        threat_type: threat,
        site_id: site_id.to_string(),
        site_name: site_name.to_string(),
        timeline,
        evolution,
        critical_periods,
    }
}

fn mean_magnitude(entries: &[TimelineEntry]) -> f64 {
    entries.iter().map(|e| f64::from(e.magnitude)).sum::<f64>() / entries.len() as f64
}

/// Compare the most recent third of the timeline against the earliest third
fn classify_evolution(timeline: &[TimelineEntry], margin: f64) -> EvolutionPattern {
    if timeline.len() < 2 {
        return EvolutionPattern::Stable;
    }

    let window = (timeline.len() / 3).max(1);
    let early = mean_magnitude(&timeline[..window]);
    let recent = mean_magnitude(&timeline[timeline.len() - window..]);
    let delta = recent - early;

    if delta > margin {
        EvolutionPattern::Escalating
    } else if delta < -margin {
        EvolutionPattern::Improving
    } else {
        EvolutionPattern::Stable
    }
}

/// Scan for maximal runs with magnitude >= threshold
fn critical_periods(
    timeline: &[TimelineEntry],
    threat: ThreatType,
    threshold: u8,
) -> Vec<CriticalPeriod> {
    let mut periods = Vec::new();
    let mut run: Option<(usize, usize)> = None;

    for (idx, entry) in timeline.iter().enumerate() {
        if entry.magnitude >= threshold {
            run = Some(match run {
                Some((start, _)) => (start, idx),
                None => (idx, idx),
            });
        } else if let Some((start, end)) = run.take() {
            periods.push(period_for(&timeline[start..=end], threat, threshold));
        }
    }
    if let Some((start, end)) = run {
        periods.push(period_for(&timeline[start..=end], threat, threshold));
    }

    periods
}

fn period_for(run: &[TimelineEntry], threat: ThreatType, threshold: u8) -> CriticalPeriod {
    let peak_magnitude = run.iter().map(|e| e.magnitude).max().unwrap_or(threshold);
    let assessments = if run.len() == 1 {
        "1 assessment".to_string()
    } else {
        format!("{} consecutive assessments", run.len())
    };

    CriticalPeriod {
        start: run[0].date,
        end: run[run.len() - 1].date,
        reason: format!(
            "{} risk at magnitude {} or above across {} (peak {})",
            threat.label(),
            threshold,
            assessments,
            peak_magnitude
        ),
        peak_magnitude,
    }
}
