//! Reporting and output generation
//!
//! Global invariants enforced:
//! - Deterministic output ordering (threats in declaration order, sites in request order)
//! - Rendering never recomputes analysis results

use crate::aggregates::{self, SiteRiskSummary};
use crate::assessment::{RiskAssessment, ThreatType};
use crate::compare::ComparativeTrendAnalysis;
use crate::evolution::ThreatEvolution;
use crate::risk::{self, EscalationPolicy, RiskScore, UncertaintyLevel};
use crate::sites::SiteNameResolver;
use crate::trends::TrendAnalysis;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current standing of one threat at a site, from its latest assessment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ThreatOutlook {
    pub threat_type: ThreatType,
    pub assessment_date: DateTime<Utc>,
    pub uncertainty_level: UncertaintyLevel,
    pub score: RiskScore,
    pub recommendations: Vec<String>,
}

/// Site summary plus per-threat recommendations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SiteReport {
    pub summary: SiteRiskSummary,
    pub escalation_policy: EscalationPolicy,
    pub threats: Vec<ThreatOutlook>,
}

impl SiteReport {
    /// Build a report for `site_id`, scoring each threat's latest assessment under `policy`
    pub fn build<R>(
        assessments: &[RiskAssessment],
        site_id: &str,
        resolver: &R,
        policy: EscalationPolicy,
    ) -> Self
    where
        R: SiteNameResolver + ?Sized,
    {
        let summary = aggregates::summarize_site(assessments, site_id, resolver);
        let threats = aggregates::latest_by_threat(assessments, site_id)
            .into_iter()
            .map(|a| {
                let score = risk::score(a.abc(), a.uncertainty_level(), policy);
                ThreatOutlook {
                    threat_type: a.threat_type(),
                    assessment_date: a.assessment_date(),
                    uncertainty_level: a.uncertainty_level(),
                    score,
                    recommendations: aggregates::recommendations(
                        score.adjusted_priority,
                        a.threat_type(),
                        score.magnitude,
                    ),
                }
            })
            .collect();

        SiteReport {
            summary,
            escalation_policy: policy,
            threats,
        }
    }
}

/// Render any analysis result as pretty JSON
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize report")
}

/// Render a single score as text
pub fn render_score_text(score: &RiskScore) -> String {
    let mut output = String::new();
    output.push_str(&format!("Magnitude:         {}\n", score.magnitude));
    output.push_str(&format!("Base priority:     {}\n", score.base_priority));
    output.push_str(&format!("Adjusted priority: {}\n", score.adjusted_priority));
    output
}

/// Render a site report as text
pub fn render_site_text(report: &SiteReport) -> String {
    let summary = &report.summary;
    let mut output = String::new();

    output.push_str(&format!("{} ({})\n", summary.site_name, summary.site_id));
    output.push_str(&format!(
        "Overall risk: {}  assessments: {}  high uncertainty: {:.0}%\n",
        summary.overall_risk,
        summary.assessment_count,
        summary.high_uncertainty_share * 100.0
    ));
    if let Some(peak) = summary.peak_magnitude {
        output.push_str(&format!("Peak magnitude: {}\n", peak));
    }
    if let Some(latest) = summary.latest_assessment {
        output.push_str(&format!("Latest assessment: {}\n", latest.format("%Y-%m-%d")));
    }
    if report.threats.is_empty() {
        return output;
    }

    output.push('\n');
    output.push_str(&format!(
        "{:<20} {:<4} {:<15} {:<15} {}\n",
        "THREAT", "MAG", "BASE", "ADJUSTED", "ASSESSED"
    ));
    for threat in &report.threats {
        output.push_str(&format!(
            "{:<20} {:<4} {:<15} {:<15} {}\n",
            truncate_or_pad(&threat.threat_type.label(), 20),
            threat.score.magnitude,
            threat.score.base_priority.as_str(),
            threat.score.adjusted_priority.as_str(),
            threat.assessment_date.format("%Y-%m-%d"),
        ));
        for item in &threat.recommendations {
            output.push_str(&format!("    - {}\n", item));
        }
    }

    output
}

/// Render a trend analysis as text
pub fn render_trend_text(analysis: &TrendAnalysis) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{} ({}) - {}\n",
        analysis.site_name, analysis.site_id, analysis.metric
    ));
    output.push_str(&format!(
        "Trend: {}  strength: {:.3}  average: {:.2}  change: {:+.1}%\n",
        analysis.trend.as_str(),
        analysis.trend_strength,
        analysis.average_value,
        analysis.change_rate
    ));
    output.push('\n');
    output.push_str(&format!("{:<12} {}\n", "DATE", "VALUE"));
    for point in &analysis.data_points {
        output.push_str(&format!("{:<12} {:.2}\n", point.date.to_string(), point.value));
    }
    for point in &analysis.forecast {
        output.push_str(&format!("{:<12} {:.2} (forecast)\n", point.date.to_string(), point.value));
    }
    output
}

/// Render a comparative analysis as text
pub fn render_comparison_text(analysis: &ComparativeTrendAnalysis) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Metric: {}  range: {} to {}  overall: {}\n",
        analysis.metric,
        analysis.time_range.start.format("%Y-%m-%d"),
        analysis.time_range.end.format("%Y-%m-%d"),
        analysis.overall_trend.as_str()
    ));
    output.push('\n');
    output.push_str(&format!("{:<20} {:<30} {}\n", "SITE", "NAME", "TREND"));
    for site in &analysis.sites {
        output.push_str(&format!(
            "{:<20} {:<30} {}\n",
            truncate_or_pad(&site.site_id, 20),
            truncate_or_pad(&site.site_name, 30),
            site.trend.as_str()
        ));
    }

    if !analysis.correlations.is_empty() {
        output.push('\n');
        output.push_str("Correlations:\n");
        for pair in &analysis.correlations {
            output.push_str(&format!(
                "  {} ~ {}: {:+.3}\n",
                pair.site_a, pair.site_b, pair.correlation
            ));
        }
    }

    if !analysis.excluded_sites.is_empty() {
        output.push('\n');
        output.push_str("Excluded:\n");
        for excluded in &analysis.excluded_sites {
            output.push_str(&format!(
                "  {}: {}\n",
                excluded.site_id,
                excluded.reason.as_str()
            ));
        }
    }

    output
}

/// Render a threat evolution as text
pub fn render_evolution_text(evolution: &ThreatEvolution) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{} at {} ({}) - {}\n",
        evolution.threat_type.label(),
        evolution.site_name,
        evolution.site_id,
        evolution.evolution.as_str()
    ));
    output.push('\n');
    output.push_str(&format!("{:<12} {:<4} {:<15} {}\n", "DATE", "MAG", "PRIORITY", "ASSESSOR"));
    for entry in &evolution.timeline {
        output.push_str(&format!(
            "{:<12} {:<4} {:<15} {}\n",
            entry.date.format("%Y-%m-%d").to_string(),
            entry.magnitude,
            entry.priority.as_str(),
            entry.assessor.as_deref().unwrap_or("-")
        ));
    }

    if !evolution.critical_periods.is_empty() {
        output.push('\n');
        output.push_str("Critical periods:\n");
        for period in &evolution.critical_periods {
            output.push_str(&format!(
                "  {} to {}: {}\n",
                period.start.format("%Y-%m-%d"),
                period.end.format("%Y-%m-%d"),
                period.reason
            ));
        }
    }

    output
}

/// Truncate or pad string to fixed width
fn truncate_or_pad(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        format!("{:<width$}", s, width = width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::AbcScore;
    use crate::risk::Priority;
    use crate::sites::SiteDirectory;
    use chrono::TimeZone;

    fn assessment(threat: ThreatType, abc: (i32, i32, i32), day: u32) -> RiskAssessment {
        RiskAssessment::new(
            "petra",
            threat,
            AbcScore::new(abc.0, abc.1, abc.2).unwrap(),
            UncertaintyLevel::High,
            Utc.with_ymd_and_hms(2024, 2, day, 9, 0, 0).unwrap(),
        )
    }

    fn directory() -> SiteDirectory {
        [("petra", "Petra")].into_iter().collect()
    }

    #[test]
    fn test_site_report_uses_latest_per_threat() {
        let assessments = vec![
            assessment(ThreatType::Flooding, (2, 2, 2), 1),
            assessment(ThreatType::Flooding, (4, 4, 4), 10),
            assessment(ThreatType::Earthquake, (1, 1, 1), 5),
        ];
        let report = SiteReport::build(
            &assessments,
            "petra",
            &directory(),
            EscalationPolicy::HighUncertaintyStep,
        );

        assert_eq!(report.summary.site_name, "Petra");
        assert_eq!(report.threats.len(), 2);
        let flooding = report
            .threats
            .iter()
            .find(|t| t.threat_type == ThreatType::Flooding)
            .unwrap();
        assert_eq!(flooding.score.magnitude, 12);
        assert_eq!(flooding.score.base_priority, Priority::VeryHigh);
        assert_eq!(flooding.score.adjusted_priority, Priority::ExtremelyHigh);
        assert!(flooding.recommendations[0].starts_with("URGENT: "));
    }

    #[test]
    fn test_site_report_for_unknown_site_is_empty() {
        let report = SiteReport::build(
            &[],
            "nowhere",
            &directory(),
            EscalationPolicy::UncertaintyMatrix,
        );
        assert_eq!(report.summary.assessment_count, 0);
        assert_eq!(report.summary.overall_risk, Priority::Low);
        assert!(report.threats.is_empty());

        let text = render_site_text(&report);
        assert!(text.starts_with("nowhere (nowhere)"));
        assert!(!text.contains("THREAT"));
    }

    #[test]
    fn test_render_json_uses_snake_case_and_kebab_priorities() {
        let assessments = vec![assessment(ThreatType::TourismPressure, (3, 3, 2), 3)];
        let report = SiteReport::build(
            &assessments,
            "petra",
            &directory(),
            EscalationPolicy::HighUncertaintyStep,
        );
        let json = render_json(&report).unwrap();
        assert!(json.contains("\"escalation_policy\": \"high-uncertainty-step\""));
        assert!(json.contains("\"threat_type\": \"tourism-pressure\""));
        assert!(json.contains("\"adjusted_priority\": \"very-high\""));
    }

    #[test]
    fn test_render_score_text() {
        let score = risk::score(
            AbcScore::new(2, 2, 2).unwrap(),
            UncertaintyLevel::Low,
            EscalationPolicy::UncertaintyMatrix,
        );
        let text = render_score_text(&score);
        assert!(text.contains("Magnitude:         6"));
        assert!(text.contains("Base priority:     medium-high"));
    }

    #[test]
    fn test_truncate_or_pad() {
        assert_eq!(truncate_or_pad("abc", 5), "abc  ");
        assert_eq!(truncate_or_pad("abcdefgh", 6), "abc...");
    }
}
