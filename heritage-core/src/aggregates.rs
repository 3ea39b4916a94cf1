//! Site-level aggregation - overall risk and recommended actions
//!
//! Global invariants enforced:
//! - The most severe assessment governs, never the average
//! - Precautionary escalation applies to the aggregate, at most one step
//! - Aggregates are strictly derived (never stored, always computed)

use crate::assessment::{RiskAssessment, ThreatType};
use crate::risk::{Priority, UncertaintyLevel};
use crate::sites::SiteNameResolver;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Share of high-uncertainty assessments above which the aggregate escalates
const PRECAUTIONARY_SHARE: f64 = 0.5;

/// Maximum number of recommendations returned
const MAX_RECOMMENDATIONS: usize = 5;

const ROUTINE_MONITORING: &str =
    "Continue routine monitoring and reassess at the next scheduled review";

/// Overall priority for a site's assessments
///
/// Empty input is `low`. Otherwise the highest base priority wins; when more
/// than half of the assessments carry high uncertainty the result moves up
/// one band, unless it is already at the top.
pub fn overall_risk(assessments: &[RiskAssessment]) -> Priority {
    let Some(max) = assessments.iter().map(RiskAssessment::priority).max() else {
        return Priority::Low;
    };

    if high_uncertainty_share(assessments) > PRECAUTIONARY_SHARE
        && max < Priority::ExtremelyHigh
    {
        max.escalate(1)
    } else {
        max
    }
}

fn high_uncertainty_share(assessments: &[RiskAssessment]) -> f64 {
    if assessments.is_empty() {
        return 0.0;
    }
    let high = assessments
        .iter()
        .filter(|a| a.uncertainty_level() == UncertaintyLevel::High)
        .count();
    high as f64 / assessments.len() as f64
}

/// Threat-specific conservation guidance, most important first
fn threat_guidance(threat: ThreatType) -> &'static [&'static str] {
    match threat {
        ThreatType::Weathering => &[
            "Apply consolidation treatment to friable stone and mortar surfaces",
            "Install protective shelters or capping over exposed masonry",
            "Improve surface drainage to limit water retention",
        ],
        ThreatType::TourismPressure => &[
            "Introduce visitor caps and timed-entry ticketing",
            "Reroute visitor paths away from fragile surfaces",
            "Deploy site wardens at high-traffic areas",
        ],
        ThreatType::Flooding => &[
            "Clear and upgrade drainage channels and culverts",
            "Install temporary flood barriers at vulnerable openings",
            "Relocate movable collections above historic flood levels",
        ],
        ThreatType::UrbanDevelopment => &[
            "Request a heritage impact assessment for nearby construction",
            "Establish or enforce a protective buffer zone",
            "Monitor vibration and groundwater changes from adjacent works",
        ],
        ThreatType::Earthquake => &[
            "Commission a structural seismic vulnerability survey",
            "Install temporary shoring on unstable walls and arches",
            "Prepare a post-earthquake rapid damage assessment plan",
        ],
        ThreatType::Vegetation => &[
            "Remove invasive vegetation and treat root intrusions",
            "Schedule regular biological growth control",
            "Stabilise masonry disturbed by root action",
        ],
        ThreatType::Looting => &[
            "Increase security patrols and install surveillance",
            "Document and inventory portable elements at risk",
            "Coordinate with local law enforcement and customs",
        ],
        ThreatType::Conflict => &[
            "Activate the emergency safeguarding plan for the site",
            "Mark the site with protective emblems and notify authorities",
            "Evacuate movable heritage to secure storage",
        ],
        ThreatType::ClimateChange => &[
            "Integrate the site into a climate adaptation plan",
            "Install environmental monitoring for temperature and humidity",
            "Model long-term exposure scenarios for the site",
        ],
        ThreatType::Fire => &[
            "Inspect and upgrade fire detection and suppression systems",
            "Clear combustible material and create firebreaks",
            "Train staff in fire emergency procedures",
        ],
        ThreatType::Pollution => &[
            "Monitor air and water pollutant levels at the site",
            "Clean pollutant deposits using approved conservation methods",
            "Engage authorities on local emission controls",
        ],
    }
}

fn urgency_prefix(priority: Priority) -> Option<&'static str> {
    match priority {
        Priority::ExtremelyHigh => Some("URGENT"),
        Priority::VeryHigh => Some("HIGH PRIORITY"),
        Priority::High => Some("PRIORITY"),
        Priority::MediumHigh | Priority::Low => None,
    }
}

fn magnitude_action(magnitude: u8) -> Option<&'static str> {
    if magnitude >= 12 {
        Some("Activate the emergency response protocol immediately")
    } else if magnitude >= 9 {
        Some("Schedule a detailed condition assessment within 30 days")
    } else if magnitude >= 6 {
        Some("Include in the next quarterly review")
    } else {
        None
    }
}

/// Recommended actions for a threat at the given priority and magnitude
///
/// Threat guidance is included from `high` priority upward; the urgency
/// prefix goes on the first item only; one magnitude-banded action is
/// appended. At most five items; a single routine-monitoring item when
/// nothing else applies.
pub fn recommendations(priority: Priority, threat: ThreatType, magnitude: u8) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();

    if priority >= Priority::High {
        items.extend(threat_guidance(threat).iter().map(|s| s.to_string()));
    }

    if let Some(action) = magnitude_action(magnitude) {
        items.push(action.to_string());
    }

    if items.is_empty() {
        return vec![ROUTINE_MONITORING.to_string()];
    }

    if let (Some(prefix), Some(first)) = (urgency_prefix(priority), items.first_mut()) {
        *first = format!("{}: {}", prefix, first);
    }

    items.truncate(MAX_RECOMMENDATIONS);
    items
}

/// Summary of one site's current risk picture
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SiteRiskSummary {
    pub site_id: String,
    pub site_name: String,
    pub assessment_count: usize,
    pub overall_risk: Priority,
    pub priority_counts: BTreeMap<Priority, usize>,
    pub high_uncertainty_share: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_magnitude: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_assessment: Option<DateTime<Utc>>,
}

/// Summarize all assessments recorded for one site
pub fn summarize_site<R>(
    assessments: &[RiskAssessment],
    site_id: &str,
    resolver: &R,
) -> SiteRiskSummary
where
    R: SiteNameResolver + ?Sized,
{
    let site: Vec<RiskAssessment> = assessments
        .iter()
        .filter(|a| a.site_id() == site_id)
        .cloned()
        .collect();

    let mut priority_counts = BTreeMap::new();
    for assessment in &site {
        *priority_counts.entry(assessment.priority()).or_insert(0) += 1;
    }

    SiteRiskSummary {
        site_id: site_id.to_string(),
        site_name: resolver.display_name(site_id),
        assessment_count: site.len(),
        overall_risk: overall_risk(&site),
        priority_counts,
        high_uncertainty_share: high_uncertainty_share(&site),
        peak_magnitude: site.iter().map(RiskAssessment::magnitude).max(),
        latest_assessment: site.iter().map(RiskAssessment::assessment_date).max(),
    }
}

/// Latest assessment per threat for a site, ordered by threat
pub fn latest_by_threat<'a>(
    assessments: &'a [RiskAssessment],
    site_id: &str,
) -> Vec<&'a RiskAssessment> {
    let mut latest: BTreeMap<ThreatType, &RiskAssessment> = BTreeMap::new();
    for assessment in assessments.iter().filter(|a| a.site_id() == site_id) {
        latest
            .entry(assessment.threat_type())
            .and_modify(|current| {
                if assessment.assessment_date() >= current.assessment_date() {
                    *current = assessment;
                }
            })
            .or_insert(assessment);
    }
    latest.into_values().collect()
}
