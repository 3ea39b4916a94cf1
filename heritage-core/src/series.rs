//! Time series construction from assessment records
//!
//! Global invariants enforced:
//! - Points are emitted in strictly ascending date order
//! - At most one point per calendar day (same-day records are reduced)
//! - Empty input yields an empty series, never an error

use crate::assessment::{RiskAssessment, ThreatType};
use crate::risk::{MAX_MAGNITUDE, MIN_MAGNITUDE};
use crate::sites::SiteNameResolver;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Quantity tracked over time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    /// Mean magnitude of the day's assessments
    #[default]
    AvgMagnitude,
    /// Highest magnitude recorded that day
    MaxMagnitude,
    /// Number of assessments recorded that day
    AssessmentCount,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::AvgMagnitude => "avg-magnitude",
            Metric::MaxMagnitude => "max-magnitude",
            Metric::AssessmentCount => "assessment-count",
        }
    }

    /// Valid value range for the metric, used to clamp forecasts
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            Metric::AvgMagnitude | Metric::MaxMagnitude => {
                (f64::from(MIN_MAGNITUDE), f64::from(MAX_MAGNITUDE))
            }
            Metric::AssessmentCount => (0.0, f64::INFINITY),
        }
    }

    fn reduce(&self, magnitudes: &[u8]) -> f64 {
        match self {
            Metric::AvgMagnitude => {
                magnitudes.iter().map(|&m| f64::from(m)).sum::<f64>() / magnitudes.len() as f64
            }
            Metric::MaxMagnitude => magnitudes.iter().copied().max().map_or(0.0, f64::from),
            Metric::AssessmentCount => magnitudes.len() as f64,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avg-magnitude" => Ok(Metric::AvgMagnitude),
            "max-magnitude" => Ok(Metric::MaxMagnitude),
            "assessment-count" => Ok(Metric::AssessmentCount),
            other => Err(format!("unknown metric: {}", other)),
        }
    }
}

/// One aggregated sample of a site's metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TimeSeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub site_id: String,
    pub site_name: String,
}

/// Build a day-bucketed series for one site, optionally one threat
pub fn build_series<R>(
    assessments: &[RiskAssessment],
    site_id: &str,
    threat: Option<ThreatType>,
    metric: Metric,
    resolver: &R,
) -> Vec<TimeSeriesPoint>
where
    R: SiteNameResolver + ?Sized,
{
    let mut buckets: BTreeMap<NaiveDate, Vec<u8>> = BTreeMap::new();

    for assessment in assessments {
        if assessment.site_id() != site_id {
            continue;
        }
        if threat.is_some_and(|t| t != assessment.threat_type()) {
            continue;
        }
        buckets
            .entry(assessment.assessment_day())
            .or_default()
            .push(assessment.magnitude());
    }

    if buckets.is_empty() {
        return Vec::new();
    }

    tracing::debug!(
        site_id,
        metric = metric.as_str(),
        buckets = buckets.len(),
        "built time series"
    );

    let site_name = resolver.display_name(site_id);

    buckets
        .into_iter()
        .map(|(date, magnitudes)| TimeSeriesPoint {
            date,
            value: metric.reduce(&magnitudes),
            site_id: site_id.to_string(),
            site_name: site_name.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::AbcScore;
    use crate::risk::UncertaintyLevel;
    use crate::sites::SiteDirectory;
    use chrono::{TimeZone, Utc};

    fn assessment(site: &str, threat: ThreatType, abc: (i32, i32, i32), day: u32, hour: u32) -> RiskAssessment {
        RiskAssessment::new(
            site,
            threat,
            AbcScore::new(abc.0, abc.1, abc.2).unwrap(),
            UncertaintyLevel::Low,
            Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_empty_input_yields_empty_series() {
        let series = build_series(&[], "petra", None, Metric::AvgMagnitude, &SiteDirectory::new());
        assert!(series.is_empty());
    }

    #[test]
    fn test_same_day_records_are_averaged() {
        let records = vec![
            assessment("petra", ThreatType::Flooding, (3, 3, 3), 2, 9),
            assessment("petra", ThreatType::Weathering, (1, 1, 1), 1, 9),
            assessment("petra", ThreatType::Weathering, (5, 5, 5), 2, 17),
            assessment("angkor", ThreatType::Weathering, (5, 5, 5), 1, 9),
        ];
        let sites: SiteDirectory = [("petra", "Petra")].into_iter().collect();

        let series = build_series(&records, "petra", None, Metric::AvgMagnitude, &sites);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(series[0].value, 3.0);
        assert_eq!(series[1].value, 12.0);
        assert_eq!(series[1].site_name, "Petra");
    }

    #[test]
    fn test_threat_filter_and_other_metrics() {
        let records = vec![
            assessment("petra", ThreatType::Flooding, (3, 3, 3), 2, 9),
            assessment("petra", ThreatType::Flooding, (4, 4, 4), 2, 12),
            assessment("petra", ThreatType::Weathering, (5, 5, 5), 2, 17),
        ];
        let sites = SiteDirectory::new();

        let max = build_series(&records, "petra", Some(ThreatType::Flooding), Metric::MaxMagnitude, &sites);
        assert_eq!(max.len(), 1);
        assert_eq!(max[0].value, 12.0);
        assert_eq!(max[0].site_name, "petra");

        let count = build_series(&records, "petra", None, Metric::AssessmentCount, &sites);
        assert_eq!(count[0].value, 3.0);
    }

    #[test]
    fn test_dates_strictly_ascending() {
        let records: Vec<_> = [9u32, 3, 7, 3, 1]
            .iter()
            .map(|&d| assessment("petra", ThreatType::Looting, (2, 2, 2), d, 8))
            .collect();
        let series = build_series(&records, "petra", None, Metric::AvgMagnitude, &SiteDirectory::new());
        assert_eq!(series.len(), 4);
        assert!(series.windows(2).all(|w| w[0].date < w[1].date));
    }
}
