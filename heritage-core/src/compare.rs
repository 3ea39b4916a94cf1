//! Cross-site comparison - per-site trends, correlation, overall direction
//!
//! Global invariants enforced:
//! - Sites without enough data are excluded, never fatal for the whole call
//! - Output order follows the requested site order, regardless of parallelism
//! - Correlation alignment never extends a series beyond its own dates
//! - Ties in the overall vote resolve to stable

use crate::assessment::RiskAssessment;
use crate::error::{Result, RiskError};
use crate::series::{Metric, TimeSeriesPoint};
use crate::sites::SiteNameResolver;
use crate::trends::{self, TrendAnalysis, TrendDirection};
use crate::AnalysisSettings;
use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Minimum number of included sites for a comparison
pub const MIN_COMPARED_SITES: usize = 2;

/// Minimum aligned points for a reported correlation
pub const MIN_CORRELATION_POINTS: usize = 3;

/// Per-site trend in a comparison
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SiteTrend {
    pub site_id: String,
    pub site_name: String,
    pub trend: TrendDirection,
}

/// Pearson correlation between two sites' series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SiteCorrelation {
    pub site_a: String,
    pub site_b: String,
    pub correlation: f64,
}

/// Inclusive span of assessment dates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Why a requested site was left out of a comparison
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExclusionReason {
    /// No assessments recorded for the site
    NoData,
    /// Assessments exist but cover fewer than two days
    InsufficientData,
}

impl ExclusionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionReason::NoData => "no-data",
            ExclusionReason::InsufficientData => "insufficient-data",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ExcludedSite {
    pub site_id: String,
    pub reason: ExclusionReason,
}

/// Comparison of trends across several sites
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ComparativeTrendAnalysis {
    pub metric: Metric,
    pub time_range: TimeRange,
    pub sites: Vec<SiteTrend>,
    pub overall_trend: TrendDirection,
    pub correlations: Vec<SiteCorrelation>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub excluded_sites: Vec<ExcludedSite>,
}

/// Compare trends across `site_ids`
///
/// Fails with `NoData` when none of the requested sites has any assessment,
/// and with `InsufficientData` when fewer than two sites can be analyzed.
pub fn compare<S, R>(
    assessments: &[RiskAssessment],
    site_ids: &[S],
    metric: Metric,
    resolver: &R,
    settings: &AnalysisSettings,
) -> Result<ComparativeTrendAnalysis>
where
    S: AsRef<str> + Sync,
    R: SiteNameResolver + Sync + ?Sized,
{
    let mut seen = HashSet::new();
    let requested: Vec<&str> = site_ids
        .iter()
        .map(AsRef::as_ref)
        .filter(|id| {
            let fresh = seen.insert(*id);
            if !fresh {
                tracing::warn!(site_id = *id, "duplicate site id in comparison request");
            }
            fresh
        })
        .collect();

    let results: Vec<(&str, Result<TrendAnalysis>)> = requested
        .par_iter()
        .map(|&site_id| {
            (
                site_id,
                trends::analyze_site(assessments, site_id, None, metric, resolver, settings),
            )
        })
        .collect();

    let mut included = Vec::new();
    let mut excluded_sites = Vec::new();
    for (site_id, result) in results {
        match result {
            Ok(analysis) => included.push(analysis),
            Err(err) => {
                let reason = match err {
                    RiskError::NoData => ExclusionReason::NoData,
                    _ => ExclusionReason::InsufficientData,
                };
                tracing::debug!(site_id, error = %err, "site excluded from comparison");
                excluded_sites.push(ExcludedSite {
                    site_id: site_id.to_string(),
                    reason,
                });
            }
        }
    }

    if included.len() < MIN_COMPARED_SITES {
        let any_data = excluded_sites
            .iter()
            .any(|e| e.reason == ExclusionReason::InsufficientData)
            || !included.is_empty();
        return Err(if any_data {
            RiskError::InsufficientData {
                required: MIN_COMPARED_SITES,
                actual: included.len(),
            }
        } else {
            RiskError::NoData
        });
    }

    let included_ids: HashSet<&str> = included.iter().map(|a| a.site_id.as_str()).collect();
    let time_range = time_range(assessments, &included_ids).ok_or(RiskError::NoData)?;

    let sites = included
        .iter()
        .map(|a| SiteTrend {
            site_id: a.site_id.clone(),
            site_name: a.site_name.clone(),
            trend: a.trend,
        })
        .collect::<Vec<_>>();
    let overall_trend = overall_trend(sites.iter().map(|s| s.trend));
    let correlations = correlations(&included);

    Ok(ComparativeTrendAnalysis {
        metric,
        time_range,
        sites,
        overall_trend,
        correlations,
        excluded_sites,
    })
}

fn time_range(assessments: &[RiskAssessment], sites: &HashSet<&str>) -> Option<TimeRange> {
    let mut dates = assessments
        .iter()
        .filter(|a| sites.contains(a.site_id()))
        .map(RiskAssessment::assessment_date);
    let first = dates.next()?;
    let (start, end) = dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
    Some(TimeRange { start, end })
}

/// Plurality vote over site trends; any tie for first place is stable
pub fn overall_trend(trends: impl IntoIterator<Item = TrendDirection>) -> TrendDirection {
    let mut counts = [
        (TrendDirection::Increasing, 0usize),
        (TrendDirection::Decreasing, 0),
        (TrendDirection::Stable, 0),
    ];
    for trend in trends {
        if let Some(slot) = counts.iter_mut().find(|(t, _)| *t == trend) {
            slot.1 += 1;
        }
    }

    let best = counts.iter().map(|(_, c)| *c).max().unwrap_or(0);
    let mut leaders = counts.iter().filter(|(_, c)| *c == best);
    match (leaders.next(), leaders.next()) {
        (Some((trend, _)), None) if best > 0 => *trend,
        _ => TrendDirection::Stable,
    }
}

fn correlations(included: &[TrendAnalysis]) -> Vec<SiteCorrelation> {
    let pairs: Vec<(usize, usize)> = (0..included.len())
        .flat_map(|i| (i + 1..included.len()).map(move |j| (i, j)))
        .collect();

    pairs
        .par_iter()
        .filter_map(|&(i, j)| {
            let a = &included[i];
            let b = &included[j];
            let (xs, ys) = align(&a.data_points, &b.data_points);
            let correlation = pearson(&xs, &ys);
            if correlation.is_none() {
                tracing::debug!(
                    site_a = a.site_id.as_str(),
                    site_b = b.site_id.as_str(),
                    aligned = xs.len(),
                    "correlation omitted"
                );
            }
            correlation.map(|correlation| SiteCorrelation {
                site_a: a.site_id.clone(),
                site_b: b.site_id.clone(),
                correlation,
            })
        })
        .collect()
}

/// Latest sample at or before `date`, or `None` outside the series' own span
fn value_at(series: &[TimeSeriesPoint], date: NaiveDate) -> Option<f64> {
    let first = series.first()?;
    let last = series.last()?;
    if date < first.date || date > last.date {
        return None;
    }
    let idx = series.partition_point(|p| p.date <= date);
    idx.checked_sub(1).map(|i| series[i].value)
}

/// Reindex two ascending series onto the union of their dates, forward
/// filling gaps, and keep only dates where both have a value
pub fn align(a: &[TimeSeriesPoint], b: &[TimeSeriesPoint]) -> (Vec<f64>, Vec<f64>) {
    let grid: BTreeSet<NaiveDate> = a.iter().chain(b).map(|p| p.date).collect();

    grid.into_iter()
        .filter_map(|date| Some((value_at(a, date)?, value_at(b, date)?)))
        .unzip()
}

/// Pearson correlation coefficient, `None` when undefined
///
/// Requires at least [`MIN_CORRELATION_POINTS`] pairs and non-zero variance
/// in both inputs.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len();
    if n != ys.len() || n < MIN_CORRELATION_POINTS {
        return None;
    }

    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    let denominator = (sxx * syy).sqrt();
    if denominator <= f64::EPSILON {
        return None;
    }
    Some((sxy / denominator).clamp(-1.0, 1.0))
}
