//! Trend semantics - linear trend, change rate, and forecast for a site series
//!
//! Global invariants enforced:
//! - At least two points are required for any regression
//! - The direction epsilon scales with the series' value range
//! - Forecasts never leave the metric's valid range
//! - Trends are derived, not stored

use crate::assessment::{RiskAssessment, ThreatType};
use crate::error::{Result, RiskError};
use crate::series::{self, Metric, TimeSeriesPoint};
use crate::sites::SiteNameResolver;
use crate::AnalysisSettings;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Minimum number of points for a regression
pub const MIN_TREND_POINTS: usize = 2;

/// Floor applied to the value range when scaling the direction epsilon,
/// so perfectly flat series do not get a zero-width dead band
const MIN_VALUE_RANGE: f64 = 1.0;

/// Trend direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
        }
    }
}

/// Ordinary least-squares fit `value = slope * day + intercept`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Trend analysis for one site and metric
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TrendAnalysis {
    pub metric: Metric,
    pub site_id: String,
    pub site_name: String,
    pub data_points: Vec<TimeSeriesPoint>,
    pub trend: TrendDirection,
    /// Fitted change over the observed span relative to the mean, signed
    pub trend_strength: f64,
    pub average_value: f64,
    /// Percent change between the fitted first and last values
    pub change_rate: f64,
    pub forecast: Vec<TimeSeriesPoint>,
}

/// Fit a line through `(x, y)` pairs.
///
/// With no spread in `x` the slope is zero and the intercept is the mean.
pub fn linear_fit(xs: &[f64], ys: &[f64]) -> LinearFit {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return LinearFit {
            slope: 0.0,
            intercept: 0.0,
        };
    }

    let n_f = n as f64;
    let mean_x = xs[..n].iter().sum::<f64>() / n_f;
    let mean_y = ys[..n].iter().sum::<f64>() / n_f;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        sxx += (x - mean_x) * (x - mean_x);
        sxy += (x - mean_x) * (y - mean_y);
    }

    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    LinearFit {
        slope,
        intercept: mean_y - slope * mean_x,
    }
}

/// Classify a slope against a dead band scaled by the value range
fn classify(slope: f64, value_range: f64, span_days: f64, epsilon_ratio: f64) -> TrendDirection {
    let epsilon = epsilon_ratio * value_range.max(MIN_VALUE_RANGE) / span_days.max(1.0);
    if slope > epsilon {
        TrendDirection::Increasing
    } else if slope < -epsilon {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    }
}

/// Analyze a series produced by [`series::build_series`]
pub fn analyze(
    series: &[TimeSeriesPoint],
    metric: Metric,
    settings: &AnalysisSettings,
) -> Result<TrendAnalysis> {
    if let Some(err) = RiskError::for_count(series.len(), MIN_TREND_POINTS) {
        return Err(err);
    }

    let mut points = series.to_vec();
    points.sort_by_key(|p| p.date);

    let first = &points[0];
    let last = &points[points.len() - 1];
    let origin = first.date;

    let xs: Vec<f64> = points
        .iter()
        .map(|p| (p.date - origin).num_days() as f64)
        .collect();
    let ys: Vec<f64> = points.iter().map(|p| p.value).collect();

    let fit = linear_fit(&xs, &ys);
    let span_days = xs[xs.len() - 1];

    let average_value = ys.iter().sum::<f64>() / ys.len() as f64;
    let (min_value, max_value) = ys
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    let trend = classify(
        fit.slope,
        max_value - min_value,
        span_days,
        settings.trend_epsilon_ratio,
    );
    let trend_strength = fit.slope * span_days / average_value.max(1.0);

    let fitted_first = fit.at(0.0);
    let fitted_last = fit.at(span_days);
    let change_rate = if fitted_first.abs() < f64::EPSILON {
        last.value - first.value
    } else {
        (fitted_last - fitted_first) / fitted_first.abs() * 100.0
    };

    let forecast = forecast_points(&points, &fit, span_days, metric, settings.forecast_horizon);

    Ok(TrendAnalysis {
        metric,
        site_id: last.site_id.clone(),
        site_name: last.site_name.clone(),
        trend,
        trend_strength,
        average_value,
        change_rate,
        forecast,
        data_points: points,
    })
}

/// Extrapolate `horizon` points past the last observation at the mean
/// observed spacing (at least one day), clamped to the metric's bounds
fn forecast_points(
    points: &[TimeSeriesPoint],
    fit: &LinearFit,
    span_days: f64,
    metric: Metric,
    horizon: usize,
) -> Vec<TimeSeriesPoint> {
    let Some(last) = points.last() else {
        return Vec::new();
    };

    let intervals = points.len().saturating_sub(1).max(1) as f64;
    let step_days = ((span_days / intervals).round() as i64).max(1);
    let (lo, hi) = metric.bounds();

    (1..=horizon as i64)
        .map(|i| {
            let offset = step_days * i;
            TimeSeriesPoint {
                date: last.date + Duration::days(offset),
                value: fit.at(span_days + offset as f64).clamp(lo, hi),
                site_id: last.site_id.clone(),
                site_name: last.site_name.clone(),
            }
        })
        .collect()
}

/// Build a site's series, optionally for one threat, and analyze it
pub fn analyze_site<R>(
    assessments: &[RiskAssessment],
    site_id: &str,
    threat: Option<ThreatType>,
    metric: Metric,
    resolver: &R,
    settings: &AnalysisSettings,
) -> Result<TrendAnalysis>
where
    R: SiteNameResolver + ?Sized,
{
    let points = series::build_series(assessments, site_id, threat, metric, resolver);
    analyze(&points, metric, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(values: &[f64], spacing_days: i64) -> Vec<TimeSeriesPoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| TimeSeriesPoint {
                date: start + Duration::days(i as i64 * spacing_days),
                value,
                site_id: "petra".to_string(),
                site_name: "Petra".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_linear_increasing_series() {
        let points = series(&[3.0, 5.0, 7.0, 9.0, 11.0], 1);
        let analysis = analyze(&points, Metric::AvgMagnitude, &AnalysisSettings::default()).unwrap();

        assert_eq!(analysis.trend, TrendDirection::Increasing);
        assert!(analysis.change_rate > 0.0);
        assert_eq!(analysis.average_value, 7.0);
        // fitted 3 -> 11 over the span
        assert!((analysis.change_rate - 266.666_666).abs() < 1e-3);
        assert!((analysis.trend_strength - 8.0 / 7.0).abs() < 1e-9);
        assert_eq!(analysis.site_name, "Petra");
    }

    #[test]
    fn test_single_point_is_insufficient() {
        let points = series(&[7.0], 1);
        assert_eq!(
            analyze(&points, Metric::AvgMagnitude, &AnalysisSettings::default()),
            Err(RiskError::InsufficientData {
                required: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_empty_series_is_no_data() {
        assert_eq!(
            analyze(&[], Metric::AvgMagnitude, &AnalysisSettings::default()),
            Err(RiskError::NoData)
        );
    }

    #[test]
    fn test_decreasing_and_stable() {
        let settings = AnalysisSettings::default();
        let down = analyze(&series(&[14.0, 12.0, 9.0, 6.0], 30), Metric::AvgMagnitude, &settings).unwrap();
        assert_eq!(down.trend, TrendDirection::Decreasing);
        assert!(down.change_rate < 0.0);
        assert!(down.trend_strength < 0.0);

        let flat = analyze(&series(&[8.0, 8.0, 8.0, 8.0], 7), Metric::AvgMagnitude, &settings).unwrap();
        assert_eq!(flat.trend, TrendDirection::Stable);
        assert_eq!(flat.change_rate, 0.0);
    }

    #[test]
    fn test_symmetric_noise_is_stable() {
        let points = series(&[7.0, 8.0, 7.0, 7.0, 8.0, 7.0], 10);
        let analysis = analyze(&points, Metric::AvgMagnitude, &AnalysisSettings::default()).unwrap();
        assert_eq!(analysis.trend, TrendDirection::Stable);
    }

    #[test]
    fn test_forecast_is_spaced_and_clamped() {
        let points = series(&[3.0, 5.0, 7.0, 9.0, 11.0], 7);
        let analysis = analyze(&points, Metric::AvgMagnitude, &AnalysisSettings::default()).unwrap();

        assert_eq!(analysis.forecast.len(), 3);
        let last_date = points[4].date;
        assert_eq!(analysis.forecast[0].date, last_date + Duration::days(7));
        assert_eq!(analysis.forecast[2].date, last_date + Duration::days(21));
        assert!((analysis.forecast[0].value - 13.0).abs() < 1e-9);
        assert_eq!(analysis.forecast[1].value, 15.0);
        assert_eq!(analysis.forecast[2].value, 15.0);
    }

    #[test]
    fn test_forecast_feedback_keeps_direction() {
        let settings = AnalysisSettings::default();
        let points = series(&[3.0, 5.0, 7.0, 9.0, 11.0], 1);
        let first = analyze(&points, Metric::AvgMagnitude, &settings).unwrap();

        let mut extended = points.clone();
        extended.extend(first.forecast.iter().cloned());
        let second = analyze(&extended, Metric::AvgMagnitude, &settings).unwrap();
        assert_eq!(second.trend, first.trend);

        let forecast_only = analyze(&first.forecast, Metric::AvgMagnitude, &settings).unwrap();
        assert_eq!(forecast_only.trend, first.trend);
    }

    #[test]
    fn test_zero_fitted_start_uses_raw_delta() {
        let points = series(&[0.0, 2.0, 4.0], 1);
        let analysis = analyze(&points, Metric::AssessmentCount, &AnalysisSettings::default()).unwrap();
        assert_eq!(analysis.change_rate, 4.0);
    }

    #[test]
    fn test_negative_fitted_start_keeps_sign() {
        // counts 1, 1, 1, 10 fit a line starting at -0.8
        let points = series(&[1.0, 1.0, 1.0, 10.0], 1);
        let analysis = analyze(&points, Metric::AssessmentCount, &AnalysisSettings::default()).unwrap();
        assert_eq!(analysis.trend, TrendDirection::Increasing);
        assert!(analysis.change_rate > 0.0);
        assert!((analysis.change_rate - 1012.5).abs() < 1e-6);
    }

    #[test]
    fn test_site_trend_for_one_threat() {
        use crate::assessment::AbcScore;
        use crate::risk::UncertaintyLevel;
        use crate::sites::SiteDirectory;
        use chrono::{TimeZone, Utc};

        let record = |threat, abc: (i32, i32, i32), day| {
            RiskAssessment::new(
                "petra",
                threat,
                AbcScore::new(abc.0, abc.1, abc.2).unwrap(),
                UncertaintyLevel::Low,
                Utc.with_ymd_and_hms(2024, 3, day, 10, 0, 0).unwrap(),
            )
        };
        let records = vec![
            record(ThreatType::Flooding, (1, 1, 1), 1),
            record(ThreatType::Weathering, (5, 5, 5), 1),
            record(ThreatType::Flooding, (2, 2, 2), 10),
            record(ThreatType::Weathering, (4, 4, 4), 10),
            record(ThreatType::Flooding, (3, 3, 3), 20),
            record(ThreatType::Weathering, (3, 3, 3), 20),
        ];
        let sites = SiteDirectory::new();
        let settings = AnalysisSettings::default();

        let flooding = analyze_site(
            &records,
            "petra",
            Some(ThreatType::Flooding),
            Metric::AvgMagnitude,
            &sites,
            &settings,
        )
        .unwrap();
        let values: Vec<f64> = flooding.data_points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![3.0, 6.0, 9.0]);
        assert_eq!(flooding.trend, TrendDirection::Increasing);

        let weathering = analyze_site(
            &records,
            "petra",
            Some(ThreatType::Weathering),
            Metric::AvgMagnitude,
            &sites,
            &settings,
        )
        .unwrap();
        assert_eq!(weathering.trend, TrendDirection::Decreasing);

        let all = analyze_site(&records, "petra", None, Metric::AvgMagnitude, &sites, &settings)
            .unwrap();
        assert_eq!(all.trend, TrendDirection::Stable);

        let missing = analyze_site(
            &records,
            "petra",
            Some(ThreatType::Looting),
            Metric::AvgMagnitude,
            &sites,
            &settings,
        );
        assert_eq!(missing.unwrap_err(), RiskError::NoData);
    }

    #[test]
    fn test_unsorted_input_is_ordered() {
        let mut points = series(&[3.0, 5.0, 7.0], 1);
        points.reverse();
        let analysis = analyze(&points, Metric::AvgMagnitude, &AnalysisSettings::default()).unwrap();
        assert_eq!(analysis.trend, TrendDirection::Increasing);
        assert!(analysis.data_points.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let points = series(&[4.0, 9.0, 6.0, 11.0, 8.0], 3);
        let settings = AnalysisSettings::default();
        let a = analyze(&points, Metric::AvgMagnitude, &settings).unwrap();
        let b = analyze(&points, Metric::AvgMagnitude, &settings).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_linear_fit_degenerate_x() {
        let fit = linear_fit(&[2.0, 2.0], &[4.0, 6.0]);
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.intercept, 5.0);
    }
}
