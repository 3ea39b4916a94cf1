//! Assessment records and their validated inputs
//!
//! Global invariants enforced:
//! - ABC components are integers in [1,5]; anything else is rejected on ingestion
//! - Magnitude and priority are derived once, at construction
//! - Records are never mutated after construction

use crate::error::{Result, RiskError};
use crate::risk::{self, Priority, UncertaintyLevel};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Validated probability (A), loss of value (B), and fraction affected (C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AbcScore {
    #[serde(rename = "probability")]
    a: u8,
    #[serde(rename = "loss_of_value")]
    b: u8,
    #[serde(rename = "fraction_affected")]
    c: u8,
}

impl AbcScore {
    pub fn new(a: i32, b: i32, c: i32) -> Result<Self> {
        risk::magnitude(a, b, c)?;
        Ok(AbcScore {
            a: a as u8,
            b: b as u8,
            c: c as u8,
        })
    }

    /// Build from untyped numeric input, rejecting fractional values
    pub fn from_f64(a: f64, b: f64, c: f64) -> Result<Self> {
        let a = integral_component('A', a)?;
        let b = integral_component('B', b)?;
        let c = integral_component('C', c)?;
        AbcScore::new(a, b, c)
    }

    pub fn probability(&self) -> u8 {
        self.a
    }

    pub fn loss_of_value(&self) -> u8 {
        self.b
    }

    pub fn fraction_affected(&self) -> u8 {
        self.c
    }

    pub fn magnitude(&self) -> u8 {
        self.a + self.b + self.c
    }
}

fn integral_component(component: char, value: f64) -> Result<i32> {
    if value.is_finite() && value.fract() == 0.0 && (1.0..=5.0).contains(&value) {
        Ok(value as i32)
    } else {
        Err(RiskError::InvalidComponent { component, value })
    }
}

/// Closed set of threat categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThreatType {
    Weathering,
    #[serde(alias = "tourism_pressure")]
    TourismPressure,
    Flooding,
    #[serde(alias = "urban_development")]
    UrbanDevelopment,
    Earthquake,
    Vegetation,
    Looting,
    Conflict,
    #[serde(alias = "climate_change")]
    ClimateChange,
    Fire,
    Pollution,
}

impl ThreatType {
    pub const ALL: [ThreatType; 11] = [
        ThreatType::Weathering,
        ThreatType::TourismPressure,
        ThreatType::Flooding,
        ThreatType::UrbanDevelopment,
        ThreatType::Earthquake,
        ThreatType::Vegetation,
        ThreatType::Looting,
        ThreatType::Conflict,
        ThreatType::ClimateChange,
        ThreatType::Fire,
        ThreatType::Pollution,
    ];

    /// Machine slug, e.g. `tourism-pressure`
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatType::Weathering => "weathering",
            ThreatType::TourismPressure => "tourism-pressure",
            ThreatType::Flooding => "flooding",
            ThreatType::UrbanDevelopment => "urban-development",
            ThreatType::Earthquake => "earthquake",
            ThreatType::Vegetation => "vegetation",
            ThreatType::Looting => "looting",
            ThreatType::Conflict => "conflict",
            ThreatType::ClimateChange => "climate-change",
            ThreatType::Fire => "fire",
            ThreatType::Pollution => "pollution",
        }
    }

    /// Display label, e.g. `Tourism Pressure`
    pub fn label(&self) -> String {
        humanize(self.as_str())
    }
}

impl fmt::Display for ThreatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreatType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        ThreatType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("unknown threat type: {}", s))
    }
}

/// Turn a slug like `climate-change` into `Climate Change`
pub fn humanize(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// One assessor's ABC judgement of a threat at a site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAssessment", rename_all = "snake_case")]
pub struct RiskAssessment {
    site_id: String,
    threat_type: ThreatType,
    #[serde(flatten)]
    abc: AbcScore,
    magnitude: u8,
    priority: Priority,
    uncertainty_level: UncertaintyLevel,
    assessment_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assessor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
}

impl RiskAssessment {
    pub fn new(
        site_id: impl Into<String>,
        threat_type: ThreatType,
        abc: AbcScore,
        uncertainty_level: UncertaintyLevel,
        assessment_date: DateTime<Utc>,
    ) -> Self {
        let magnitude = abc.magnitude();
        RiskAssessment {
            site_id: site_id.into(),
            threat_type,
            abc,
            magnitude,
            priority: risk::base_priority(magnitude),
            uncertainty_level,
            assessment_date,
            assessor: None,
            notes: None,
        }
    }

    pub fn with_assessor(mut self, assessor: impl Into<String>) -> Self {
        self.assessor = Some(assessor.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn threat_type(&self) -> ThreatType {
        self.threat_type
    }

    pub fn abc(&self) -> AbcScore {
        self.abc
    }

    pub fn magnitude(&self) -> u8 {
        self.magnitude
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn uncertainty_level(&self) -> UncertaintyLevel {
        self.uncertainty_level
    }

    pub fn assessment_date(&self) -> DateTime<Utc> {
        self.assessment_date
    }

    /// UTC calendar day the assessment falls on
    pub fn assessment_day(&self) -> NaiveDate {
        self.assessment_date.date_naive()
    }

    pub fn assessor(&self) -> Option<&str> {
        self.assessor.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}

/// Wire form accepted from assessment sources before validation.
///
/// Components arrive as plain numbers so that fractional values can be
/// reported as invalid components rather than as parse failures.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
struct RawAssessment {
    #[serde(alias = "siteId")]
    site_id: String,
    #[serde(alias = "threatType")]
    threat_type: ThreatType,
    probability: f64,
    #[serde(alias = "lossOfValue")]
    loss_of_value: f64,
    #[serde(alias = "fractionAffected")]
    fraction_affected: f64,
    #[serde(default)]
    magnitude: Option<i64>,
    // Derived on construction; a supplied label is not trusted.
    #[serde(default)]
    #[allow(dead_code)]
    priority: Option<Priority>,
    #[serde(alias = "uncertaintyLevel")]
    uncertainty_level: UncertaintyLevel,
    #[serde(alias = "assessmentDate")]
    assessment_date: DateTime<Utc>,
    #[serde(default)]
    assessor: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

impl TryFrom<RawAssessment> for RiskAssessment {
    type Error = RiskError;

    fn try_from(raw: RawAssessment) -> Result<Self> {
        let abc = AbcScore::from_f64(raw.probability, raw.loss_of_value, raw.fraction_affected)?;

        if let Some(supplied) = raw.magnitude {
            risk::check_magnitude(supplied)?;
            if supplied != i64::from(abc.magnitude()) {
                return Err(RiskError::InvalidMagnitude(supplied));
            }
        }

        let mut assessment = RiskAssessment::new(
            raw.site_id,
            raw.threat_type,
            abc,
            raw.uncertainty_level,
            raw.assessment_date,
        );
        assessment.assessor = raw.assessor.filter(|s| !s.is_empty());
        assessment.notes = raw.notes.filter(|s| !s.is_empty());
        Ok(assessment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_new_derives_magnitude_and_priority() {
        let assessment = RiskAssessment::new(
            "petra",
            ThreatType::Flooding,
            AbcScore::new(4, 5, 3).unwrap(),
            UncertaintyLevel::Low,
            date(1),
        )
        .with_assessor("J. Doe");

        assert_eq!(assessment.magnitude(), 12);
        assert_eq!(assessment.priority(), Priority::VeryHigh);
        assert_eq!(assessment.assessor(), Some("J. Doe"));
        assert_eq!(assessment.notes(), None);
    }

    #[test]
    fn test_threat_labels() {
        assert_eq!(ThreatType::TourismPressure.label(), "Tourism Pressure");
        assert_eq!(ThreatType::ClimateChange.label(), "Climate Change");
        assert_eq!(ThreatType::Fire.label(), "Fire");
        assert_eq!(humanize("urban_development"), "Urban Development");
        assert_eq!(humanize(""), "");
    }

    #[test]
    fn test_threat_from_str_accepts_variants() {
        assert_eq!(
            "tourism-pressure".parse::<ThreatType>(),
            Ok(ThreatType::TourismPressure)
        );
        assert_eq!(
            "Climate_Change".parse::<ThreatType>(),
            Ok(ThreatType::ClimateChange)
        );
        assert!("meteor".parse::<ThreatType>().is_err());
    }

    #[test]
    fn test_deserialize_validates_components() {
        let json = r#"{
            "site_id": "petra",
            "threat_type": "weathering",
            "probability": 6,
            "loss_of_value": 3,
            "fraction_affected": 2,
            "uncertainty_level": "low",
            "assessment_date": "2024-03-01T10:00:00Z"
        }"#;
        let err = serde_json::from_str::<RiskAssessment>(json).unwrap_err();
        assert!(err.to_string().contains("invalid ABC component A"));
    }

    #[test]
    fn test_deserialize_rejects_fractional_component() {
        let json = r#"{
            "site_id": "petra",
            "threat_type": "weathering",
            "probability": 3,
            "loss_of_value": 2.5,
            "fraction_affected": 2,
            "uncertainty_level": "low",
            "assessment_date": "2024-03-01T10:00:00Z"
        }"#;
        let err = serde_json::from_str::<RiskAssessment>(json).unwrap_err();
        assert!(err.to_string().contains("invalid ABC component B"));
    }

    #[test]
    fn test_deserialize_rejects_inconsistent_magnitude() {
        let json = r#"{
            "siteId": "petra",
            "threatType": "looting",
            "probability": 3,
            "lossOfValue": 3,
            "fractionAffected": 3,
            "magnitude": 10,
            "uncertaintyLevel": "high",
            "assessmentDate": "2024-03-01T10:00:00Z"
        }"#;
        let err = serde_json::from_str::<RiskAssessment>(json).unwrap_err();
        assert!(err.to_string().contains("invalid magnitude 10"));
    }

    #[test]
    fn test_serialize_then_deserialize_preserves_record() {
        let assessment = RiskAssessment::new(
            "angkor",
            ThreatType::Vegetation,
            AbcScore::new(2, 3, 4).unwrap(),
            UncertaintyLevel::Medium,
            date(5),
        )
        .with_notes("root intrusion at east gallery");

        let json = serde_json::to_string(&assessment).unwrap();
        assert!(json.contains("\"probability\":2"));
        assert!(json.contains("\"priority\":\"high\""));
        let parsed: RiskAssessment = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, assessment);
    }
}
