//! Assessment sources
//!
//! The engine only reads assessments. Anything that can produce validated
//! `RiskAssessment` records (a JSON export, an in-memory log, a database
//! adapter, a demo generator) plugs in behind [`AssessmentSource`].

use crate::assessment::RiskAssessment;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Supplier of assessment records
pub trait AssessmentSource {
    /// Load every available assessment
    fn load(&self) -> Result<Vec<RiskAssessment>>;
}

/// JSON array of assessment records on disk
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileSource { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AssessmentSource for JsonFileSource {
    fn load(&self) -> Result<Vec<RiskAssessment>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read assessments: {}", self.path.display()))?;
        let assessments: Vec<RiskAssessment> = serde_json::from_str(&content)
            .with_context(|| format!("invalid assessments in: {}", self.path.display()))?;
        tracing::debug!(
            path = %self.path.display(),
            count = assessments.len(),
            "loaded assessments"
        );
        Ok(assessments)
    }
}

/// Append-only in-memory assessment store with copy-on-read snapshots
///
/// `snapshot()` hands out the current immutable slice. `append()` builds a
/// new slice and swaps it in, so a snapshot taken before an append never
/// observes it.
#[derive(Debug)]
pub struct AssessmentLog {
    records: RwLock<Arc<[RiskAssessment]>>,
}

impl Default for AssessmentLog {
    fn default() -> Self {
        AssessmentLog {
            records: RwLock::new(Arc::from(Vec::new())),
        }
    }
}

impl AssessmentLog {
    pub fn new() -> Self {
        AssessmentLog::default()
    }

    /// Current contents; unaffected by later appends
    pub fn snapshot(&self) -> Arc<[RiskAssessment]> {
        let guard = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn append(&self, assessment: RiskAssessment) {
        self.extend(std::iter::once(assessment));
    }

    pub fn extend(&self, assessments: impl IntoIterator<Item = RiskAssessment>) {
        let mut guard = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let mut next: Vec<RiskAssessment> = guard.to_vec();
        next.extend(assessments);
        *guard = Arc::from(next);
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AssessmentSource for AssessmentLog {
    fn load(&self) -> Result<Vec<RiskAssessment>> {
        Ok(self.snapshot().to_vec())
    }
}

impl FromIterator<RiskAssessment> for AssessmentLog {
    fn from_iter<I: IntoIterator<Item = RiskAssessment>>(iter: I) -> Self {
        let records: Vec<RiskAssessment> = iter.into_iter().collect();
        AssessmentLog {
            records: RwLock::new(Arc::from(records)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::{AbcScore, ThreatType};
    use crate::risk::UncertaintyLevel;
    use chrono::{TimeZone, Utc};

    fn record(day: u32) -> RiskAssessment {
        RiskAssessment::new(
            "petra",
            ThreatType::Earthquake,
            AbcScore::new(2, 2, 2).unwrap(),
            UncertaintyLevel::Low,
            Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_snapshot_is_isolated_from_appends() {
        let log: AssessmentLog = [record(1), record(2)].into_iter().collect();
        let before = log.snapshot();

        log.append(record(3));

        assert_eq!(before.len(), 2);
        assert_eq!(log.snapshot().len(), 3);
        assert_eq!(log.load().unwrap().len(), 3);
    }

    #[test]
    fn test_empty_log() {
        let log = AssessmentLog::new();
        assert!(log.is_empty());
        assert!(log.load().unwrap().is_empty());
    }

    #[test]
    fn test_json_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assessments.json");
        let json = serde_json::to_string(&vec![record(1), record(2)]).unwrap();
        std::fs::write(&path, json).unwrap();

        let loaded = JsonFileSource::new(&path).load().unwrap();
        assert_eq!(loaded, vec![record(1), record(2)]);
    }

    #[test]
    fn test_json_file_source_reports_invalid_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assessments.json");
        std::fs::write(
            &path,
            r#"[{"site_id": "petra", "threat_type": "fire", "probability": 0,
                "loss_of_value": 1, "fraction_affected": 1,
                "uncertainty_level": "low", "assessment_date": "2024-01-01T00:00:00Z"}]"#,
        )
        .unwrap();

        let err = JsonFileSource::new(&path).load().unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("invalid assessments in"));
        assert!(message.contains("invalid ABC component A"));
    }
}
