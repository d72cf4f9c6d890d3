use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("unsupported grade {0} (use 7 or 8)")]
    UnsupportedGrade(String),
    #[error("unsupported cycle {0} (use 1 or 2)")]
    UnsupportedCycle(String),
    #[error("unknown assessment {0:?} (use elpac, sbac, i-ready, edcite-a or edcite-b)")]
    UnknownAssessment(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Grade {
    Seventh,
    Eighth,
}

impl Grade {
    pub fn number(self) -> u8 {
        match self {
            Grade::Seventh => 7,
            Grade::Eighth => 8,
        }
    }
}

impl TryFrom<u8> for Grade {
    type Error = ModelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            7 => Ok(Grade::Seventh),
            8 => Ok(Grade::Eighth),
            other => Err(ModelError::UnsupportedGrade(other.to_string())),
        }
    }
}

impl From<Grade> for u8 {
    fn from(grade: Grade) -> Self {
        grade.number()
    }
}

impl FromStr for Grade {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u8 = s
            .trim()
            .parse()
            .map_err(|_| ModelError::UnsupportedGrade(s.to_string()))?;
        Grade::try_from(value)
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Testing window; only i-Ready cutoffs depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Cycle {
    First,
    Second,
}

impl Cycle {
    pub fn number(self) -> u8 {
        match self {
            Cycle::First => 1,
            Cycle::Second => 2,
        }
    }
}

impl TryFrom<u8> for Cycle {
    type Error = ModelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Cycle::First),
            2 => Ok(Cycle::Second),
            other => Err(ModelError::UnsupportedCycle(other.to_string())),
        }
    }
}

impl From<Cycle> for u8 {
    fn from(cycle: Cycle) -> Self {
        cycle.number()
    }
}

impl FromStr for Cycle {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u8 = s
            .trim()
            .parse()
            .map_err(|_| ModelError::UnsupportedCycle(s.to_string()))?;
        Cycle::try_from(value)
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssessmentKind {
    Elpac,
    Sbac,
    IReady,
    EdciteA,
    EdciteB,
}

impl AssessmentKind {
    /// Every assessment that can satisfy the second gate.
    pub const OTHERS: [AssessmentKind; 4] = [
        AssessmentKind::Sbac,
        AssessmentKind::IReady,
        AssessmentKind::EdciteA,
        AssessmentKind::EdciteB,
    ];

    pub fn key(self) -> &'static str {
        match self {
            AssessmentKind::Elpac => "elpac",
            AssessmentKind::Sbac => "sbac",
            AssessmentKind::IReady => "i-ready",
            AssessmentKind::EdciteA => "edcite-a",
            AssessmentKind::EdciteB => "edcite-b",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            AssessmentKind::Elpac => "ELPAC Overall",
            AssessmentKind::Sbac => "SBAC ELA",
            AssessmentKind::IReady => "i-Ready Reading",
            AssessmentKind::EdciteA => "Edcite A",
            AssessmentKind::EdciteB => "Edcite B",
        }
    }
}

impl FromStr for AssessmentKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elpac" => Ok(AssessmentKind::Elpac),
            "sbac" => Ok(AssessmentKind::Sbac),
            "i-ready" | "iready" => Ok(AssessmentKind::IReady),
            "edcite-a" | "edcitea" => Ok(AssessmentKind::EdciteA),
            "edcite-b" | "edciteb" => Ok(AssessmentKind::EdciteB),
            _ => Err(ModelError::UnknownAssessment(s.to_string())),
        }
    }
}

impl fmt::Display for AssessmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Inclusive score range accepted for an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValidRange {
    pub min: f64,
    pub max: f64,
}

impl ValidRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && score <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Band {
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
    pub meets: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssessmentDefinition {
    SingleCutoff {
        cutoff: f64,
        valid_range: ValidRange,
    },
    BandedLevels {
        bands: &'static [Band],
        valid_range: ValidRange,
    },
}

impl AssessmentDefinition {
    pub fn valid_range(&self) -> ValidRange {
        match self {
            AssessmentDefinition::SingleCutoff { valid_range, .. }
            | AssessmentDefinition::BandedLevels { valid_range, .. } => *valid_range,
        }
    }

    /// Lowest score that meets the requirement.
    pub fn target(&self) -> f64 {
        match self {
            AssessmentDefinition::SingleCutoff { cutoff, .. } => *cutoff,
            AssessmentDefinition::BandedLevels { bands, valid_range } => bands
                .iter()
                .find(|band| band.meets)
                .map(|band| band.min)
                .unwrap_or(valid_range.max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub label: &'static str,
    pub meets: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputStatus {
    Empty,
    Valid,
    OutOfRange,
    NotNumeric,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputWarning {
    pub field: &'static str,
    pub raw: String,
    pub status: InputStatus,
    pub valid_range: ValidRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub kind: AssessmentKind,
    pub normalized_score: Option<f64>,
    pub label: Option<&'static str>,
    pub meets: bool,
    pub target: f64,
    pub shortfall_points: f64,
    pub progress_percent: f64,
}

impl EvaluationResult {
    pub fn is_entered(&self) -> bool {
        self.normalized_score.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeEligibility {
    pub mandatory_met: bool,
    pub other_assessments_met_count: usize,
    pub eligible: bool,
    pub overall_progress_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsNeeded {
    pub points_needed: f64,
    /// Raise needed on a single part when the other stays put.
    pub total_component_points: f64,
    /// Raise needed on each part when both improve equally.
    pub balanced_per_component: f64,
}

/// Raw entries as typed by the student; an empty string is "not entered".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawScores {
    pub elpac_oral: String,
    pub elpac_written: String,
    pub sbac: String,
    pub i_ready: String,
    pub edcite_a: String,
    pub edcite_b: String,
}

impl RawScores {
    /// Raw entry for a single-value assessment. ELPAC has two parts and
    /// reports the oral part here.
    pub fn get(&self, kind: AssessmentKind) -> &str {
        match kind {
            AssessmentKind::Elpac => &self.elpac_oral,
            AssessmentKind::Sbac => &self.sbac,
            AssessmentKind::IReady => &self.i_ready,
            AssessmentKind::EdciteA => &self.edcite_a,
            AssessmentKind::EdciteB => &self.edcite_b,
        }
    }

    pub fn has_entry(&self, kind: AssessmentKind) -> bool {
        match kind {
            AssessmentKind::Elpac => {
                !self.elpac_oral.trim().is_empty() || !self.elpac_written.trim().is_empty()
            }
            other => !self.get(other).trim().is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInputs {
    pub grade: Grade,
    pub cycle: Cycle,
    /// Grade at which ELPAC was administered; selects the ELPAC table.
    pub elpac_test_grade: Grade,
    pub scores: RawScores,
}

impl Default for StudentInputs {
    fn default() -> Self {
        Self {
            grade: Grade::Seventh,
            cycle: Cycle::First,
            elpac_test_grade: Grade::Seventh,
            scores: RawScores::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentEvaluation {
    pub mandatory: EvaluationResult,
    pub others: Vec<EvaluationResult>,
    pub composite: CompositeEligibility,
    pub elpac_points: Option<PointsNeeded>,
    pub warnings: Vec<InputWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSnapshot {
    pub student_name: String,
    #[serde(flatten)]
    pub inputs: StudentInputs,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub snapshot: StudentSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataExport {
    #[serde(default)]
    pub current: Option<StudentSnapshot>,
    #[serde(default)]
    pub history: Option<Vec<HistoryEntry>>,
    pub exported_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_parses_supported_values_only() {
        assert_eq!("7".parse::<Grade>(), Ok(Grade::Seventh));
        assert_eq!(" 8 ".parse::<Grade>(), Ok(Grade::Eighth));
        assert!(matches!(
            "6".parse::<Grade>(),
            Err(ModelError::UnsupportedGrade(_))
        ));
        assert!("seventh".parse::<Grade>().is_err());
    }

    #[test]
    fn cycle_round_trips_through_number() {
        assert_eq!(Cycle::try_from(2).map(u8::from), Ok(2));
        assert!(Cycle::try_from(3).is_err());
    }

    #[test]
    fn assessment_kind_accepts_loose_spellings() {
        assert_eq!("iReady".parse::<AssessmentKind>(), Ok(AssessmentKind::IReady));
        assert_eq!("EDCITE-B".parse::<AssessmentKind>(), Ok(AssessmentKind::EdciteB));
        assert!("map".parse::<AssessmentKind>().is_err());
    }

    #[test]
    fn banded_target_is_first_passing_band() {
        const BANDS: &[Band] = &[
            Band {
                label: "low",
                min: 0.0,
                max: 9.0,
                meets: false,
            },
            Band {
                label: "high",
                min: 10.0,
                max: 20.0,
                meets: true,
            },
        ];
        let def = AssessmentDefinition::BandedLevels {
            bands: BANDS,
            valid_range: ValidRange::new(0.0, 20.0),
        };
        assert_eq!(def.target(), 10.0);
    }

    #[test]
    fn snapshot_json_uses_flat_camel_case_keys() {
        let snapshot = StudentSnapshot {
            student_name: "Maya Ortiz".to_string(),
            inputs: StudentInputs::default(),
            last_updated: DateTime::parse_from_rfc3339("2026-02-02T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["studentName"], "Maya Ortiz");
        assert_eq!(value["grade"], 7);
        assert_eq!(value["elpacTestGrade"], 7);
        assert_eq!(value["scores"]["iReady"], "");

        let back: StudentSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, snapshot);
    }
}
