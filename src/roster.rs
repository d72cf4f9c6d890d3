use std::io::{Read, Write};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::{AssessmentKind, Cycle, Grade, RawScores, StudentInputs};
use crate::scoring::evaluate_student;

#[derive(Debug, Deserialize)]
struct RosterRow {
    student_name: String,
    grade: Grade,
    #[serde(default)]
    cycle: Option<Cycle>,
    #[serde(default)]
    elpac_test_grade: Option<Grade>,
    #[serde(default)]
    elpac_oral: String,
    #[serde(default)]
    elpac_written: String,
    #[serde(default)]
    sbac: String,
    #[serde(default)]
    i_ready: String,
    #[serde(default)]
    edcite_a: String,
    #[serde(default)]
    edcite_b: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RosterResult {
    pub student_name: String,
    pub grade: u8,
    pub elpac_overall: Option<f64>,
    pub elpac_level: Option<String>,
    pub elpac_met: bool,
    pub other_assessments_met: usize,
    pub eligible: bool,
    pub overall_progress: f64,
    pub warnings: usize,
}

impl RosterRow {
    fn into_inputs(self) -> (String, StudentInputs) {
        let inputs = StudentInputs {
            grade: self.grade,
            cycle: self.cycle.unwrap_or(Cycle::First),
            elpac_test_grade: self.elpac_test_grade.unwrap_or(self.grade),
            scores: RawScores {
                elpac_oral: self.elpac_oral,
                elpac_written: self.elpac_written,
                sbac: self.sbac,
                i_ready: self.i_ready,
                edcite_a: self.edcite_a,
                edcite_b: self.edcite_b,
            },
        };
        (self.student_name, inputs)
    }
}

/// Evaluates every roster row. A row that cannot be parsed aborts the run
/// with its line number.
pub fn evaluate_roster<R: Read>(
    reader: R,
    active_others: &[AssessmentKind],
) -> anyhow::Result<Vec<RosterResult>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut results = Vec::new();

    for (index, row) in reader.deserialize::<RosterRow>().enumerate() {
        let row = row.with_context(|| format!("invalid roster row {}", index + 2))?;
        let (student_name, inputs) = row.into_inputs();
        let evaluation = evaluate_student(&inputs, active_others);

        results.push(RosterResult {
            student_name,
            grade: inputs.grade.number(),
            elpac_overall: evaluation.mandatory.normalized_score,
            elpac_level: evaluation.mandatory.label.map(str::to_string),
            elpac_met: evaluation.composite.mandatory_met,
            other_assessments_met: evaluation.composite.other_assessments_met_count,
            eligible: evaluation.composite.eligible,
            overall_progress: (evaluation.composite.overall_progress_percent * 10.0).round() / 10.0,
            warnings: evaluation.warnings.len(),
        });
    }

    tracing::info!(students = results.len(), "roster evaluated");
    Ok(results)
}

pub fn write_results<W: Write>(writer: W, results: &[RosterResult]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for result in results {
        writer.serialize(result)?;
    }
    writer.flush()?;
    Ok(())
}
