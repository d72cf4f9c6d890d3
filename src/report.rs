use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{AssessmentKind, EvaluationResult, StudentEvaluation, StudentSnapshot};
use crate::scoring;

/// Display label; SBAC bands read as "Standard Met" and so on.
pub fn level_label(result: &EvaluationResult) -> Option<String> {
    let label = result.label?;
    Some(match result.kind {
        AssessmentKind::Sbac => format!("Standard {label}"),
        _ => label.to_string(),
    })
}

pub fn format_score(score: Option<f64>) -> String {
    match score {
        Some(value) if value.fract() == 0.0 => format!("{value:.0}"),
        Some(value) => format!("{value:.1}"),
        None => "not entered".to_string(),
    }
}

pub fn status_line(evaluation: &StudentEvaluation) -> String {
    let composite = &evaluation.composite;
    if composite.eligible {
        let count = composite.other_assessments_met_count;
        format!(
            "Ready to reclassify: ELPAC Level 4 and {count} other assessment{}",
            if count > 1 { "s" } else { "" }
        )
    } else if composite.mandatory_met {
        "Not yet qualifying: ELPAC Level 4 met, one other assessment still needed".to_string()
    } else if composite.other_assessments_met_count > 0 {
        "Not yet qualifying: ELPAC Level 4 is still required".to_string()
    } else {
        "Not yet qualifying: needs ELPAC Level 4 plus one other assessment".to_string()
    }
}

pub fn build_report(
    snapshot: &StudentSnapshot,
    evaluation: &StudentEvaluation,
    generated_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();
    let inputs = &snapshot.inputs;
    let name = if snapshot.student_name.trim().is_empty() {
        "Unnamed student"
    } else {
        snapshot.student_name.trim()
    };

    let _ = writeln!(output, "# Road to Reclassification");
    let _ = writeln!(
        output,
        "Prepared for {} (grade {}, cycle {}) on {}",
        name,
        inputs.grade,
        inputs.cycle,
        generated_at.format("%Y-%m-%d")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Status");
    let _ = writeln!(output, "{}", status_line(evaluation));
    let _ = writeln!(
        output,
        "Overall progress: {:.0}%",
        evaluation.composite.overall_progress_percent
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## ELPAC (required)");
    let mandatory = &evaluation.mandatory;
    match mandatory.normalized_score {
        Some(_) => {
            let _ = writeln!(
                output,
                "- Overall {} from oral {} and written {} (tested in grade {})",
                format_score(mandatory.normalized_score),
                inputs.scores.elpac_oral.trim(),
                inputs.scores.elpac_written.trim(),
                inputs.elpac_test_grade
            );
            let _ = writeln!(
                output,
                "- {} (Level 4 starts at {:.0})",
                level_label(mandatory).unwrap_or_else(|| "Level undetermined".to_string()),
                mandatory.target
            );
            if let Some(points) = evaluation.elpac_points.filter(|p| p.points_needed > 0.0) {
                let _ = writeln!(
                    output,
                    "- {:.0} overall points needed: {:.0} more on each of oral and written, or {:.0} on one part alone",
                    points.points_needed,
                    points.balanced_per_component,
                    points.total_component_points
                );
            }
        }
        None => {
            let _ = writeln!(output, "No ELPAC overall score yet; enter both oral and written scores.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Other Assessments");
    if evaluation.others.is_empty() {
        let _ = writeln!(output, "No other assessments are configured.");
    }
    for result in &evaluation.others {
        let mut line = format!(
            "- {}: {} (target {:.0})",
            result.kind.display_name(),
            format_score(result.normalized_score),
            result.target
        );
        if let Some(label) = level_label(result) {
            let _ = write!(line, ", {label}");
        }
        if result.meets {
            line.push_str(", met");
        } else if result.is_entered() {
            let _ = write!(
                line,
                ", {:.0} points short ({:.0}% of target)",
                result.shortfall_points, result.progress_percent
            );
        }
        let _ = writeln!(output, "{line}");
    }

    if !evaluation.composite.eligible {
        let candidates = std::iter::once(&evaluation.mandatory).chain(evaluation.others.iter());
        if let Some(closest) = scoring::closest_to_target(candidates) {
            let _ = writeln!(output);
            let _ = writeln!(output, "## Closest Next Step");
            let _ = writeln!(
                output,
                "{} is {:.0} points from its target.",
                closest.kind.display_name(),
                closest.shortfall_points
            );
        }
    }

    if !evaluation.warnings.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Entry Warnings");
        for warning in &evaluation.warnings {
            let _ = writeln!(
                output,
                "- {} value {:?} was ignored (valid range {:.0}-{:.0})",
                warning.field, warning.raw, warning.valid_range.min, warning.valid_range.max
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Grade, RawScores, StudentInputs};
    use crate::scoring::evaluate_student;

    fn snapshot(scores: RawScores) -> StudentSnapshot {
        StudentSnapshot {
            student_name: "Maya Ortiz".to_string(),
            inputs: StudentInputs {
                grade: Grade::Seventh,
                scores,
                ..StudentInputs::default()
            },
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn report_for_eligible_student() {
        let snapshot = snapshot(RawScores {
            elpac_oral: "1600".to_string(),
            elpac_written: "1600".to_string(),
            sbac: "2600".to_string(),
            ..RawScores::default()
        });
        let evaluation = evaluate_student(&snapshot.inputs, &AssessmentKind::OTHERS);
        let report = build_report(&snapshot, &evaluation, Utc::now());

        assert!(report.contains("Prepared for Maya Ortiz (grade 7, cycle 1)"));
        assert!(report.contains("Ready to reclassify: ELPAC Level 4 and 1 other assessment\n"));
        assert!(report.contains("Overall progress: 100%"));
        assert!(report.contains("- SBAC ELA: 2600 (target 2479), Standard Met, met"));
        assert!(report.contains("- i-Ready Reading: not entered (target 562)"));
        assert!(!report.contains("Closest Next Step"));
    }

    #[test]
    fn status_counts_every_met_assessment() {
        let snapshot = snapshot(RawScores {
            elpac_oral: "1600".to_string(),
            elpac_written: "1600".to_string(),
            sbac: "2600".to_string(),
            i_ready: "570".to_string(),
            ..RawScores::default()
        });
        let evaluation = evaluate_student(&snapshot.inputs, &AssessmentKind::OTHERS);
        assert_eq!(
            status_line(&evaluation),
            "Ready to reclassify: ELPAC Level 4 and 2 other assessments"
        );
        let report = build_report(&snapshot, &evaluation, Utc::now());
        assert!(report.contains("- i-Ready Reading: 570 (target 562), met"));
    }

    #[test]
    fn report_points_at_closest_gap() {
        let snapshot = snapshot(RawScores {
            elpac_oral: "1560".to_string(),
            elpac_written: "1540".to_string(),
            i_ready: "550".to_string(),
            edcite_a: "20".to_string(),
            ..RawScores::default()
        });
        let evaluation = evaluate_student(&snapshot.inputs, &AssessmentKind::OTHERS);
        let report = build_report(&snapshot, &evaluation, Utc::now());

        assert!(report.contains("needs ELPAC Level 4 plus one other assessment"));
        assert!(report.contains(
            "- 26 overall points needed: 26 more on each of oral and written, or 52 on one part alone"
        ));
        assert!(report.contains("- i-Ready Reading: 550 (target 562), 12 points short (98% of target)"));
        assert!(report.contains("ELPAC Overall is 26 points from its target."));
    }

    #[test]
    fn report_lists_ignored_entries() {
        let snapshot = snapshot(RawScores {
            elpac_oral: "1600".to_string(),
            sbac: "9999".to_string(),
            ..RawScores::default()
        });
        let evaluation = evaluate_student(&snapshot.inputs, &AssessmentKind::OTHERS);
        let report = build_report(&snapshot, &evaluation, Utc::now());

        assert!(report.contains("No ELPAC overall score yet"));
        assert!(report.contains("- sbac value \"9999\" was ignored (valid range 2260-2810)"));
    }

    #[test]
    fn scores_render_without_trailing_zeroes() {
        assert_eq!(format_score(Some(562.0)), "562");
        assert_eq!(format_score(Some(562.5)), "562.5");
        assert_eq!(format_score(None), "not entered");
    }
}
