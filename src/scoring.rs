use crate::models::{
    AssessmentDefinition, AssessmentKind, Band, Classification, CompositeEligibility,
    EvaluationResult, Grade, InputStatus, InputWarning, PointsNeeded, StudentEvaluation,
    StudentInputs, ValidRange,
};
use crate::thresholds::{self, ELPAC_PART_RANGE};

/// Weight of each gate in the overall progress percentage.
const GATE_WEIGHT: f64 = 50.0;

pub fn input_status(raw: &str, range: ValidRange) -> InputStatus {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return InputStatus::Empty;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => {
            if range.contains(value) {
                InputStatus::Valid
            } else {
                InputStatus::OutOfRange
            }
        }
        _ => InputStatus::NotNumeric,
    }
}

/// Parses a raw entry. Anything that is not an in-range number is unset.
pub fn normalize(raw: &str, range: ValidRange) -> Option<f64> {
    match input_status(raw, range) {
        InputStatus::Valid => raw.trim().parse().ok(),
        _ => None,
    }
}

pub fn normalize_value(value: f64, range: ValidRange) -> Option<f64> {
    (value.is_finite() && range.contains(value)).then_some(value)
}

pub fn classify(score: Option<f64>, bands: &[Band]) -> Option<Classification> {
    let score = score?;
    bands
        .iter()
        .find(|band| band.min <= score && score <= band.max)
        .map(|band| Classification {
            label: band.label,
            meets: band.meets,
        })
}

pub fn meets_threshold(score: Option<f64>, cutoff: f64) -> bool {
    score.is_some_and(|score| score >= cutoff)
}

/// ELPAC overall score: mean of the two parts, rounded half up.
pub fn combine_parts(oral: Option<f64>, written: Option<f64>) -> Option<f64> {
    let oral = normalize_value(oral?, ELPAC_PART_RANGE)?;
    let written = normalize_value(written?, ELPAC_PART_RANGE)?;
    Some(((oral + written) / 2.0).round())
}

pub fn progress(score: Option<f64>, target: f64) -> f64 {
    let Some(score) = score else {
        return 0.0;
    };
    if target.is_nan() || target <= 0.0 || score <= 0.0 {
        return 0.0;
    }
    if score >= target {
        return 100.0;
    }
    (score / target * 100.0).clamp(0.0, 100.0)
}

/// Points still missing; an unset score still owes the whole target.
pub fn shortfall(score: Option<f64>, target: f64) -> f64 {
    match score {
        Some(score) => (target - score).max(0.0),
        None => target.max(0.0),
    }
}

pub fn elpac_points_needed(overall: f64, test_grade: Grade) -> PointsNeeded {
    let points_needed = (thresholds::elpac_level4_min(test_grade) - overall).max(0.0);
    PointsNeeded {
        points_needed,
        total_component_points: points_needed * 2.0,
        balanced_per_component: points_needed.ceil(),
    }
}

pub fn evaluate_assessment(
    kind: AssessmentKind,
    score: Option<f64>,
    definition: &AssessmentDefinition,
) -> EvaluationResult {
    let target = definition.target();
    let (label, meets) = match definition {
        AssessmentDefinition::BandedLevels { bands, .. } => match classify(score, bands) {
            Some(class) => (Some(class.label), class.meets),
            None => (None, false),
        },
        AssessmentDefinition::SingleCutoff { cutoff, .. } => {
            (None, meets_threshold(score, *cutoff))
        }
    };

    EvaluationResult {
        kind,
        normalized_score: score,
        label,
        meets,
        target,
        shortfall_points: shortfall(score, target),
        progress_percent: progress(score, target),
    }
}

/// Combines the mandatory gate with the any-one-of-others gate.
pub fn evaluate(
    mandatory: Option<&EvaluationResult>,
    others: &[EvaluationResult],
) -> CompositeEligibility {
    let mandatory_met = mandatory.is_some_and(|result| result.meets);
    let other_assessments_met_count = others.iter().filter(|result| result.meets).count();
    let eligible = mandatory_met && other_assessments_met_count > 0;

    let overall_progress_percent = if eligible {
        100.0
    } else {
        let mandatory_progress = mandatory.map_or(0.0, |result| result.progress_percent);
        let best_other_progress = others
            .iter()
            .filter(|result| result.is_entered())
            .map(|result| result.progress_percent)
            .fold(0.0, f64::max);

        let mandatory_part = if mandatory_met {
            GATE_WEIGHT
        } else {
            mandatory_progress * 0.5
        };
        let other_part = if other_assessments_met_count > 0 {
            GATE_WEIGHT
        } else {
            best_other_progress * 0.5
        };
        (mandatory_part + other_part).clamp(0.0, 100.0)
    };

    CompositeEligibility {
        mandatory_met,
        other_assessments_met_count,
        eligible,
        overall_progress_percent,
    }
}

/// Evaluates a whole student. ELPAC uses the test-grade table; the others
/// use the current grade and cycle. `active_others` lists the deployment's
/// second-gate assessments in display order.
pub fn evaluate_student(
    inputs: &StudentInputs,
    active_others: &[AssessmentKind],
) -> StudentEvaluation {
    let scores = &inputs.scores;
    let mut warnings = Vec::new();

    let oral = normalize_checked("elpac-oral", &scores.elpac_oral, ELPAC_PART_RANGE, &mut warnings);
    let written = normalize_checked(
        "elpac-written",
        &scores.elpac_written,
        ELPAC_PART_RANGE,
        &mut warnings,
    );
    let overall = combine_parts(oral, written);
    let elpac_definition =
        thresholds::definition(AssessmentKind::Elpac, inputs.elpac_test_grade, inputs.cycle);
    let mandatory = evaluate_assessment(AssessmentKind::Elpac, overall, &elpac_definition);
    let elpac_points = overall.map(|score| elpac_points_needed(score, inputs.elpac_test_grade));

    let mut seen = Vec::with_capacity(active_others.len());
    let mut others = Vec::with_capacity(active_others.len());
    for &kind in active_others {
        if kind == AssessmentKind::Elpac || seen.contains(&kind) {
            continue;
        }
        seen.push(kind);

        let definition = thresholds::definition(kind, inputs.grade, inputs.cycle);
        let score = normalize_checked(
            kind.key(),
            scores.get(kind),
            definition.valid_range(),
            &mut warnings,
        );
        others.push(evaluate_assessment(kind, score, &definition));
    }

    let composite = evaluate(Some(&mandatory), &others);

    StudentEvaluation {
        mandatory,
        others,
        composite,
        elpac_points,
        warnings,
    }
}

fn normalize_checked(
    field: &'static str,
    raw: &str,
    range: ValidRange,
    warnings: &mut Vec<InputWarning>,
) -> Option<f64> {
    let status = input_status(raw, range);
    if matches!(status, InputStatus::OutOfRange | InputStatus::NotNumeric) {
        warnings.push(InputWarning {
            field,
            raw: raw.to_string(),
            status,
            valid_range: range,
        });
    }
    normalize(raw, range)
}

/// The entered, not-yet-met result with the highest progress.
pub fn closest_to_target<'a>(
    results: impl IntoIterator<Item = &'a EvaluationResult>,
) -> Option<&'a EvaluationResult> {
    results
        .into_iter()
        .filter(|result| result.is_entered() && !result.meets)
        .fold(None, |best: Option<&EvaluationResult>, current| match best {
            Some(best) if best.progress_percent >= current.progress_percent => Some(best),
            _ => Some(current),
        })
}
