use crate::models::{AssessmentDefinition, AssessmentKind, Band, Cycle, Grade, ValidRange};

/// Range of each ELPAC component (oral, written) and of the overall score.
pub const ELPAC_PART_RANGE: ValidRange = ValidRange::new(1150.0, 1900.0);
pub const IREADY_RANGE: ValidRange = ValidRange::new(100.0, 800.0);
pub const EDCITE_RANGE: ValidRange = ValidRange::new(0.0, 100.0);

const ELPAC_GRADE_7: &[Band] = &[
    band("Level 1", 1150.0, 1480.0, false),
    band("Level 2", 1481.0, 1526.0, false),
    band("Level 3", 1527.0, 1575.0, false),
    band("Level 4", 1576.0, 1900.0, true),
];

const ELPAC_GRADE_8: &[Band] = &[
    band("Level 1", 1150.0, 1485.0, false),
    band("Level 2", 1486.0, 1533.0, false),
    band("Level 3", 1534.0, 1589.0, false),
    band("Level 4", 1590.0, 1900.0, true),
];

const SBAC_GRADE_7: &[Band] = &[
    band("Not Met", 2260.0, 2478.0, false),
    band("Nearly Met", 2479.0, 2551.0, true),
    band("Met", 2552.0, 2648.0, true),
    band("Exceeded", 2649.0, 2810.0, true),
];

const SBAC_GRADE_8: &[Band] = &[
    band("Not Met", 2290.0, 2486.0, false),
    band("Nearly Met", 2487.0, 2566.0, true),
    band("Met", 2567.0, 2667.0, true),
    band("Exceeded", 2668.0, 2850.0, true),
];

const fn band(label: &'static str, min: f64, max: f64, meets: bool) -> Band {
    Band {
        label,
        min,
        max,
        meets,
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TableError {
    #[error("{table}: band table is empty")]
    Empty { table: String },
    #[error("{table}: band {label} has min {min} above max {max}")]
    Inverted {
        table: String,
        label: &'static str,
        min: f64,
        max: f64,
    },
    #[error("{table}: bands span {start}..={end} but the valid range is {min}..={max}")]
    NotExhaustive {
        table: String,
        start: f64,
        end: f64,
        min: f64,
        max: f64,
    },
    #[error("{table}: band {label} starts at {min}, expected {expected}")]
    NotContiguous {
        table: String,
        label: &'static str,
        min: f64,
        expected: f64,
    },
    #[error("{table}: band {label} does not meet after a passing band")]
    MeetsRegresses { table: String, label: &'static str },
}

pub fn elpac_bands(test_grade: Grade) -> &'static [Band] {
    match test_grade {
        Grade::Seventh => ELPAC_GRADE_7,
        Grade::Eighth => ELPAC_GRADE_8,
    }
}

pub fn sbac_bands(grade: Grade) -> &'static [Band] {
    match grade {
        Grade::Seventh => SBAC_GRADE_7,
        Grade::Eighth => SBAC_GRADE_8,
    }
}

pub fn iready_cutoff(grade: Grade, cycle: Cycle) -> f64 {
    match (grade, cycle) {
        (Grade::Seventh, Cycle::First) => 562.0,
        (Grade::Seventh, Cycle::Second) => 567.0,
        (Grade::Eighth, _) => 567.0,
    }
}

pub fn edcite_a_cutoff(grade: Grade) -> f64 {
    match grade {
        Grade::Seventh => 40.0,
        Grade::Eighth => 41.0,
    }
}

pub fn edcite_b_cutoff(grade: Grade) -> f64 {
    match grade {
        Grade::Seventh => 38.0,
        Grade::Eighth => 42.0,
    }
}

/// Definition of `kind` for a student. For ELPAC, `grade` is the grade at
/// which the test was administered.
pub fn definition(kind: AssessmentKind, grade: Grade, cycle: Cycle) -> AssessmentDefinition {
    match kind {
        AssessmentKind::Elpac => AssessmentDefinition::BandedLevels {
            bands: elpac_bands(grade),
            valid_range: ELPAC_PART_RANGE,
        },
        AssessmentKind::Sbac => {
            let bands = sbac_bands(grade);
            AssessmentDefinition::BandedLevels {
                bands,
                valid_range: band_extent(bands),
            }
        }
        AssessmentKind::IReady => AssessmentDefinition::SingleCutoff {
            cutoff: iready_cutoff(grade, cycle),
            valid_range: IREADY_RANGE,
        },
        AssessmentKind::EdciteA => AssessmentDefinition::SingleCutoff {
            cutoff: edcite_a_cutoff(grade),
            valid_range: EDCITE_RANGE,
        },
        AssessmentKind::EdciteB => AssessmentDefinition::SingleCutoff {
            cutoff: edcite_b_cutoff(grade),
            valid_range: EDCITE_RANGE,
        },
    }
}

/// Lowest overall ELPAC score at Level 4 for the test grade.
pub fn elpac_level4_min(test_grade: Grade) -> f64 {
    definition(AssessmentKind::Elpac, test_grade, Cycle::First).target()
}

pub fn band_extent(bands: &[Band]) -> ValidRange {
    match (bands.first(), bands.last()) {
        (Some(first), Some(last)) => ValidRange::new(first.min, last.max),
        _ => ValidRange::new(0.0, 0.0),
    }
}

pub fn validate_bands(table: &str, bands: &[Band], range: ValidRange) -> Result<(), TableError> {
    if bands.is_empty() {
        return Err(TableError::Empty {
            table: table.to_string(),
        });
    }

    let extent = band_extent(bands);
    if extent != range {
        return Err(TableError::NotExhaustive {
            table: table.to_string(),
            start: extent.min,
            end: extent.max,
            min: range.min,
            max: range.max,
        });
    }

    let mut passed = false;
    for (i, band) in bands.iter().enumerate() {
        if band.min > band.max {
            return Err(TableError::Inverted {
                table: table.to_string(),
                label: band.label,
                min: band.min,
                max: band.max,
            });
        }
        if i > 0 {
            let expected = bands[i - 1].max + 1.0;
            if band.min != expected {
                return Err(TableError::NotContiguous {
                    table: table.to_string(),
                    label: band.label,
                    min: band.min,
                    expected,
                });
            }
        }
        if passed && !band.meets {
            return Err(TableError::MeetsRegresses {
                table: table.to_string(),
                label: band.label,
            });
        }
        passed |= band.meets;
    }

    Ok(())
}

/// Checks every shipped band table.
pub fn validate_all() -> Result<(), TableError> {
    for grade in [Grade::Seventh, Grade::Eighth] {
        for kind in [AssessmentKind::Elpac, AssessmentKind::Sbac] {
            if let AssessmentDefinition::BandedLevels { bands, valid_range } =
                definition(kind, grade, Cycle::First)
            {
                validate_bands(&format!("{kind} grade {grade}"), bands, valid_range)?;
            }
        }
    }
    Ok(())
}
