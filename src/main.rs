use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use sqlx::SqlitePool;
use tracing_subscriber::EnvFilter;

use reclassification::config::Config;
use reclassification::models::{
    AssessmentKind, Cycle, DataExport, Grade, RawScores, StudentEvaluation, StudentInputs,
    StudentSnapshot,
};
use reclassification::{db, report, roster, scoring, thresholds};

#[derive(Parser)]
#[command(name = "reclass")]
#[command(about = "Track a student's progress toward English-learner reclassification", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, default_value = "reclass.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct ScoreArgs {
    #[arg(long, default_value = "7")]
    grade: Grade,
    #[arg(long, default_value = "1")]
    cycle: Cycle,
    /// Grade in which ELPAC was taken (defaults to --grade)
    #[arg(long)]
    elpac_grade: Option<Grade>,
    #[arg(long)]
    oral: Option<String>,
    #[arg(long)]
    written: Option<String>,
    #[arg(long)]
    sbac: Option<String>,
    #[arg(long)]
    iready: Option<String>,
    #[arg(long)]
    edcite_a: Option<String>,
    #[arg(long)]
    edcite_b: Option<String>,
}

impl ScoreArgs {
    fn into_inputs(self) -> StudentInputs {
        StudentInputs {
            grade: self.grade,
            cycle: self.cycle,
            elpac_test_grade: self.elpac_grade.unwrap_or(self.grade),
            scores: RawScores {
                elpac_oral: self.oral.unwrap_or_default(),
                elpac_written: self.written.unwrap_or_default(),
                sbac: self.sbac.unwrap_or_default(),
                i_ready: self.iready.unwrap_or_default(),
                edcite_a: self.edcite_a.unwrap_or_default(),
                edcite_b: self.edcite_b.unwrap_or_default(),
            },
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Evaluate scores without saving them
    Evaluate {
        #[command(flatten)]
        scores: ScoreArgs,
        #[arg(long)]
        json: bool,
    },
    /// Save scores as the current snapshot and append them to history
    Save {
        #[arg(long, default_value = "")]
        name: String,
        #[command(flatten)]
        scores: ScoreArgs,
    },
    /// Evaluate the current snapshot
    Show {
        #[arg(long)]
        json: bool,
    },
    /// List saved history entries
    History {
        /// Only entries where this assessment was entered
        #[arg(long)]
        assessment: Option<AssessmentKind>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Remove the current snapshot
    Clear {
        /// Also remove the history log
        #[arg(long)]
        history: bool,
    },
    /// Write a JSON backup of the snapshot and history
    Export {
        #[arg(long, default_value = "reclassification-backup.json")]
        out: PathBuf,
    },
    /// Restore the snapshot and/or history carried by a JSON backup
    Import {
        #[arg(long)]
        file: PathBuf,
    },
    /// Generate a markdown report for the current snapshot
    Report {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Evaluate a roster CSV and write one result row per student
    Batch {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "results.csv")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("reclassification=info".parse()?)
                .add_directive("reclass=info".parse()?),
        )
        .init();

    thresholds::validate_all().context("built-in threshold tables are inconsistent")?;

    let cli = Cli::parse();
    let config = Config::load(&cli.config);
    let active = config.active_others();
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| config.database.url.clone());
    let max_history = config.history.max_entries;

    match cli.command {
        Commands::InitDb => {
            open_store(&database_url).await?;
            println!("Schema ready.");
        }
        Commands::Evaluate { scores, json } => {
            let evaluation = scoring::evaluate_student(&scores.into_inputs(), &active);
            print_evaluation(&evaluation, json)?;
        }
        Commands::Save { name, scores } => {
            let pool = open_store(&database_url).await?;
            let snapshot = StudentSnapshot {
                student_name: name,
                inputs: scores.into_inputs(),
                last_updated: Utc::now(),
            };
            db::save_current(&pool, &snapshot).await?;
            let entry = db::append_history(&pool, &snapshot, max_history).await?;
            tracing::info!(id = %entry.id, "snapshot saved");

            let evaluation = scoring::evaluate_student(&snapshot.inputs, &active);
            println!("Saved at {}.", snapshot.last_updated.format("%Y-%m-%d %H:%M:%S"));
            print_evaluation(&evaluation, false)?;
        }
        Commands::Show { json } => {
            let pool = open_store(&database_url).await?;
            match db::load_current(&pool).await? {
                Some(snapshot) => {
                    let evaluation = scoring::evaluate_student(&snapshot.inputs, &active);
                    if !json {
                        println!(
                            "{} (last updated {})",
                            display_name(&snapshot),
                            snapshot.last_updated.format("%Y-%m-%d %H:%M:%S")
                        );
                    }
                    print_evaluation(&evaluation, json)?;
                }
                None => println!("No saved snapshot."),
            }
        }
        Commands::History { assessment, limit } => {
            let pool = open_store(&database_url).await?;
            let entries = match assessment {
                Some(kind) => db::history_for(&pool, kind).await?,
                None => db::load_history(&pool).await?,
            };

            if entries.is_empty() {
                println!("No history entries.");
                return Ok(());
            }

            let skip = entries.len().saturating_sub(limit);
            for entry in entries.iter().skip(skip) {
                let evaluation = scoring::evaluate_student(&entry.snapshot.inputs, &active);
                println!(
                    "- {} {}: ELPAC {} | {} other met | progress {:.0}%{}",
                    entry.recorded_at.format("%Y-%m-%d %H:%M"),
                    display_name(&entry.snapshot),
                    report::format_score(evaluation.mandatory.normalized_score),
                    evaluation.composite.other_assessments_met_count,
                    evaluation.composite.overall_progress_percent,
                    if evaluation.composite.eligible {
                        " | eligible"
                    } else {
                        ""
                    }
                );
            }
        }
        Commands::Clear { history } => {
            let pool = open_store(&database_url).await?;
            let removed = db::clear_current(&pool).await?;
            println!(
                "{}",
                if removed {
                    "Current snapshot cleared."
                } else {
                    "No current snapshot to clear."
                }
            );
            if history {
                let count = db::clear_history(&pool).await?;
                println!("Removed {count} history entries.");
            }
        }
        Commands::Export { out } => {
            let pool = open_store(&database_url).await?;
            let data = db::export_all(&pool).await?;
            let json = serde_json::to_string_pretty(&data)?;
            std::fs::write(&out, json)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!(
                "Exported {} history entries to {}.",
                data.history.as_ref().map_or(0, Vec::len),
                out.display()
            );
        }
        Commands::Import { file } => {
            let pool = open_store(&database_url).await?;
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let data: DataExport = serde_json::from_str(&contents)
                .with_context(|| format!("{} is not a reclassification backup", file.display()))?;
            let kept = db::import_all(&pool, &data, max_history).await?;
            if data.current.is_some() {
                println!("Restored the current snapshot from {}.", file.display());
            }
            match data.history {
                Some(_) => println!("Imported {kept} history entries from {}.", file.display()),
                None => println!("Backup has no history; existing history kept."),
            }
        }
        Commands::Report { out } => {
            let pool = open_store(&database_url).await?;
            let snapshot = db::load_current(&pool)
                .await?
                .context("no saved snapshot; run `reclass save` first")?;
            let evaluation = scoring::evaluate_student(&snapshot.inputs, &active);
            let text = report::build_report(&snapshot, &evaluation, Utc::now());
            match out {
                Some(path) => {
                    std::fs::write(&path, text)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Report written to {}.", path.display());
                }
                None => print!("{text}"),
            }
        }
        Commands::Batch { csv, out } => {
            let input = std::fs::File::open(&csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let results = roster::evaluate_roster(input, &active)?;
            let output = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            roster::write_results(output, &results)?;

            let eligible = results.iter().filter(|r| r.eligible).count();
            println!(
                "Evaluated {} students ({} eligible); results written to {}.",
                results.len(),
                eligible,
                out.display()
            );
        }
    }

    Ok(())
}

async fn open_store(database_url: &str) -> anyhow::Result<SqlitePool> {
    let pool = db::connect(database_url).await?;
    db::init_db(&pool)
        .await
        .context("failed to apply database migrations")?;
    Ok(pool)
}

fn display_name(snapshot: &StudentSnapshot) -> &str {
    let name = snapshot.student_name.trim();
    if name.is_empty() {
        "Unnamed student"
    } else {
        name
    }
}

fn print_evaluation(evaluation: &StudentEvaluation, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(evaluation)?);
        return Ok(());
    }

    println!("{}", report::status_line(evaluation));
    println!(
        "Overall progress: {:.0}%",
        evaluation.composite.overall_progress_percent
    );
    for result in std::iter::once(&evaluation.mandatory).chain(evaluation.others.iter()) {
        let level = report::level_label(result)
            .map(|label| format!(" [{label}]"))
            .unwrap_or_default();
        println!(
            "- {}: {}{} target {:.0}, {:.0}%{}",
            result.kind.display_name(),
            report::format_score(result.normalized_score),
            level,
            result.target,
            result.progress_percent,
            if result.meets { ", met" } else { "" }
        );
    }
    for warning in &evaluation.warnings {
        tracing::warn!(
            field = warning.field,
            "ignored {:?}: outside {}-{} or not a number",
            warning.raw,
            warning.valid_range.min,
            warning.valid_range.max
        );
    }
    Ok(())
}
