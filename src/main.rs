use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use uuid::Uuid;

mod attainment;
mod config;
mod db;
mod error;
mod models;
mod report;
mod snapshot;
mod store;
mod telemetry;

use attainment::AttainmentCalculator;
use config::AppConfig;
use models::{
    BlendWeights, CourseCoAttainment, CourseSummary, OutcomeAttainment, PoAttainment, StudentScope,
};
use store::AttainmentStore;

#[derive(Parser)]
#[command(name = "obe-attainment")]
#[command(about = "Course and program outcome attainment for outcome based education", long_about = None)]
struct Cli {
    /// Read from a JSON snapshot instead of Postgres
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo program, course and marks
    Seed,
    /// Import marks from a CSV file (roll_no,question_id,marks)
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Attainment of one course outcome by one student
    Student {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        course: Uuid,
        #[arg(long)]
        co: Uuid,
    },
    /// Attainment levels for every outcome of a course
    Course {
        #[arg(long)]
        course: Uuid,
        #[arg(long)]
        section: Option<Uuid>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Average, maximum and head count for each assessment of a course
    Assessments {
        #[arg(long)]
        course: Uuid,
        #[arg(long)]
        section: Option<Uuid>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Direct, indirect and overall attainment for every outcome of a program
    Program {
        #[arg(long)]
        program: Uuid,
        #[arg(long)]
        direct_weight: Option<f64>,
        #[arg(long)]
        indirect_weight: Option<f64>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Generate a markdown report
    Report {
        #[command(subcommand)]
        target: ReportTarget,
    },
}

#[derive(Subcommand)]
enum ReportTarget {
    /// Course outcome attainment for a batch or section
    Course {
        #[arg(long)]
        course: Uuid,
        #[arg(long)]
        section: Option<Uuid>,
        #[arg(long, default_value = "course-attainment.md")]
        out: PathBuf,
    },
    /// Assessment comparison for a batch or section
    Assessments {
        #[arg(long)]
        course: Uuid,
        #[arg(long)]
        section: Option<Uuid>,
        #[arg(long, default_value = "assessment-comparison.md")]
        out: PathBuf,
    },
    /// Program outcome attainment
    Program {
        #[arg(long)]
        program: Uuid,
        #[arg(long)]
        direct_weight: Option<f64>,
        #[arg(long)]
        indirect_weight: Option<f64>,
        #[arg(long, default_value = "program-attainment.md")]
        out: PathBuf,
    },
}

impl Commands {
    fn needs_database(&self) -> bool {
        matches!(
            self,
            Commands::InitDb | Commands::Seed | Commands::Import { .. }
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("invalid configuration")?;
    telemetry::init(&config.telemetry)?;

    if let Some(path) = &cli.snapshot {
        if cli.command.needs_database() {
            anyhow::bail!("this command writes to Postgres and cannot run against --snapshot");
        }
        let store = snapshot::SnapshotStore::from_json_file(path)?;
        info!(snapshot = %path.display(), "using snapshot store");
        let calculator = AttainmentCalculator::new(Arc::new(store))
            .with_max_concurrency(config.calculator.max_concurrency);
        return run_query(cli.command, &calculator, &config).await;
    }

    let database_url = config
        .database
        .url
        .clone()
        .context("DATABASE_URL must be set to a Postgres instance (or pass --snapshot)")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let written = db::import_csv(&pool, &csv).await?;
            println!("Imported {written} marks from {}.", csv.display());
        }
        command => {
            let max_concurrency = config
                .calculator
                .max_concurrency
                .min(config.database.max_connections as usize);
            let calculator = AttainmentCalculator::new(Arc::new(db::PgStore::new(pool)))
                .with_max_concurrency(max_concurrency);
            run_query(command, &calculator, &config).await?;
        }
    }

    Ok(())
}

fn blend_weights(
    config: &AppConfig,
    direct_weight: Option<f64>,
    indirect_weight: Option<f64>,
) -> BlendWeights {
    BlendWeights {
        direct: direct_weight.unwrap_or(config.calculator.weights.direct),
        indirect: indirect_weight.unwrap_or(config.calculator.weights.indirect),
    }
}

fn scope_label(course: &CourseSummary, section: Option<Uuid>) -> String {
    let scope = match section {
        Some(id) => StudentScope::Section(id),
        None => StudentScope::Batch(course.batch_id),
    };
    scope.label()
}

async fn course_summary<S: AttainmentStore + 'static>(
    calculator: &AttainmentCalculator<S>,
    course: Uuid,
) -> anyhow::Result<CourseSummary> {
    calculator
        .store()
        .course_summary(course)
        .await?
        .with_context(|| format!("course {course} not found"))
}

async fn course_rows<S: AttainmentStore + 'static>(
    calculator: &AttainmentCalculator<S>,
    course: Uuid,
    section: Option<Uuid>,
) -> anyhow::Result<Vec<OutcomeAttainment<CourseCoAttainment>>> {
    let attainments = calculator.course_co_attainments(course, section).await?;
    let outcomes = calculator.store().course_outcomes(course).await?;
    Ok(report::merge_outcomes(&outcomes, attainments, |a| a.co_id))
}

async fn program_rows<S: AttainmentStore + 'static>(
    calculator: &AttainmentCalculator<S>,
    program: Uuid,
    weights: BlendWeights,
) -> anyhow::Result<Vec<OutcomeAttainment<PoAttainment>>> {
    let attainments = if weights == BlendWeights::default() {
        calculator.program_po_attainments(program).await?
    } else {
        calculator
            .program_po_attainments_with(program, weights)
            .await?
    };
    let outcomes = calculator.store().program_outcomes(program).await?;
    Ok(report::merge_outcomes(&outcomes, attainments, |a| a.po_id))
}

async fn run_query<S: AttainmentStore + 'static>(
    command: Commands,
    calculator: &AttainmentCalculator<S>,
    config: &AppConfig,
) -> anyhow::Result<()> {
    match command {
        Commands::InitDb | Commands::Seed | Commands::Import { .. } => {
            anyhow::bail!("this command needs a Postgres connection");
        }
        Commands::Student {
            student,
            course,
            co,
        } => {
            let percentage = calculator
                .student_co_attainment(student, course, co)
                .await?;
            println!("Student {student} attains {percentage:.2}% on outcome {co}.");
        }
        Commands::Course {
            course,
            section,
            format,
        } => {
            let rows = course_rows(calculator, course, section).await?;
            match format {
                OutputFormat::Json => {
                    let body = json!({
                        "courseId": course,
                        "sectionId": section,
                        "coAttainments": rows,
                    });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                OutputFormat::Text if rows.is_empty() => {
                    println!("No course outcomes found for this course.");
                }
                OutputFormat::Text => {
                    println!("Course outcome attainment:");
                    for row in &rows {
                        println!(
                            "- {} level {} ({:.2}% meeting target, {}/{} students)",
                            row.code,
                            row.attainment.attainment_level.value(),
                            row.attainment.percentage_meeting_target,
                            row.attainment.students_meeting_target,
                            row.attainment.total_students
                        );
                    }
                }
            }
        }
        Commands::Assessments {
            course,
            section,
            format,
        } => {
            let stats = calculator.assessment_stats(course, section).await?;
            match format {
                OutputFormat::Json => {
                    let body = json!({
                        "courseId": course,
                        "sectionId": section,
                        "assessmentStats": stats,
                    });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                OutputFormat::Text if stats.is_empty() => {
                    println!("No assessments recorded for this course.");
                }
                OutputFormat::Text => {
                    println!("Assessment comparison:");
                    for stat in &stats {
                        println!(
                            "- {} average {:.2}/{:.2} ({}/{} students scored)",
                            stat.name,
                            stat.average_score,
                            stat.max_score,
                            stat.students_scored,
                            stat.student_count
                        );
                    }
                }
            }
        }
        Commands::Program {
            program,
            direct_weight,
            indirect_weight,
            format,
        } => {
            let weights = blend_weights(config, direct_weight, indirect_weight);
            let rows = program_rows(calculator, program, weights).await?;
            match format {
                OutputFormat::Json => {
                    let body = json!({
                        "programId": program,
                        "poAttainments": rows,
                    });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                OutputFormat::Text if rows.is_empty() => {
                    println!("No program outcomes found for this program.");
                }
                OutputFormat::Text => {
                    println!("Program outcome attainment:");
                    for row in &rows {
                        println!(
                            "- {} overall {:.2} (direct {:.2}, indirect {:.2})",
                            row.code,
                            row.attainment.overall_attainment,
                            row.attainment.direct_attainment,
                            row.attainment.indirect_attainment
                        );
                    }
                }
            }
        }
        Commands::Report { target } => match target {
            ReportTarget::Course {
                course,
                section,
                out,
            } => {
                let summary = course_summary(calculator, course).await?;
                let rows = course_rows(calculator, course, section).await?;
                let scope = scope_label(&summary, section);
                let report =
                    report::build_course_report(&summary, &scope, &rows, chrono::Utc::now());
                std::fs::write(&out, report)?;
                info!(%course, rows = rows.len(), "course report written");
                println!("Report written to {}.", out.display());
            }
            ReportTarget::Assessments {
                course,
                section,
                out,
            } => {
                let summary = course_summary(calculator, course).await?;
                let stats = calculator.assessment_stats(course, section).await?;
                let scope = scope_label(&summary, section);
                let report =
                    report::build_assessment_report(&summary, &scope, &stats, chrono::Utc::now());
                std::fs::write(&out, report)?;
                info!(%course, assessments = stats.len(), "assessment report written");
                println!("Report written to {}.", out.display());
            }
            ReportTarget::Program {
                program,
                direct_weight,
                indirect_weight,
                out,
            } => {
                let weights = blend_weights(config, direct_weight, indirect_weight);
                let summary = calculator
                    .store()
                    .program_summary(program)
                    .await?
                    .with_context(|| format!("program {program} not found"))?;
                let rows = program_rows(calculator, program, weights).await?;
                let report =
                    report::build_program_report(&summary, weights, &rows, chrono::Utc::now());
                std::fs::write(&out, report)?;
                info!(%program, rows = rows.len(), "program report written");
                println!("Report written to {}.", out.display());
            }
        },
    }

    Ok(())
}
