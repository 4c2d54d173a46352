use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

mod benchmarks;
mod db;
mod models;
mod narrative;
mod recommend;
mod report;
mod tier;
mod trend;

use benchmarks::BenchmarkTable;
use models::{Grade, Tier, TimeOfYear};

#[derive(Parser)]
#[command(name = "literacy-screening")]
#[command(about = "Benchmark screening and early warning for literacy assessment", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load deterministic fixture data
    Seed,
    /// Import completed score observations from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List the available subtest instruments
    Subtests,
    /// Classify one raw score against the benchmark table
    Classify {
        #[arg(long)]
        key: String,
        #[arg(long)]
        grade: Grade,
        #[arg(long)]
        window: TimeOfYear,
        #[arg(long)]
        score: f64,
    },
    /// Score a narrative retell transcript from a file or a stored session
    #[command(group(
        ArgGroup::new("source")
            .args(["file", "session"])
            .required(true)
            .multiple(false)
    ))]
    Analyze {
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        session: Option<Uuid>,
    },
    /// Summarize MTSS support tiers across the roster
    #[command(group(
        ArgGroup::new("scope")
            .args(["grade", "school"])
            .multiple(false)
    ))]
    Tiers {
        #[arg(long)]
        grade: Option<String>,
        #[arg(long)]
        school: Option<String>,
    },
    /// List students flagged for declining performance
    #[command(group(
        ArgGroup::new("scope")
            .args(["grade", "school"])
            .multiple(false)
    ))]
    AtRisk {
        #[arg(long)]
        grade: Option<String>,
        #[arg(long)]
        school: Option<String>,
    },
    /// Show a student's support tier for each assessment window
    TierHistory {
        #[arg(long)]
        student: Uuid,
    },
    /// Toggle a student on or off the watchlist
    Watch {
        #[arg(long)]
        student: Uuid,
    },
    /// Generate a markdown report
    #[command(group(
        ArgGroup::new("scope")
            .args(["grade", "school"])
            .multiple(false)
    ))]
    Report {
        #[arg(long)]
        grade: Option<String>,
        #[arg(long)]
        school: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let table = BenchmarkTable::builtin()?;
            let pool = connect().await?;
            db::seed(&pool, &table).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let table = BenchmarkTable::builtin()?;
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, &csv, &table).await?;
            println!("Inserted {inserted} scores from {}.", csv.display());
        }
        Commands::Subtests => {
            for info in benchmarks::SUBTESTS {
                let grades: Vec<&str> = info.grades.iter().map(|grade| grade.as_str()).collect();
                println!(
                    "{} [{}] {}: grades {}, targets {}",
                    info.id,
                    info.category,
                    info.name,
                    grades.join("/"),
                    info.targets.join(", ")
                );
            }
        }
        Commands::Classify {
            key,
            grade,
            window,
            score,
        } => {
            let table = BenchmarkTable::builtin()?;
            match table.classify(&key, grade, window, score) {
                Some(level) => println!(
                    "{key} grade {grade} {window} score {score}: {level} (tier {})",
                    level.tier()
                ),
                None => println!("No benchmark data for {key} grade {grade} {window}."),
            }
        }
        Commands::Analyze { file, session } => {
            let transcript = match (file, session) {
                (Some(path), _) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, Some(session_id)) => {
                    let pool = connect().await?;
                    db::fetch_transcript(&pool, session_id)
                        .await?
                        .with_context(|| format!("session {session_id} has no stored transcript"))?
                }
                (None, None) => anyhow::bail!("provide --file or --session"),
            };

            let analyzer = narrative::TranscriptAnalyzer::with_builtin_lexicon()?;
            match analyzer.analyze(&transcript) {
                Some(analysis) => println!("{}", serde_json::to_string_pretty(&analysis)?),
                None => println!("Transcript is empty or still a placeholder; nothing to score."),
            }
        }
        Commands::Tiers { grade, school } => {
            let pool = connect().await?;
            let students = db::fetch_students(&pool, grade.as_deref(), school.as_deref()).await?;
            let observations =
                db::fetch_observations(&pool, grade.as_deref(), school.as_deref()).await?;
            let by_student = db::group_by_student(observations);

            let tiers: Vec<Tier> = students
                .iter()
                .filter_map(|student| {
                    by_student
                        .get(&student.id)
                        .and_then(|observations| tier::student_tier(observations).ok())
                })
                .collect();
            let summary = tier::tier_summary(&tiers);

            println!(
                "Tier 1 (general instruction): {} ({:.1}%)",
                summary.tier1.count, summary.tier1.pct
            );
            println!(
                "Tier 2 (targeted support): {} ({:.1}%)",
                summary.tier2.count, summary.tier2.pct
            );
            println!(
                "Tier 3 (intensive support): {} ({:.1}%)",
                summary.tier3.count, summary.tier3.pct
            );
            println!(
                "{} of {} students have classifiable scores.",
                summary.total,
                students.len()
            );
        }
        Commands::AtRisk { grade, school } => {
            let pool = connect().await?;
            let students = db::fetch_students(&pool, grade.as_deref(), school.as_deref()).await?;
            let observations =
                db::fetch_observations(&pool, grade.as_deref(), school.as_deref()).await?;
            let by_student = db::group_by_student(observations);

            let alerts = trend::at_risk_report(&students, &by_student);
            if alerts.is_empty() {
                println!("No students currently flagged.");
                return Ok(());
            }

            for alert in &alerts {
                println!(
                    "- {} (grade {}) probability {} (current risk {}): {}",
                    alert.student_name,
                    alert.grade,
                    alert.probability,
                    alert.current_risk,
                    alert.contributing_factors.join("; ")
                );
                for score in &alert.latest_scores {
                    let raw = score
                        .raw_score
                        .map(|value| value.to_string())
                        .unwrap_or_else(|| "n/a".to_string());
                    let risk = score
                        .risk_level
                        .map(|level| level.as_str())
                        .unwrap_or("unclassified");
                    println!("    {} = {raw} ({risk})", score.key);
                }
            }
        }
        Commands::TierHistory { student } => {
            let pool = connect().await?;
            let observations = db::fetch_observations(&pool, None, None).await?;
            let mine: Vec<_> = observations
                .into_iter()
                .filter(|obs| obs.student_id == student)
                .collect();

            let history = tier::tier_history(&mine);
            if history.is_empty() {
                println!("No classifiable scores for student {student}.");
            } else {
                for entry in history {
                    println!(
                        "{} {}: tier {}",
                        entry.academic_year, entry.time_of_year, entry.tier
                    );
                }
            }
        }
        Commands::Watch { student } => {
            let pool = connect().await?;
            if db::toggle_watchlist(&pool, student).await? {
                println!("Student {student} added to the watchlist.");
            } else {
                println!("Student {student} removed from the watchlist.");
            }
        }
        Commands::Report { grade, school, out } => {
            let pool = connect().await?;
            let students = db::fetch_students(&pool, grade.as_deref(), school.as_deref()).await?;
            let observations =
                db::fetch_observations(&pool, grade.as_deref(), school.as_deref()).await?;
            let by_student = db::group_by_student(observations);
            let watchlist = db::watchlisted_students(&pool).await?;

            let scope = grade.as_deref().or(school.as_deref());
            let report = report::build_report(scope, &students, &by_student, &watchlist);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}
