use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

mod classifier;
mod concepts;
mod db;
mod mastery;
mod models;
mod pathway;
mod performance;

use models::Trigger;

#[derive(Parser)]
#[command(name = "pathway-mastery-engine")]
#[command(about = "Learning pathway determination and concept mastery engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import activity records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Evaluate a learner and persist the resulting pathway
    Evaluate {
        #[arg(long)]
        email: String,
        #[arg(long, value_enum, default_value_t = Trigger::Manual)]
        trigger: Trigger,
    },
    /// Show the learner's current active pathway
    Pathway {
        #[arg(long)]
        email: String,
    },
    /// Show recent pathway evaluations for a learner
    History {
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Show the learner's concept mastery profile
    Mastery {
        #[arg(long)]
        email: String,
        /// Restrict output to one concept (case-insensitive)
        #[arg(long)]
        concept: Option<String>,
    },
}

async fn resolve_student(pool: &PgPool, email: &str) -> anyhow::Result<Uuid> {
    db::find_student_by_email(pool, email)
        .await?
        .with_context(|| format!("no student with email {email}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
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
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} activities from {}.", csv.display());
        }
        Commands::Evaluate { email, trigger } => {
            let student_id = resolve_student(&pool, &email).await?;
            let outcome = pathway::evaluate(&pool, student_id, trigger).await?;
            let path = &outcome.path;

            println!(
                "Pathway for {}: {} (trigger {}, generated {})",
                email,
                path.pathway_type.as_str(),
                path.trigger.as_str(),
                outcome.generated_at.to_rfc3339()
            );
            println!(
                "  average score {:.2}, task completion {:.2}",
                path.average_score, path.task_completion_rate
            );
            match path.previous_pathway {
                Some(previous) => println!("  previous pathway: {}", previous.as_str()),
                None => println!("  first evaluation for this learner"),
            }
            println!("  tags: {}", path.recommended_tags.join(", "));
            println!("Recommendations:");
            for rec in &outcome.recommendations {
                println!(
                    "- [{}] {} ({}): {}",
                    rec.priority.as_str(),
                    rec.title,
                    rec.kind,
                    rec.description
                );
            }
        }
        Commands::Pathway { email } => {
            let student_id = resolve_student(&pool, &email).await?;
            match pathway::get_current_pathway(&pool, student_id).await? {
                None => println!("No active pathway for {email}."),
                Some(path) => {
                    println!(
                        "{}: {} since {} (avg score {:.2}, completion {:.2})",
                        email,
                        path.pathway_type.as_str(),
                        path.calculated_at.to_rfc3339(),
                        path.average_score,
                        path.task_completion_rate
                    );
                    if path.pathway_history.is_empty() {
                        println!("  no pathway changes on record");
                    }
                    for entry in &path.pathway_history {
                        println!(
                            "  {} -> {} on {}: {}",
                            entry.from.as_str(),
                            entry.to.as_str(),
                            entry.changed_at.to_rfc3339(),
                            entry.reason
                        );
                    }
                }
            }
        }
        Commands::History { email, limit } => {
            let student_id = resolve_student(&pool, &email).await?;
            let paths = pathway::get_pathway_history(&pool, student_id, limit).await?;

            if paths.is_empty() {
                println!("No evaluations on record for {email}.");
            } else {
                println!("Evaluations for {email} (newest first):");
                for path in &paths {
                    println!(
                        "- {} at {} (trigger {}, avg {:.2}{})",
                        path.pathway_type.as_str(),
                        path.calculated_at.to_rfc3339(),
                        path.trigger.as_str(),
                        path.average_score,
                        if path.is_active { ", active" } else { "" }
                    );
                }
            }
        }
        Commands::Mastery { email, concept } => {
            let student_id = resolve_student(&pool, &email).await?;

            match concept {
                Some(name) => {
                    match pathway::get_concept_mastery_by_name(&pool, student_id, &name).await {
                        None => println!("No mastery record for concept '{name}'."),
                        Some(record) => {
                            println!(
                                "{}: {:.2}% ({})",
                                record.concept_name,
                                record.mastery_percentage,
                                record.mastery_level.as_str()
                            );
                            println!(
                                "  attempts {}, engagements {}, sources: {}",
                                record.total_attempts,
                                record.engagement_count,
                                record
                                    .sources
                                    .iter()
                                    .map(|s| s.as_str())
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            );
                        }
                    }
                }
                None => {
                    let summary = pathway::get_concept_mastery(&pool, student_id).await;
                    println!(
                        "Mastery for {}: {} concepts, average {:.2}%",
                        email, summary.total_concepts, summary.average_mastery
                    );
                    for record in &summary.concepts {
                        println!(
                            "- {}: {:.2}% ({}), {} attempts",
                            record.concept_name,
                            record.mastery_percentage,
                            record.mastery_level.as_str(),
                            record.total_attempts
                        );
                    }
                }
            }
        }
    }

    Ok(())
}
