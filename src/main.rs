use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod error;
mod grading;
mod models;
mod ranking;
mod report;
mod server;

use report::{ReportParams, ReportRequest, ReportScope};

#[derive(Parser)]
#[command(name = "term-report")]
#[command(about = "End of term grading and class ranking for school reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Scope {
    /// Class level, e.g. S5
    #[arg(long)]
    class_level: String,
    /// Term number (1-3) or "Term N"
    #[arg(long)]
    term: String,
    /// Defaults to the current calendar year
    #[arg(long)]
    year: Option<i32>,
    #[arg(long)]
    stream: Option<String>,
    /// Restrict output to one student; overrides --stream
    #[arg(long)]
    student_id: Option<i64>,
    /// insertion, student-id or shared
    #[arg(long)]
    tie_break: Option<String>,
}

impl Scope {
    fn request(&self) -> anyhow::Result<ReportRequest> {
        let params = ReportParams {
            year: self.year,
            term: Some(self.term.clone()),
            class_level: Some(self.class_level.clone()),
            stream: self.stream.clone(),
            student_id: self.student_id,
            tie_break: self.tie_break.clone(),
        };
        Ok(ReportRequest::from_params(&params)?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a small sample school
    Seed,
    /// Import mark submissions from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print ranked A-Level rows as JSON
    Report {
        #[command(flatten)]
        scope: Scope,
    },
    /// Print ranked O-Level rows as JSON
    Olevel {
        #[command(flatten)]
        scope: Scope,
    },
    /// Write a markdown report card for one student
    Card {
        #[command(flatten)]
        scope: Scope,
        #[arg(long, default_value = "report-card.md")]
        out: PathBuf,
    },
    /// Serve the report API over HTTP
    Serve {
        /// Overrides REPORT_PORT
        #[arg(long)]
        port: Option<u16>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let written = db::seed(&pool).await?;
            println!("Seeded {written} marks.");
        }
        Commands::Import { csv } => {
            let written = db::import_csv(&pool, &csv).await?;
            println!("Stored {written} marks from {}.", csv.display());
        }
        Commands::Report { scope } => {
            let request = scope.request()?;
            let rows =
                db::fetch_alevel_marks(&pool, &request.class_level, &request.term, request.year)
                    .await?;
            let ranked = report::assemble_alevel(&rows, &request.scope, request.tie_break);
            println!("{}", serde_json::to_string_pretty(&ranked)?);
        }
        Commands::Olevel { scope } => {
            let request = scope.request()?;
            let rows =
                db::fetch_olevel_marks(&pool, &request.class_level, &request.term, request.year)
                    .await?;
            let ranked = report::assemble_olevel(&rows, &request.scope, request.tie_break);
            for (remark, count) in report::summarize_remarks(&ranked) {
                info!(remark = remark.as_str(), count, "remark tally");
            }
            println!("{}", serde_json::to_string_pretty(&ranked)?);
        }
        Commands::Card { scope, out } => {
            let request = scope.request()?;
            if !matches!(request.scope, ReportScope::Student(_)) {
                anyhow::bail!("--student-id is required for a report card");
            }
            let rows =
                db::fetch_alevel_marks(&pool, &request.class_level, &request.term, request.year)
                    .await?;
            let ranked = report::assemble_alevel(&rows, &request.scope, request.tie_break);
            let card = report::build_report_card(&request.term, request.year, &ranked);
            std::fs::write(&out, card)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report card written to {}.", out.display());
        }
        Commands::Serve { port } => {
            let state = server::AppState { pool };
            server::serve(state, port.unwrap_or(config.port)).await?;
        }
    }

    Ok(())
}
