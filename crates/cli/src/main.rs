mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{Config, Overrides, DEFAULT_CONFIG_FILE};
use events::EventBus;
use loki::LokiClient;
use nomad::HttpNomadClient;
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracker::{NomadEventService, RunService, TrackerError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "jobtrail")]
#[command(about = "Inspect and control Nomad job runs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[arg(long, env = "JOBTRAIL_DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "NOMAD_ADDR")]
    nomad_addr: Option<String>,

    #[arg(long, env = "NOMAD_TOKEN", hide_env_values = true)]
    nomad_token: Option<String>,

    #[arg(long, env = "LOKI_ADDR")]
    loki_addr: Option<String>,

    /// Give up on log queries after this many seconds.
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,
    /// Print the index to resume the Nomad event stream from
    LastIndex,
    /// List recorded Nomad events
    Events {
        #[arg(long)]
        handled: bool,
    },
    /// List allocations of a job
    Allocs {
        job_id: Uuid,

        /// Only the current state of each allocation
        #[arg(long)]
        latest: bool,
    },
    /// Show a run and its pending output
    Run { job_id: Uuid },
    /// List runs
    Runs {
        #[arg(long)]
        action: Option<Uuid>,
    },
    /// Fetch the logs of a job
    Logs { job_id: Uuid },
    /// Fetch the logs of one task group of an allocation
    AllocLogs { alloc_id: String, task_group: String },
    /// Stop a running job and discard its output
    Cancel { job_id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load(&cli.config).await?.apply(Overrides {
        database_url: cli.database_url,
        nomad_addr: cli.nomad_addr,
        nomad_token: cli.nomad_token,
        loki_addr: cli.loki_addr,
    });
    let timeout = cli.timeout;
    let deadline = timeout.map(|secs| Instant::now() + Duration::from_secs(secs));

    tracing::debug!(database = %config.database.url, "Connecting to database");
    let pool = db::connect(&config.database)
        .await
        .context("Failed to create database pool")?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;
            println!("Migrations applied");
            Ok(())
        }
        Commands::LastIndex => {
            let index = NomadEventService::new(pool)
                .get_last_nomad_event_index()
                .await?;
            println!("{index}");
            Ok(())
        }
        Commands::Events { handled } => {
            let events = NomadEventService::new(pool).get_by_handled(handled).await?;
            print_json(&events)
        }
        Commands::Allocs { job_id, latest } => {
            let runs = run_service(pool, &config)?;
            let allocations = if latest {
                runs.get_latest_allocations(job_id).await?
            } else {
                runs.get_allocations(job_id).await?
            };
            print_json(&allocations)
        }
        Commands::Run { job_id } => show_run(run_service(pool, &config)?, job_id).await,
        Commands::Runs { action } => {
            let runs = run_service(pool, &config)?;
            let found = match action {
                Some(action_id) => runs.get_by_action_id(action_id).await?,
                None => runs.get_all().await?,
            };
            print_json(&found)
        }
        Commands::Logs { job_id } => {
            let logs = run_service(pool, &config)?
                .job_logs(job_id, deadline)
                .await
                .map_err(|e| log_error(e, timeout))?;
            print_json(&logs)
        }
        Commands::AllocLogs {
            alloc_id,
            task_group,
        } => {
            let logs = run_service(pool, &config)?
                .run_logs(&alloc_id, &task_group, deadline)
                .await
                .map_err(|e| log_error(e, timeout))?;
            print_json(&logs)
        }
        Commands::Cancel { job_id } => cancel(run_service(pool, &config)?, job_id).await,
    }
}

fn run_service(pool: SqlitePool, config: &Config) -> Result<RunService> {
    let nomad = HttpNomadClient::new(&config.nomad).context("Failed to create Nomad client")?;
    let loki = LokiClient::new(&config.loki).context("Failed to create Loki client")?;

    let events = EventBus::new();
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(envelope) = rx.recv().await {
            tracing::info!(
                nomad_job_id = %envelope.event.nomad_job_id(),
                event = ?envelope.event,
                "Run event"
            );
        }
    });

    Ok(RunService::new(pool, Arc::new(nomad), Arc::new(loki), events))
}

async fn show_run(runs: RunService, job_id: Uuid) -> Result<()> {
    #[derive(Serialize)]
    struct RunView {
        #[serde(flatten)]
        run: jobtrail_core::Run,
        output: Option<jobtrail_core::RunOutput>,
    }

    let run = runs.get_by_nomad_job_id(job_id).await?;
    let output = match runs.get_output_by_nomad_job_id(job_id).await {
        Ok(output) => Some(output),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };

    print_json(&RunView { run, output })
}

async fn cancel(runs: RunService, job_id: Uuid) -> Result<()> {
    let run = runs.get_by_nomad_job_id(job_id).await?;
    if run.status.is_finished() {
        println!("Run {job_id} already {}", run.status.as_str());
        return Ok(());
    }

    let cancelled = runs.cancel(&run).await?;
    println!("Run {job_id} {}", cancelled.status.as_str());
    Ok(())
}

fn log_error(err: TrackerError, timeout: Option<u64>) -> anyhow::Error {
    match timeout {
        Some(secs) if err.is_cancelled() => {
            anyhow::anyhow!("Log query did not finish within {secs}s; raise --timeout to wait longer")
        }
        _ => err.into(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobtrail=info,tracker=info,loki=info,nomad=info".into()),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use loki::LokiError;

    #[test]
    fn test_log_timeout_is_reported() {
        let err = TrackerError::Logs {
            context: "Could not fetch logs".to_string(),
            source: LokiError::Cancelled,
        };
        let message = log_error(err, Some(5)).to_string();
        assert!(message.contains("within 5s"));
    }

    #[test]
    fn test_other_log_errors_pass_through() {
        let err = TrackerError::Logs {
            context: "Could not fetch logs".to_string(),
            source: LokiError::Backend {
                status: 502,
                body: "bad gateway".to_string(),
            },
        };
        let message = log_error(err, Some(5)).to_string();
        assert!(message.starts_with("Could not fetch logs"));
    }
}
