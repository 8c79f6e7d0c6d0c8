use anyhow::{Context, Result, anyhow};
use chatstore::command::{FetchDue, ListSchedules, Summarize};
use chatstore::scheduler::{self, ScheduleState};
use chatstore::{ChatStore, NoopIndexSync, StoreConfig};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "store-tool")]
#[command(about = "Inspection and scheduling helper for chatstore data directories")]
struct Cli {
    /// JSON config file; flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding chatstore.snapshot and chatstore.wal.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print record counts as JSON.
    Summary,
    /// List schedules due at a given instant (default: now).
    Due {
        #[arg(long)]
        at: Option<String>,
    },
    /// List every schedule with its state.
    Schedules,
    /// Preview upcoming runs of a cron expression.
    NextRun {
        #[arg(long)]
        cron: String,
        #[arg(long, default_value = "UTC")]
        tz: String,
        #[arg(long, default_value_t = 5)]
        count: usize,
        #[arg(long)]
        after: Option<String>,
    },
    /// Write a snapshot and truncate the WAL.
    Checkpoint,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::NextRun {
            cron,
            tz,
            count,
            after,
        } => next_run(&cron, &tz, count, after.as_deref()),
        Command::Summary => {
            let store = open_store(cli.config, cli.data_dir).await?;
            let summary = store.read(Summarize).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            store.shutdown().await?;
            Ok(())
        }
        Command::Due { at } => {
            let now = parse_instant(at.as_deref())?;
            let store = open_store(cli.config, cli.data_dir).await?;
            let due = store.read(FetchDue { now }).await?;
            if due.is_empty() {
                println!("No schedules due at {}", now.to_rfc3339());
            }
            for schedule in due {
                println!(
                    "{}  {}  {}",
                    schedule.next_run_at.map(|at| at.to_rfc3339()).unwrap_or_default(),
                    schedule.id,
                    schedule.title
                );
            }
            store.shutdown().await?;
            Ok(())
        }
        Command::Schedules => {
            let now = Utc::now();
            let store = open_store(cli.config, cli.data_dir).await?;
            for schedule in store.read(ListSchedules).await? {
                let state = match scheduler::schedule_state(&schedule, now) {
                    ScheduleState::Disabled => "disabled",
                    ScheduleState::Pending => "pending",
                    ScheduleState::Due => "due",
                    ScheduleState::Completed => "completed",
                };
                println!(
                    "{:<10} {:<26} {}  {}",
                    state,
                    schedule
                        .next_run_at
                        .map(|at| at.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string()),
                    schedule.id,
                    schedule.title
                );
            }
            store.shutdown().await?;
            Ok(())
        }
        Command::Checkpoint => {
            let store = open_store(cli.config, cli.data_dir).await?;
            if !store.config().is_durable() {
                return Err(anyhow!("checkpoint needs --data-dir or a durable config"));
            }
            store.checkpoint()?;
            store.shutdown().await?;
            println!("Checkpoint written");
            Ok(())
        }
    }
}

async fn open_store(config: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<ChatStore> {
    let mut config = match config {
        Some(path) => StoreConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => StoreConfig::default(),
    };
    if let Some(data_dir) = data_dir {
        config = config.data_dir(data_dir);
    }
    if config.data_dir.is_none() {
        return Err(anyhow!("no data directory given (use --data-dir or --config)"));
    }
    ChatStore::open(config, Arc::new(NoopIndexSync))
        .await
        .context("Failed to open store")
}

fn parse_instant(raw: Option<&str>) -> Result<DateTime<Utc>> {
    match raw {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|at| at.with_timezone(&Utc))
            .with_context(|| format!("'{}' is not an RFC 3339 timestamp", raw)),
        None => Ok(Utc::now()),
    }
}

fn next_run(expression: &str, tz: &str, count: usize, after: Option<&str>) -> Result<()> {
    let zone = scheduler::parse_timezone(tz)?;
    let after = parse_instant(after)?;
    let runs = scheduler::upcoming_cron_runs(expression, zone, after, count)?;
    if runs.is_empty() {
        println!("'{}' never fires after {}", expression, after.to_rfc3339());
    }
    for run in runs {
        println!("{}  ({})", run.to_rfc3339(), run.with_timezone(&zone).format("%Y-%m-%d %H:%M %Z"));
    }
    Ok(())
}
