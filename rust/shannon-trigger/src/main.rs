//! Shannon Trigger - operator CLI
//!
//! Checks schedule and backfill inputs before they are submitted: `preview`
//! prints the next fire times of a cron expression, `plan` prints the
//! commands a backfill would create.

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};

use shannon_trigger::config::AppConfig;
use shannon_trigger::database::InMemoryStore;
use shannon_trigger::domain::RunMode;
use shannon_trigger::executor::{CronTrigger, backfill};
use shannon_trigger::logging::init_tracing;
use shannon_trigger::runtime::InMemoryTriggerEngine;
use shannon_trigger::scheduler::{CronParser, ScheduleParams};
use shannon_trigger::{Collaborators, ControlPlane};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "shannon-trigger")]
#[command(about = "Shannon Trigger - schedule preview and backfill planning")]
#[command(version)]
struct Args {
    /// Log level (overrides the configured level).
    #[arg(long, env = "SHANNON_TRIGGER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Next fire times of a cron expression.
    Preview {
        /// Seconds-first cron expression, e.g. "0 0 2 * * *".
        cron: String,
        /// Window start (RFC 3339). Defaults to now.
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        /// Window end (RFC 3339). Defaults to one year after start.
        #[arg(long)]
        end: Option<DateTime<Utc>>,
        /// IANA timezone. Defaults to the configured timezone.
        #[arg(long)]
        timezone: Option<String>,
        /// Number of fire times. Defaults to the configured preview count.
        #[arg(long)]
        count: Option<usize>,
    },
    /// Sub-ranges a backfill would be split into.
    Plan {
        /// Window start (RFC 3339).
        #[arg(long)]
        start: DateTime<Utc>,
        /// Window end (RFC 3339).
        #[arg(long)]
        end: DateTime<Utc>,
        /// SERIAL or PARALLEL.
        #[arg(long, default_value = "SERIAL")]
        mode: RunMode,
        /// Cron expression of an online schedule; repeatable.
        #[arg(long = "cron")]
        crons: Vec<String>,
        /// IANA timezone of the schedules and calendar days.
        #[arg(long)]
        timezone: Option<String>,
        /// Maximum number of commands in PARALLEL mode.
        #[arg(long)]
        parallelism: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load()?;
    if let Some(level) = &args.log_level {
        config.logging.level.clone_from(level);
    }
    init_tracing(&config.logging);

    tracing::debug!("Starting Shannon Trigger v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Preview {
            cron,
            start,
            end,
            timezone,
            count,
        } => {
            if let Some(count) = count {
                config.control.preview_count = count;
            }
            let start = start.unwrap_or_else(Utc::now);
            let params = ScheduleParams {
                start_time: start,
                end_time: end.unwrap_or(start + Duration::days(365)),
                crontab: cron,
                timezone_id: timezone.unwrap_or_else(|| config.control.default_timezone.clone()),
            };

            let store = InMemoryStore::new();
            let engine = InMemoryTriggerEngine::new();
            let plane = ControlPlane::new(config, Collaborators::in_memory(&store, &engine))?;
            let fires = plane.schedules.preview(&params)?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&fires)?);
            } else {
                for fire in fires {
                    println!("{fire}");
                }
            }
        }
        Command::Plan {
            start,
            end,
            mode,
            crons,
            timezone,
            parallelism,
        } => {
            let timezone_id =
                timezone.unwrap_or_else(|| config.control.default_timezone.clone());
            let tz = CronParser::parse_timezone(&timezone_id)?;
            let triggers = crons
                .iter()
                .map(|cron| CronTrigger::parse(cron, &timezone_id))
                .collect::<Result<Vec<_>, _>>()?;

            let entries =
                backfill::plan_with_triggers(&triggers, start, end, mode, parallelism, tz);

            if args.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in &entries {
                    println!("{entry}");
                }
                println!("{} command(s)", entries.len());
            }
        }
    }

    Ok(())
}
