//! Operator tool for inspecting, auditing and seeding a range event log.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use holo_status::{
    check_split_invariants, FileRangeEventLog, RangeDirectory, RangeEventLog, RangeEventType,
    RangeLogEvent, StatusConfig, SystemClock,
};

#[derive(Parser)]
#[command(name = "rangelog")]
#[command(about = "Inspect and audit the HoloStore range event log", long_about = None)]
struct Args {
    /// Directory holding the range log file.
    #[arg(long, env = "HOLO_RANGELOG_DIR")]
    dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print records in append order.
    List {
        #[arg(long)]
        event_type: Option<RangeEventType>,
        /// Emit one JSON object per line.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Count records, optionally of one type.
    Count {
        #[arg(long)]
        event_type: Option<RangeEventType>,
    },
    /// Check split records; exits non-zero on any violation.
    Verify,
    /// Split the range owning `key`, replaying existing splits first.
    Split {
        /// Split key as UTF-8 text.
        #[arg(long)]
        key: String,
        /// Initial split keys applied before `key` (skipped when already present).
        #[arg(long = "initial")]
        initial: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let ansi = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = StatusConfig::from_env()?;
    let log = Arc::new(
        FileRangeEventLog::open(&args.dir, config.rangelog_sync)
            .with_context(|| format!("open range log in {}", args.dir.display()))?,
    );

    match args.command {
        Command::List { event_type, json } => {
            for event in select(log.as_ref(), event_type)? {
                if json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    println!(
                        "{:>6}  {:<6} ts={} range={} other={} {}",
                        event.seq,
                        event.event_type.as_str(),
                        event.timestamp_nanos,
                        event.range_id,
                        event
                            .other_range_id
                            .map(|id| id.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        event.info
                    );
                }
            }
        }
        Command::Count { event_type } => {
            let count = match event_type {
                Some(event_type) => log.count_by_type(event_type)?,
                None => log.events()?.len(),
            };
            println!("{count}");
        }
        Command::Verify => {
            let events = log.events()?;
            let violations = check_split_invariants(&events, None);
            if violations.is_empty() {
                println!("ok ({} records)", events.len());
                return Ok(());
            }
            for violation in &violations {
                println!("{violation}");
            }
            anyhow::bail!("{} split invariant violation(s)", violations.len());
        }
        Command::Split { key, initial } => {
            let directory = RangeDirectory::recover(log.clone(), Arc::new(SystemClock))?;
            let initial: Vec<Vec<u8>> = initial.into_iter().map(String::into_bytes).collect();
            for outcome in directory.bootstrap(&initial)? {
                println!(
                    "initial split: range {} -> {} at seq {}",
                    outcome.left.range_id, outcome.right.range_id, outcome.event.seq
                );
            }
            let outcome = directory.admin_split(key.into_bytes())?;
            println!(
                "split: range {} -> {} at seq {}",
                outcome.left.range_id, outcome.right.range_id, outcome.event.seq
            );
        }
    }
    Ok(())
}

fn select(
    log: &dyn RangeEventLog,
    event_type: Option<RangeEventType>,
) -> anyhow::Result<Vec<RangeLogEvent>> {
    match event_type {
        Some(event_type) => log.list_by_type(event_type),
        None => log.events(),
    }
}
