use crate::display::spawn_session_writer;
use crate::model::{CommitPolicy, RankedRecord, RunConfig, SessionEvent};
use crate::{orchestrator, registry, report};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "rand-run",
    version,
    about = "Run a random command from a list and track how long each one has run"
)]
pub struct Cli {
    /// Path to the runnable list: name first, then the command, then its arguments
    #[arg(long, env = "RAND_RUN_CSV", default_value = "test.csv")]
    pub csv: PathBuf,

    /// Path to the elapsed-time store
    #[arg(long, env = "RAND_RUN_DB", default_value = "rand-run.db")]
    pub db: PathBuf,

    /// List the accumulated time for every runnable in the store and exit
    #[arg(long)]
    pub list: bool,

    /// Print the list as JSON (with --list)
    #[arg(long, requires = "list")]
    pub json: bool,

    /// Suppress the banner and the live counter
    #[arg(long)]
    pub quiet: bool,

    /// Fixed seed for runnable selection (defaults to a time-derived seed)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Counter period
    #[arg(long, default_value = "1s")]
    pub tick: humantime::Duration,

    /// Hold one store transaction for the whole run, or commit after every tick
    #[arg(long, value_enum, default_value_t = CommitPolicy::Session)]
    pub commit_policy: CommitPolicy,
}

pub async fn run(args: Cli) -> Result<()> {
    if args.list {
        return run_report(&args);
    }
    run_random(args).await
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    RunConfig {
        list_path: args.csv.clone(),
        store_path: args.db.clone(),
        tick: Duration::from(args.tick),
        commit_policy: args.commit_policy,
        seed: args.seed,
    }
}

async fn run_random(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    anyhow::ensure!(!cfg.tick.is_zero(), "--tick must be greater than zero");

    let runnables = registry::load(&cfg.list_path).context("cannot load runnables")?;
    let mut rng = registry::seeded_rng(cfg.seed);

    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let writer = spawn_session_writer(evt_rx, args.quiet);

    let outcome = orchestrator::random_run(&cfg, &runnables, &mut rng, evt_tx).await;
    // The session drops its sender on return, which lets the writer finish.
    if let Err(e) = writer.await {
        warn!(error = %e, "session display task failed");
    }
    let summary = outcome?;

    // Non-zero exits are reported but not fatal.
    if let Ok(status) = &summary.launch {
        if !status.success() {
            warn!(name = %summary.runnable.name, %status, "runnable exited unsuccessfully");
        }
    }
    let tracked = summary.tracked_seconds();
    summary
        .launch
        .with_context(|| format!("{} did not run ({tracked}s recorded)", summary.runnable.name))?;

    if !args.quiet {
        println!("Goodbye!");
    }
    Ok(())
}

fn run_report(args: &Cli) -> Result<()> {
    let ranked = report::list_runs(&args.db)?;
    let stdout = std::io::stdout();
    write_report(&mut stdout.lock(), &ranked, args.json, &args.db)
}

fn write_report<W: Write>(
    out: &mut W,
    ranked: &[RankedRecord],
    json: bool,
    db: &Path,
) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(ranked)?)?;
    } else if ranked.is_empty() {
        eprintln!("No runs recorded in {}", db.display());
    } else {
        for line in report::build_report_lines(ranked) {
            writeln!(out, "{line}")?;
        }
    }
    out.flush()?;
    Ok(())
}
