//! AutoTune command line.
//!
//! Reads snapshots written by the scanner, prints the assessment and plan,
//! and optionally executes the plan on this machine.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use autotune_lib::reports::{self, RunReport};
use autotune_lib::settings::{save_settings, settings_file_path};
use autotune_lib::state::AppState;
use autotune_lib::{
    build_plan_with, compare, evaluate_with, load_snapshot, run_pipeline, Evaluation, EventBus, Executor, OsControl,
    PipelineOptions, Plan, SnapshotFile,
};

#[derive(Parser)]
#[command(name = "autotune")]
#[command(about = "Workstation health evaluation and remediation", long_about = None)]
#[command(version)]
struct Cli {
    /// Data directory (defaults to AUTOTUNE_DATA_DIR or ./data)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a snapshot and list its issues
    Evaluate {
        snapshot: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the remediation plan for a snapshot
    Plan {
        snapshot: PathBuf,
        #[arg(long)]
        json: bool,
    },

    /// Execute the plan for a snapshot on this machine
    Run {
        snapshot: PathBuf,
        /// Snapshot taken after the run, for the before/after comparison
        #[arg(long)]
        after: Option<PathBuf>,
        /// Build the plan but execute nothing
        #[arg(long)]
        dry_run: bool,
        /// Write the report here instead of the reports folder
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Compare two snapshots of the same machine
    Compare { before: PathBuf, after: PathBuf },

    /// Show the effective settings
    Settings {
        /// Write the current settings to the settings file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let state = AppState::initialize(cli.data_dir).context("failed to prepare data directory")?;

    match cli.command {
        Commands::Evaluate { snapshot, json } => cmd_evaluate(&state, snapshot, json),
        Commands::Plan { snapshot, json } => cmd_plan(&state, snapshot, json),
        Commands::Run {
            snapshot,
            after,
            dry_run,
            output,
        } => cmd_run(&state, snapshot, after, dry_run, output).await,
        Commands::Compare { before, after } => cmd_compare(before, after),
        Commands::Settings { write } => cmd_settings(&state, write),
    }
}

fn evaluate_file(state: &AppState, path: &Path) -> Result<(autotune_lib::Snapshot, Evaluation)> {
    let snapshot = load_snapshot(path).with_context(|| format!("cannot load snapshot {}", path.display()))?;
    let evaluation = evaluate_with(&snapshot, &state.settings.thresholds);
    Ok((snapshot, evaluation))
}

fn cmd_evaluate(state: &AppState, path: PathBuf, json: bool) -> Result<()> {
    let (snapshot, evaluation) = evaluate_file(state, &path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&evaluation)?);
        return Ok(());
    }

    println!(
        "{}: health score {} ({})",
        snapshot.system.hostname,
        evaluation.score,
        evaluation.score.grade()
    );
    if evaluation.issues.is_empty() {
        println!("No issues found.");
    }
    for issue in &evaluation.issues {
        println!(
            "  [{:<8}] {:<10} {}",
            issue.severity.to_string(),
            issue.category,
            issue.description
        );
        println!("             -> {}", issue.recommendation);
    }
    Ok(())
}

fn cmd_plan(state: &AppState, path: PathBuf, json: bool) -> Result<()> {
    let (snapshot, evaluation) = evaluate_file(state, &path)?;
    let plan = build_plan_with(&snapshot, &evaluation.issues, &state.settings.planner);
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan);
    }
    Ok(())
}

fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("Nothing to do.");
        return;
    }
    for action in plan.actions() {
        let mode = if action.is_automatable { "auto" } else { "manual" };
        println!("  {:>2}. [{:<6}] {} ({})", action.id, mode, action.title, action.risk);
    }
    println!("Estimated space to reclaim: {} MB", plan.estimated_free_mb());
}

async fn cmd_run(
    state: &AppState,
    snapshot: PathBuf,
    after: Option<PathBuf>,
    dry_run: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut scanner = SnapshotFile::new(snapshot);
    if let Some(after) = after {
        scanner = scanner.with_after(after);
    }
    let mut options = PipelineOptions::from_settings(&state.settings);
    options.dry_run = dry_run;

    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", event.describe()),
                Err(RecvError::Lagged(missed)) => warn!(missed, "console fell behind on events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let run_control = state.run_control.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("stop requested, finishing the current action");
            run_control.request_stop();
        }
    });

    let executor = Executor::new(OsControl::new(), state.settings.executor.clone())
        .with_events(bus)
        .with_run_control(state.run_control.clone());
    let report = run_pipeline(&scanner, &executor, &options).await;
    drop(executor);
    let _ = printer.await;
    let report = report.context("run failed")?;

    if dry_run {
        print_plan(&plan_of(&report));
    }
    print_manual(&report);
    if let Some(delta) = report.comparison {
        println!(
            "CPU load {:+.1} pts, RAM freed {} MB, system disk free {:+.1} pts",
            -delta.cpu_delta, delta.ram_freed_mb, delta.disk_freed_percent
        );
    }

    let path = match output {
        Some(path) => {
            std::fs::write(&path, report.to_json()?).with_context(|| format!("cannot write {}", path.display()))?;
            path
        }
        None => reports::save_report(&state.reports_dir(), &report)?,
    };
    println!("Report written to {}", path.display());
    Ok(())
}

fn plan_of(report: &RunReport) -> Plan {
    report.actions.iter().cloned().collect()
}

fn print_manual(report: &RunReport) {
    let manual: Vec<_> = report.manual_actions().collect();
    if manual.is_empty() {
        return;
    }
    println!("Needs attention:");
    for action in manual {
        println!("  - {}: {}", action.title, action.description);
    }
}

fn cmd_compare(before: PathBuf, after: PathBuf) -> Result<()> {
    let before = load_snapshot(&before).with_context(|| format!("cannot load snapshot {}", before.display()))?;
    let after = load_snapshot(&after).with_context(|| format!("cannot load snapshot {}", after.display()))?;
    println!("{}", serde_json::to_string_pretty(&compare(&before, &after))?);
    Ok(())
}

fn cmd_settings(state: &AppState, write: bool) -> Result<()> {
    if write {
        save_settings(&state.data_dir, &state.settings)?;
        println!("Settings written to {}", settings_file_path(&state.data_dir).display());
    } else {
        println!("{}", serde_json::to_string_pretty(&state.settings)?);
    }
    Ok(())
}
