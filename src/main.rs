//! hexsweep - Fleet Scheduler for Map-Scanning Worker Sessions
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use hexsweep::clock::{Clock, SystemClock};
use hexsweep::config::{CliArgs, Command, PlanArgs, ScanConfig};
use hexsweep::coordinator::{Collaborators, ScanCoordinator};
use hexsweep::error::ConfigError;
use hexsweep::progress::{print_header, print_plan_summary, print_summary, LogSwitch};
use hexsweep::schedule::{assign_spawns, load_schedule, save_schedule};
use hexsweep::session::{EntityCountParser, MemorySpawnStore, MockSessionFactory};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    if let Some(Command::Plan(plan)) = &args.command {
        setup_logging(false, false)?;
        return run_plan(plan);
    }

    let logs = setup_logging(args.verbose, args.print_status)?;

    let config = ScanConfig::from_args(args).context("Invalid configuration")?;
    run_scan(config, logs)
}

/// Pack a spawn file onto workers and write the schedule
fn run_plan(plan: &PlanArgs) -> Result<()> {
    let params = plan.params().context("Invalid configuration")?;
    let spawns = load_schedule(&plan.spawns).context("Failed to load spawn points")?;

    let assignment = assign_spawns(spawns, &params);
    if !assignment.rejected.is_empty() {
        warn!(
            rejected = assignment.rejected.len(),
            "Some spawn points could not be scheduled; add workers or raise --max-delay"
        );
    }

    save_schedule(&plan.output, &assignment.schedule).context("Failed to write schedule")?;
    print_plan_summary(&assignment, &plan.output);
    Ok(())
}

/// Run a scan until interrupted
fn run_scan(config: ScanConfig, logs: LogSwitch) -> Result<()> {
    if !config.mock {
        return Err(ConfigError::NoSessionBackend.into());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store = match &config.spawn_db {
        Some(path) => {
            let store = MemorySpawnStore::from_file(path).context("Failed to load spawn store")?;
            info!(spawns = store.len(), path = %path.display(), "Loaded spawn store");
            store
        }
        None => MemorySpawnStore::default(),
    };

    let collaborators = Collaborators {
        factory: Arc::new(MockSessionFactory::new(Arc::clone(&clock))),
        parser: Arc::new(EntityCountParser::new()),
        store: Arc::new(store),
    };

    if !config.print_status {
        print_header(&config);
    }

    let coordinator = ScanCoordinator::new(config, collaborators, clock).with_log_switch(logs);

    // Setup signal handler for graceful shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let summary = coordinator.run().context("Scan failed")?;
    print_summary(&summary);

    Ok(())
}

/// Install the global subscriber; the filter stays swappable so the status
/// screen can hand the terminal back to the log
fn setup_logging(verbose: bool, print_status: bool) -> Result<LogSwitch> {
    let normal = if verbose {
        "hexsweep=debug,warn"
    } else {
        "hexsweep=info,warn"
    };
    // The status screen owns the terminal; only errors get through
    let quiet = "hexsweep=error";

    let initial = if print_status { quiet } else { normal };
    let (filter, handle) = reload::Layer::new(EnvFilter::new(initial));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_names(verbose)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(LogSwitch::new(handle, quiet, normal))
}
