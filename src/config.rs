//! Configuration types for hexsweep
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Location parsing

use crate::error::ConfigError;
use crate::geo::Location;
use crate::overseer::GridSettings;
use crate::schedule::AssignParams;
use crate::session::SessionCredentials;
use crate::worker::{ScanMode, WorkerSettings};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Maximum reasonable worker count
pub const MAX_WORKERS: usize = 512;

/// Jitter radius used by `--jitter` (m)
pub const JITTER_METERS: f64 = 10.0;

/// Scan a map area with a fleet of worker accounts
#[derive(Parser, Debug, Clone)]
#[command(
    name = "hexsweep",
    version,
    about = "Scan a map area with a fleet of worker accounts",
    long_about = "Coordinates one worker per account polling a map API.\n\n\
                  Hex grid mode walks rings of scan points around a location in lockstep.\n\
                  Spawn scan mode visits known spawn points one minute after they appear,\n\
                  using a schedule packed onto the available accounts.",
    after_help = "EXAMPLES:\n    \
        hexsweep -m -a ptc:ash:secret -a ptc:misty:secret -l 40.7580,-73.9855\n    \
        hexsweep -m -a ptc:ash:secret -l 40.7580,-73.9855 -s 5 --print-status\n    \
        hexsweep -m -a ptc:ash:secret --spawnpoint-scanning spawns.json\n    \
        hexsweep plan --spawns spawns.json --workers 4 -o schedule.json",
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
pub struct CliArgs {
    /// Subcommand (plan)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Worker account, one worker per account (can be repeated)
    #[arg(
        short = 'a',
        long = "account",
        value_name = "PROVIDER:USER:PASS",
        env = "HEXSWEEP_ACCOUNTS",
        value_delimiter = ',',
        action = clap::ArgAction::Append,
        required = true
    )]
    pub accounts: Vec<String>,

    /// Starting location
    #[arg(short = 'l', long, value_name = "LAT,LNG", allow_hyphen_values = true)]
    pub location: Option<String>,

    /// Number of hex rings to scan around the location
    #[arg(short = 's', long, default_value = "10", value_name = "NUM")]
    pub step_limit: usize,

    /// Minimum seconds between two scans by one worker
    #[arg(long, default_value = "10", value_name = "SECS")]
    pub scan_delay: f64,

    /// Failed attempts before a scan is abandoned
    #[arg(long, default_value = "5", value_name = "NUM")]
    pub scan_retries: u32,

    /// Login attempts before the worker restarts
    #[arg(long, default_value = "3", value_name = "NUM")]
    pub login_retries: u32,

    /// Seconds between login attempts
    #[arg(long, default_value = "6", value_name = "SECS")]
    pub login_delay: f64,

    /// Maximum speed a worker may virtually travel between spawn scans (m/s)
    #[arg(long, default_value = "30", value_name = "M/S")]
    pub max_speed: f64,

    /// Maximum seconds a spawn scan may be delayed to fit a worker
    #[arg(long, default_value = "60", value_name = "SECS")]
    pub max_delay: f64,

    /// Only scan static structures (coarser grid)
    #[arg(long)]
    pub static_only: bool,

    /// Only scan grid steps within 70m of a known spawn point
    #[arg(long)]
    pub spawnpoints_only: bool,

    /// Spawn scan mode; reads the schedule from FILE if it exists
    #[arg(long, value_name = "FILE")]
    pub spawnpoint_scanning: Option<PathBuf>,

    /// JSON spawn point store (same format as a schedule file)
    #[arg(long, value_name = "FILE")]
    pub spawn_db: Option<PathBuf>,

    /// Jitter each scan position by up to 10m
    #[arg(short = 'j', long)]
    pub jitter: bool,

    /// Proxy used for logins
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,

    /// Show the paged worker status screen instead of logs
    #[arg(long)]
    pub print_status: bool,

    /// Use the built-in mock session
    #[arg(short = 'm', long)]
    pub mock: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Pack spawn points onto workers and write the schedule
    Plan(PlanArgs),
}

/// Arguments of `hexsweep plan`
#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Spawn point file (array of {lat, lng, time})
    #[arg(long, value_name = "FILE")]
    pub spawns: PathBuf,

    /// Number of workers to pack onto
    #[arg(short = 'w', long, value_name = "NUM")]
    pub workers: usize,

    /// Minimum seconds between two scans by one worker
    #[arg(long, default_value = "10", value_name = "SECS")]
    pub scan_delay: f64,

    /// Maximum virtual travel speed (m/s)
    #[arg(long, default_value = "30", value_name = "M/S")]
    pub max_speed: f64,

    /// Maximum seconds a scan may be delayed
    #[arg(long, default_value = "60", value_name = "SECS")]
    pub max_delay: f64,

    /// Output schedule file
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: PathBuf,
}

impl PlanArgs {
    /// Validate into assigner parameters
    pub fn params(&self) -> Result<AssignParams, ConfigError> {
        validate_workers(self.workers)?;
        validate_assigner(self.scan_delay, self.max_speed, self.max_delay)?;
        Ok(AssignParams {
            workers: self.workers,
            scan_delay: self.scan_delay,
            max_speed: self.max_speed,
            max_delay: self.max_delay,
        })
    }
}

/// Validated runtime configuration for a scan
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// One worker per account
    pub accounts: Vec<SessionCredentials>,

    /// Initial grid center / spawn query center
    pub location: Option<Location>,

    /// Ring count of the hex grid
    pub step_limit: usize,

    pub scan_delay: Duration,
    pub scan_retries: u32,
    pub login_retries: u32,
    pub login_delay: Duration,

    /// Assigner speed limit (m/s)
    pub max_speed: f64,

    /// Assigner wiggle limit (s)
    pub max_delay: f64,

    pub static_only: bool,
    pub spawnpoints_only: bool,

    /// Spawn scan mode schedule file (may not exist yet)
    pub spawn_schedule: Option<PathBuf>,

    /// Spawn point store file
    pub spawn_db: Option<PathBuf>,

    pub jitter: bool,
    pub proxy: Option<String>,
    pub print_status: bool,
    pub mock: bool,
    pub verbose: bool,
}

impl ScanConfig {
    /// Create a validated configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        validate_workers(args.accounts.len())?;

        let accounts = args
            .accounts
            .iter()
            .map(|spec| SessionCredentials::parse(spec.trim()))
            .collect::<Result<Vec<_>, _>>()?;

        let location = args.location.as_deref().map(parse_location).transpose()?;

        if args.step_limit == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "step limit",
                reason: "must be at least 1".into(),
            });
        }
        if args.scan_retries == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "scan retries",
                reason: "must be at least 1".into(),
            });
        }
        if args.login_retries == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "login retries",
                reason: "must be at least 1".into(),
            });
        }
        let scan_delay = seconds("scan delay", args.scan_delay)?;
        let login_delay = seconds("login delay", args.login_delay)?;
        validate_assigner(args.scan_delay, args.max_speed, args.max_delay)?;

        // Grid mode, or spawn mode that has to query the store, needs a center
        let schedule_file_exists = args.spawnpoint_scanning.as_ref().is_some_and(|p| p.is_file());
        if location.is_none() && !schedule_file_exists {
            return Err(ConfigError::MissingLocation);
        }

        Ok(Self {
            accounts,
            location,
            step_limit: args.step_limit,
            scan_delay,
            scan_retries: args.scan_retries,
            login_retries: args.login_retries,
            login_delay,
            max_speed: args.max_speed,
            max_delay: args.max_delay,
            static_only: args.static_only,
            spawnpoints_only: args.spawnpoints_only,
            spawn_schedule: args.spawnpoint_scanning,
            spawn_db: args.spawn_db,
            jitter: args.jitter,
            proxy: args.proxy,
            print_status: args.print_status,
            mock: args.mock,
            verbose: args.verbose,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn mode(&self) -> ScanMode {
        if self.spawn_schedule.is_some() {
            ScanMode::SpawnScan
        } else {
            ScanMode::Grid
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        let mut settings = WorkerSettings::new(self.mode(), self.scan_delay);
        settings.scan_retries = self.scan_retries;
        settings.login_retries = self.login_retries;
        settings.login_delay = self.login_delay;
        settings.jitter_meters = self.jitter.then_some(JITTER_METERS);
        settings.proxy = self.proxy.clone();
        settings
    }

    pub fn grid_settings(&self) -> GridSettings {
        GridSettings {
            ring_count: self.step_limit,
            static_only: self.static_only,
            spawnpoints_only: self.spawnpoints_only,
        }
    }

    pub fn assign_params(&self) -> AssignParams {
        AssignParams {
            workers: self.worker_count(),
            scan_delay: self.scan_delay.as_secs_f64(),
            max_speed: self.max_speed,
            max_delay: self.max_delay,
        }
    }
}

/// Parse `LAT,LNG` (whitespace around either part is ignored)
pub fn parse_location(value: &str) -> Result<Location, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidLocation {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let (lat, lng) = value.split_once(',').ok_or_else(|| invalid("missing ','"))?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid("latitude is not a number"))?;
    let lng: f64 = lng.trim().parse().map_err(|_| invalid("longitude is not a number"))?;

    if !(-90.0..=90.0).contains(&lat) {
        return Err(invalid("latitude must be within [-90, 90]"));
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(invalid("longitude must be within [-180, 180]"));
    }

    Ok(Location::new(lat, lng, 0.0))
}

fn validate_workers(count: usize) -> Result<(), ConfigError> {
    if count == 0 || count > MAX_WORKERS {
        return Err(ConfigError::InvalidWorkerCount {
            count,
            max: MAX_WORKERS,
        });
    }
    Ok(())
}

fn validate_assigner(scan_delay: f64, max_speed: f64, max_delay: f64) -> Result<(), ConfigError> {
    if !(scan_delay.is_finite() && scan_delay >= 0.0) {
        return Err(ConfigError::InvalidParameter {
            name: "scan delay",
            reason: format!("{} must be a non-negative number of seconds", scan_delay),
        });
    }
    // Infinite speed is allowed: it disables the travel constraint
    if max_speed.is_nan() || max_speed <= 0.0 {
        return Err(ConfigError::InvalidParameter {
            name: "max speed",
            reason: format!("{} must be greater than 0", max_speed),
        });
    }
    if !(max_delay.is_finite() && max_delay >= 0.0) {
        return Err(ConfigError::InvalidParameter {
            name: "max delay",
            reason: format!("{} must be a non-negative number of seconds", max_delay),
        });
    }
    Ok(())
}

fn seconds(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidParameter {
        name,
        reason: format!("{} must be a non-negative number of seconds", value),
    })
}
