//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "stc", version, about = "Steam-chamber calibration CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/stc_config.toml")]
    pub config: PathBuf,

    /// Print results and logs as JSON instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Chamber half.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum PositionArg {
    Upper,
    Lower,
}

impl From<PositionArg> for stc_core::Position {
    fn from(p: PositionArg) -> Self {
        match p {
            PositionArg::Upper => stc_core::Position::Upper,
            PositionArg::Lower => stc_core::Position::Lower,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest a probe log, detect steady state and print section medians
    Analyze {
        /// Probe export (CSV)
        #[arg(long, value_name = "FILE")]
        log: PathBuf,
    },
    /// Predict corrected setpoints from measured medians and reference setpoints
    Predict {
        /// Eight measured section medians, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        hb: Vec<f64>,
        /// Eight reference setpoints, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        sv: Vec<f64>,
        /// Formula id (411, 412 or 421); defaults to the configured one
        #[arg(long, value_name = "ID")]
        formula: Option<u16>,
        /// Clamp to this machine's section limits
        #[arg(long, value_name = "ID")]
        machine: Option<u32>,
    },
    /// Full calibration run: analyze, predict, push and record
    Run {
        #[arg(long, value_name = "FILE")]
        log: PathBuf,
        #[arg(long, value_name = "ID")]
        machine: u32,
        #[arg(long, value_enum)]
        position: PositionArg,
        /// Conveyor speed (0.1..=0.9)
        #[arg(long)]
        speed: f64,
        /// Run sequence (1 or 2)
        #[arg(long)]
        sequence: u8,
        #[arg(long, value_name = "CODE")]
        device_code: String,
        #[arg(long, value_name = "NAME")]
        operator: String,
        /// Manual setpoints, used when the controller's live SV is unavailable
        #[arg(long, value_delimiter = ',')]
        sv: Option<Vec<f64>>,
        /// Formula id (411, 412 or 421); defaults to the configured one
        #[arg(long, value_name = "ID")]
        formula: Option<u16>,
        /// Current plant ambient temperature in °C
        #[arg(long, value_name = "T", allow_negative_numbers = true)]
        ambient_c: Option<f64>,
        /// Talk to a simulated controller instead of the network
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
    },
    /// Which machines had a run recorded recently, per position
    Recents,
    /// Shift live setpoints on every machine for an ambient temperature change
    AmbientAdjust {
        /// Ambient change in °C (positive: plant got warmer)
        #[arg(long, allow_negative_numbers = true)]
        change: f64,
        /// Compute the new setpoints without writing them
        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,
        /// Talk to a simulated controller instead of the network
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
    },
    /// Validate the config and check that the record store is writable
    SelfCheck,
}
