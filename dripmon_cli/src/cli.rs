//! CLI argument definitions.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Keeps the non-blocking file writer alive for the process lifetime.
pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "dripmon", version, about = "Gravity-infusion monitor CLI")]
pub struct Cli {
    /// Path to config TOML (typed); defaults apply when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit JSON lines instead of CSV rows
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the engine against a simulated bag and drip chamber
    Simulate {
        /// Initial liquid mass in grams
        #[arg(long, default_value_t = 500.0)]
        initial_g: f32,

        /// Drop rate of the simulated giving set (drops/second)
        #[arg(long, default_value_t = 2.0)]
        drip_dps: f32,

        /// True grams per drop of the simulated set
        #[arg(long, default_value_t = 0.05)]
        wpd_g: f32,

        /// Number of 1 s ticks to simulate (virtual time, runs instantly)
        #[arg(long, default_value_t = 300)]
        ticks: u64,

        /// Liquid mass at which the infusion counts as finished
        #[arg(long, default_value_t = 0.0)]
        target_empty_g: f32,

        /// Device id stamped into the final cloud report
        #[arg(long, default_value = "dripmon-sim")]
        device_id: String,
    },

    /// Parse and validate a config file
    CheckConfig,
}
