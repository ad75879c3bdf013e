//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "hvstep", version, about = "Stepped HV supply CLI")]
pub struct Cli {
    /// Path to config TOML (typed); rig defaults apply when the file is absent
    #[arg(long, value_name = "FILE", default_value = "etc/hvstep.toml")]
    pub config: PathBuf,

    /// Optional sensor-curve CSV (strict header) overriding the configured
    /// polynomial
    #[arg(long, value_name = "FILE")]
    pub curve: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an interactive step-and-measure session
    Run {
        /// Measurement file name (without extension); prompted when absent
        #[arg(long)]
        name: Option<String>,

        /// Skip the initial capacitor discharge wait
        #[arg(long, action = ArgAction::SetTrue)]
        skip_discharge: bool,
    },
    /// Quick health check (hardware presence / sim ok)
    SelfCheck,
}
