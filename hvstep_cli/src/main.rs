mod cli;
mod error_fmt;
mod session;

use std::fs;
use std::path::Path;

use clap::Parser;
use eyre::WrapErr;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};

fn main() {
    let exit = match run() {
        Ok(()) => 0,
        Err(err) => {
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", error_fmt::format_error_json(&err));
            } else {
                eprintln!("{}", error_fmt::humanize(&err));
            }
            error_fmt::exit_code_for_error(&err)
        }
    };
    std::process::exit(exit);
}

fn run() -> eyre::Result<()> {
    let _ = color_eyre::install();
    let args = Cli::parse();
    let _ = JSON_MODE.set(args.json);

    let (cfg, found) = load_config(&args.config)?;
    init_tracing(&args, &cfg.logging);
    if !found {
        tracing::info!(config = %args.config.display(), "config file not found; using rig defaults");
    }

    let curve = match &args.curve {
        Some(path) => Some(hvstep_config::load_curve_csv(path)?),
        None => None,
    };

    match args.cmd {
        Commands::Run {
            name,
            skip_discharge,
        } => session::run_session(&cfg, curve, name, skip_discharge),
        Commands::SelfCheck => session::self_check(&cfg),
    }
}

fn load_config(path: &Path) -> eyre::Result<(hvstep_config::Config, bool)> {
    if path.exists() {
        let text =
            fs::read_to_string(path).wrap_err_with(|| format!("read config {path:?}"))?;
        let cfg = hvstep_config::load_toml(&text)
            .map_err(|e| eyre::eyre!("parse config {path:?}: {e}"))?;
        cfg.validate()?;
        Ok((cfg, true))
    } else {
        Ok((hvstep_config::Config::default(), false))
    }
}

fn init_tracing(args: &Cli, logging: &hvstep_config::Logging) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Optional JSON-lines file log from the [logging] config table.
    let file_layer = logging.file.as_ref().map(|file| {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let fname = path
            .file_name()
            .map_or_else(|| "hvstep.log".to_string(), |f| f.to_string_lossy().into_owned());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, fname),
            Some("hourly") => tracing_appender::rolling::hourly(dir, fname),
            _ => tracing_appender::rolling::never(dir, fname),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        fmt::layer().json().with_ansi(false).with_writer(writer)
    });

    // Console logs go to stderr so stdout stays clean for prompts and data.
    if args.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
