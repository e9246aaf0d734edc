//! tempo command-line host.
//!
//! Loads a configuration and a script of timed commands, runs the script
//! against the clock objects and prints every output.

mod script;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tempo_common::config::TempoConfig;
use tracing::{info, warn};

use crate::script::{Script, ScriptHost};

/// tempo command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "tempo",
    about = "Run scripted commands against delay, metro, line, timer, and pipe objects",
    version,
    long_about = None
)]
struct Args {
    /// Script of objects and timed events (TOML).
    #[arg(value_name = "SCRIPT", required_unless_present = "dump_config")]
    script: Option<PathBuf>,

    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Keep time running until this point, e.g. `2s` or `750ms`.
    #[arg(long, value_parser = humantime::parse_duration)]
    run_for: Option<Duration>,

    /// Print the effective configuration and exit.
    #[arg(long)]
    dump_config: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let config = load_config(&args)?;
    if args.dump_config {
        print!("{}", config.to_toml().context("Failed to serialize config")?);
        return Ok(());
    }
    info!(
        time_source = ?config.scheduler.time_source,
        grain_ms = config.line.grain_ms,
        "Configuration loaded"
    );

    let script_path = args
        .script
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("a script path is required"))?;
    let script = Script::from_file(script_path)
        .with_context(|| format!("Failed to load script from {}", script_path.display()))?;

    let mut host = ScriptHost::new(config);
    host.load(&script).context("Failed to create script objects")?;

    let end = args.run_for.map(|d| d.as_secs_f64() * 1000.0);
    let summary = host.run(&script, end).context("Script run failed")?;

    for line in host.trace() {
        println!("{line}");
    }
    if summary.rejected > 0 {
        warn!(rejected = summary.rejected, "Some commands were rejected");
    }
    info!(
        events = summary.events,
        fired = summary.fired,
        ended_at = summary.ended_at,
        conditions = summary.conditions,
        "Run complete"
    );
    Ok(())
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "tempo={level},tempo_common={level},tempo_runtime={level},tempo_objects={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `TEMPO_CONFIG_PATH` environment variable
/// 3. Built-in defaults
fn load_config(args: &Args) -> Result<TempoConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return TempoConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }

    if let Ok(env_path) = std::env::var("TEMPO_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from TEMPO_CONFIG_PATH");
            return TempoConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from TEMPO_CONFIG_PATH={env_path}")
            });
        }
        warn!(
            path = %env_path,
            "TEMPO_CONFIG_PATH set but file does not exist, using defaults"
        );
    }

    info!("No config file given, using built-in defaults");
    Ok(TempoConfig::default())
}
