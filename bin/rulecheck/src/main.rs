//! ---
//! rc_section: "06-cli"
//! rc_subsection: "binary"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Command line entrypoint for running alarm rule scenarios."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rulecheck_common::config::HarnessConfig;
use rulecheck_common::logging::init_tracing;
use tracing::info;

mod link;
mod ops;
mod run;

const DEFAULT_CONFIG_PATH: &str = "configs/rulecheck.toml";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Acceptance harness for the motor-overheat alarm rule",
    long_about = None
)]
struct Cli {
    /// Configuration file (falls back to RULECHECK_CONFIG, then configs/rulecheck.toml).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run scenarios and report a verdict for each.
    Run(run::RunArgs),
    /// List the built-in scenarios.
    List,
    /// Send a single measurement.
    Publish(ops::PublishArgs),
    /// Clear the active alarm.
    ClearAlarm(ops::ClearAlarmArgs),
    /// Report an operation as successful or failed.
    Finalize(ops::FinalizeArgs),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let (config, source) = load_config(cli.config.as_deref())?;
    init_tracing("rulecheck", &config.logging)?;
    match &source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found, using defaults and environment"),
    }

    match cli.command {
        Commands::Run(args) => run::execute(config, args).await,
        Commands::List => {
            run::list();
            Ok(ExitCode::SUCCESS)
        }
        Commands::Publish(args) => ops::publish(&config, args).await,
        Commands::ClearAlarm(args) => ops::clear_alarm(&config, args).await,
        Commands::Finalize(args) => ops::finalize(&config, args).await,
    }
}

fn load_config(explicit: Option<&Path>) -> Result<(HarnessConfig, Option<PathBuf>)> {
    let (mut config, source) = match explicit {
        Some(path) => (HarnessConfig::from_path(path)?, Some(path.to_path_buf())),
        None => {
            let loaded = HarnessConfig::load_with_source(&[DEFAULT_CONFIG_PATH])?;
            (loaded.config, loaded.source)
        }
    };
    config
        .apply_env_overrides()
        .context("invalid MQTT_* environment override")?;
    config.validate()?;
    Ok((config, source))
}
