//! ---
//! simgpu_section: "05-external-interfaces"
//! simgpu_subsection: "binary"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Control CLI for the simulated GPU device."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use simgpu_common::DeviceConfig;
use simgpu_logging as logging;

mod run;
mod stages;
mod sweep;

const DEFAULT_CONFIG_PATH: &str = "configs/simgpu.toml";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Simulated GPU device control utility",
    long_about = None
)]
struct Cli {
    /// Also write rolling JSON logs under the configured logging directory.
    #[arg(long = "log-to-file", global = true, action = clap::ArgAction::SetTrue)]
    log_to_file: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Bring a device up, drive a concurrent workload through it, flush and destroy.
    Run(run::RunArgs),
    /// Print the declared bring-up order.
    Stages(stages::StagesArgs),
    /// Fail every stage in turn and verify the rollback of the committed prefix.
    #[command(name = "fault-sweep")]
    FaultSweep(sweep::SweepArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = match &cli.command {
        Commands::Run(args) => args.config.as_deref(),
        Commands::FaultSweep(args) => args.config.as_deref(),
        Commands::Stages(_) => None,
    };
    let config = load_config(config_path)?;
    if cli.log_to_file {
        simgpu_common::init_tracing("simgpuctl", &config.logging)?;
    } else {
        logging::init();
    }

    match cli.command {
        Commands::Run(args) => run::execute(args, config),
        Commands::Stages(args) => stages::execute(args),
        Commands::FaultSweep(args) => sweep::execute(args, config),
    }
}

/// Explicit path first, then `SIMGPU_CONFIG` or the default path, then built-in defaults.
fn load_config(explicit: Option<&Path>) -> Result<DeviceConfig> {
    if let Some(path) = explicit {
        return DeviceConfig::from_path(path);
    }
    let candidates = [PathBuf::from(DEFAULT_CONFIG_PATH)];
    let env_set = std::env::var_os(DeviceConfig::ENV_CONFIG_PATH).is_some_and(|v| !v.is_empty());
    if env_set || candidates.iter().any(|path| path.exists()) {
        return DeviceConfig::load(&candidates);
    }
    Ok(DeviceConfig::default())
}
