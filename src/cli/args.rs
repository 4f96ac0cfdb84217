//! Command line argument parsing
//!
//! Subcommands:
//! - `run`: Start the scheduler with the demo project
//! - `show-config`: Print the effective scheduler configuration

use crate::scheduler::SchedulerConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug)]
pub enum ExecutionMode {
    Run(RunConfig),
    ShowConfig(SchedulerConfig),
}

#[derive(Debug)]
pub struct RunConfig {
    pub scheduler: SchedulerConfig,
    /// Stop after this many seconds instead of waiting for Ctrl-C.
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Parser)]
#[command(name = "taskserver")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "In-process cooperative task scheduler")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the scheduler with the demo project
    Run {
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        /// Override the tick rate of the scheduling loop
        #[arg(short = 'u', long = "updates-per-second")]
        updates_per_second: Option<u32>,
        /// Stop after this many seconds
        #[arg(short = 'd', long = "duration-secs")]
        duration_secs: Option<u64>,
    },
    /// Show the effective scheduler configuration
    ShowConfig {
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
    },
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode> {
        match &self.command {
            Some(Commands::Run {
                config,
                updates_per_second,
                duration_secs,
            }) => {
                let mut scheduler = Self::load_config(config.as_ref())?;
                if let Some(updates_per_second) = updates_per_second {
                    scheduler = scheduler.with_updates_per_second(*updates_per_second);
                }
                scheduler.validate()?;

                Ok(ExecutionMode::Run(RunConfig {
                    scheduler,
                    duration_secs: *duration_secs,
                }))
            }
            Some(Commands::ShowConfig { config }) => Ok(ExecutionMode::ShowConfig(
                Self::load_config(config.as_ref())?,
            )),
            None => anyhow::bail!(
                "No command specified. Use 'taskserver --help' to see available commands."
            ),
        }
    }

    fn load_config(path: Option<&PathBuf>) -> Result<SchedulerConfig> {
        match path {
            Some(path) => SchedulerConfig::from_toml_file(path),
            None => Ok(SchedulerConfig::default()),
        }
    }
}
