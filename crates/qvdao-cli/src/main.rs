//! QVDAO CLI - drive the governance ledger from configuration and scripts.

pub mod config;
pub mod replay;
pub mod script;
pub mod telemetry;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use crate::config::LedgerConfig;
use crate::script::Script;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "qvdao")]
#[command(about = "Quadratic-voting DAO governance ledger")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Log level or filter directive (overrides the config file)
    #[arg(short, long, global = true, env = "QVDAO_LOG")]
    log_level: Option<String>,

    /// Log format (overrides the config file)
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Write the default configuration
    InitConfig {
        /// Output file
        path: PathBuf,
    },
    /// Load and validate a configuration
    CheckConfig {
        /// Config file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
    /// Run a script against a fresh ledger
    Replay {
        /// Config file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Script file path
        #[arg(short, long, value_name = "FILE")]
        script: PathBuf,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Command::InitConfig { .. } => None,
        Command::CheckConfig { config } | Command::Replay { config, .. } => {
            Some(LedgerConfig::from_file(config)?)
        }
    };

    let logging = config.as_ref().map(|c| c.logging.clone()).unwrap_or_default();
    let level = cli.log_level.clone().unwrap_or(logging.level);
    let json_format = match cli.log_format {
        Some(format) => format == LogFormat::Json,
        None => logging.format == "json",
    };
    telemetry::init_telemetry(&level, json_format)?;

    match cli.command {
        Command::InitConfig { path } => {
            LedgerConfig::default().to_file(&path)?;
            info!("Wrote default configuration to {:?}", path);
        }
        Command::CheckConfig { .. } => {
            let config = config.unwrap_or_default();
            config.validate()?;
            info!("Configuration is valid");
            println!("{}", toml::to_string_pretty(&config.governance)?);
        }
        Command::Replay { script, json, .. } => {
            let config = config.unwrap_or_default();
            let script = Script::from_file(&script)?;
            info!("Replaying {} steps", script.steps.len());

            let report = replay::replay(&config, &script)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", replay::render(&report));
            }
        }
    }

    Ok(())
}
