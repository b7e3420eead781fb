//! fwagent CLI - Command-line interface
//!
//! Verifies, inspects and signs update manifests, and runs deployments
//! against a directory-backed device, either simulated or over HTTP.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::common::load_config;
use commands::config::ConfigCommands;
use commands::manifest::{InspectArgs, SignArgs, VerifyArgs};
use commands::run::RunArgs;
use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "fwagent")]
#[command(version, about = "Secure firmware update agent", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check a manifest signature against the trusted root keys
    Verify(VerifyArgs),

    /// Print the contents of an update manifest
    Inspect(InspectArgs),

    /// Sign a manifest, printing the compact signature token
    Sign(SignArgs),

    /// Run a deployment with firmware served from local files
    Simulate(SimulateArgs),

    /// Run a deployment from a property document over HTTP
    Run(RunArgs),

    /// View or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config.as_deref())?;
    let _logging = fwagent::logging::init(&config.logging)?;

    match cli.command {
        Commands::Verify(args) => commands::manifest::run_verify(args, &config),
        Commands::Inspect(args) => commands::manifest::run_inspect(args, &config),
        Commands::Sign(args) => commands::manifest::run_sign(args),
        Commands::Simulate(args) => commands::simulate::run(args, &config),
        Commands::Run(args) => commands::run::run(args, &config),
        Commands::Config(command) => {
            commands::config::run(command, cli.config.as_deref(), &config)
        }
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
