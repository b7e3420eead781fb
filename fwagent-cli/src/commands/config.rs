//! Configuration management CLI commands.
//!
//! Provides `config path`, `config show` and `config init`.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use fwagent::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Show the effective configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(
    command: ConfigCommands,
    path: Option<&Path>,
    config: &ConfigFile,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(path),
        ConfigCommands::Show => run_show(config),
        ConfigCommands::Init { force } => run_init(path, force),
    }
}

fn target_path(path: Option<&Path>) -> Result<PathBuf, CliError> {
    path.map(Path::to_path_buf)
        .or_else(config_file_path)
        .ok_or_else(|| CliError::Config("no configuration directory on this platform".to_string()))
}

/// Show the configuration file path.
fn run_path(path: Option<&Path>) -> Result<(), CliError> {
    let path = target_path(path)?;
    println!("{}", path.display());
    if !path.exists() {
        println!("(file does not exist, defaults apply)");
    }
    Ok(())
}

/// Show the effective configuration.
fn run_show(config: &ConfigFile) -> Result<(), CliError> {
    let effective = config.to_agent_config()?;

    println!("Configuration Settings");
    println!("======================");
    println!();
    println!("[device]");
    println!("  manufacturer = {}", or_unset(&effective.manufacturer));
    println!("  model = {}", or_unset(&effective.model));
    println!(
        "  installed_criteria = {}",
        or_unset(&effective.installed_criteria)
    );
    println!("  agent_version = {}", effective.agent_version);
    println!("  delivery_version = {}", effective.delivery_version);
    println!();
    println!("[capacity]");
    println!("  proxy_update_count = {}", effective.proxy_update_count);
    println!("  scratch_size = {}", effective.scratch_size);
    println!("  signature_size = {}", effective.signature_size);
    println!("  manifest_size = {} (derived)", effective.manifest_size());
    println!("  steps_max = {} (derived)", effective.steps_max());
    println!();
    println!("[timeouts]");
    println!("  dns_initial = {}", effective.timeouts.dns_initial);
    println!(
        "  dns_retransmit_count = {}",
        effective.timeouts.dns_retransmit_count
    );
    println!("  http_connect = {}", effective.timeouts.http_connect);
    println!("  http_download = {}", effective.timeouts.http_download);
    println!();
    println!("[logging]");
    println!("  level = {}", config.logging.level);
    match &config.logging.directory {
        Some(dir) => println!("  directory = {}", dir.display()),
        None => println!("  directory = (not set, stderr only)"),
    }
    println!();
    println!("[keys]");
    match &config.keys_file {
        Some(file) => println!("  file = {}", file.display()),
        None => println!("  file = (not set)"),
    }
    let kids: Vec<&str> = effective.root_keys.kids().collect();
    println!("  trusted roots = {}", kids.join(", "));

    Ok(())
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

/// Write a default configuration file.
fn run_init(path: Option<&Path>, force: bool) -> Result<(), CliError> {
    let path = target_path(path)?;
    if path.exists() && !force {
        return Err(CliError::Usage(format!(
            "{} already exists, use --force to overwrite",
            path.display()
        )));
    }
    ConfigFile::default().save_to(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
