//! `fwagent run`: deploy from a property document over real HTTP.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::info;

use fwagent::config::ConfigFile;
use fwagent::downloader::ThreadedHttpTransport;
use fwagent::{Agent, AgentState};

use crate::commands::common::{drive, printing_cloud, read_file, FileDriver};
use crate::error::CliError;

/// Arguments of `fwagent run`.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Writable-property document as sent by the service
    #[arg(long)]
    pub properties: PathBuf,

    /// Directory the device driver writes into
    #[arg(long, default_value = "fwagent-device")]
    pub out: PathBuf,

    /// Seconds to wait for the deployment to settle
    #[arg(long, default_value_t = 3600)]
    pub max_seconds: u32,
}

pub fn run(args: RunArgs, config: &ConfigFile) -> Result<(), CliError> {
    let document = read_file(&args.properties)?;
    let agent_config = config.to_agent_config()?;
    let request_timeout = Duration::from_secs(u64::from(agent_config.timeouts.http_download));

    let driver = FileDriver::new(&args.out);
    let agent = Agent::start(
        agent_config,
        printing_cloud(),
        Box::new(ThreadedHttpTransport::new(request_timeout)),
        Box::new(driver),
        None,
    )?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
        .map_err(|e| CliError::Usage(format!("cannot install Ctrl-C handler: {}", e)))?;

    agent.handle_properties(&document, 1)?;
    info!(state = %agent.state(), "properties handled");

    let state = drive(
        &agent,
        Duration::from_secs(1),
        args.max_seconds,
        &interrupted,
    );
    agent.stop();

    println!("Deployment finished: {}", state);
    if let Some(installed) = FileDriver::new(&args.out).installed() {
        println!("Installed criteria: {}", installed);
    }

    match state {
        AgentState::Idle => Ok(()),
        other => Err(CliError::Deployment(other)),
    }
}
