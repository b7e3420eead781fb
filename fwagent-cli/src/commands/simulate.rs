//! `fwagent simulate`: run a full deployment against local files.
//!
//! Firmware is served from memory at `http://simulator.local/<file id>`,
//! reports are printed, and the image lands in the output directory.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::Args;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use fwagent::config::ConfigFile;
use fwagent::manifest::{self, ManifestCapacity, ScratchArena, UpdateIdentity};
use fwagent::testing::MemoryTransport;
use fwagent::verify::RootKeyTable;
use fwagent::{Agent, AgentState, NotifyCallback, UpdateNotice};

use crate::commands::common::{drive, printing_cloud, read_file, read_token, FileDriver};
use crate::error::CliError;

const SIMULATOR_HOST: &str = "simulator.local";

/// Arguments of `fwagent simulate`.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Update manifest file
    #[arg(long)]
    pub manifest: PathBuf,

    /// File holding the compact signature token
    #[arg(long)]
    pub signature: PathBuf,

    /// Firmware to serve, as `<file id>=<path>`; repeat per file
    #[arg(long = "firmware", value_name = "ID=PATH")]
    pub firmware: Vec<String>,

    /// Directory the simulated device writes into
    #[arg(long, default_value = "fwagent-device")]
    pub out: PathBuf,

    /// Device manufacturer; the manifest's compatibility when omitted
    #[arg(long)]
    pub manufacturer: Option<String>,

    /// Device model; the manifest's compatibility when omitted
    #[arg(long)]
    pub model: Option<String>,

    /// Installed criteria the device reports before the update
    #[arg(long, default_value = "")]
    pub installed: String,

    /// Ask for consent through the notification callback
    #[arg(long)]
    pub consent: bool,

    /// Ticks to wait for the deployment to settle
    #[arg(long, default_value_t = 600)]
    pub max_ticks: u32,
}

fn parse_firmware(value: &str) -> Result<(String, PathBuf), CliError> {
    match value.split_once('=') {
        Some((id, path)) if !id.is_empty() && !path.is_empty() => {
            Ok((id.to_string(), PathBuf::from(path)))
        }
        _ => Err(CliError::Usage(format!(
            "invalid --firmware '{}', expected <file id>=<path>",
            value
        ))),
    }
}

/// Callback granting consent as soon as each phase asks for it.
fn auto_consent() -> NotifyCallback {
    Box::new(
        |agent: &Agent, notice: UpdateNotice, update: &UpdateIdentity| {
            info!(
                notice = notice.name(),
                provider = %update.provider,
                name = %update.name,
                version = %update.version,
                "consent requested"
            );
            match notice {
                UpdateNotice::UpdateReceived => agent.update_download_and_install(),
                UpdateNotice::Installed => agent.update_apply(),
                UpdateNotice::Downloaded => {}
            }
        },
    )
}

pub fn run(args: SimulateArgs, config: &ConfigFile) -> Result<(), CliError> {
    let manifest_bytes = read_file(&args.manifest)?;
    let signature = read_token(&args.signature)?;
    let manifest_text = String::from_utf8(manifest_bytes.clone())
        .map_err(|_| CliError::Usage(format!("{} is not UTF-8", args.manifest.display())))?;

    let content = manifest::parse(
        &manifest_bytes,
        ScratchArena::with_capacity(config.agent.scratch_size.max(manifest_bytes.len())),
        ManifestCapacity {
            steps: config.agent.steps_max(),
            files: config.agent.files_max(),
        },
    )?;

    let transport = MemoryTransport::new();
    let mut file_urls = Map::new();
    for value in &args.firmware {
        let (id, path) = parse_firmware(value)?;
        let url = format!("http://{}/{}", SIMULATOR_HOST, id);
        transport.serve(&url, read_file(&path)?)?;
        file_urls.insert(id, Value::String(url));
    }
    for file in &content.files {
        let id = content.text(file.id);
        if !file_urls.contains_key(id) {
            warn!(file = id, "no firmware given for manifest file");
        }
    }

    let mut agent_config = config.to_agent_config()?;
    agent_config.manufacturer = args
        .manufacturer
        .unwrap_or_else(|| content.text(content.compatibility.manufacturer).to_string());
    agent_config.model = args
        .model
        .unwrap_or_else(|| content.text(content.compatibility.model).to_string());
    agent_config.installed_criteria = args.installed;
    agent_config.root_keys.extend(RootKeyTable::development());
    warn!("simulator trusts the development root key");

    let agent = Agent::start(
        agent_config,
        printing_cloud(),
        Box::new(transport),
        Box::new(FileDriver::new(&args.out)),
        args.consent.then(auto_consent),
    )?;

    let properties = json!({"deviceUpdate": {"__t": "c", "service": {
        "workflow": {"action": 3, "id": "simulated"},
        "updateManifest": manifest_text,
        "updateManifestSignature": signature,
        "fileUrls": file_urls
    }}});
    agent.handle_properties(properties.to_string().as_bytes(), 1)?;

    let interrupted = AtomicBool::new(false);
    let state = drive(&agent, Duration::ZERO, args.max_ticks, &interrupted);
    agent.stop();

    println!();
    println!("Deployment finished: {}", state);
    for (index, step) in agent.step_states().iter().enumerate() {
        println!("  step {}: {}", index, step);
    }
    println!("Device directory: {}", args.out.display());

    match state {
        AgentState::Idle => Ok(()),
        other => Err(CliError::Deployment(other)),
    }
}
