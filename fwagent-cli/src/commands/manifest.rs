//! Manifest tooling: `verify`, `inspect` and `sign`.

use std::path::PathBuf;

use clap::Args;

use fwagent::config::ConfigFile;
use fwagent::manifest::{self, ManifestCapacity, ScratchArena, UpdateManifestContent};
use fwagent::testing::keys;
use fwagent::verify::signer::{sign_manifest, RsaSigningKey};
use fwagent::verify::{ManifestVerifier, RootKeyTable};
use fwagent::AgentError;

use crate::commands::common::{read_file, read_token};
use crate::error::CliError;

/// Arguments of `fwagent verify`.
#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Update manifest file, exactly as delivered
    #[arg(long)]
    pub manifest: PathBuf,

    /// File holding the compact signature token
    #[arg(long)]
    pub signature: PathBuf,

    /// Extra root key table (JSON) to trust
    #[arg(long)]
    pub keys: Option<PathBuf>,

    /// Also trust the development root used by `fwagent sign`
    #[arg(long)]
    pub dev_keys: bool,
}

/// Arguments of `fwagent inspect`.
#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Update manifest file
    #[arg(long)]
    pub manifest: PathBuf,
}

/// Arguments of `fwagent sign`.
#[derive(Debug, Args)]
pub struct SignArgs {
    /// Update manifest file to sign
    #[arg(long)]
    pub manifest: PathBuf,

    /// Root private key (JSON); the development root when omitted
    #[arg(long)]
    pub root_key: Option<PathBuf>,

    /// Signing private key (JSON); the development signing key when omitted
    #[arg(long)]
    pub signing_key: Option<PathBuf>,
}

/// Root keys from the config file plus the ones named on the command line.
fn root_keys(config: &ConfigFile, args: &VerifyArgs) -> Result<RootKeyTable, CliError> {
    let mut table = config.to_agent_config()?.root_keys;
    if let Some(path) = &args.keys {
        table.extend(RootKeyTable::load(path)?);
    }
    if args.dev_keys {
        table.extend(RootKeyTable::development());
    }
    Ok(table)
}

pub fn run_verify(args: VerifyArgs, config: &ConfigFile) -> Result<(), CliError> {
    let manifest = read_file(&args.manifest)?;
    let token = read_token(&args.signature)?;
    let verifier = ManifestVerifier::new(root_keys(config, &args)?);

    if verifier.verify(&manifest, &token) {
        println!("valid");
        Ok(())
    } else {
        println!("invalid");
        Err(CliError::Agent(AgentError::VerificationFailed))
    }
}

pub fn run_inspect(args: InspectArgs, config: &ConfigFile) -> Result<(), CliError> {
    let bytes = read_file(&args.manifest)?;
    let agent = &config.agent;
    let content = manifest::parse(
        &bytes,
        ScratchArena::with_capacity(agent.scratch_size.max(bytes.len())),
        ManifestCapacity {
            steps: agent.steps_max(),
            files: agent.files_max(),
        },
    )?;
    print_manifest(&content);
    Ok(())
}

fn print_manifest(content: &UpdateManifestContent) {
    let identity = content.identity();
    println!("Update");
    println!("======");
    println!("  Provider:        {}", identity.provider);
    println!("  Name:            {}", identity.name);
    println!("  Version:         {}", identity.version);
    println!(
        "  Manifest:        v{}",
        content.text(content.manifest_version)
    );
    println!();

    let compat = &content.compatibility;
    println!("Compatibility");
    println!("  Manufacturer:    {}", content.text(compat.manufacturer));
    println!("  Model:           {}", content.text(compat.model));
    if !compat.group.is_empty() {
        println!("  Group:           {}", content.text(compat.group));
    }
    println!();

    println!("Steps ({})", content.steps.len());
    for (index, step) in content.steps.iter().enumerate() {
        println!(
            "  [{}] {:?} type='{}' handler='{}'",
            index,
            content.step_kind(step),
            content.text(step.step_type),
            content.text(step.handler)
        );
        if !step.installed_criteria.is_empty() {
            println!(
                "      installed criteria: {}",
                content.text(step.installed_criteria)
            );
        }
        if !step.file_id.is_empty() {
            println!("      file: {}", content.text(step.file_id));
        }
        if !step.detached_manifest_file_id.is_empty() {
            println!(
                "      detached manifest: {}",
                content.text(step.detached_manifest_file_id)
            );
        }
    }
    if content.dropped_steps > 0 {
        println!("  ({} more dropped: beyond capacity)", content.dropped_steps);
    }
    println!();

    println!("Files ({})", content.files.len());
    for file in &content.files {
        println!(
            "  {} {} ({} bytes, sha256 {})",
            content.text(file.id),
            content.text(file.name),
            file.size_in_bytes,
            content.text(file.sha256)
        );
    }
    if content.dropped_files > 0 {
        println!("  ({} more dropped: beyond capacity)", content.dropped_files);
    }
}

pub fn run_sign(args: SignArgs) -> Result<(), CliError> {
    let manifest = read_file(&args.manifest)?;
    let root = match &args.root_key {
        Some(path) => RsaSigningKey::load(path)?,
        None => keys::root_key()?,
    };
    let signing = match &args.signing_key {
        Some(path) => RsaSigningKey::load(path)?,
        None => keys::signing_key()?,
    };
    if args.root_key.is_none() || args.signing_key.is_none() {
        eprintln!("warning: signing with development keys");
    }

    println!("{}", sign_manifest(&manifest, &root, &signing)?);
    Ok(())
}
