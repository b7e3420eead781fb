//! Common types and utilities shared across CLI commands.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use serde_json::Value;
use tracing::{debug, info};

use fwagent::config::ConfigFile;
use fwagent::report::CloudClient;
use fwagent::{
    Agent, AgentResult, AgentState, DeviceDriver, DriverCommand, DriverError, DriverReply,
};

use crate::error::CliError;

/// Name of the firmware image written by [`FileDriver`].
pub const FIRMWARE_FILE: &str = "firmware.bin";

/// Name of the file recording the applied installed criteria.
pub const INSTALLED_FILE: &str = "installed";

/// Load the configuration file, from `path` when given.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(config)
}

/// Read a whole file, naming it in the error.
pub fn read_file(path: &Path) -> Result<Vec<u8>, CliError> {
    fs::read(path).map_err(|e| CliError::Usage(format!("cannot read {}: {}", path.display(), e)))
}

/// Read a signature token, trimming surrounding whitespace.
pub fn read_token(path: &Path) -> Result<String, CliError> {
    let bytes = read_file(path)?;
    let text = String::from_utf8(bytes)
        .map_err(|_| CliError::Usage(format!("{} is not UTF-8", path.display())))?;
    Ok(text.trim().to_string())
}

/// Cloud client printing every reported document with a timestamp.
pub fn printing_cloud() -> Box<dyn CloudClient> {
    Box::new(|document: &Value| -> AgentResult<()> {
        println!("[{}] {}", Local::now().format("%H:%M:%S%.3f"), document);
        Ok(())
    })
}

/// Pump the agent until the deployment settles.
///
/// Ticks once per `tick` of wall time. Gives up after `max_ticks` or when
/// `interrupted` is set, stopping the agent in that case.
pub fn drive(
    agent: &Agent,
    tick: Duration,
    max_ticks: u32,
    interrupted: &AtomicBool,
) -> AgentState {
    let mut ticks = 0;
    let mut next_tick = Instant::now() + tick;
    loop {
        agent.process_events();
        if agent.state() != AgentState::DeploymentInProgress {
            break;
        }
        if interrupted.load(Ordering::Relaxed) {
            info!("interrupted, stopping agent");
            agent.stop();
            break;
        }
        if Instant::now() >= next_tick {
            if ticks >= max_ticks {
                info!(ticks, "deployment did not settle, stopping agent");
                agent.stop();
                break;
            }
            ticks += 1;
            next_tick += tick;
            agent.tick();
        }
        if tick > Duration::ZERO {
            thread::sleep(Duration::from_millis(20).min(tick));
        }
    }
    agent.state()
}

// ============================================================================
// File driver
// ============================================================================

/// Device driver writing firmware into a directory.
///
/// The image is streamed to `firmware.bin.part`, renamed to `firmware.bin`
/// on install, and the installed criteria are recorded on apply.
#[derive(Debug)]
pub struct FileDriver {
    directory: PathBuf,
    image: Option<File>,
    checked_criteria: Option<String>,
}

impl FileDriver {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            image: None,
            checked_criteria: None,
        }
    }

    fn partial_path(&self) -> PathBuf {
        self.directory.join(format!("{}.part", FIRMWARE_FILE))
    }

    /// Criteria recorded by the last apply, if any.
    pub fn installed(&self) -> Option<String> {
        fs::read_to_string(self.directory.join(INSTALLED_FILE))
            .ok()
            .map(|text| text.trim().to_string())
    }

    fn io(command: &DriverCommand<'_>, e: std::io::Error) -> DriverError {
        DriverError::new(
            e.raw_os_error().map_or(1, |code| code.unsigned_abs()),
            format!("{}: {}", command.name(), e),
        )
    }

    fn run(&mut self, command: &DriverCommand<'_>) -> std::io::Result<DriverReply> {
        match *command {
            DriverCommand::Initialize => {
                fs::create_dir_all(&self.directory)?;
            }
            DriverCommand::UpdateCheck { installed_criteria } => {
                self.checked_criteria = Some(installed_criteria.to_string());
                let installed = self.installed().as_deref() == Some(installed_criteria);
                return Ok(DriverReply::Installed(installed));
            }
            DriverCommand::Preprocess { firmware_size } => {
                let file = File::create(self.partial_path())?;
                file.set_len(u64::from(firmware_size))?;
                self.image = Some(file);
            }
            DriverCommand::Write { offset, data } => {
                let file = self.image.as_mut().ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no image in progress")
                })?;
                file.seek(SeekFrom::Start(u64::from(offset)))?;
                file.write_all(data)?;
            }
            DriverCommand::Install => {
                if let Some(file) = self.image.take() {
                    file.sync_all()?;
                }
                fs::rename(self.partial_path(), self.directory.join(FIRMWARE_FILE))?;
            }
            DriverCommand::Apply => {
                let criteria = self.checked_criteria.take().unwrap_or_default();
                let mut marker = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(self.directory.join(INSTALLED_FILE))?;
                writeln!(marker, "{}", criteria)?;
            }
            DriverCommand::Cancel => {
                self.image = None;
                let partial = self.partial_path();
                if partial.exists() {
                    fs::remove_file(partial)?;
                }
            }
        }
        Ok(DriverReply::Done)
    }
}

impl DeviceDriver for FileDriver {
    fn execute(&mut self, command: DriverCommand<'_>) -> Result<DriverReply, DriverError> {
        debug!(command = command.name(), directory = %self.directory.display(), "file driver");
        self.run(&command).map_err(|e| Self::io(&command, e))
    }
}
