use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::{DeviceDriver, DriverCommand, DriverError, DriverReply};

/// Owned record of a driver command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommand {
    Initialize,
    UpdateCheck(String),
    Preprocess(u32),
    Write { offset: u32, len: usize },
    Install,
    Apply,
    Cancel,
}

/// Driver that records commands and keeps written firmware in memory.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    inner: Arc<Mutex<DriverScript>>,
}

#[derive(Debug, Default)]
struct DriverScript {
    commands: Vec<RecordedCommand>,
    firmware: Vec<u8>,
    installed: Vec<String>,
    fail_on: Option<&'static str>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `criteria` as installed on `UpdateCheck`.
    pub fn with_installed(self, criteria: impl Into<String>) -> Self {
        self.inner.lock().installed.push(criteria.into());
        self
    }

    /// Fail every command with this name (see [`DriverCommand::name`]).
    pub fn fail_on(&self, command: &'static str) {
        self.inner.lock().fail_on = Some(command);
    }

    /// Commands received so far.
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.inner.lock().commands.clone()
    }

    /// Firmware bytes written so far.
    pub fn firmware(&self) -> Vec<u8> {
        self.inner.lock().firmware.clone()
    }

    /// A boxed clone to hand to the agent.
    pub fn boxed(&self) -> Box<dyn DeviceDriver> {
        Box::new(self.clone())
    }
}

impl DeviceDriver for ScriptedDriver {
    fn execute(&mut self, command: DriverCommand<'_>) -> Result<DriverReply, DriverError> {
        let mut script = self.inner.lock();
        let recorded = match command {
            DriverCommand::Initialize => RecordedCommand::Initialize,
            DriverCommand::UpdateCheck { installed_criteria } => {
                RecordedCommand::UpdateCheck(installed_criteria.to_string())
            }
            DriverCommand::Preprocess { firmware_size } => {
                RecordedCommand::Preprocess(firmware_size)
            }
            DriverCommand::Write { offset, data } => RecordedCommand::Write {
                offset,
                len: data.len(),
            },
            DriverCommand::Install => RecordedCommand::Install,
            DriverCommand::Apply => RecordedCommand::Apply,
            DriverCommand::Cancel => RecordedCommand::Cancel,
        };
        script.commands.push(recorded);

        if script.fail_on == Some(command.name()) {
            return Err(DriverError::new(1, format!("scripted {} failure", command.name())));
        }

        match command {
            DriverCommand::UpdateCheck { installed_criteria } => Ok(DriverReply::Installed(
                script.installed.iter().any(|c| c == installed_criteria),
            )),
            DriverCommand::Preprocess { .. } | DriverCommand::Cancel => {
                script.firmware.clear();
                Ok(DriverReply::Done)
            }
            DriverCommand::Write { offset, data } => {
                let start = offset as usize;
                let end = start + data.len();
                if script.firmware.len() < end {
                    script.firmware.resize(end, 0);
                }
                script.firmware[start..end].copy_from_slice(data);
                Ok(DriverReply::Done)
            }
            _ => Ok(DriverReply::Done),
        }
    }
}
