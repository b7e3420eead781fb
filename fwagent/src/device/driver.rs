//! Device driver interface.

use thiserror::Error;

/// A command sent to a device driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCommand<'a> {
    /// Prepare the driver; sent once when the device is registered.
    Initialize,
    /// Ask whether the firmware matching `installed_criteria` is running.
    UpdateCheck { installed_criteria: &'a str },
    /// A firmware download of `firmware_size` bytes is about to start.
    Preprocess { firmware_size: u32 },
    /// Store a chunk of firmware at `offset`.
    Write { offset: u32, data: &'a [u8] },
    /// Firmware is complete and verified; stage it.
    Install,
    /// Activate the staged firmware. May reboot and never return.
    Apply,
    /// Abandon a partially written image.
    Cancel,
}

impl DriverCommand<'_> {
    /// Get a display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::UpdateCheck { .. } => "update check",
            Self::Preprocess { .. } => "preprocess",
            Self::Write { .. } => "write",
            Self::Install => "install",
            Self::Apply => "apply",
            Self::Cancel => "cancel",
        }
    }
}

/// Successful driver reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverReply {
    /// Command completed.
    Done,
    /// Answer to [`DriverCommand::UpdateCheck`].
    Installed(bool),
}

/// Failure reported by a device driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("status {status}: {message}")]
pub struct DriverError {
    /// Driver-specific status code.
    pub status: u32,
    pub message: String,
}

impl DriverError {
    pub fn new(status: u32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Hardware-specific firmware writer.
///
/// Implemented once per target; closures taking a [`DriverCommand`] work too.
pub trait DeviceDriver: Send {
    fn execute(&mut self, command: DriverCommand<'_>) -> Result<DriverReply, DriverError>;
}

impl<F> DeviceDriver for F
where
    F: for<'a> FnMut(DriverCommand<'a>) -> Result<DriverReply, DriverError> + Send,
{
    fn execute(&mut self, command: DriverCommand<'_>) -> Result<DriverReply, DriverError> {
        self(command)
    }
}
