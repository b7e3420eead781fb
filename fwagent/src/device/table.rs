//! Managed device table.

use tracing::{debug, warn};

use super::driver::{DeviceDriver, DriverCommand, DriverReply};
use crate::error::{AgentError, AgentResult};

/// Index of the host device.
pub const HOST_DEVICE: usize = 0;

/// A device the agent can update.
pub struct Device {
    pub manufacturer: String,
    pub model: String,
    /// Cached installed criteria; empty means ask the driver.
    pub installed_criteria: String,
    driver: Box<dyn DeviceDriver>,
}

impl Device {
    pub fn new(
        manufacturer: impl Into<String>,
        model: impl Into<String>,
        installed_criteria: impl Into<String>,
        driver: Box<dyn DeviceDriver>,
    ) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            model: model.into(),
            installed_criteria: installed_criteria.into(),
            driver,
        }
    }

    /// Exact manufacturer and model match.
    pub fn matches(&self, manufacturer: &[u8], model: &[u8]) -> bool {
        self.manufacturer.as_bytes() == manufacturer && self.model.as_bytes() == model
    }

    /// Send a command to the driver.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::DriverError`] with the driver's status.
    pub fn execute(&mut self, command: DriverCommand<'_>) -> AgentResult<DriverReply> {
        let name = command.name();
        match self.driver.execute(command) {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!(
                    device = %self.model,
                    command = name,
                    status = e.status,
                    error = %e.message,
                    "driver command failed"
                );
                Err(e.into())
            }
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("manufacturer", &self.manufacturer)
            .field("model", &self.model)
            .field("installed_criteria", &self.installed_criteria)
            .finish_non_exhaustive()
    }
}

/// Fixed-capacity device table; slot 0 is the host.
#[derive(Debug)]
pub struct DeviceTable {
    devices: Vec<Device>,
    capacity: usize,
}

impl DeviceTable {
    /// Table with room for `capacity` devices, host included.
    pub fn new(capacity: usize) -> Self {
        Self {
            devices: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Install the host device in slot 0, replacing any previous host.
    pub fn set_host(&mut self, device: Device) {
        if self.devices.is_empty() {
            self.devices.push(device);
        } else {
            self.devices[HOST_DEVICE] = device;
        }
    }

    /// Register a proxy device.
    ///
    /// # Errors
    ///
    /// * [`AgentError::InvalidParameter`] if no host is registered yet
    /// * [`AgentError::BufferExhausted`] if every slot is taken
    pub fn add(&mut self, device: Device) -> AgentResult<usize> {
        if self.devices.is_empty() {
            return Err(AgentError::InvalidParameter(
                "host device must be registered first".to_string(),
            ));
        }
        if self.devices.len() >= self.capacity {
            return Err(AgentError::BufferExhausted("device table"));
        }
        self.devices.push(device);
        let index = self.devices.len() - 1;
        debug!(index, "registered proxy device");
        Ok(index)
    }

    /// First device matching the compatibility identity.
    pub fn find(&self, manufacturer: &[u8], model: &[u8]) -> Option<usize> {
        self.devices
            .iter()
            .position(|device| device.matches(manufacturer, model))
    }

    pub fn get(&self, index: usize) -> Option<&Device> {
        self.devices.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Device> {
        self.devices.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DriverError;

    fn noop_driver() -> Box<dyn DeviceDriver> {
        Box::new(|_: DriverCommand<'_>| -> Result<DriverReply, DriverError> {
            Ok(DriverReply::Done)
        })
    }

    fn device(manufacturer: &str, model: &str) -> Device {
        Device::new(manufacturer, model, "", noop_driver())
    }

    #[test]
    fn test_host_then_proxies() {
        let mut table = DeviceTable::new(2);
        table.set_host(device("Contoso", "Gateway"));
        assert_eq!(table.add(device("Contoso", "Sensor")).unwrap(), 1);

        let result = table.add(device("Contoso", "Valve"));
        assert!(matches!(result, Err(AgentError::BufferExhausted(_))));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_add_requires_host() {
        let mut table = DeviceTable::new(2);
        let result = table.add(device("Contoso", "Sensor"));
        assert!(matches!(result, Err(AgentError::InvalidParameter(_))));
    }

    #[test]
    fn test_find_is_exact_first_match() {
        let mut table = DeviceTable::new(3);
        table.set_host(device("Contoso", "Gateway"));
        table.add(device("Contoso", "Sensor")).unwrap();
        table.add(device("Contoso", "Sensor")).unwrap();

        assert_eq!(table.find(b"Contoso", b"Sensor"), Some(1));
        assert_eq!(table.find(b"Contoso", b"Gateway"), Some(HOST_DEVICE));
        assert_eq!(table.find(b"contoso", b"Sensor"), None);
        assert_eq!(table.find(b"Contoso", b"Sens"), None);
    }

    #[test]
    fn test_set_host_replaces() {
        let mut table = DeviceTable::new(1);
        table.set_host(device("A", "1"));
        table.set_host(device("B", "2"));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(HOST_DEVICE).unwrap().manufacturer, "B");
    }

    #[test]
    fn test_execute_maps_driver_error() {
        let mut failing = Device::new(
            "A",
            "1",
            "",
            Box::new(|_: DriverCommand<'_>| -> Result<DriverReply, DriverError> {
                Err(DriverError::new(7, "no flash"))
            }),
        );
        let result = failing.execute(DriverCommand::Install);
        assert!(matches!(result, Err(AgentError::DriverError(e)) if e.status == 7));
    }
}
