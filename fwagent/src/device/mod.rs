//! Devices the agent updates and the driver interface that reaches them.
//!
//! The host device always occupies slot 0 of the [`DeviceTable`]; proxy
//! (leaf) devices are added behind it up to the configured capacity. Every
//! device owns a [`DeviceDriver`] that performs the hardware side of an
//! update: integrity checks happen in the agent, the driver only stores and
//! activates bytes.

mod driver;
mod table;

pub use driver::{DeviceDriver, DriverCommand, DriverError, DriverReply};
pub use table::{Device, DeviceTable, HOST_DEVICE};
