//! Application core — pure domain logic, zero I/O.
//!
//! The device controller, identity handling and the connectivity summary.
//! All interaction with hardware happens through **port traits** defined
//! in [`ports`], keeping this layer fully testable without real peripherals.

pub mod device;
pub mod events;
pub mod identity;
pub mod ports;
pub mod status;

pub use device::MeoDevice;
