//! MEO device agent library.
//!
//! Connects a device to a MEO gateway: BLE provisioning, the WiFi + MQTT
//! connectivity lifecycle, and dispatch of feature invocations to
//! application handlers.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each adapter; everything else
//! runs on the host for tests.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod feature;
pub mod fsm;
pub mod provisioning;
pub mod transport;

pub use app::MeoDevice;
pub use config::DeviceConfig;
pub use error::{Error, Result};
