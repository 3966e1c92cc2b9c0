//! ESP32 system adapter.
//!
//! Monotonic time, blocking delay and restart for the device core.
//!
//! - **`target_os = "espidf"`** — wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer (microsecond precision, monotonic),
//!   FreeRTOS delays and `esp_restart()`.
//! - **`not(target_os = "espidf")`** — uses `std::time::Instant` for
//!   host-side testing and simulation; restart is only recorded.

use embedded_hal::delay::DelayNs;
use log::warn;

use crate::app::ports::SystemPort;

#[cfg(not(target_os = "espidf"))]
static SIM_EPOCH: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();

/// Milliseconds since boot (monotonic).
#[cfg(target_os = "espidf")]
pub fn uptime_ms() -> u64 {
    (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
}

/// Milliseconds since the first call (monotonic).
#[cfg(not(target_os = "espidf"))]
pub fn uptime_ms() -> u64 {
    SIM_EPOCH
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_millis() as u64
}

/// System adapter for the ESP32 platform.
pub struct EspSystem {
    #[cfg(not(target_os = "espidf"))]
    restarts: u32,
}

impl Default for EspSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl EspSystem {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            restarts: 0,
        }
    }

    /// Restarts requested so far (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn restarts(&self) -> u32 {
        self.restarts
    }
}

impl DelayNs for EspSystem {
    #[cfg(target_os = "espidf")]
    fn delay_ns(&mut self, ns: u32) {
        esp_idf_hal::delay::Ets::delay_us(ns.div_ceil(1_000));
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }

    /// Millisecond delays yield to the scheduler.
    #[cfg(target_os = "espidf")]
    fn delay_ms(&mut self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }
}

impl SystemPort for EspSystem {
    fn uptime_ms(&self) -> u64 {
        uptime_ms()
    }

    #[cfg(target_os = "espidf")]
    fn restart(&mut self) {
        warn!("System: restarting");
        unsafe { esp_idf_svc::sys::esp_restart() };
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart(&mut self) {
        self.restarts += 1;
        warn!("System(sim): restart requested ({})", self.restarts);
    }
}
