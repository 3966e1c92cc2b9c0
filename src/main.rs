//! MEO Device — demo firmware entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  NvsAdapter     WifiAdapter    BleAdapter    EspBrokerClient   │
//! │  (StoragePort)  (NetworkPort)  (RadioPort)   (BrokerClient)    │
//! │  EspSystem      LogEventSink                                   │
//! │  (SystemPort)   (EventSink)                                    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              MeoDevice (pure logic)                    │    │
//! │  │  Lifecycle FSM · Provisioning · Transport · Router     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Registers one method (`turn_on_led`) and one event
//! (`humid_temp_update`), then ticks the device forever.
#![deny(unused_must_use)]

use core::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use log::{error, info, warn};

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::PinDriver;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::EspWifi;

use meo_device::adapters::ble::BleAdapter;
use meo_device::adapters::device_id;
use meo_device::adapters::log_sink::LogEventSink;
use meo_device::adapters::mqtt::EspBrokerClient;
use meo_device::adapters::nvs::NvsAdapter;
use meo_device::adapters::time::EspSystem;
use meo_device::adapters::wifi::WifiAdapter;
use meo_device::feature::{FeatureCall, FeatureResponder, ParamMap};
use meo_device::{DeviceConfig, MeoDevice};

const TICK_MS: u32 = 20;
const SENSOR_INTERVAL_MS: u64 = 5_000;

/// Set by the method handler, applied to the pin by the main loop.
static LED_ON: AtomicBool = AtomicBool::new(false);

fn turn_on_led(call: &FeatureCall, responder: &mut FeatureResponder<'_>) {
    info!("feature 'turn_on_led' invoked");
    for (key, value) in &call.params {
        info!("  {} = {}", key, value);
    }
    LED_ON.store(true, Ordering::Relaxed);

    let first = call.param_i64("first").unwrap_or(0);
    let second = call.param_i64("second").unwrap_or(0);
    let msg = format!("LED on, sum={}", first + second);
    responder.respond(call, true, Some(&msg));
}

/// Stand-in readings until a real sensor is wired: 20.0–29.9 °C, 40.0–59.9 %.
fn sample_readings(seed: u64) -> ParamMap {
    let mut values = ParamMap::new();
    let temp = 200 + (seed.wrapping_mul(7_919) % 100);
    let humid = 400 + (seed.wrapping_mul(104_729) % 200);
    values.insert("temperature".into(), format!("{}.{}", temp / 10, temp % 10));
    values.insert("humidity".into(), format!("{}.{}", humid / 10, humid % 10));
    values
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  MEO Device v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut led = PinDriver::output(peripherals.pins.gpio8)?;
    led.set_low()?;

    // ── 2. Configuration ──────────────────────────────────────
    let mac = device_id::read_mac();
    let config = DeviceConfig {
        label: device_id::ble_name(&mac).as_str().into(),
        model: "Test MEO Module".into(),
        manufacturer: "ThingAI Lab".into(),
        ..DeviceConfig::default()
    };
    info!("Device hostname: {}", device_id::hostname(&mac));

    // ── 3. Construct adapters ─────────────────────────────────
    let wifi = WifiAdapter::new(EspWifi::new(peripherals.modem, sys_loop, Some(nvs_partition))?);
    let ble = BleAdapter::new(&config.label);
    let mut sink = LogEventSink::new();

    let mut device = MeoDevice::new(
        config,
        NvsAdapter::new(),
        wifi,
        ble,
        EspBrokerClient::new(),
        EspSystem::new(),
    );
    device.add_feature_method("turn_on_led", turn_on_led);
    device.add_feature_event("humid_temp_update");

    // ── 4. Start ──────────────────────────────────────────────
    if let Err(e) = device.start(&mut sink) {
        // Nothing works without the credential store; wait for a reset.
        error!("MEO device failed to start: {} — halting", e);
        loop {
            FreeRtos::delay_ms(1_000);
        }
    }

    info!("System ready. Entering main loop.");

    // ── 5. Main loop ──────────────────────────────────────────
    let mut last_sample: u64 = 0;
    loop {
        device.tick(&mut sink);

        if LED_ON.swap(false, Ordering::Relaxed) {
            if let Err(e) = led.set_high() {
                warn!("LED: set_high failed: {:?}", e);
            }
        }

        let now = meo_device::adapters::time::uptime_ms();
        if now.saturating_sub(last_sample) >= SENSOR_INTERVAL_MS && device.is_connected() {
            last_sample = now;
            let values = sample_readings(now);
            if !device.publish_event("humid_temp_update", &values) {
                warn!("humid_temp_update not published");
            }
        }

        FreeRtos::delay_ms(TICK_MS);
    }
}
