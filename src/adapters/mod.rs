//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements    | Connects to                 |
//! |-------------|---------------|-----------------------------|
//! | `ble`       | RadioPort     | Bluedroid GATT server       |
//! | `device_id` | —             | eFuse factory MAC           |
//! | `log_sink`  | EventSink     | Serial log output           |
//! | `mqtt`      | BrokerClient  | ESP-MQTT client / sim       |
//! | `nvs`       | StoragePort   | NVS / in-memory store       |
//! | `time`      | SystemPort    | ESP32 timer, FreeRTOS, reset|
//! | `wifi`      | NetworkPort   | ESP-IDF WiFi STA            |

pub mod ble;
pub mod device_id;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod time;
pub mod wifi;
