//! BLE provisioning adapter.
//!
//! Implements [`RadioPort`] — the GATT server hosting the provisioning
//! service described in [`crate::provisioning`].
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via raw `esp_ble_*`
//!   calls.  Characteristics are auto-responded from their attribute
//!   values; writes are queued by the GATTS callback and drained by
//!   [`RadioPort::dispatch_writes`].
//! - **all other targets**: in-memory simulation with write injection for
//!   host-side tests.

use log::{info, warn};

use crate::app::ports::{RadioPort, WriteHandler};
use crate::provisioning::{DataPoint, MAX_WRITE_LEN, SERVICE_UUID};

#[cfg(not(target_os = "espidf"))]
use std::collections::VecDeque;

/// Longest advertised local name.
pub const MAX_NAME_LEN: usize = 29;

/// Writes buffered between two ticks.
pub const WRITE_QUEUE_DEPTH: usize = 8;

/// One byte more than the longest accepted write, so the service can tell
/// an over-long write from a maximal one.
const QUEUED_WRITE_CAP: usize = MAX_WRITE_LEN + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
    Failed,
}

fn truncate_name(label: &str) -> heapless::String<MAX_NAME_LEN> {
    let mut name = heapless::String::new();
    for c in label.chars() {
        if name.push(c).is_err() {
            break;
        }
    }
    name
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF static state
// ───────────────────────────────────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures.  These statics bridge the callback context to the adapter.

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};

#[cfg(target_os = "espidf")]
static BLE_GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CONN_ID: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CONNECTED: AtomicBool = AtomicBool::new(false);
#[cfg(target_os = "espidf")]
static BLE_ADVERTISING: AtomicBool = AtomicBool::new(false);
#[cfg(target_os = "espidf")]
static BLE_SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
/// Index into [`DataPoint::ALL`] of the characteristic being registered.
#[cfg(target_os = "espidf")]
static BLE_CHAR_STEP: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CHAR_HANDLES: [AtomicU32; DataPoint::COUNT] =
    [const { AtomicU32::new(0) }; DataPoint::COUNT];
#[cfg(target_os = "espidf")]
static BLE_REGISTERED: AtomicBool = AtomicBool::new(false);

#[cfg(target_os = "espidf")]
type QueuedWrite = (u8, heapless::Vec<u8, QUEUED_WRITE_CAP>);

// GATTS callbacks run in the Bluedroid task (not ISR), so std Mutex is safe.
#[cfg(target_os = "espidf")]
static BLE_WRITE_QUEUE: std::sync::Mutex<heapless::Deque<QueuedWrite, WRITE_QUEUE_DEPTH>> =
    std::sync::Mutex::new(heapless::Deque::new());

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    unsafe {
        t.uuid.uuid128 = uuid.to_le_bytes();
    }
    t
}

#[cfg(target_os = "espidf")]
fn uuid16_to_esp(uuid: u16) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 2;
    t.uuid.uuid16 = uuid;
    t
}

#[cfg(target_os = "espidf")]
fn adv_params() -> esp_idf_svc::sys::esp_ble_adv_params_t {
    use esp_idf_svc::sys::*;
    esp_ble_adv_params_t {
        adv_int_min: 0x20,
        adv_int_max: 0x40,
        adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
        own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
        channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
        adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
        ..unsafe { core::mem::zeroed() }
    }
}

/// Register the characteristic for `point` with an auto-responded value
/// buffer of [`MAX_WRITE_LEN`] bytes.
#[cfg(target_os = "espidf")]
unsafe fn add_data_point(svc_handle: u16, point: DataPoint) {
    use esp_idf_svc::sys::*;

    let access = point.access();
    let mut perm = 0u32;
    let mut prop = 0u32;
    if access.readable() {
        perm |= ESP_GATT_PERM_READ;
        prop |= ESP_GATT_CHAR_PROP_BIT_READ;
    }
    if access.writable() {
        perm |= ESP_GATT_PERM_WRITE;
        prop |= ESP_GATT_CHAR_PROP_BIT_WRITE;
    }
    if point.notifies() {
        prop |= ESP_GATT_CHAR_PROP_BIT_NOTIFY;
    }

    let mut char_uuid = uuid128_to_esp(point.uuid());
    let mut value = esp_attr_value_t {
        attr_max_len: MAX_WRITE_LEN as u16,
        attr_len: 0,
        attr_value: core::ptr::null_mut(),
    };
    let mut control = esp_attr_control_t {
        auto_rsp: ESP_GATT_AUTO_RSP as u8,
    };
    unsafe {
        esp_ble_gatts_add_char(
            svc_handle,
            &mut char_uuid,
            perm as esp_gatt_perm_t,
            prop as esp_gatt_char_prop_t,
            &mut value,
            &mut control,
        );
    }
}

/// Register the client-configuration descriptor of a notifying point.
#[cfg(target_os = "espidf")]
unsafe fn add_cccd(svc_handle: u16) {
    use esp_idf_svc::sys::*;
    let mut uuid = uuid16_to_esp(ESP_GATT_UUID_CHAR_CLIENT_CONFIG as u16);
    let mut control = esp_attr_control_t {
        auto_rsp: ESP_GATT_AUTO_RSP as u8,
    };
    unsafe {
        esp_ble_gatts_add_char_descr(
            svc_handle,
            &mut uuid,
            (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
            core::ptr::null_mut(),
            &mut control,
        );
    }
}

/// Register the point after `done`, or mark the table complete.
#[cfg(target_os = "espidf")]
unsafe fn register_next(svc_handle: u16, done: usize) {
    match DataPoint::from_index(done + 1) {
        Some(next) => {
            BLE_CHAR_STEP.store((done + 1) as u32, AtomicOrdering::Relaxed);
            unsafe { add_data_point(svc_handle, next) };
        }
        None => {
            BLE_REGISTERED.store(true, AtomicOrdering::Release);
            log::info!("BLE GATTS: all {} data points registered", DataPoint::COUNT);
        }
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    _param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising stopped");
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    BLE_GATTS_IF.store(gatts_if as u32, AtomicOrdering::Relaxed);

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            log::info!("BLE GATTS: app registered (if={})", gatts_if);
            let mut svc_id = esp_gatt_srvc_id_t {
                id: esp_gatt_id_t {
                    uuid: uuid128_to_esp(SERVICE_UUID),
                    inst_id: 0,
                },
                is_primary: true,
            };
            // service + (declaration, value) per point + one CCCD
            let handles = (1 + DataPoint::COUNT * 2 + 1) as u16;
            unsafe { esp_ble_gatts_create_service(gatts_if, &mut svc_id, handles) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            let svc_handle = unsafe { (*param).create.service_handle };
            BLE_SVC_HANDLE.store(svc_handle as u32, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: service created (handle={})", svc_handle);
            unsafe {
                esp_ble_gatts_start_service(svc_handle);
            }
            BLE_CHAR_STEP.store(0, AtomicOrdering::Relaxed);
            unsafe { add_data_point(svc_handle, DataPoint::ALL[0]) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            let handle = unsafe { (*param).add_char.attr_handle };
            let step = BLE_CHAR_STEP.load(AtomicOrdering::Relaxed) as usize;
            let svc_handle = BLE_SVC_HANDLE.load(AtomicOrdering::Relaxed) as u16;
            let Some(point) = DataPoint::from_index(step) else {
                return;
            };
            BLE_CHAR_HANDLES[step].store(handle as u32, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: {} char (handle={})", point.name(), handle);
            if point.notifies() {
                unsafe { add_cccd(svc_handle) };
            } else {
                unsafe { register_next(svc_handle, step) };
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
            let step = BLE_CHAR_STEP.load(AtomicOrdering::Relaxed) as usize;
            let svc_handle = BLE_SVC_HANDLE.load(AtomicOrdering::Relaxed) as u16;
            unsafe { register_next(svc_handle, step) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            let p = unsafe { &(*param).connect };
            BLE_CONN_ID.store(p.conn_id as u32, AtomicOrdering::Relaxed);
            BLE_CONNECTED.store(true, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: client connected (conn_id={})", p.conn_id);
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            BLE_CONNECTED.store(false, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: client disconnected");
            if BLE_ADVERTISING.load(AtomicOrdering::Relaxed) {
                let mut params = adv_params();
                unsafe { esp_ble_gap_start_advertising(&mut params) };
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            let p = unsafe { &(*param).write };
            if p.is_prep {
                log::warn!("BLE GATTS: prepared write ignored (handle={})", p.handle);
                return;
            }
            let handle = p.handle as u32;
            let Some(idx) = BLE_CHAR_HANDLES
                .iter()
                .position(|h| h.load(AtomicOrdering::Relaxed) == handle)
            else {
                return;
            };
            let data = unsafe { core::slice::from_raw_parts(p.value, p.len as usize) };
            let mut value = heapless::Vec::<u8, QUEUED_WRITE_CAP>::new();
            let _ = value.extend_from_slice(&data[..data.len().min(QUEUED_WRITE_CAP)]);
            if let Ok(mut queue) = BLE_WRITE_QUEUE.lock() {
                if queue.push_back((idx as u8, value)).is_err() {
                    log::warn!("BLE GATTS: write queue full, dropping write");
                }
            }
        }
        _ => {}
    }
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

pub struct BleAdapter {
    state: BleState,
    device_name: heapless::String<MAX_NAME_LEN>,
    /// Last value set per point; mirrored to the GATT table on device.
    values: [String; DataPoint::COUNT],
    #[cfg(target_os = "espidf")]
    stack_up: bool,
    /// Attribute values were pushed after registration completed.
    #[cfg(target_os = "espidf")]
    synced: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_writes: VecDeque<(DataPoint, Vec<u8>)>,
    #[cfg(not(target_os = "espidf"))]
    sim_central: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_notifications: usize,
}

impl BleAdapter {
    pub fn new(label: &str) -> Self {
        Self {
            state: BleState::Idle,
            device_name: truncate_name(label),
            values: Default::default(),
            #[cfg(target_os = "espidf")]
            stack_up: false,
            #[cfg(target_os = "espidf")]
            synced: false,
            #[cfg(not(target_os = "espidf"))]
            sim_writes: VecDeque::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_central: false,
            #[cfg(not(target_os = "espidf"))]
            sim_notifications: 0,
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Value a central would currently read from `point`.
    pub fn value(&self, point: DataPoint) -> &str {
        &self.values[point as usize]
    }

    // ── Platform-specific ─────────────────────────────────────

    /// Bring up the controller and Bluedroid once and register callbacks.
    #[cfg(target_os = "espidf")]
    fn ensure_stack(&mut self) -> bool {
        use esp_idf_svc::sys::*;
        if self.stack_up {
            return true;
        }
        unsafe {
            // Release classic BT memory (BLE-only mode saves ~30 KB).
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            let ret = esp_bt_controller_init(&mut bt_cfg);
            if ret != ESP_OK {
                log::error!("BLE: bt_controller_init failed ({})", ret);
                return false;
            }
            let ret = esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE);
            if ret != ESP_OK {
                log::error!("BLE: bt_controller_enable failed ({})", ret);
                return false;
            }
            let ret = esp_bluedroid_init();
            if ret != ESP_OK {
                log::error!("BLE: bluedroid_init failed ({})", ret);
                return false;
            }
            let ret = esp_bluedroid_enable();
            if ret != ESP_OK {
                log::error!("BLE: bluedroid_enable failed ({})", ret);
                return false;
            }

            esp_ble_gap_register_callback(Some(ble_gap_event_handler));
            esp_ble_gatts_register_callback(Some(ble_gatts_event_handler));
            esp_ble_gatts_app_register(0);
            // Room for a full-length write in one ATT packet.
            esp_ble_gatt_set_local_mtu((MAX_WRITE_LEN + 3) as u16);

            let mut name = [0u8; MAX_NAME_LEN + 1];
            name[..self.device_name.len()].copy_from_slice(self.device_name.as_bytes());
            esp_ble_gap_set_device_name(name.as_ptr() as *const _);
        }
        info!("BLE(espidf): Bluedroid stack initialised as '{}'", self.device_name);
        self.stack_up = true;
        true
    }

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) -> bool {
        if !self.ensure_stack() {
            return false;
        }
        BLE_ADVERTISING.store(true, AtomicOrdering::Relaxed);
        let mut params = adv_params();
        unsafe {
            esp_idf_svc::sys::esp_ble_gap_start_advertising(&mut params);
        }
        true
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self) -> bool {
        info!(
            "BLE(sim): advertising '{}' (service {:032x})",
            self.device_name, SERVICE_UUID
        );
        true
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&mut self) {
        BLE_ADVERTISING.store(false, AtomicOrdering::Relaxed);
        unsafe {
            esp_idf_svc::sys::esp_ble_gap_stop_advertising();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&mut self) {
        info!("BLE(sim): advertising stopped");
    }

    #[cfg(target_os = "espidf")]
    fn platform_set_value(&mut self, point: DataPoint) {
        let handle = BLE_CHAR_HANDLES[point as usize].load(AtomicOrdering::Relaxed);
        if handle == 0 {
            return;
        }
        let value = self.values[point as usize].as_bytes();
        let len = value.len().min(MAX_WRITE_LEN);
        unsafe {
            esp_idf_svc::sys::esp_ble_gatts_set_attr_value(handle as u16, len as u16, value.as_ptr());
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_set_value(&mut self, _point: DataPoint) {}

    #[cfg(target_os = "espidf")]
    fn platform_notify(&mut self, point: DataPoint) -> bool {
        let handle = BLE_CHAR_HANDLES[point as usize].load(AtomicOrdering::Relaxed);
        if handle == 0 || !BLE_CONNECTED.load(AtomicOrdering::Relaxed) {
            return false;
        }
        let value = self.values[point as usize].as_bytes();
        let len = value.len().min(MAX_WRITE_LEN);
        let ret = unsafe {
            esp_idf_svc::sys::esp_ble_gatts_send_indicate(
                BLE_GATTS_IF.load(AtomicOrdering::Relaxed) as u8,
                BLE_CONN_ID.load(AtomicOrdering::Relaxed) as u16,
                handle as u16,
                len as u16,
                value.as_ptr() as *mut u8,
                false,
            )
        };
        ret == esp_idf_svc::sys::ESP_OK
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_notify(&mut self, _point: DataPoint) -> bool {
        self.sim_notifications += 1;
        self.sim_central
    }

    /// Push every cached value once the GATT table exists.
    #[cfg(target_os = "espidf")]
    fn sync_values(&mut self) {
        if self.synced || !BLE_REGISTERED.load(AtomicOrdering::Acquire) {
            return;
        }
        for point in DataPoint::ALL {
            if point.access().readable() {
                self.platform_set_value(point);
            }
        }
        self.synced = true;
    }

    // ── Simulation hooks ──────────────────────────────────────

    /// Queue a write as if a central had sent it.
    #[cfg(not(target_os = "espidf"))]
    pub fn inject_write(&mut self, point: DataPoint, value: &[u8]) {
        if self.sim_writes.len() >= WRITE_QUEUE_DEPTH {
            warn!("BLE(sim): write queue full, dropping write");
            return;
        }
        let len = value.len().min(QUEUED_WRITE_CAP);
        self.sim_writes.push_back((point, value[..len].to_vec()));
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn set_central_connected(&mut self, connected: bool) {
        self.sim_central = connected;
    }

    /// Notifications attempted so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn notify_count(&self) -> usize {
        self.sim_notifications
    }
}

// ───────────────────────────────────────────────────────────────
// RadioPort implementation
// ───────────────────────────────────────────────────────────────

impl RadioPort for BleAdapter {
    fn start_advertising(&mut self) {
        if self.state == BleState::Advertising {
            return;
        }
        if self.platform_start() {
            info!("BLE: advertising as '{}'", self.device_name);
            self.state = BleState::Advertising;
        } else {
            warn!("BLE: stack failed to start");
            self.state = BleState::Failed;
        }
    }

    fn stop_advertising(&mut self) {
        if self.state != BleState::Advertising {
            return;
        }
        self.platform_stop();
        self.state = BleState::Idle;
    }

    fn is_advertising(&self) -> bool {
        self.state == BleState::Advertising
    }

    fn set_value(&mut self, point: DataPoint, value: &str) {
        let slot = &mut self.values[point as usize];
        if slot != value {
            value.clone_into(slot);
            self.platform_set_value(point);
        }
    }

    fn notify(&mut self, point: DataPoint) -> bool {
        if !point.notifies() {
            return false;
        }
        self.platform_notify(point)
    }

    #[cfg(target_os = "espidf")]
    fn dispatch_writes(&mut self, handler: &mut dyn WriteHandler) {
        self.sync_values();
        loop {
            // Release the lock before calling out to the handler.
            let next = match BLE_WRITE_QUEUE.lock() {
                Ok(mut queue) => queue.pop_front(),
                Err(_) => None,
            };
            let Some((idx, value)) = next else {
                break;
            };
            if let Some(point) = DataPoint::from_index(idx as usize) {
                handler.on_write(point, &value);
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn dispatch_writes(&mut self, handler: &mut dyn WriteHandler) {
        while let Some((point, value)) = self.sim_writes.pop_front() {
            handler.on_write(point, &value);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
