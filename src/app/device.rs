//! Device controller — the hexagonal core.
//!
//! [`MeoDevice`] owns the lifecycle FSM, the provisioning service, the
//! transport wrapper and the feature router.  All I/O flows through port
//! traits, so the whole controller runs on the host against mock adapters.
//!
//! ```text
//!  StoragePort ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!  NetworkPort ──▶ │          MeoDevice            │
//!    RadioPort ◀─▶ │ FSM · Provisioning · Router   │
//! BrokerClient ◀─▶ │          Transport            │
//!   SystemPort ◀── └──────────────────────────────┘
//! ```
//!
//! One call to [`MeoDevice::tick`] drains radio writes, pumps the broker,
//! steps the FSM and applies whatever the state handlers asked for.

use log::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::error::{Error, Result};
use crate::feature::payload::{self, STATUS_OFFLINE, STATUS_ONLINE};
use crate::feature::{
    FeatureCall, FeatureHandler, FeatureRouter, InvocationEncoding, ParamMap, TopicSpace,
};
use crate::fsm::context::LifecycleContext;
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::provisioning::{ProvisioningService, StaticInfo};
use crate::transport::MqttTransport;

use super::events::DeviceEvent;
use super::identity::{DeviceIdentity, ProvisioningRecord, format_mac};
use super::ports::{BrokerClient, EventSink, NetworkPort, RadioPort, StoragePort, SystemPort};
use super::status::ConnectivityStatus;

/// Credentials and time of the last association attempt.
struct AssociationAttempt {
    ssid: String,
    password: String,
    at_ms: u64,
}

pub struct MeoDevice<S, N, R, B, Y>
where
    S: StoragePort,
    N: NetworkPort,
    R: RadioPort,
    B: BrokerClient,
    Y: SystemPort,
{
    config: DeviceConfig,
    store: S,
    network: N,
    provisioning: ProvisioningService<R>,
    transport: MqttTransport<B>,
    system: Y,
    router: FeatureRouter,
    identity: DeviceIdentity,
    record: ProvisioningRecord,
    fsm: Fsm,
    ctx: LifecycleContext,
    last_status: Option<ConnectivityStatus>,
    last_association: Option<AssociationAttempt>,
    started: bool,
}

impl<S, N, R, B, Y> MeoDevice<S, N, R, B, Y>
where
    S: StoragePort,
    N: NetworkPort,
    R: RadioPort,
    B: BrokerClient,
    Y: SystemPort,
{
    /// Wire the controller to its adapters.  Nothing touches the hardware
    /// until [`start`](Self::start).
    pub fn new(config: DeviceConfig, store: S, network: N, radio: R, broker: B, system: Y) -> Self {
        let encoding = InvocationEncoding::for_device(config.cloud_compatible());
        let provisioning = ProvisioningService::new(radio, &config);
        let transport = MqttTransport::new(broker, &config);
        let ctx = LifecycleContext::new(config.keep_advertising_online);
        Self {
            identity: DeviceIdentity::new(&[0; 6], config.cloud_compatible()),
            config,
            store,
            network,
            provisioning,
            transport,
            system,
            router: FeatureRouter::new(encoding),
            record: ProvisioningRecord::default(),
            fsm: Fsm::new(build_state_table(), StateId::Bootstrapping),
            ctx,
            last_status: None,
            last_association: None,
            started: false,
        }
    }

    // ── Feature registration ──────────────────────────────────

    pub fn add_feature_event(&mut self, name: &str) -> bool {
        match self.router.registry_mut().add_event(name) {
            Ok(()) => true,
            Err(e) => {
                warn!("event '{}' not registered: {}", name, e);
                false
            }
        }
    }

    pub fn add_feature_method(&mut self, name: &str, handler: FeatureHandler) -> bool {
        match self.router.registry_mut().add_method(name, handler) {
            Ok(()) => true,
            Err(e) => {
                warn!("method '{}' not registered: {}", name, e);
                false
            }
        }
    }

    /// Point the transport at another gateway.  Takes effect on the next
    /// connect.
    pub fn set_gateway(&mut self, host: &str, port: u16) {
        self.transport.configure(host, port);
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Bootstrap: validate configuration, open the store, derive the
    /// identity, start the provisioning service and make the first
    /// association attempt.  A store failure is fatal.
    pub fn start(&mut self, sink: &mut impl EventSink) -> Result<()> {
        if self.started {
            return Err(Error::Init("already started"));
        }
        self.config.validate()?;
        self.store.init()?;

        let mac = self.network.mac_address();
        self.identity = DeviceIdentity::new(&mac, self.config.cloud_compatible());

        self.record = ProvisioningRecord::load(&self.store);
        if let Some(preset) = &self.config.preset_wifi {
            info!("WiFi: using preset credentials for '{}'", preset.ssid);
            preset.ssid.clone_into(&mut self.record.wifi_ssid);
            self.record.wifi_pass = Some(preset.password.clone());
        }
        self.apply_record();

        let hw_address = format_mac(&mac);
        self.provisioning.begin(&StaticInfo {
            model: &self.config.model,
            manufacturer: &self.config.manufacturer,
            product_id: &self.config.product_id,
            version: &self.config.firmware_version,
            hw_address: &hw_address,
            wifi_ssid: &self.record.wifi_ssid,
            user_id: &self.record.user_id,
        });

        info!(
            "MEO device {} starting ({} invocation)",
            self.identity.device_id,
            if self.identity.cloud_compatible {
                "payload-encoded"
            } else {
                "path-encoded"
            }
        );
        sink.emit(&DeviceEvent::Started {
            device_id: self.identity.device_id.clone(),
        });

        if self.record.has_wifi() {
            self.associate(true, sink);
        } else {
            info!("WiFi: no credentials stored, waiting for provisioning");
        }

        self.fsm.start(&mut self.ctx);
        self.started = true;
        Ok(())
    }

    /// Run one cooperative cycle.  Call repeatedly from the main loop.
    pub fn tick(&mut self, sink: &mut impl EventSink) {
        if !self.started {
            debug!("tick before start ignored");
            return;
        }
        if self.fsm.current_state() == StateId::Rebooting {
            return;
        }
        let now = self.system.uptime_ms();

        // 1. Provisioning writes, heartbeat, reboot deadline
        let report = self.provisioning.poll(&mut self.store, now);
        for point in &report.written {
            sink.emit(&DeviceEvent::ProvisioningWrite(*point));
        }
        if report.credentials_changed() {
            self.reload_record();
        }

        // 2. Inbound invocations and whatever the handlers queued
        self.transport.pump(&mut self.router);
        self.flush_outbox();

        // 3. Lifecycle
        self.refresh_inputs(now);
        if report.reboot_due {
            let from = self.fsm.current_state();
            if self.fsm.force_transition(StateId::Rebooting, &mut self.ctx) {
                sink.emit(&DeviceEvent::StateChanged {
                    from,
                    to: StateId::Rebooting,
                });
            }
        } else {
            self.step_fsm(sink);
        }
        let connected = self.apply_commands(sink);
        if connected {
            // Declare in the same tick the session came up.
            self.refresh_inputs(now);
            self.step_fsm(sink);
            self.apply_commands(sink);
        }

        // 4. Connectivity summary
        self.update_status(now, sink);
    }

    // ── Application publishing ────────────────────────────────

    /// Publish `values` on `…/event/<name>`.  `false` when offline.
    pub fn publish_event(&mut self, name: &str, values: &ParamMap) -> bool {
        if !self.router.registry().has_event(name) {
            debug!("event '{}' was not declared", name);
        }
        let topic = self.router.topics().event(name);
        match payload::event(values) {
            Ok(body) => self.transport.publish(&topic, &body, false),
            Err(e) => {
                warn!("event '{}': encode failed: {}", name, e);
                false
            }
        }
    }

    /// Publish a feature response outside a handler.
    pub fn send_feature_response(
        &mut self,
        call: &FeatureCall,
        success: bool,
        message: Option<&str>,
    ) -> bool {
        let topic = self.router.topics().feature_response();
        match payload::feature_response(call, success, message) {
            Ok(body) => self.transport.publish(&topic, &body, false),
            Err(e) => {
                warn!("feature '{}': response encode failed: {}", call.feature_name, e);
                false
            }
        }
    }

    /// Retained `online`/`offline` on the status topic.
    pub fn publish_status(&mut self, online: bool) -> bool {
        let topic = self.router.topics().status();
        let body = if online { STATUS_ONLINE } else { STATUS_OFFLINE };
        self.transport.publish(&topic, body, true)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn record(&self) -> &ProvisioningRecord {
        &self.record
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn topics(&self) -> &TopicSpace {
        self.router.topics()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn is_network_connected(&self) -> bool {
        self.network.is_connected()
    }

    pub fn connectivity(&self) -> Option<ConnectivityStatus> {
        self.last_status
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn network_mut(&mut self) -> &mut N {
        &mut self.network
    }

    pub fn provisioning(&self) -> &ProvisioningService<R> {
        &self.provisioning
    }

    pub fn provisioning_mut(&mut self) -> &mut ProvisioningService<R> {
        &mut self.provisioning
    }

    pub fn transport(&self) -> &MqttTransport<B> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut MqttTransport<B> {
        &mut self.transport
    }

    pub fn system(&self) -> &Y {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut Y {
        &mut self.system
    }

    // ── Internal ──────────────────────────────────────────────

    fn step_fsm(&mut self, sink: &mut impl EventSink) {
        if let Some((from, to)) = self.fsm.tick(&mut self.ctx) {
            sink.emit(&DeviceEvent::StateChanged { from, to });
        }
    }

    fn refresh_inputs(&mut self, now: u64) {
        let wifi_up = self.network.is_connected();
        let wifi_credentials = self.record.has_wifi();
        let has_credentials = self.identity.has_credentials();
        let mqtt_up = self.transport.is_connected();
        let association_due = !wifi_up && self.association_due(now);

        let inputs = &mut self.ctx.inputs;
        inputs.wifi_credentials = wifi_credentials;
        inputs.wifi_connected = wifi_up;
        inputs.has_credentials = has_credentials;
        inputs.mqtt_connected = mqtt_up;
        inputs.association_due = association_due;
    }

    fn association_due(&self, now: u64) -> bool {
        if !self.record.has_wifi() {
            return false;
        }
        match &self.last_association {
            None => true,
            Some(last) => {
                last.ssid != self.record.wifi_ssid
                    || last.password != self.record.wifi_password()
                    || now.saturating_sub(last.at_ms) >= u64::from(self.config.wifi_retry_interval_ms)
            }
        }
    }

    /// Translate FSM commands into port calls.  Returns `true` when a
    /// broker session was opened.
    fn apply_commands(&mut self, sink: &mut impl EventSink) -> bool {
        if self.ctx.commands.advertise {
            self.provisioning.start_advertising();
        } else {
            self.provisioning.stop_advertising();
        }

        if self.ctx.commands.take_associate() {
            self.associate(false, sink);
        }

        let mut connected = false;
        if self.ctx.commands.take_connect() {
            connected = self.connect_transport();
        }

        if self.ctx.commands.take_declare() {
            self.declare(sink);
        }

        if self.ctx.commands.take_restart() {
            self.restart(sink);
        }
        connected
    }

    /// Start station association with the current record.  With `wait`
    /// set, busy-wait for the link within the configured budget.
    fn associate(&mut self, wait: bool, sink: &mut impl EventSink) {
        let ssid = self.record.wifi_ssid.clone();
        let password = self.record.wifi_password().to_owned();
        self.last_association = Some(AssociationAttempt {
            ssid: ssid.clone(),
            password: password.clone(),
            at_ms: self.system.uptime_ms(),
        });

        info!("WiFi: associating with '{}'", ssid);
        if let Err(e) = self.network.begin(&ssid, &password) {
            warn!("WiFi: association with '{}' failed: {}", ssid, e);
            sink.emit(&DeviceEvent::Association {
                ssid,
                connected: false,
            });
            return;
        }

        if wait {
            let poll = self.config.wifi_poll_interval_ms.max(1);
            let attempts = self.config.wifi_connect_timeout_ms / poll;
            for _ in 0..attempts {
                if self.network.is_connected() {
                    break;
                }
                self.system.delay_ms(poll);
            }
        }

        let connected = self.network.is_connected();
        if connected {
            info!("WiFi: connected to '{}'", ssid);
        } else if wait {
            warn!("WiFi: '{}' not reachable within budget", ssid);
        }
        sink.emit(&DeviceEvent::Association { ssid, connected });
    }

    fn connect_transport(&mut self) -> bool {
        let status_topic = self.router.topics().status();
        self.transport
            .set_credentials(&self.identity.device_id, &self.identity.transmit_key);
        self.transport
            .set_last_will(&status_topic, STATUS_OFFLINE, self.config.will_retained);
        self.transport.connect(self.system.uptime_ms())
    }

    fn declare(&mut self, sink: &mut impl EventSink) {
        let filter = self.router.topics().invoke_filter(self.router.encoding());
        if !self.transport.subscribe(&filter) {
            warn!("DECLARE: subscribe to {} failed", filter);
        }

        let registry = self.router.registry();
        match payload::declaration(&self.config.model, &self.config.manufacturer, registry) {
            Ok(body) => {
                let topic = self.router.topics().declare();
                if self.transport.publish(&topic, &body, false) {
                    info!(
                        "DECLARE: {} events, {} methods on {}",
                        registry.event_count(),
                        registry.method_count(),
                        topic
                    );
                    sink.emit(&DeviceEvent::Declared {
                        events: registry.event_count(),
                        methods: registry.method_count(),
                    });
                } else {
                    warn!("DECLARE: publish to {} failed", topic);
                }
            }
            Err(e) => warn!("DECLARE: encode failed: {}", e),
        }

        if !self.publish_status(true) {
            warn!("DECLARE: status publish failed");
        }
    }

    fn restart(&mut self, sink: &mut impl EventSink) {
        sink.emit(&DeviceEvent::Rebooting);
        info!("REBOOT: restarting in {} ms", self.config.reboot_settle_ms);
        self.system.delay_ms(self.config.reboot_settle_ms);
        self.system.restart();
    }

    fn flush_outbox(&mut self) {
        while let Some(msg) = self.router.take_outbound() {
            if !self.transport.publish(&msg.topic, &msg.payload, msg.retained) {
                debug!("dropped outbound message for {}", msg.topic);
            }
        }
    }

    /// Re-read the store after a provisioning write.  Once an SSID has been
    /// provisioned it wins over the preset credentials.
    fn reload_record(&mut self) {
        let mut fresh = ProvisioningRecord::load(&self.store);
        if let (false, Some(preset)) = (fresh.has_wifi(), &self.config.preset_wifi) {
            preset.ssid.clone_into(&mut fresh.wifi_ssid);
            fresh.wifi_pass = Some(preset.password.clone());
        }
        if fresh == self.record {
            return;
        }
        info!("PROV: provisioning record updated");
        self.record = fresh;
        self.apply_record();
    }

    fn apply_record(&mut self) {
        self.identity.apply(&self.record);
        self.router
            .bind(&self.identity.user_id, &self.identity.device_id);
        self.transport
            .set_credentials(&self.identity.device_id, &self.identity.transmit_key);
    }

    fn update_status(&mut self, now: u64, sink: &mut impl EventSink) {
        let status = ConnectivityStatus::new(self.network.is_connected(), self.transport.is_connected());
        if self.last_status == Some(status) {
            return;
        }
        self.last_status = Some(status);
        self.provisioning.set_runtime_status(status, now);
        sink.emit(&DeviceEvent::ConnectivityChanged(status));
    }
}
