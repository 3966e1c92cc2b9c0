//! Message transport wrapper.
//!
//! Owns the broker endpoint, credentials and last-will settings, and turns
//! the raw [`BrokerClient`] port into the boolean-result API the controller
//! uses.  Inbound delivery happens only inside [`MqttTransport::pump`]; the
//! handler is borrowed for the duration of the call, nothing is stored.

use core::fmt::Write;

use log::{debug, info, warn};

use crate::app::ports::{BrokerClient, ConnectOptions, LastWill, MessageHandler};
use crate::config::{BrokerUsername, DeviceConfig};

/// Upper bound on deliveries handled by one `pump` call.
pub const MAX_DELIVERIES_PER_PUMP: usize = 16;

const CLIENT_ID_PREFIX: &str = "meo-";
const FALLBACK_CLIENT_ID_PREFIX: &str = "meo-device-";

pub struct MqttTransport<B: BrokerClient> {
    client: B,
    host: String,
    port: u16,
    device_id: String,
    transmit_key: String,
    username: BrokerUsername,
    will: Option<LastWill>,
    keep_alive_secs: u16,
    timeout_ms: u32,
}

impl<B: BrokerClient> MqttTransport<B> {
    pub fn new(client: B, config: &DeviceConfig) -> Self {
        Self {
            client,
            host: config.gateway_host.clone(),
            port: config.gateway_port,
            device_id: String::new(),
            transmit_key: String::new(),
            username: config.broker_username.clone(),
            will: None,
            keep_alive_secs: config.keep_alive_secs,
            timeout_ms: config.handshake_timeout_ms,
        }
    }

    pub fn configure(&mut self, host: &str, port: u16) {
        host.clone_into(&mut self.host);
        self.port = port;
    }

    pub fn set_credentials(&mut self, device_id: &str, transmit_key: &str) {
        device_id.clone_into(&mut self.device_id);
        transmit_key.clone_into(&mut self.transmit_key);
    }

    pub fn set_username_policy(&mut self, policy: BrokerUsername) {
        self.username = policy;
    }

    pub fn set_last_will(&mut self, topic: &str, payload: &[u8], retained: bool) {
        self.will = Some(LastWill {
            topic: topic.to_owned(),
            payload: payload.to_vec(),
            retained,
        });
    }

    pub fn set_keep_alive(&mut self, secs: u16) {
        self.keep_alive_secs = secs;
    }

    pub fn set_timeout(&mut self, timeout_ms: u32) {
        self.timeout_ms = timeout_ms;
    }

    pub fn endpoint(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    /// Client identifier presented to the broker.  Without a device id the
    /// uptime keeps it unique across reconnects.
    pub fn client_id(&self, uptime_ms: u64) -> String {
        let mut id = String::new();
        if self.device_id.is_empty() {
            let _ = write!(id, "{}{}", FALLBACK_CLIENT_ID_PREFIX, uptime_ms);
        } else {
            let _ = write!(id, "{}{}", CLIENT_ID_PREFIX, self.device_id);
        }
        id
    }

    /// Open the broker session.  Fails fast when the network link is down,
    /// succeeds immediately when a session is already up.
    pub fn connect(&mut self, uptime_ms: u64) -> bool {
        if !self.client.link_up() {
            debug!("MQTT: link down, not connecting");
            return false;
        }
        if self.client.is_connected() {
            return true;
        }

        let client_id = self.client_id(uptime_ms);
        let password = (!self.transmit_key.is_empty()).then_some(self.transmit_key.as_str());
        let options = ConnectOptions {
            host: &self.host,
            port: self.port,
            client_id: &client_id,
            username: broker_username(&self.username, &self.device_id),
            password,
            will: self.will.as_ref(),
            keep_alive_secs: self.keep_alive_secs,
            timeout_ms: self.timeout_ms,
        };

        info!(
            "MQTT: connecting to {}:{} as '{}'",
            self.host, self.port, client_id
        );
        match self.client.connect(&options) {
            Ok(()) => {
                info!("MQTT: connected");
                true
            }
            Err(e) => {
                warn!("MQTT: connect failed: {}", e);
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> bool {
        if !self.client.is_connected() {
            debug!("MQTT: publish to {} skipped, not connected", topic);
            return false;
        }
        match self.client.publish(topic, payload, retained) {
            Ok(()) => true,
            Err(e) => {
                warn!("MQTT: publish to {} failed: {}", topic, e);
                false
            }
        }
    }

    pub fn subscribe(&mut self, filter: &str) -> bool {
        if !self.client.is_connected() {
            return false;
        }
        match self.client.subscribe(filter) {
            Ok(()) => {
                info!("MQTT: subscribed to {}", filter);
                true
            }
            Err(e) => {
                warn!("MQTT: subscribe to {} failed: {}", filter, e);
                false
            }
        }
    }

    /// Deliver queued inbound messages to `handler`.  Returns how many were
    /// delivered.
    pub fn pump(&mut self, handler: &mut impl MessageHandler) -> usize {
        let mut delivered = 0;
        while delivered < MAX_DELIVERIES_PER_PUMP {
            let Some(msg) = self.client.poll() else {
                break;
            };
            handler.on_message(&msg.topic, &msg.payload);
            delivered += 1;
        }
        delivered
    }

    pub fn client(&self) -> &B {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut B {
        &mut self.client
    }
}

fn broker_username<'a>(policy: &'a BrokerUsername, device_id: &'a str) -> Option<&'a str> {
    let name = match policy {
        BrokerUsername::DeviceId => device_id,
        BrokerUsername::Fixed(name) => name.as_str(),
    };
    (!name.is_empty()).then_some(name)
}
