//! MQTT broker client adapter.
//!
//! Implements [`BrokerClient`].
//!
//! - **`target_os = "espidf"`**: [`EspBrokerClient`] over
//!   `esp_idf_svc::mqtt::client::EspMqttClient`.  The driver's event
//!   callback runs on the MQTT task; it only flips the session flag and
//!   queues inbound messages, which [`BrokerClient::poll`] drains on the
//!   main task.
//! - **all targets**: [`SimBroker`], an in-memory broker that records
//!   every handshake and publish for host tests.

use std::collections::VecDeque;

use log::{info, warn};

use crate::app::ports::{BrokerClient, BrokerError, ConnectOptions, InboundMessage, LastWill};

/// Inbound messages buffered between two pumps.
pub const INBOX_DEPTH: usize = 16;

/// Largest inbound payload accepted from the broker.
pub const MAX_INBOUND_PAYLOAD: usize = 4096;

// ───────────────────────────────────────────────────────────────
// ESP-IDF client
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::EspBrokerClient;

#[cfg(target_os = "espidf")]
mod esp {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use esp_idf_hal::delay::FreeRtos;
    use esp_idf_svc::mqtt::client::{
        Details, EspMqttClient, EventPayload, LwtConfiguration, MqttClientConfiguration, QoS,
    };

    use super::*;

    const CONNECT_POLL_MS: u32 = 50;

    type Inbox = Arc<Mutex<VecDeque<InboundMessage>>>;

    pub struct EspBrokerClient {
        client: Option<EspMqttClient<'static>>,
        connected: Arc<AtomicBool>,
        inbox: Inbox,
    }

    impl Default for EspBrokerClient {
        fn default() -> Self {
            Self::new()
        }
    }

    impl EspBrokerClient {
        pub fn new() -> Self {
            Self {
                client: None,
                connected: Arc::new(AtomicBool::new(false)),
                inbox: Arc::new(Mutex::new(VecDeque::with_capacity(INBOX_DEPTH))),
            }
        }

        fn queue_inbound(inbox: &Inbox, topic: &str, data: &[u8]) {
            if data.len() > MAX_INBOUND_PAYLOAD {
                warn!(
                    "MQTT(espidf): dropping oversized payload on {} ({} bytes)",
                    topic,
                    data.len()
                );
                return;
            }
            let Ok(mut queue) = inbox.lock() else {
                return;
            };
            if queue.len() >= INBOX_DEPTH {
                warn!("MQTT(espidf): inbox full, dropping message on {}", topic);
                return;
            }
            queue.push_back(InboundMessage {
                topic: topic.to_owned(),
                payload: data.to_vec(),
            });
        }
    }

    impl BrokerClient for EspBrokerClient {
        /// Up once the station interface holds an IPv4 lease, not merely
        /// once it is associated.
        fn link_up(&self) -> bool {
            use esp_idf_svc::sys::{
                ESP_OK, esp_netif_get_handle_from_ifkey, esp_netif_get_ip_info, esp_netif_ip_info_t,
            };

            // SAFETY: the key is a NUL-terminated literal; the call only
            // looks the interface up and returns null when it does not exist.
            let netif = unsafe { esp_netif_get_handle_from_ifkey(c"WIFI_STA_DEF".as_ptr()) };
            if netif.is_null() {
                return false;
            }
            let mut info = esp_netif_ip_info_t::default();
            // SAFETY: `netif` is a live handle owned by the WiFi driver and
            // `info` is a valid out-parameter for the duration of the call.
            let rc = unsafe { esp_netif_get_ip_info(netif, &mut info) };
            rc == ESP_OK && info.ip.addr != 0
        }

        fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), BrokerError> {
            // Tear down any previous session before handshaking again.
            self.client = None;
            self.connected.store(false, Ordering::Relaxed);

            let url = format!("mqtt://{}:{}", options.host, options.port);
            let conf = MqttClientConfiguration {
                client_id: Some(options.client_id),
                username: options.username,
                password: options.password,
                keep_alive_interval: Some(Duration::from_secs(u64::from(options.keep_alive_secs))),
                network_timeout: Duration::from_millis(u64::from(options.timeout_ms)),
                lwt: options.will.map(|will: &LastWill| LwtConfiguration {
                    topic: &will.topic,
                    payload: &will.payload,
                    qos: QoS::AtMostOnce,
                    retain: will.retained,
                }),
                ..Default::default()
            };

            let connected = self.connected.clone();
            let inbox = self.inbox.clone();
            let client = EspMqttClient::new_cb(&url, &conf, move |event| match event.payload() {
                EventPayload::Connected(_) => {
                    connected.store(true, Ordering::Relaxed);
                }
                EventPayload::Disconnected => {
                    connected.store(false, Ordering::Relaxed);
                }
                EventPayload::Received {
                    topic: Some(topic),
                    data,
                    details,
                    ..
                } => {
                    // Only complete payloads are dispatched.
                    if matches!(details, Details::Complete) {
                        Self::queue_inbound(&inbox, topic, data);
                    }
                }
                EventPayload::Error(err) => {
                    warn!("MQTT(espidf): client error: {:?}", err);
                }
                _ => {}
            })
            .map_err(|e| {
                warn!("MQTT(espidf): client init failed: {:?}", e);
                BrokerError::Io
            })?;
            self.client = Some(client);

            let mut waited = 0;
            while waited < options.timeout_ms {
                if self.connected.load(Ordering::Relaxed) {
                    return Ok(());
                }
                FreeRtos::delay_ms(CONNECT_POLL_MS);
                waited += CONNECT_POLL_MS;
            }
            if self.connected.load(Ordering::Relaxed) {
                return Ok(());
            }
            self.client = None;
            Err(BrokerError::Timeout)
        }

        fn is_connected(&self) -> bool {
            self.client.is_some() && self.connected.load(Ordering::Relaxed)
        }

        fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> Result<(), BrokerError> {
            let Some(client) = self.client.as_mut() else {
                return Err(BrokerError::NotConnected);
            };
            client
                .publish(topic, QoS::AtMostOnce, retained, payload)
                .map(|_| ())
                .map_err(|_| BrokerError::Io)
        }

        fn subscribe(&mut self, filter: &str) -> Result<(), BrokerError> {
            let Some(client) = self.client.as_mut() else {
                return Err(BrokerError::NotConnected);
            };
            client
                .subscribe(filter, QoS::AtMostOnce)
                .map(|_| ())
                .map_err(|_| BrokerError::Io)
        }

        fn poll(&mut self) -> Option<InboundMessage> {
            self.inbox.lock().ok()?.pop_front()
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Simulated broker
// ───────────────────────────────────────────────────────────────

/// Owned copy of the options of one handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedConnect {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub will: Option<LastWill>,
    pub keep_alive_secs: u16,
    pub timeout_ms: u32,
}

impl From<&ConnectOptions<'_>> for RecordedConnect {
    fn from(o: &ConnectOptions<'_>) -> Self {
        Self {
            host: o.host.to_owned(),
            port: o.port,
            client_id: o.client_id.to_owned(),
            username: o.username.map(str::to_owned),
            password: o.password.map(str::to_owned),
            will: o.will.cloned(),
            keep_alive_secs: o.keep_alive_secs,
            timeout_ms: o.timeout_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retained: bool,
}

impl Published {
    pub fn payload_str(&self) -> &str {
        core::str::from_utf8(&self.payload).unwrap_or("")
    }
}

/// In-memory broker.  The link starts up, connections are accepted.
#[derive(Debug)]
pub struct SimBroker {
    link: bool,
    connected: bool,
    refuse: bool,
    attempts: u32,
    last_options: Option<RecordedConnect>,
    published: Vec<Published>,
    subscriptions: Vec<String>,
    inbox: VecDeque<InboundMessage>,
}

impl Default for SimBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBroker {
    pub fn new() -> Self {
        Self {
            link: true,
            connected: false,
            refuse: false,
            attempts: 0,
            last_options: None,
            published: Vec::new(),
            subscriptions: Vec::new(),
            inbox: VecDeque::new(),
        }
    }

    /// Bring the link up or down.  A downed link also ends the session.
    pub fn set_link(&mut self, up: bool) {
        self.link = up;
        if !up {
            self.connected = false;
        }
    }

    pub fn refuse_connections(&mut self, refuse: bool) {
        self.refuse = refuse;
    }

    /// End the session as if the broker had closed it.
    pub fn drop_session(&mut self) {
        self.connected = false;
    }

    /// Queue a message for the next `poll`.
    pub fn inject(&mut self, topic: &str, payload: &[u8]) {
        if self.inbox.len() >= INBOX_DEPTH {
            warn!("MQTT(sim): inbox full, dropping message on {}", topic);
            return;
        }
        self.inbox.push_back(InboundMessage {
            topic: topic.to_owned(),
            payload: payload.to_vec(),
        });
    }

    pub fn connect_attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_options(&self) -> Option<&RecordedConnect> {
        self.last_options.as_ref()
    }

    pub fn published(&self) -> &[Published] {
        &self.published
    }

    /// Messages published on `topic`, oldest first.
    pub fn published_on<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a Published> + 'a {
        self.published.iter().filter(move |p| p.topic == topic)
    }

    pub fn clear_published(&mut self) {
        self.published.clear();
    }

    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }
}

impl BrokerClient for SimBroker {
    fn link_up(&self) -> bool {
        self.link
    }

    fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), BrokerError> {
        self.attempts += 1;
        self.last_options = Some(RecordedConnect::from(options));
        if !self.link {
            return Err(BrokerError::LinkDown);
        }
        if self.refuse {
            return Err(BrokerError::Refused);
        }
        info!("MQTT(sim): session open for '{}'", options.client_id);
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        self.published.push(Published {
            topic: topic.to_owned(),
            payload: payload.to_vec(),
            retained,
        });
        Ok(())
    }

    fn subscribe(&mut self, filter: &str) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        if !self.subscriptions.iter().any(|s| s == filter) {
            self.subscriptions.push(filter.to_owned());
        }
        Ok(())
    }

    fn poll(&mut self) -> Option<InboundMessage> {
        self.inbox.pop_front()
    }
}
