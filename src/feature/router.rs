//! Inbound invocation routing.
//!
//! [`FeatureRouter`] is the [`MessageHandler`] the transport pumps into.
//! It decodes each message with the device's [`InvocationEncoding`], looks
//! the method up in the [`FeatureRegistry`] and runs the handler.  Anything
//! a handler wants to send goes into a bounded outbox through a
//! [`FeatureResponder`]; the device flushes the outbox through the
//! transport right after the pump, in the same tick.

use log::{debug, info, warn};

use crate::app::ports::MessageHandler;

use super::call::{FeatureCall, ParamMap};
use super::invocation::InvocationEncoding;
use super::payload;
use super::registry::FeatureRegistry;
use super::topics::TopicSpace;

pub const OUTBOX_CAPACITY: usize = 8;

/// A publish waiting for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retained: bool,
}

pub type Outbox = heapless::Deque<OutboundMessage, OUTBOX_CAPACITY>;

// ───────────────────────────────────────────────────────────────
// Responder handed to method handlers
// ───────────────────────────────────────────────────────────────

pub struct FeatureResponder<'a> {
    topics: &'a TopicSpace,
    outbox: &'a mut Outbox,
}

impl<'a> FeatureResponder<'a> {
    pub fn new(topics: &'a TopicSpace, outbox: &'a mut Outbox) -> Self {
        Self { topics, outbox }
    }

    /// Queue a feature response for `call`.
    pub fn respond(&mut self, call: &FeatureCall, success: bool, message: Option<&str>) -> bool {
        match payload::feature_response(call, success, message) {
            Ok(body) => self.enqueue(self.topics.feature_response(), body),
            Err(e) => {
                warn!("feature '{}': response encode failed: {}", call.feature_name, e);
                false
            }
        }
    }

    /// Queue an event publish on `…/event/<name>`.
    pub fn publish_event(&mut self, name: &str, values: &ParamMap) -> bool {
        match payload::event(values) {
            Ok(body) => self.enqueue(self.topics.event(name), body),
            Err(e) => {
                warn!("event '{}': encode failed: {}", name, e);
                false
            }
        }
    }

    fn enqueue(&mut self, topic: String, payload: Vec<u8>) -> bool {
        let msg = OutboundMessage {
            topic,
            payload,
            retained: false,
        };
        if let Err(dropped) = self.outbox.push_back(msg) {
            warn!("outbox full, dropping publish to {}", dropped.topic);
            return false;
        }
        true
    }
}

// ───────────────────────────────────────────────────────────────
// Router
// ───────────────────────────────────────────────────────────────

pub struct FeatureRouter {
    registry: FeatureRegistry,
    encoding: InvocationEncoding,
    device_id: String,
    topics: TopicSpace,
    outbox: Outbox,
}

impl FeatureRouter {
    pub fn new(encoding: InvocationEncoding) -> Self {
        Self {
            registry: FeatureRegistry::new(),
            encoding,
            device_id: String::new(),
            topics: TopicSpace::new("", ""),
            outbox: Outbox::new(),
        }
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FeatureRegistry {
        &mut self.registry
    }

    pub fn encoding(&self) -> InvocationEncoding {
        self.encoding
    }

    pub fn topics(&self) -> &TopicSpace {
        &self.topics
    }

    /// Point the router at the identity used for the current connection.
    pub fn bind(&mut self, user_id: &str, device_id: &str) {
        self.topics = TopicSpace::new(user_id, device_id);
        device_id.clone_into(&mut self.device_id);
    }

    /// Run the handler bound to `call.feature_name`.  Returns `false` and
    /// queues a failure response when nothing is bound.
    pub fn dispatch(&mut self, call: &FeatureCall) -> bool {
        let mut responder = FeatureResponder::new(&self.topics, &mut self.outbox);
        match self.registry.find_method(&call.feature_name) {
            Some(handler) => {
                info!(
                    "feature '{}' invoked ({} params)",
                    call.feature_name,
                    call.params.len()
                );
                handler(call, &mut responder);
                true
            }
            None => {
                warn!("feature '{}': no handler registered", call.feature_name);
                responder.respond(call, false, Some(payload::NO_HANDLER_MESSAGE));
                false
            }
        }
    }

    /// Responder for code outside a handler (application publishes).
    pub fn responder(&mut self) -> FeatureResponder<'_> {
        FeatureResponder::new(&self.topics, &mut self.outbox)
    }

    pub fn take_outbound(&mut self) -> Option<OutboundMessage> {
        self.outbox.pop_front()
    }

    pub fn pending_outbound(&self) -> usize {
        self.outbox.len()
    }
}

impl MessageHandler for FeatureRouter {
    fn on_message(&mut self, topic: &str, payload: &[u8]) {
        let root = self.topics.device_root();
        match self.encoding.parse(root, &self.device_id, topic, payload) {
            Ok(call) => {
                self.dispatch(&call);
            }
            Err(e) => debug!("dropping message on {}: {}", topic, e),
        }
    }
}
