//! Broker topic layout.
//!
//! ```text
//! meo/[<user_id>/]<device_id>/declare
//!                            /status
//!                            /event/<name>
//!                            /event/feature_response
//!                            /feature/<name>/invoke   (path mode)
//!                            /feature                 (cloud mode)
//! ```

use super::invocation::InvocationEncoding;

pub const TOPIC_ROOT: &str = "meo/";

/// Topic builder for one device.  Rebuilt on every connect so a user id
/// provisioned in the meantime is picked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpace {
    device_root: String,
}

impl TopicSpace {
    pub fn new(user_id: &str, device_id: &str) -> Self {
        let mut device_root = String::from(TOPIC_ROOT);
        if !user_id.is_empty() {
            device_root.push_str(user_id);
            device_root.push('/');
        }
        device_root.push_str(device_id);
        Self { device_root }
    }

    /// `base + device_id`
    pub fn device_root(&self) -> &str {
        &self.device_root
    }

    pub fn declare(&self) -> String {
        format!("{}/declare", self.device_root)
    }

    pub fn status(&self) -> String {
        format!("{}/status", self.device_root)
    }

    /// `…/event/<name>`, or `…/event` for an empty name.
    pub fn event(&self, name: &str) -> String {
        if name.is_empty() {
            format!("{}/event", self.device_root)
        } else {
            format!("{}/event/{}", self.device_root, name)
        }
    }

    pub fn feature_response(&self) -> String {
        self.event("feature_response")
    }

    /// Subscription filter for the given invocation encoding.
    pub fn invoke_filter(&self, encoding: InvocationEncoding) -> String {
        match encoding {
            InvocationEncoding::PathEncoded => format!("{}/feature/+/invoke", self.device_root),
            InvocationEncoding::PayloadEncoded => format!("{}/feature", self.device_root),
        }
    }
}
