//! A single inbound invocation, normalized across both encodings.

use std::collections::BTreeMap;

/// Parameter values are always strings; handlers interpret them.
pub type ParamMap = BTreeMap<String, String>;

/// At most this many parameters are carried into a call.
pub const MAX_PARAMS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureCall {
    pub device_id: String,
    pub feature_name: String,
    pub params: ParamMap,
}

impl FeatureCall {
    pub fn new(device_id: &str, feature_name: &str) -> Self {
        Self {
            device_id: device_id.to_owned(),
            feature_name: feature_name.to_owned(),
            params: ParamMap::new(),
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parse a parameter as an integer, `None` when absent or not numeric.
    pub fn param_i64(&self, key: &str) -> Option<i64> {
        self.param(key).and_then(|v| v.trim().parse().ok())
    }

    /// `"true"`/`"1"`/`"on"` are truthy, `"false"`/`"0"`/`"off"` falsy.
    pub fn param_bool(&self, key: &str) -> Option<bool> {
        match self.param(key)?.trim() {
            "true" | "1" | "on" => Some(true),
            "false" | "0" | "off" => Some(false),
            _ => None,
        }
    }
}
