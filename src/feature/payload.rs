//! JSON envelopes published by the device.

use serde::Serialize;

use super::call::{FeatureCall, ParamMap};
use super::registry::FeatureRegistry;

/// Connection medium reported in the declaration.
pub const CONNECTION_TAG: &str = "LAN";

pub const STATUS_ONLINE: &[u8] = b"online";
pub const STATUS_OFFLINE: &[u8] = b"offline";

pub const NO_HANDLER_MESSAGE: &str = "No handler registered";

#[derive(Serialize)]
struct DeviceInfo<'a> {
    model: &'a str,
    manufacturer: &'a str,
    connection: &'a str,
}

#[derive(Serialize)]
struct Declaration<'a> {
    device_info: DeviceInfo<'a>,
    events: Vec<&'a str>,
    methods: Vec<&'a str>,
}

#[derive(Serialize)]
struct FeatureResponse<'a> {
    feature_name: &'a str,
    device_id: &'a str,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

/// `{"device_info":{…},"events":[…],"methods":[…]}`
pub fn declaration(
    model: &str,
    manufacturer: &str,
    registry: &FeatureRegistry,
) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&Declaration {
        device_info: DeviceInfo {
            model,
            manufacturer,
            connection: CONNECTION_TAG,
        },
        events: registry.events().collect(),
        methods: registry.methods().collect(),
    })
}

/// `{"feature_name","device_id","success","message"?}`
pub fn feature_response(
    call: &FeatureCall,
    success: bool,
    message: Option<&str>,
) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&FeatureResponse {
        feature_name: &call.feature_name,
        device_id: &call.device_id,
        success,
        message,
    })
}

/// Flat key → value object.
pub fn event(payload: &ParamMap) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(payload)
}
