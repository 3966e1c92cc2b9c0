//! Invocation decoding.
//!
//! Both wire encodings go through [`InvocationEncoding::parse`], which is
//! the only place that knows where the feature name and parameters live.
//! Dispatch only ever sees the normalized [`FeatureCall`].
//!
//! | Encoding         | Feature name                         | Params                                  |
//! |------------------|--------------------------------------|-----------------------------------------|
//! | `PathEncoded`    | topic segment `/feature/<n>/invoke`  | payload `params` object, if any         |
//! | `PayloadEncoded` | payload `feature` or `feature_name`  | payload `params`, else other top keys   |

use core::fmt;

use log::{debug, warn};
use serde_json::{Map, Value};

use super::call::{FeatureCall, MAX_PARAMS, ParamMap};

/// Longest feature name accepted from the wire.
pub const MAX_FEATURE_NAME_LEN: usize = 63;

const FEATURE_MARKER: &str = "/feature/";
const INVOKE_MARKER: &str = "/invoke";
const NAME_KEYS: [&str; 2] = ["feature", "feature_name"];

/// How the gateway encodes invocations for this device.  Fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationEncoding {
    /// Feature name in the topic path.
    PathEncoded,
    /// Feature name in the JSON payload ("cloud" mode).
    PayloadEncoded,
}

/// Why an inbound message did not become a [`FeatureCall`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    /// Topic does not carry the path-mode markers.
    NotAnInvocation,
    /// Feature name empty or longer than [`MAX_FEATURE_NAME_LEN`].
    InvalidFeatureName,
    /// Payload is not a JSON object.
    MalformedPayload,
    /// Payload-encoded message without `feature`/`feature_name`.
    MissingFeatureName,
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnInvocation => write!(f, "topic is not a feature invocation"),
            Self::InvalidFeatureName => {
                write!(f, "feature name must be 1-{} bytes", MAX_FEATURE_NAME_LEN)
            }
            Self::MalformedPayload => write!(f, "payload is not a JSON object"),
            Self::MissingFeatureName => write!(f, "payload has no feature name"),
        }
    }
}

impl InvocationEncoding {
    /// Cloud-compatible devices receive payload-encoded invocations.
    pub fn for_device(cloud_compatible: bool) -> Self {
        if cloud_compatible {
            Self::PayloadEncoded
        } else {
            Self::PathEncoded
        }
    }

    /// Decode one inbound message into a call addressed to `device_id`.
    /// Path-encoded topics must sit under `device_root`.
    pub fn parse(
        self,
        device_root: &str,
        device_id: &str,
        topic: &str,
        payload: &[u8],
    ) -> Result<FeatureCall, InvocationError> {
        match self {
            Self::PathEncoded => parse_path_encoded(device_root, device_id, topic, payload),
            Self::PayloadEncoded => parse_payload_encoded(device_id, payload),
        }
    }
}

/// Extract `<name>` from `<device_root>/feature/<name>/invoke`.  The name is
/// a single topic level.
pub fn feature_name_from_topic<'t>(
    device_root: &str,
    topic: &'t str,
) -> Result<&'t str, InvocationError> {
    let name = topic
        .strip_prefix(device_root)
        .and_then(|rest| rest.strip_prefix(FEATURE_MARKER))
        .and_then(|rest| rest.strip_suffix(INVOKE_MARKER))
        .ok_or(InvocationError::NotAnInvocation)?;
    if name.contains('/') {
        return Err(InvocationError::NotAnInvocation);
    }
    validate_name(name)
}

fn validate_name(name: &str) -> Result<&str, InvocationError> {
    if name.is_empty() || name.len() > MAX_FEATURE_NAME_LEN {
        return Err(InvocationError::InvalidFeatureName);
    }
    Ok(name)
}

fn parse_path_encoded(
    device_root: &str,
    device_id: &str,
    topic: &str,
    payload: &[u8],
) -> Result<FeatureCall, InvocationError> {
    let name = feature_name_from_topic(device_root, topic)?;
    let mut call = FeatureCall::new(device_id, name);

    if payload.is_empty() {
        return Ok(call);
    }
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(obj)) => {
            if let Some(Value::Object(params)) = obj.get("params") {
                call.params = collect_params(params, &[]);
            }
        }
        Ok(_) => debug!("invoke '{}': payload is not an object, no params", name),
        // The name came from the topic, so the call still goes through.
        Err(e) => debug!("invoke '{}': undecodable payload ({}), no params", name, e),
    }
    Ok(call)
}

fn parse_payload_encoded(device_id: &str, payload: &[u8]) -> Result<FeatureCall, InvocationError> {
    let obj = match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(obj)) => obj,
        _ => return Err(InvocationError::MalformedPayload),
    };

    let name = NAME_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()))
        .ok_or(InvocationError::MissingFeatureName)?;
    let mut call = FeatureCall::new(device_id, validate_name(name)?);

    call.params = match obj.get("params") {
        Some(Value::Object(params)) => collect_params(params, &[]),
        _ => collect_params(&obj, &NAME_KEYS),
    };
    Ok(call)
}

/// Stringify every value of `obj` except `skip` keys, capped at [`MAX_PARAMS`].
fn collect_params(obj: &Map<String, Value>, skip: &[&str]) -> ParamMap {
    let mut params = ParamMap::new();
    for (key, value) in obj.iter().filter(|(k, _)| !skip.contains(&k.as_str())) {
        if params.len() == MAX_PARAMS {
            warn!("invoke: more than {} params, extra keys dropped", MAX_PARAMS);
            break;
        }
        params.insert(key.clone(), param_value(value));
    }
    params
}

/// Strings verbatim, scalars via their JSON text, null as empty,
/// nested arrays/objects as compact JSON.
fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
