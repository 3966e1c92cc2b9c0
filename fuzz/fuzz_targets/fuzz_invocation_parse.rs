//! Fuzz target: `InvocationEncoding::parse`
//!
//! Splits the input into a topic and a payload and decodes it in both
//! encodings.  Neither may panic, and an accepted call always carries a
//! bounded feature name and parameter count.  A path-encoded name is
//! always a single topic level.
//!
//! cargo fuzz run fuzz_invocation_parse

#![no_main]

use libfuzzer_sys::fuzz_target;
use meo_device::feature::call::MAX_PARAMS;
use meo_device::feature::invocation::MAX_FEATURE_NAME_LEN;
use meo_device::feature::InvocationEncoding;

fuzz_target!(|data: &[u8]| {
    let split = data.iter().position(|b| *b == 0).unwrap_or(data.len());
    let topic = String::from_utf8_lossy(&data[..split]);
    let payload = data.get(split + 1..).unwrap_or(&[]);

    for enc in [InvocationEncoding::PathEncoded, InvocationEncoding::PayloadEncoded] {
        if let Ok(call) = enc.parse("meo/AABBCCDDEEFF", "AABBCCDDEEFF", &topic, payload) {
            assert!(!call.feature_name.is_empty());
            assert!(call.feature_name.len() <= MAX_FEATURE_NAME_LEN);
            assert!(call.params.len() <= MAX_PARAMS);
            if enc == InvocationEncoding::PathEncoded {
                assert!(!call.feature_name.contains('/'));
            }
            assert_eq!(call.device_id, "AABBCCDDEEFF");
        }
    }
});
