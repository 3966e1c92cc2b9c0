//! Feature protocol: registry, topic layout, invocation decoding,
//! JSON envelopes and dispatch.

pub mod call;
pub mod invocation;
pub mod payload;
pub mod registry;
pub mod router;
pub mod topics;

pub use call::{FeatureCall, ParamMap};
pub use invocation::{InvocationEncoding, InvocationError};
pub use registry::{FeatureHandler, FeatureRegistry, RegistryError};
pub use router::{FeatureResponder, FeatureRouter, OutboundMessage};
pub use topics::TopicSpace;
