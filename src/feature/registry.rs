//! Bounded feature registry.
//!
//! Two fixed-capacity tables: declared event names and method handlers.
//! Filled at startup, never shrunk.  A full table rejects further
//! registrations instead of growing.

use core::fmt;

use super::call::FeatureCall;
use super::router::FeatureResponder;

pub const MAX_FEATURE_EVENTS: usize = 8;
pub const MAX_FEATURE_METHODS: usize = 8;
pub const MAX_NAME_LEN: usize = 32;

pub type FeatureName = heapless::String<MAX_NAME_LEN>;

/// A method handler.  Plain `fn` pointer: no captured state, no heap.
/// Replies go through the responder.
pub type FeatureHandler = fn(&FeatureCall, &mut FeatureResponder<'_>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    EmptyName,
    NameTooLong,
    Duplicate,
    Full,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "feature name is empty"),
            Self::NameTooLong => write!(f, "feature name exceeds {} bytes", MAX_NAME_LEN),
            Self::Duplicate => write!(f, "feature name already registered"),
            Self::Full => write!(f, "feature table full"),
        }
    }
}

struct MethodEntry {
    name: FeatureName,
    handler: FeatureHandler,
}

#[derive(Default)]
pub struct FeatureRegistry {
    events: heapless::Vec<FeatureName, MAX_FEATURE_EVENTS>,
    methods: heapless::Vec<MethodEntry, MAX_FEATURE_METHODS>,
}

fn make_name(name: &str) -> Result<FeatureName, RegistryError> {
    if name.is_empty() {
        return Err(RegistryError::EmptyName);
    }
    let mut s = FeatureName::new();
    s.push_str(name).map_err(|_| RegistryError::NameTooLong)?;
    Ok(s)
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an event the device may emit.
    pub fn add_event(&mut self, name: &str) -> Result<(), RegistryError> {
        let name = make_name(name)?;
        if self.events.contains(&name) {
            return Err(RegistryError::Duplicate);
        }
        self.events.push(name).map_err(|_| RegistryError::Full)
    }

    /// Bind `handler` to method `name`.  A bound name can never be rebound.
    pub fn add_method(&mut self, name: &str, handler: FeatureHandler) -> Result<(), RegistryError> {
        let name = make_name(name)?;
        if self.methods.iter().any(|m| m.name == name) {
            return Err(RegistryError::Duplicate);
        }
        self.methods
            .push(MethodEntry { name, handler })
            .map_err(|_| RegistryError::Full)
    }

    /// Exact, case-sensitive lookup.
    pub fn find_method(&self, name: &str) -> Option<FeatureHandler> {
        self.methods
            .iter()
            .find(|m| m.name.as_str() == name)
            .map(|m| m.handler)
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.events.iter().any(|e| e.as_str() == name)
    }

    /// Declared events, in registration order.
    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.events.iter().map(FeatureName::as_str)
    }

    /// Registered method names, in registration order.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(|m| m.name.as_str())
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}
