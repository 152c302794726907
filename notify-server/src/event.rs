//! The event handed to subscriber callbacks.

use gena_parser::{EventValue, EventVariables};

/// One received UPnP event.
///
/// Built once per accepted NOTIFY request and never mutated afterwards.
/// Callbacks receive it behind an `Arc`, so the same read-only instance is
/// shared across every handler registered for the subscription.
#[derive(Debug, Clone)]
pub struct Event {
    /// Subscription identifier from the request's `SID` header
    pub sid: String,
    /// Per-subscription sequence number from the `SEQ` header
    pub seq: String,
    /// Decoded variables, keyed by snake_case variable name
    pub variables: EventVariables,
}

impl Event {
    /// Look up a decoded variable by name.
    pub fn variable(&self, name: &str) -> Option<&EventValue> {
        self.variables.get(name)
    }
}
