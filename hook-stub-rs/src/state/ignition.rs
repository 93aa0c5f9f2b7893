use serde::Serialize;

use crate::types::{FireLocation, Ignition};

/// mutable firing state of one interceptor
///
/// the counter is advanced by the entry wrapper once per logical call;
/// evaluation never touches it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IgnitionState {
    pub call_count: u64,
    pub location: FireLocation,
    pub threshold: u64,
    pub payload: String,
    pub trace: bool,
}

impl IgnitionState {
    /// replace every setting wholesale and restart counting
    pub fn configure(&mut self, ignition: Ignition) {
        let Ignition {
            threshold,
            location,
            payload,
            trace,
        } = ignition;
        self.call_count = 0;
        self.location = location;
        self.threshold = threshold;
        self.payload = payload;
        self.trace = trace;
    }

    /// back to NONE / 0 / "" / trace off
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// returns the new count
    pub fn record_call(&mut self) -> u64 {
        self.call_count = self.call_count.saturating_add(1);
        self.call_count
    }

    pub fn should_fire(&self, requested: FireLocation) -> bool {
        self.location.intersects(requested) && self.call_count == self.threshold
    }
}
