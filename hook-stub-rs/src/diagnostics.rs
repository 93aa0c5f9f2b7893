//! text formatting for entry/exit traces and fire notifications

use std::fmt;

use crate::state::IgnitionState;
use crate::types::FireLocation;

/// which side of the original call a trace line describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Enter,
    Exit,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enter => "Start",
            Self::Exit => "End",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `<method> location:<mask> threshold:<n> count:<n> payload:"<text>"`
pub struct Summary<'a> {
    pub method: &'a str,
    pub state: &'a IgnitionState,
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} location:{} threshold:{} count:{} payload:\"{}\"",
            self.method,
            self.state.location,
            self.state.threshold,
            self.state.call_count,
            self.state.payload
        )
    }
}

/// entry and exit lines are emitted only when one of the flags is on
pub fn tracing_enabled(global_debug: bool, state: &IgnitionState) -> bool {
    global_debug || state.trace
}

pub fn call_line(
    phase: Phase,
    id: Option<&str>,
    message: Option<&str>,
    method: &str,
    state: &IgnitionState,
) -> String {
    let mut line = String::from("[+]HOOK ");
    if let Some(id) = id {
        line.push_str(id);
        line.push(' ');
    }
    line.push_str(&format!("{}: {}", phase, Summary { method, state }));
    if let Some(message) = message {
        line.push_str("  -> ");
        line.push_str(message);
    }
    line
}

pub fn fire_line(
    location: FireLocation,
    id: Option<&str>,
    method: &str,
    state: &IgnitionState,
) -> String {
    match id {
        Some(id) => format!("-> fired [{}] {} {}", location, id, Summary { method, state }),
        None => format!("-> fired [{}] {}", location, Summary { method, state }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Ignition;

    fn sample() -> IgnitionState {
        let mut state = IgnitionState::default();
        state.configure(Ignition::at(3).location(FireLocation::BOTH).payload("eio"));
        state.record_call();
        state
    }

    #[test]
    fn summary_carries_all_firing_state() {
        let state = sample();
        assert_eq!(
            Summary { method: "foo", state: &state }.to_string(),
            "foo location:BEFORE | AFTER threshold:3 count:1 payload:\"eio\""
        );
    }

    #[test]
    fn call_line_optional_parts() {
        let state = sample();
        let bare = call_line(Phase::Enter, None, None, "foo", &state);
        assert!(bare.starts_with("[+]HOOK Start: foo "));

        let full = call_line(Phase::Exit, Some("#7"), Some("rc=-1"), "foo", &state);
        assert!(full.starts_with("[+]HOOK #7 End: foo "));
        assert!(full.ends_with("  -> rc=-1"));
    }

    #[test]
    fn fire_line_names_location() {
        let state = sample();
        let line = fire_line(FireLocation::AFTER, Some("read"), "foo", &state);
        assert!(line.starts_with("-> fired [AFTER] read foo location:"));
    }

    #[test]
    fn gating() {
        let mut state = IgnitionState::default();
        assert!(!tracing_enabled(false, &state));
        assert!(tracing_enabled(true, &state));
        state.trace = true;
        assert!(tracing_enabled(false, &state));
    }
}
