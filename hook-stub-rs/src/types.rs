use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::StubError;

bitflags! {
    /// where a stub fires relative to the original call
    ///
    /// unknown bits are retained rather than rejected, so callers may pass
    /// any raw mask through [`FireLocation::from_bits_retain`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FireLocation: u32 {
        const BEFORE = 1;
        const AFTER = 2;
        const BOTH = Self::BEFORE.bits() | Self::AFTER.bits();
        const SKIP_ORIGINAL = 65536;
    }
}

impl FireLocation {
    pub const NONE: Self = Self::empty();

    /// bits outside the defined set
    pub fn unknown_bits(self) -> u32 {
        self.bits() & !Self::all().bits()
    }
}

impl Default for FireLocation {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for FireLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        bitflags::parser::to_writer(self, f)
    }
}

impl FromStr for FireLocation {
    type Err = StubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("none") {
            return Ok(Self::NONE);
        }
        bitflags::parser::from_str(s).map_err(|e| StubError::InvalidDirective {
            directive: s.to_string(),
            reason: e.to_string(),
        })
    }
}

/// one hooked symbol as emitted by the wrapper generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookEntry {
    pub library: String,
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl HookEntry {
    pub fn new(library: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            library: library.into(),
            symbol: symbol.into(),
            display: None,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// human readable name, falling back to the mangled symbol
    pub fn display_name(&self) -> &str {
        match self.display.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.symbol,
        }
    }
}

/// ordered batch of entries covering one logical hooked operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HookTable(Vec<HookEntry>);

impl HookTable {
    pub fn new(entries: Vec<HookEntry>) -> Self {
        Self(entries)
    }

    /// parse the generator's JSON output (an array of entries)
    pub fn from_json(json: &str) -> Result<Self, StubError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn entries(&self) -> &[HookEntry] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &HookEntry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, entry: HookEntry) {
        self.0.push(entry);
    }

    /// sorted, de-duplicated display names
    pub fn method_label(&self) -> String {
        join_sorted(self.0.iter().map(HookEntry::display_name))
    }

    /// sorted, de-duplicated library names
    pub fn library_label(&self) -> String {
        join_sorted(self.0.iter().map(|e| e.library.as_str()))
    }

    /// distinct library names in first-seen order
    pub fn libraries(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for entry in &self.0 {
            if !seen.contains(&entry.library.as_str()) {
                seen.push(entry.library.as_str());
            }
        }
        seen
    }
}

fn join_sorted<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<BTreeSet<_>>().into_iter().collect::<Vec<_>>().join(", ")
}

impl FromIterator<HookEntry> for HookTable {
    fn from_iter<I: IntoIterator<Item = HookEntry>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a HookTable {
    type Item = &'a HookEntry;
    type IntoIter = std::slice::Iter<'a, HookEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// build a [`HookTable`] from `(library, symbol)` or `(library, symbol, display)` tuples
#[macro_export]
macro_rules! hook_table {
    ($(($library:expr, $symbol:expr $(, $display:expr)?)),* $(,)?) => {
        $crate::HookTable::new(vec![
            $($crate::HookEntry::new($library, $symbol)$(.with_display($display))?),*
        ])
    };
}

/// complete firing configuration handed to `Interceptor::configure`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ignition {
    pub threshold: u64,
    pub location: FireLocation,
    pub payload: String,
    pub trace: bool,
}

impl Ignition {
    /// fire when the call counter equals `threshold`
    pub fn at(threshold: u64) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    pub fn location(mut self, location: FireLocation) -> Self {
        self.location = location;
        self
    }

    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}

impl Default for Ignition {
    fn default() -> Self {
        Self {
            threshold: 1,
            location: FireLocation::BEFORE,
            payload: String::new(),
            trace: false,
        }
    }
}
