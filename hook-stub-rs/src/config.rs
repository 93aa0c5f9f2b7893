use std::str::FromStr;
use tracing::{info, warn};

use crate::error::StubError;
use crate::registry::StubRegistry;
use crate::types::{FireLocation, Ignition};

pub const ENV_DEBUG: &str = "HOOK_STUB_DEBUG";
pub const ENV_LOG: &str = "HOOK_STUB_LOG";
pub const ENV_ARM: &str = "HOOK_STUB_ARM";

/// preconfigured firing state for interceptors with a given method label
///
/// syntax: `<method>=<threshold>[@<location>][#<payload>]`, e.g.
/// `read=3@BEFORE | SKIP_ORIGINAL#EIO`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmDirective {
    pub method: String,
    pub ignition: Ignition,
}

impl FromStr for ArmDirective {
    type Err = StubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| StubError::InvalidDirective {
            directive: s.to_string(),
            reason: reason.to_string(),
        };

        let (head, payload) = match s.split_once('#') {
            Some((head, payload)) => (head, payload),
            None => (s, ""),
        };
        let (method, firing) = head
            .rsplit_once('=')
            .ok_or_else(|| invalid("expected <method>=<threshold>"))?;
        let method = method.trim();
        if method.is_empty() {
            return Err(invalid("method label is empty"));
        }

        let (threshold, location) = match firing.split_once('@') {
            Some((threshold, location)) => (threshold, location.parse::<FireLocation>()?),
            None => (firing, FireLocation::BEFORE),
        };
        let threshold = threshold
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid(&format!("bad threshold: {}", e)))?;

        Ok(Self {
            method: method.to_string(),
            ignition: Ignition::at(threshold).location(location).payload(payload),
        })
    }
}

// environment variable configuration
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub debug: bool,
    pub log_filter: Option<String>,
    pub arm: Vec<ArmDirective>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// build from any key lookup; invalid arm directives are logged and dropped
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let debug = lookup(ENV_DEBUG)
            .map(|v| !matches!(v.trim(), "0" | "false" | "off" | ""))
            .unwrap_or(false);

        let log_filter = lookup(ENV_LOG).filter(|v| !v.trim().is_empty());

        let arm = lookup(ENV_ARM)
            .map(|v| {
                v.split(';')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .filter_map(|d| match d.parse::<ArmDirective>() {
                        Ok(directive) => Some(directive),
                        Err(e) => {
                            warn!(error = %e, "ignoring {} entry", ENV_ARM);
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            debug,
            log_filter,
            arm,
        }
    }

    pub fn apply(&self, registry: &StubRegistry) {
        if self.debug {
            registry.set_debug(true);
            info!("debug tracing enabled via {}", ENV_DEBUG);
        }
        for directive in &self.arm {
            info!(
                method = %directive.method,
                threshold = directive.ignition.threshold,
                location = %directive.ignition.location,
                "arm directive registered"
            );
            registry.arm(directive.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn directive_full_form() {
        let d: ArmDirective = "read=3@BEFORE | SKIP_ORIGINAL#EIO".parse().unwrap();
        assert_eq!(d.method, "read");
        assert_eq!(d.ignition.threshold, 3);
        assert_eq!(
            d.ignition.location,
            FireLocation::BEFORE | FireLocation::SKIP_ORIGINAL
        );
        assert_eq!(d.ignition.payload, "EIO");
    }

    #[test]
    fn directive_defaults_to_before() {
        let d: ArmDirective = "open, openat=1".parse().unwrap();
        assert_eq!(d.method, "open, openat");
        assert_eq!(d.ignition.location, FireLocation::BEFORE);
        assert_eq!(d.ignition.payload, "");
    }

    #[test]
    fn directive_errors() {
        assert!("read".parse::<ArmDirective>().is_err());
        assert!("=3".parse::<ArmDirective>().is_err());
        assert!("read=x".parse::<ArmDirective>().is_err());
        assert!("read=1@NOWHERE".parse::<ArmDirective>().is_err());
    }

    #[test]
    fn env_config_parsing() {
        let config = EnvConfig::from_lookup(lookup(&[
            (ENV_DEBUG, "1"),
            (ENV_LOG, "hook_stub=debug"),
            (ENV_ARM, "read=2; bogus ;write=1@AFTER"),
        ]));
        assert!(config.debug);
        assert_eq!(config.log_filter.as_deref(), Some("hook_stub=debug"));
        assert_eq!(config.arm.len(), 2);
        assert_eq!(config.arm[1].method, "write");

        let quiet = EnvConfig::from_lookup(lookup(&[(ENV_DEBUG, "0")]));
        assert!(!quiet.debug);
        assert!(quiet.arm.is_empty());

        for off in ["false", "off", "", " 0 "] {
            assert!(!EnvConfig::from_lookup(lookup(&[(ENV_DEBUG, off)])).debug, "{:?}", off);
        }
        assert!(!EnvConfig::from_lookup(lookup(&[])).debug);
    }

    #[test]
    fn apply_sets_debug_and_arms() {
        let registry = StubRegistry::new();
        let config = EnvConfig::from_lookup(lookup(&[(ENV_DEBUG, "yes"), (ENV_ARM, "=9;x=2")]));
        config.apply(&registry);
        assert!(registry.debug_enabled());

        let stub = registry
            .try_register(&crate::HookTable::new(vec![]))
            .unwrap();
        // the empty label only matches directives for "", which failed to parse
        assert_eq!(stub.snapshot().state.threshold, 0);
    }
}
