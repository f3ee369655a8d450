use crate::error::{AutomationError, AutomationResult};
use crate::guard::ErrorMode;
use crate::protocol::AutomationIdentity;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_INSTRUMENT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(8 * 60 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-client behaviour of an [`AstraAdmin`](crate::AstraAdmin).
#[derive(Debug, Clone, PartialEq)]
pub struct AdminConfig {
    pub error_mode: ErrorMode,
    /// Bound on every acknowledgement wait (read, write, run, close, collection steps).
    pub wait_timeout: Duration,
    pub instrument_timeout: Duration,
    /// Bound on the wait for a running collection to finish.
    pub collection_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            error_mode: ErrorMode::default(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            instrument_timeout: DEFAULT_INSTRUMENT_TIMEOUT,
            collection_timeout: DEFAULT_COLLECTION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl AdminConfig {
    /// Defaults overridden by `ASTRA_*` environment variables.
    pub fn from_env() -> AutomationResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AutomationResult<Self> {
        let mut config = Self::default();
        if let Some(mode) = lookup("ASTRA_ERROR_MODE") {
            config.error_mode = mode.parse().map_err(AutomationError::Config)?;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "ASTRA_WAIT_TIMEOUT_SECS")? {
            config.wait_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "ASTRA_INSTRUMENT_TIMEOUT_SECS")? {
            config.instrument_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "ASTRA_COLLECTION_TIMEOUT_SECS")? {
            config.collection_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "ASTRA_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms.max(1));
        }
        Ok(config)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> AutomationResult<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AutomationError::Config(format!("{key}={raw:?} is not a valid number"))),
    }
}

/// Identity for this process with a fresh random client id.
pub fn client_identity(name: &str, version: &str) -> AutomationIdentity {
    let entity_guid: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();

    AutomationIdentity {
        entity_name: name.to_string(),
        entity_version: version.to_string(),
        pid: std::process::id(),
        entity_guid,
        enabled: 1,
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
    fn environment_overrides_defaults() {
        let config = AdminConfig::from_lookup(lookup(&[
            ("ASTRA_ERROR_MODE", "raise"),
            ("ASTRA_WAIT_TIMEOUT_SECS", "5"),
            ("ASTRA_POLL_INTERVAL_MS", "20"),
        ]))
        .expect("config");
        assert_eq!(config.error_mode, ErrorMode::Raise);
        assert_eq!(config.wait_timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_millis(20));
        assert_eq!(config.collection_timeout, DEFAULT_COLLECTION_TIMEOUT);
    }

    #[test]
    fn malformed_values_are_config_errors() {
        let err = AdminConfig::from_lookup(lookup(&[("ASTRA_WAIT_TIMEOUT_SECS", "soon")]))
            .expect_err("bad number");
        assert!(matches!(err, AutomationError::Config(msg) if msg.contains("ASTRA_WAIT_TIMEOUT_SECS")));

        let err = AdminConfig::from_lookup(lookup(&[("ASTRA_ERROR_MODE", "loud")]))
            .expect_err("bad mode");
        assert!(matches!(err, AutomationError::Config(_)));
    }

    #[test]
    fn identities_are_unique_per_call() {
        let a = client_identity("sequence runner", "1.0");
        let b = client_identity("sequence runner", "1.0");
        assert_eq!(a.entity_guid.len(), 32);
        assert_ne!(a.entity_guid, b.entity_guid);
        assert_eq!(a.pid, std::process::id());
        assert_eq!(a.enabled, 1);
    }
}
