//! Connector configuration.

use mf_01_config::{parse_duration, Lookup};
use std::time::Duration;
use tracing::warn;

/// Runtime parameters of a connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Budget of outbound requests that do not set one
    pub default_time_budget: Duration,

    /// How long a caller waits for the first ack before giving up
    pub ack_timeout: Duration,

    /// Deepest call chain accepted before a request is refused
    pub max_call_depth: u32,

    /// Body bytes per fragment. Derived from the transport when `None`.
    pub max_fragment_size: Option<usize>,

    /// Idle time after which a partially received message is dropped
    pub fragment_timeout: Duration,

    /// Period of the reaper task
    pub reaper_interval: Duration,

    /// Topics remembered by the known-responders cache
    pub known_responders_capacity: usize,

    /// How long a responder count is trusted
    pub known_responders_ttl: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            default_time_budget: Duration::from_secs(20),
            ack_timeout: Duration::from_millis(250),
            max_call_depth: 64,
            max_fragment_size: None,
            fragment_timeout: Duration::from_secs(10),
            reaper_interval: Duration::from_secs(1),
            known_responders_capacity: 1024,
            known_responders_ttl: Duration::from_secs(60),
        }
    }
}

impl ConnectorConfig {
    /// Reads `FABRIC_*` keys, keeping the default for absent or invalid ones.
    ///
    /// | Key | Default |
    /// |-----|---------|
    /// | `FABRIC_TIME_BUDGET` | `20s` |
    /// | `FABRIC_ACK_TIMEOUT` | `250ms` |
    /// | `FABRIC_MAX_CALL_DEPTH` | `64` |
    /// | `FABRIC_MAX_FRAGMENT_SIZE` | from the transport |
    /// | `FABRIC_FRAGMENT_TIMEOUT` | `10s` |
    /// | `FABRIC_REAPER_INTERVAL` | `1s` |
    /// | `FABRIC_KNOWN_RESPONDERS_SIZE` | `1024` |
    /// | `FABRIC_KNOWN_RESPONDERS_TTL` | `60s` |
    pub fn from_lookup(lookup: &Lookup) -> Self {
        let defaults = Self::default();
        let duration = |key: &str, default: Duration| {
            read(lookup, key, parse_duration).unwrap_or(default)
        };

        Self {
            default_time_budget: duration("FABRIC_TIME_BUDGET", defaults.default_time_budget),
            ack_timeout: duration("FABRIC_ACK_TIMEOUT", defaults.ack_timeout),
            max_call_depth: read(lookup, "FABRIC_MAX_CALL_DEPTH", |v| v.parse().ok())
                .unwrap_or(defaults.max_call_depth),
            max_fragment_size: read(lookup, "FABRIC_MAX_FRAGMENT_SIZE", |v| {
                v.parse().ok().filter(|n: &usize| *n > 0)
            }),
            fragment_timeout: duration("FABRIC_FRAGMENT_TIMEOUT", defaults.fragment_timeout),
            reaper_interval: duration("FABRIC_REAPER_INTERVAL", defaults.reaper_interval)
                .max(Duration::from_millis(1)),
            known_responders_capacity: read(lookup, "FABRIC_KNOWN_RESPONDERS_SIZE", |v| {
                v.parse().ok()
            })
            .unwrap_or(defaults.known_responders_capacity),
            known_responders_ttl: duration(
                "FABRIC_KNOWN_RESPONDERS_TTL",
                defaults.known_responders_ttl,
            ),
        }
    }
}

fn read<T>(lookup: &Lookup, key: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let raw = lookup.get(key)?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        warn!(key, value = %raw, "Ignoring invalid connector setting");
    }
    parsed
}
