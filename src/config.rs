//! Tunable constants for the Node protocol.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::node::state::{COOLDOWN, PROBE_INTERVAL, REQUEST_TIMEOUT, WELL_KNOWN_PORT};

/// Tunables for [`crate::node::Node`] and [`crate::discovery::DiscoveryClient`].
///
/// Defaults match the fixed constants in the wire spec (28004 / 5s / 10s /
/// 2s). Tests override these with short durations so integration tests
/// don't have to wait out the real probe/cooldown windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// The fixed discovery port contended for by every process on a node.
    #[serde(default = "default_well_known_port")]
    pub well_known_port: u16,

    /// How often a Delegate probes the Leader's `/ping`.
    #[serde(default = "default_probe_interval", with = "duration_secs")]
    pub probe_interval: Duration,

    /// How long to wait after a failed delegate registration before rebinding.
    #[serde(default = "default_cooldown", with = "duration_secs")]
    pub cooldown: Duration,

    /// Timeout applied to every outbound HTTP call.
    #[serde(default = "default_request_timeout", with = "duration_secs")]
    pub request_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            well_known_port: default_well_known_port(),
            probe_interval: default_probe_interval(),
            cooldown: default_cooldown(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_well_known_port() -> u16 {
    WELL_KNOWN_PORT
}

fn default_probe_interval() -> Duration {
    PROBE_INTERVAL
}

fn default_cooldown() -> Duration {
    COOLDOWN
}

fn default_request_timeout() -> Duration {
    REQUEST_TIMEOUT
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
