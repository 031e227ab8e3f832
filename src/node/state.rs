//! The Node role state machine.
//!
//! ```text
//! Binding --bound 28004--------> Leader (stays forever)
//! Binding --bound ephemeral----> DelegateRegistering
//! Binding --both binds failed--> (fatal, Node aborts)
//! DelegateRegistering --ok-----> Delegate (probes leader every 5s)
//! DelegateRegistering --fail---> Cooldown (sleep 10s)
//! Cooldown --timer elapsed----> Binding
//! Delegate --probe fails------> Rebinding (stop local server)
//! Rebinding --------------------> Binding
//! ```
use std::time::Duration;

/// Fixed protocol constants from the wire spec, used as [`NodeConfig`] defaults.
pub const WELL_KNOWN_PORT: u16 = 28004;
/// Default delegate-to-leader probe interval.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(5);
/// Default registration-failure cooldown.
pub const COOLDOWN: Duration = Duration::from_secs(10);
/// Default per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// The role a [`crate::node::Node`] currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Attempting to bind a server port.
    Binding,
    /// Bound the well-known port; serving discovery traffic for the fleet.
    Leader,
    /// Bound an ephemeral port; registering with the Leader.
    DelegateRegistering,
    /// Registered with the Leader; probing it periodically.
    Delegate,
    /// Registration failed; waiting out the cooldown before rebinding.
    Cooldown,
    /// Leader was lost; tearing down the local server before rebinding.
    Rebinding,
}
