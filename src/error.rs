//! Error types for Minidisc operations.

use std::net::SocketAddrV4;

/// Error kinds that can occur during Minidisc operations.
#[derive(Debug, thiserror::Error)]
pub enum MinidiscError {
    /// The mesh reports no IPv4 address for this node.
    #[error("no local IPv4 address found on the mesh")]
    NoLocalAddress,

    /// The mesh control socket was unreachable or returned a non-200 status.
    #[error("mesh control socket unavailable: {0}")]
    MeshUnavailable(String),

    /// A reachable peer returned a non-200 status or malformed body for `/services`.
    #[error("remote error from peer {addr}: {reason}")]
    RemoteError {
        /// The offending peer address.
        addr: SocketAddrV4,
        /// Human-readable description of what went wrong.
        reason: String,
    },

    /// `unlist` was called with a port that has no advertised service.
    #[error("no service advertised on port {0}")]
    NotFound(u16),

    /// Neither the well-known port nor an ephemeral port could be bound.
    #[error("failed to bind Minidisc server: {0}")]
    BindFailure(String),

    /// A peer refused the connection or timed out. Callers that see this
    /// internally (e.g. `DiscoveryClient::list`) swallow it rather than
    /// surfacing it — the peer is simply treated as not running Minidisc.
    #[error("peer {0} unreachable")]
    PeerUnreachable(SocketAddrV4),
}
