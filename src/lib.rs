//! Minidisc: a lightweight service-discovery layer on top of an existing
//! overlay mesh network.
//!
//! Each node may advertise zero or more local services; any node may list
//! every service currently advertised anywhere on the mesh, or find one
//! matching a name and label set. The hard part — making sure exactly one
//! process per node address serves discovery traffic on the fixed port
//! 28004, while still letting other processes on the same host participate
//! — is handled by [`node::Node`]; [`discovery::DiscoveryClient`] is a thin
//! consumer of that protocol.
//!
//! # Example
//!
//! ```no_run
//! use minidisc::{start_registry, MeshClient};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), minidisc::MinidiscError> {
//! let mesh = MeshClient::default_socket();
//! let (registry, _node_task) = start_registry(&mesh).await?;
//!
//! registry.advertise(4242, "fuedle", Default::default());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod mesh;
pub mod node;
pub mod registry;
pub mod service;

mod net;

use std::sync::Arc;

pub use config::NodeConfig;
pub use discovery::DiscoveryClient;
pub use error::MinidiscError;
pub use mesh::MeshClient;
pub use node::{Node, Role};
pub use registry::{AdvertiseRegistry, LocalRegistry};
pub use service::Service;

/// Discover this node's own address via `mesh`, spawn its background
/// [`Node`] actor, and return the narrow registry capability used to
/// advertise and unlist local services.
///
/// The returned `JoinHandle` only resolves if the Node hits a fatal bind
/// failure ([`MinidiscError::BindFailure`]); it is otherwise meant to keep
/// running for the life of the process.
pub async fn start_registry(
    mesh: &MeshClient,
) -> Result<
    (
        Arc<dyn AdvertiseRegistry>,
        tokio::task::JoinHandle<Result<(), MinidiscError>>,
    ),
    MinidiscError,
> {
    let own_addr = mesh.own_ipv4().await?;
    let registry = Arc::new(LocalRegistry::new(own_addr));
    let node = Node::new(own_addr, registry.clone());

    let handle = tokio::spawn(async move { node.run().await });

    Ok((registry as Arc<dyn AdvertiseRegistry>, handle))
}
