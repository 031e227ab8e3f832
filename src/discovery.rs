//! Pull-side library: fan out to every online peer's Leader endpoint,
//! aggregate, and filter by name and labels.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use futures::future::join_all;

use crate::error::MinidiscError;
use crate::mesh::MeshClient;
use crate::node::state::{REQUEST_TIMEOUT, WELL_KNOWN_PORT};
use crate::service::{labels_match, Service};

/// Queries every reachable peer's `/services` endpoint and aggregates the
/// results into a single union, or finds one service matching a name and
/// label set.
pub struct DiscoveryClient {
    mesh: MeshClient,
    http: reqwest::Client,
    port: u16,
    timeout: Duration,
}

impl DiscoveryClient {
    /// Create a client that discovers peers through `mesh` and queries them
    /// on the well-known discovery port with the default 2s timeout.
    pub fn new(mesh: MeshClient) -> Self {
        Self {
            mesh,
            http: reqwest::Client::new(),
            port: WELL_KNOWN_PORT,
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Override the per-request timeout (default 2s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Query every online peer's `/services` and return the union of all
    /// successful responses.
    ///
    /// Peers that refuse the connection or time out are swallowed (they
    /// simply aren't running Minidisc). A reachable peer that returns a
    /// non-200 status or an unparsable body surfaces as
    /// [`MinidiscError::RemoteError`].
    pub async fn list(&self) -> Result<Vec<Service>, MinidiscError> {
        let peers = self.mesh.peer_ipv4s().await?;
        let fetches = peers.into_iter().map(|peer| self.fetch_peer(peer));
        let results = join_all(fetches).await;

        let mut all = Vec::new();
        for result in results {
            match result? {
                Some(services) => all.extend(services),
                None => {} // peer unreachable: not running Minidisc
            }
        }
        Ok(all)
    }

    /// Find the first advertised service named `name` whose labels are a
    /// superset of `labels`. Preserves first-seen-wins iteration order; does
    /// not sort.
    pub async fn find(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Option<SocketAddrV4>, MinidiscError> {
        let services = self.list().await?;
        Ok(services
            .into_iter()
            .find(|s| s.name == name && labels_match(labels, &s.labels))
            .map(|s| s.addr_port))
    }

    /// Fetch one peer's `/services`. `Ok(None)` means the peer was
    /// unreachable and should be swallowed by the caller.
    async fn fetch_peer(&self, peer: Ipv4Addr) -> Result<Option<Vec<Service>>, MinidiscError> {
        let addr = SocketAddrV4::new(peer, self.port);
        let url = format!("http://{addr}/services");

        let response = match self.http.get(&url).timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() || crate::net::is_connection_refused(&e) => return Ok(None),
            Err(e) => {
                return Err(MinidiscError::RemoteError {
                    addr,
                    reason: e.to_string(),
                })
            }
        };

        if !response.status().is_success() {
            return Err(MinidiscError::RemoteError {
                addr,
                reason: format!("status {}", response.status()),
            });
        }

        response
            .json::<Vec<Service>>()
            .await
            .map(Some)
            .map_err(|e| MinidiscError::RemoteError {
                addr,
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, labels: &[(&str, &str)], port: u16) -> Service {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Service::new(name, labels, SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), port))
    }

    #[test]
    fn find_semantics_over_an_in_memory_list() {
        let services = vec![
            service("x", &[], 10),
            service("y", &[("env", "prod")], 20),
        ];

        let mut want = BTreeMap::new();
        want.insert("env".to_string(), "prod".to_string());
        let found = services
            .iter()
            .find(|s| s.name == "y" && labels_match(&want, &s.labels));
        assert_eq!(found.unwrap().addr_port.port(), 20);

        want.insert("env".to_string(), "dev".to_string());
        let not_found = services
            .iter()
            .find(|s| s.name == "y" && labels_match(&want, &s.labels));
        assert!(not_found.is_none());
    }

    #[test]
    fn find_returns_first_match_in_order() {
        let services = vec![service("dup", &[], 1), service("dup", &[], 2)];
        let found = services.iter().find(|s| s.name == "dup");
        assert_eq!(found.unwrap().addr_port.port(), 1);
    }
}
