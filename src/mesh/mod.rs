//! Read-only client for the overlay mesh's local control socket.
//!
//! The mesh itself (address assignment, peer liveness, routing) is an
//! external service; this module only speaks its status protocol.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper_util::rt::TokioIo;
use indexmap::IndexMap;
use serde::Deserialize;
use tokio::net::UnixStream;

use crate::error::MinidiscError;

/// Default path of the mesh control socket on Unix systems. Platform
/// placement of this socket is owned by the mesh, not by Minidisc; callers
/// that need a different path should use [`MeshClient::new`] directly.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/tailscale/tailscaled.sock";

/// Read-only wrapper around the overlay mesh's local status endpoint.
#[derive(Debug, Clone)]
pub struct MeshClient {
    socket_path: PathBuf,
}

impl MeshClient {
    /// Create a client talking to the control socket at `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Create a client talking to the platform's default control socket path.
    pub fn default_socket() -> Self {
        Self::new(DEFAULT_SOCKET_PATH)
    }

    /// This node's primary IPv4 address.
    ///
    /// Fails with [`MinidiscError::NoLocalAddress`] if the mesh reports no
    /// IPv4 address for the local node.
    pub async fn own_ipv4(&self) -> Result<Ipv4Addr, MinidiscError> {
        let status = self.fetch_status().await?;
        status
            .tailscale_ips
            .iter()
            .find_map(|ip| Ipv4Addr::from_str(ip).ok())
            .ok_or(MinidiscError::NoLocalAddress)
    }

    /// IPv4 addresses of every currently-online peer, plus this node's own.
    /// Non-IPv4 entries are silently dropped.
    pub async fn peer_ipv4s(&self) -> Result<Vec<Ipv4Addr>, MinidiscError> {
        let status = self.fetch_status().await?;
        let mut addrs: Vec<Ipv4Addr> = status
            .tailscale_ips
            .iter()
            .filter_map(|ip| Ipv4Addr::from_str(ip).ok())
            .collect();

        for peer in status.peer.values() {
            if !peer.online {
                continue;
            }
            addrs.extend(
                peer.tailscale_ips
                    .iter()
                    .filter_map(|ip| Ipv4Addr::from_str(ip).ok()),
            );
        }
        Ok(addrs)
    }

    async fn fetch_status(&self) -> Result<IpnStatus, MinidiscError> {
        let body = http_get_unix(&self.socket_path, "/localapi/v0/status")
            .await
            .map_err(|e| MinidiscError::MeshUnavailable(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| MinidiscError::MeshUnavailable(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct IpnStatus {
    #[serde(rename = "TailscaleIPs", default)]
    tailscale_ips: Vec<String>,
    #[serde(rename = "Peer", default)]
    peer: IndexMap<String, PeerStatus>,
}

#[derive(Debug, Deserialize)]
struct PeerStatus {
    #[serde(rename = "Online", default)]
    online: bool,
    #[serde(rename = "TailscaleIPs", default)]
    tailscale_ips: Vec<String>,
}

/// Issue a single `GET path` over a fresh Unix-domain HTTP/1.1 connection and
/// return the response body. The control socket connection is never pooled:
/// a new `UnixStream` and handshake are used for every call.
async fn http_get_unix(socket_path: &Path, path: &str) -> std::io::Result<String> {
    let stream = UnixStream::connect(socket_path).await?;
    let io = TokioIo::new(stream);

    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    tokio::spawn(async move {
        if let Err(err) = conn.await {
            tracing::debug!(error = %err, "mesh control connection closed");
        }
    });

    let request = Request::builder()
        .method("GET")
        .uri(path)
        .header("Host", "local-mesh-control")
        .body(Full::new(Bytes::new()))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let status = response.status();
    let body = response
        .collect()
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
        .to_bytes();

    if !status.is_success() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("mesh control socket returned status {status}"),
        ));
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    async fn fake_status_server(socket_path: PathBuf, body: &'static str) {
        let listener = UnixListener::bind(&socket_path).unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        // Give the listener a moment to actually start accepting.
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn own_ipv4_returns_first_ipv4() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("mesh.sock");
        fake_status_server(
            socket_path.clone(),
            r#"{"TailscaleIPs":["100.64.0.1","fd7a:115c::1"],"Peer":{}}"#,
        )
        .await;

        let client = MeshClient::new(socket_path);
        let ip = client.own_ipv4().await.unwrap();
        assert_eq!(ip, Ipv4Addr::new(100, 64, 0, 1));
    }

    #[tokio::test]
    async fn own_ipv4_fails_when_no_ipv4_present() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("mesh.sock");
        fake_status_server(
            socket_path.clone(),
            r#"{"TailscaleIPs":["fd7a:115c::1"],"Peer":{}}"#,
        )
        .await;

        let client = MeshClient::new(socket_path);
        let err = client.own_ipv4().await.unwrap_err();
        assert!(matches!(err, MinidiscError::NoLocalAddress));
    }

    #[tokio::test]
    async fn peer_ipv4s_includes_own_and_online_peers_only() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("mesh.sock");
        fake_status_server(
            socket_path.clone(),
            r#"{
                "TailscaleIPs": ["100.64.0.1"],
                "Peer": {
                    "a": {"Online": true, "TailscaleIPs": ["100.64.0.2"]},
                    "b": {"Online": false, "TailscaleIPs": ["100.64.0.3"]}
                }
            }"#,
        )
        .await;

        let client = MeshClient::new(socket_path);
        let mut peers = client.peer_ipv4s().await.unwrap();
        peers.sort();
        assert_eq!(
            peers,
            vec![
                Ipv4Addr::new(100, 64, 0, 1),
                Ipv4Addr::new(100, 64, 0, 2),
            ]
        );
    }

    #[tokio::test]
    async fn unreachable_socket_surfaces_mesh_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("does-not-exist.sock");

        let client = MeshClient::new(socket_path);
        let err = client.own_ipv4().await.unwrap_err();
        assert!(matches!(err, MinidiscError::MeshUnavailable(_)));
    }
}
