//! The HTTP routing table shared by both Leader and Delegate roles.
//!
//! A static routing table on path + method, replacing the distilled
//! spec's closure-based dispatch (see the "Dynamically-built request
//! handler" redesign note).

use std::net::SocketAddrV4;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::registry::LocalRegistry;
use crate::service::Service;

/// State shared by every handler. Held behind `Arc` so the same state can
/// back both the axum `Router` and the background fetch-and-evict logic in
/// [`crate::node::Node`].
#[derive(Clone)]
pub(crate) struct ServerState {
    pub registry: Arc<LocalRegistry>,
    pub delegates: Arc<Mutex<Vec<SocketAddrV4>>>,
    pub http: reqwest::Client,
    pub request_timeout: Duration,
}

/// Build the router used for both the Leader's well-known-port server and a
/// Delegate's ephemeral-port server — per spec, a Delegate "runs the same
/// HTTP server" as the Leader.
pub(crate) fn router(state: ServerState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/services", get(services))
        .route("/add-delegate", post(add_delegate))
        .with_state(state)
}

async fn ping() -> StatusCode {
    StatusCode::OK
}

async fn services(State(state): State<ServerState>) -> Json<Vec<Service>> {
    let mut services = state.registry.snapshot();

    // Snapshot the delegate list, then drop the lock before any outbound
    // fetch — the lock and an await over I/O must never be held together.
    let delegates: Vec<SocketAddrV4> = state.delegates.lock().unwrap().clone();

    for delegate in delegates {
        match fetch_remote_services(&state.http, delegate, state.request_timeout).await {
            Ok(remote) => services.extend(remote),
            Err(FetchError::ConnectionRefused) => {
                // The delegate has gone away; evict it. Other errors
                // (timeout, malformed body) are non-fatal and leave the
                // entry in place.
                let mut guard = state.delegates.lock().unwrap();
                guard.retain(|d| *d != delegate);
                tracing::info!(%delegate, "evicted unreachable delegate");
            }
            Err(FetchError::Other(reason)) => {
                tracing::debug!(%delegate, %reason, "delegate fetch failed, leaving entry in place");
            }
        }
    }

    Json(services)
}

#[derive(Deserialize)]
struct AddDelegateBody {
    #[serde(rename = "addrPort")]
    addr_port: String,
}

async fn add_delegate(
    State(state): State<ServerState>,
    body: axum::body::Bytes,
) -> StatusCode {
    let parsed: Result<AddDelegateBody, _> = serde_json::from_slice(&body);
    let Ok(parsed) = parsed else {
        return StatusCode::BAD_REQUEST;
    };
    let Ok(addr) = SocketAddrV4::from_str(&parsed.addr_port) else {
        return StatusCode::BAD_REQUEST;
    };

    // The Leader never checks `addr == own_addr` on incoming registrations,
    // mirroring source behavior; see SPEC_FULL.md §13.
    state.delegates.lock().unwrap().push(addr);
    StatusCode::OK
}

enum FetchError {
    ConnectionRefused,
    Other(String),
}

async fn fetch_remote_services(
    client: &reqwest::Client,
    addr: SocketAddrV4,
    timeout: Duration,
) -> Result<Vec<Service>, FetchError> {
    let url = format!("http://{addr}/services");
    let response = client
        .get(&url)
        .timeout(timeout)
        .send()
        .await
        .map_err(classify_reqwest_error)?;

    if !response.status().is_success() {
        return Err(FetchError::Other(format!("status {}", response.status())));
    }

    response
        .json::<Vec<Service>>()
        .await
        .map_err(|e| FetchError::Other(e.to_string()))
}

fn classify_reqwest_error(err: reqwest::Error) -> FetchError {
    if crate::net::is_connection_refused(&err) {
        FetchError::ConnectionRefused
    } else {
        FetchError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::net::Ipv4Addr;
    use tower::ServiceExt as _;

    fn state() -> ServerState {
        ServerState {
            registry: Arc::new(LocalRegistry::new(Ipv4Addr::new(100, 64, 0, 1))),
            delegates: Arc::new(Mutex::new(Vec::new())),
            http: reqwest::Client::new(),
            request_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn ping_returns_200() {
        let app = router(state());
        let response = app
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_returns_404() {
        let app = router(state());
        let response = app
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn services_returns_local_registry_snapshot() {
        let st = state();
        st.registry.advertise(42, "fuedle", Default::default());
        let app = router(st);

        let response = app
            .oneshot(Request::get("/services").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let services: Vec<Service> = serde_json::from_slice(&body).unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].name, "fuedle");
    }

    #[tokio::test]
    async fn add_delegate_with_malformed_json_returns_400_and_leaves_list_unchanged() {
        let st = state();
        let app = router(st.clone());

        let response = app
            .oneshot(
                Request::post("/add-delegate")
                    .header("content-type", "application/json")
                    .body(Body::from("not-json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(st.delegates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_delegate_with_valid_body_registers_delegate() {
        let st = state();
        let app = router(st.clone());

        let response = app
            .oneshot(
                Request::post("/add-delegate")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"addrPort":"100.64.0.1:9000"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            st.delegates.lock().unwrap().as_slice(),
            &[SocketAddrV4::new(Ipv4Addr::new(100, 64, 0, 1), 9000)]
        );
    }
}
