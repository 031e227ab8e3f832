//! The Node protocol actor: the Leader/Delegate/Rebinding state machine
//! described in spec.md §4.3.

pub mod server;
pub mod state;

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio::sync::watch;

pub use state::Role;

use crate::config::NodeConfig;
use crate::error::MinidiscError;
use crate::registry::LocalRegistry;
use server::{router, ServerState};

/// Guarantees that, for a given node address, exactly one process serves
/// discovery traffic on the well-known port while allowing other
/// processes on the same host to still participate as Delegates.
pub struct Node {
    own_addr: Ipv4Addr,
    registry: Arc<LocalRegistry>,
    config: NodeConfig,
    http: reqwest::Client,
    role_tx: watch::Sender<Role>,
}

impl Node {
    /// Create a Node for `own_addr` backed by `registry`, using the default
    /// [`NodeConfig`] (28004 / 5s / 10s / 2s).
    pub fn new(own_addr: Ipv4Addr, registry: Arc<LocalRegistry>) -> Self {
        Self::with_config(own_addr, registry, NodeConfig::default())
    }

    /// Create a Node with an explicit [`NodeConfig`], e.g. to use shorter
    /// intervals in tests.
    pub fn with_config(own_addr: Ipv4Addr, registry: Arc<LocalRegistry>, config: NodeConfig) -> Self {
        let (role_tx, _) = watch::channel(Role::Binding);
        Self {
            own_addr,
            registry,
            config,
            http: reqwest::Client::new(),
            role_tx,
        }
    }

    /// This Node's current role.
    pub fn role(&self) -> Role {
        *self.role_tx.borrow()
    }

    /// Subscribe to role transitions, e.g. to wait for `Leader` in a test.
    pub fn watch_role(&self) -> watch::Receiver<Role> {
        self.role_tx.subscribe()
    }

    fn set_role(&self, role: Role) {
        let _ = self.role_tx.send(role);
    }

    /// Run the Node's supervisor loop forever: bind, serve as Leader or
    /// Delegate, and recover from leader loss or registration failure.
    ///
    /// Only returns on a fatal [`MinidiscError::BindFailure`] (neither the
    /// well-known nor an ephemeral port could be bound, or the bound Leader
    /// server itself faults).
    pub async fn run(&self) -> Result<(), MinidiscError> {
        loop {
            self.set_role(Role::Binding);
            match self.bind().await? {
                Bound::Leader(listener) => {
                    tracing::info!(addr = %self.own_addr, "starting in leader mode");
                    self.set_role(Role::Leader);
                    return self.run_leader(listener).await;
                }
                Bound::Delegate(listener, port) => {
                    tracing::info!(addr = %self.own_addr, port, "starting in delegate mode");
                    self.set_role(Role::DelegateRegistering);
                    match self.run_as_delegate(listener, port).await {
                        DelegateExit::Rebind => continue,
                        DelegateExit::Cooldown => {
                            self.set_role(Role::Cooldown);
                            tokio::time::sleep(self.config.cooldown).await;
                        }
                    }
                }
            }
        }
    }

    /// Attempt to bind the well-known port; fall back to an ephemeral one.
    /// The port-in-use case is the normal case for every process after the
    /// first on a given address.
    async fn bind(&self) -> Result<Bound, MinidiscError> {
        let well_known = SocketAddrV4::new(self.own_addr, self.config.well_known_port);
        if let Ok(listener) = TcpListener::bind(well_known).await {
            return Ok(Bound::Leader(listener));
        }

        let ephemeral = SocketAddrV4::new(self.own_addr, 0);
        match TcpListener::bind(ephemeral).await {
            Ok(listener) => {
                let port = listener
                    .local_addr()
                    .map_err(|e| MinidiscError::BindFailure(e.to_string()))?
                    .port();
                Ok(Bound::Delegate(listener, port))
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to bind either well-known or ephemeral port");
                Err(MinidiscError::BindFailure(e.to_string()))
            }
        }
    }

    fn server_state(&self) -> ServerState {
        ServerState {
            registry: self.registry.clone(),
            delegates: Arc::new(Mutex::new(Vec::new())),
            http: self.http.clone(),
            request_timeout: self.config.request_timeout,
        }
    }

    async fn run_leader(&self, listener: TcpListener) -> Result<(), MinidiscError> {
        axum::serve(listener, router(self.server_state()))
            .await
            .map_err(|e| MinidiscError::BindFailure(e.to_string()))
    }

    /// Run as Delegate: serve on `listener`, register with the Leader, then
    /// probe it until it goes away (or registration itself fails).
    async fn run_as_delegate(&self, listener: TcpListener, own_port: u16) -> DelegateExit {
        let app = router(self.server_state());
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let server_task = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        if let Err(reason) = self.register_as_delegate(own_port).await {
            tracing::warn!(%reason, "delegate registration failed, entering cooldown");
            let _ = shutdown_tx.send(());
            let _ = server_task.await;
            return DelegateExit::Cooldown;
        }

        tracing::info!(addr = %self.own_addr, port = own_port, "registered as delegate");
        self.set_role(Role::Delegate);

        // Check immediately (registration just succeeded, so the leader
        // was alive a moment ago), then probe every `probe_interval`.
        loop {
            if !self.probe_leader().await {
                tracing::info!("leader went away, rebinding");
                break;
            }
            tokio::time::sleep(self.config.probe_interval).await;
        }

        self.set_role(Role::Rebinding);
        let _ = shutdown_tx.send(());
        let _ = server_task.await;
        DelegateExit::Rebind
    }

    async fn register_as_delegate(&self, own_port: u16) -> Result<(), String> {
        let leader = SocketAddrV4::new(self.own_addr, self.config.well_known_port);
        let delegate_addr = SocketAddrV4::new(self.own_addr, own_port);
        let url = format!("http://{leader}/add-delegate");

        let response = self
            .http
            .post(&url)
            .timeout(self.config.request_timeout)
            .json(&serde_json::json!({ "addrPort": delegate_addr.to_string() }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!(
                "leader rejected registration with status {}",
                response.status()
            ));
        }
        Ok(())
    }

    async fn probe_leader(&self) -> bool {
        let leader = SocketAddrV4::new(self.own_addr, self.config.well_known_port);
        let url = format!("http://{leader}/ping");
        matches!(
            self.http
                .get(&url)
                .timeout(self.config.request_timeout)
                .send()
                .await,
            Ok(response) if response.status().is_success()
        )
    }
}

enum Bound {
    Leader(TcpListener),
    Delegate(TcpListener, u16),
}

enum DelegateExit {
    Rebind,
    Cooldown,
}
