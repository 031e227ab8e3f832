//! The local registry of services advertised by the current process.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Mutex;

use crate::error::MinidiscError;
use crate::service::Service;

/// Narrow capability exposed to callers that only need to mutate the
/// registry, hiding the concrete storage and the [`LocalRegistry::snapshot`]
/// operation used internally by [`crate::node::Node`].
pub trait AdvertiseRegistry: Send + Sync {
    /// Advertise (or replace) the service bound to `port`.
    fn advertise(&self, port: u16, name: &str, labels: BTreeMap<String, String>);

    /// Stop advertising the service bound to `port`.
    fn unlist(&self, port: u16) -> Result<(), MinidiscError>;
}

/// In-memory table of services advertised by the current process.
///
/// At most one entry exists per port (the port alone identifies a local
/// service, since the address is always this node's own). Order is
/// insertion order; replacing an entry preserves its position.
#[derive(Debug)]
pub struct LocalRegistry {
    own_addr: Ipv4Addr,
    services: Mutex<Vec<Service>>,
}

impl LocalRegistry {
    /// Create an empty registry for services owned by `own_addr`.
    pub fn new(own_addr: Ipv4Addr) -> Self {
        Self {
            own_addr,
            services: Mutex::new(Vec::new()),
        }
    }

    /// This node's own address, used to construct every advertised service's
    /// `addr_port`.
    pub fn own_addr(&self) -> Ipv4Addr {
        self.own_addr
    }

    /// Advertise (or replace in place) the service bound to `port`.
    ///
    /// # Panics
    ///
    /// Panics if `port` is `0` (spec precondition: `0 < port < 65536`, which
    /// `u16` already upper-bounds).
    pub fn advertise(&self, port: u16, name: impl Into<String>, labels: BTreeMap<String, String>) {
        assert!(port != 0, "port must be nonzero");
        let entry = Service::new(name, labels, SocketAddrV4::new(self.own_addr, port));

        let mut services = self.services.lock().unwrap();
        if let Some(existing) = services.iter_mut().find(|s| s.addr_port.port() == port) {
            *existing = entry;
        } else {
            services.push(entry);
        }
    }

    /// Remove the unique entry advertised on `port`.
    pub fn unlist(&self, port: u16) -> Result<(), MinidiscError> {
        let mut services = self.services.lock().unwrap();
        let before = services.len();
        services.retain(|s| s.addr_port.port() != port);
        if services.len() == before {
            return Err(MinidiscError::NotFound(port));
        }
        Ok(())
    }

    /// Atomic copy of the current list, in insertion order.
    pub fn snapshot(&self) -> Vec<Service> {
        self.services.lock().unwrap().clone()
    }
}

impl AdvertiseRegistry for LocalRegistry {
    fn advertise(&self, port: u16, name: &str, labels: BTreeMap<String, String>) {
        LocalRegistry::advertise(self, port, name, labels)
    }

    fn unlist(&self, port: u16) -> Result<(), MinidiscError> {
        LocalRegistry::unlist(self, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LocalRegistry {
        LocalRegistry::new(Ipv4Addr::new(100, 64, 0, 1))
    }

    #[test]
    fn advertise_then_snapshot_has_one_entry() {
        let r = registry();
        r.advertise(42, "fuedle", BTreeMap::new());

        let snap = r.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].name, "fuedle");
        assert_eq!(snap[0].addr_port.port(), 42);
    }

    #[test]
    fn advertise_replaces_in_place() {
        let r = registry();
        r.advertise(10, "a", BTreeMap::new());
        r.advertise(20, "b", BTreeMap::new());
        let mut labels = BTreeMap::new();
        labels.insert("v".to_string(), "2".to_string());
        r.advertise(10, "a2", labels.clone());

        let snap = r.snapshot();
        assert_eq!(snap.len(), 2);
        // Position of port 10's entry is preserved (still first).
        assert_eq!(snap[0].name, "a2");
        assert_eq!(snap[0].labels, labels);
        assert_eq!(snap[1].name, "b");
    }

    #[test]
    fn unlist_removes_entry() {
        let r = registry();
        r.advertise(42, "fuedle", BTreeMap::new());
        r.unlist(42).unwrap();
        assert!(r.snapshot().is_empty());
    }

    #[test]
    fn unlist_unknown_port_errors_and_leaves_registry_unchanged() {
        let r = registry();
        r.advertise(42, "fuedle", BTreeMap::new());

        let err = r.unlist(99).unwrap_err();
        assert!(matches!(err, MinidiscError::NotFound(99)));
        assert_eq!(r.snapshot().len(), 1);
    }

    #[test]
    fn concurrent_advertise_and_snapshot_never_observe_a_torn_write() {
        use std::sync::Arc;
        use std::thread;

        let r = Arc::new(registry());
        let mut handles = Vec::new();
        for i in 0..50u16 {
            let r = r.clone();
            handles.push(thread::spawn(move || {
                r.advertise(i + 1, format!("svc-{i}"), BTreeMap::new());
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let snap = r.snapshot();
        assert_eq!(snap.len(), 50);
    }
}
