//! The `Service` record and its wire representation.

use std::collections::BTreeMap;
use std::net::SocketAddrV4;

use serde::{Deserialize, Serialize};

/// A single service advertisement: a name, a set of opaque labels, and the
/// address/port it is reachable on.
///
/// Immutable once constructed. The wire form renders `addr_port` as the
/// single string `"ip:port"` under the JSON key `addrPort`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Service name, opaque to Minidisc.
    pub name: String,

    /// Opaque string labels, matched by subset-inclusion on lookup.
    pub labels: BTreeMap<String, String>,

    /// Address and port this service is reachable on.
    #[serde(rename = "addrPort", with = "addr_port_as_str")]
    pub addr_port: SocketAddrV4,
}

impl Service {
    /// Construct a new service record.
    pub fn new(
        name: impl Into<String>,
        labels: BTreeMap<String, String>,
        addr_port: SocketAddrV4,
    ) -> Self {
        Self {
            name: name.into(),
            labels,
            addr_port,
        }
    }
}

/// Returns true if every `(k, v)` in `want` appears in `have` with an
/// identical value. Extra labels present only in `have` are ignored.
pub fn labels_match(want: &BTreeMap<String, String>, have: &BTreeMap<String, String>) -> bool {
    want.iter().all(|(k, v)| have.get(k) == Some(v))
}

/// `SocketAddrV4` serializes as the literal wire string `"ip:port"` via its
/// existing `Display`/`FromStr` impls, rather than as a `{ip, port}` object.
mod addr_port_as_str {
    use std::net::SocketAddrV4;
    use std::str::FromStr;

    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(addr: &SocketAddrV4, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(addr)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddrV4, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SocketAddrV4::from_str(&s).map_err(D::Error::custom)
    }
}
