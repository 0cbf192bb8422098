//! Discovered node records.

use core::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::NodeId;

/// A node observed on the network: identifier plus the endpoint it answered
/// from (or was reported at).
///
/// Nodes are immutable within a lookup. Liveness is tracked by the routing
/// table, not by the record itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    /// Node identifier.
    pub id: NodeId,
    /// Discovery endpoint.
    pub addr: SocketAddr,
}

impl Node {
    /// Create a node record.
    pub const fn new(id: NodeId, addr: SocketAddr) -> Self {
        Self { id, addr }
    }

    /// IP address of the discovery endpoint.
    ///
    /// Failure counters are keyed by `(id, ip)` so that a node moving to a new
    /// address starts with a clean record.
    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}@{}", self.id.as_b256(), self.addr)
    }
}
