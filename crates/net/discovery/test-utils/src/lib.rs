//! Test utilities for node discovery.
//!
//! Provides an in-memory [`RoutingTable`](vertex_net_discovery::RoutingTable),
//! a scripted [`FindNode`](vertex_net_discovery::FindNode) transport, and
//! simulated networks built from both.

mod network;
mod query;
mod table;

use std::net::{Ipv4Addr, SocketAddr};

pub use network::{SimNetwork, random_node};
pub use query::ScriptedQuery;
pub use table::MemoryTable;

use vertex_net_discovery::{Node, NodeId};

/// A node whose identifier is zero except for the last byte.
///
/// Its XOR distance to [`NodeId::ZERO`] is `last`, which makes expected
/// orderings easy to read.
pub fn node_at(last: u8) -> Node {
    let mut bytes = [0u8; 32];
    bytes[31] = last;
    Node::new(
        NodeId::new(bytes),
        SocketAddr::from((Ipv4Addr::new(10, 0, 0, last), 30303)),
    )
}

/// Install a test-friendly tracing subscriber.
///
/// Honors `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
