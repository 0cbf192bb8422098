//! Routing table contract consumed by lookups.

use std::net::IpAddr;

use auto_impl::auto_impl;
use tokio_util::sync::CancellationToken;

use crate::{Node, NodeId};

/// The part of a Kademlia routing table a [`Lookup`](crate::Lookup) depends on.
///
/// A table is shared by every lookup running against it, so all methods take
/// `&self` and implementations must synchronize internally. None of the
/// methods may block on the network.
#[auto_impl(&, Box, Arc)]
pub trait RoutingTable: Send + Sync {
    /// Identifier of the local node. Lookups never query it.
    fn self_id(&self) -> NodeId;

    /// Up to `limit` known nodes closest to `target`, closest first.
    fn closest_known(&self, target: &NodeId, limit: usize) -> Vec<Node>;

    /// Consecutive FINDNODE failures recorded for a node at a given IP.
    fn failure_count(&self, id: &NodeId, ip: IpAddr) -> u32;

    /// Persist the consecutive FINDNODE failure counter for a node.
    fn set_failure_count(&self, id: &NodeId, ip: IpAddr, count: u32);

    /// Number of entries in the bucket `id` belongs to.
    fn bucket_len(&self, id: &NodeId) -> usize;

    /// Remove a node from the table.
    fn delete(&self, node: &Node);

    /// Offer a node reported by a peer as a table entry.
    ///
    /// The table decides whether to insert it and is responsible for later
    /// revalidating it.
    fn add_seen_node(&self, node: &Node);

    /// Signal fired when the table shuts down.
    fn shutdown_signal(&self) -> CancellationToken;
}
