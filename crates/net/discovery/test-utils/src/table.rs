//! In-memory routing table.
//!
//! Nodes are organized into buckets by their logarithmic distance to the
//! local node. A single `RwLock<HashMap<NodeId, (Node, u16)>>` serves all node
//! operations, with atomic counters per bucket for lock-free size queries.

use std::{
    collections::HashMap,
    net::IpAddr,
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use vertex_net_discovery::{
    ID_BITS, Node, NodeId, NodesByDistance, RoutingTable, log_distance,
};

/// Number of buckets (one for each possible logarithmic distance 0-256).
const NUM_BUCKETS: usize = ID_BITS as usize + 1;

/// Routing table kept entirely in memory.
///
/// Records every mutation a lookup performs so tests can assert on them.
pub struct MemoryTable {
    self_id: NodeId,
    nodes: RwLock<HashMap<NodeId, (Node, u16)>>,
    bucket_counts: [AtomicUsize; NUM_BUCKETS],
    /// Overrides the measured bucket population when set.
    bucket_len_override: Mutex<Option<usize>>,
    failures: Mutex<HashMap<(NodeId, IpAddr), u32>>,
    deleted: Mutex<Vec<Node>>,
    seen: Mutex<Vec<Node>>,
    closed: CancellationToken,
}

impl std::fmt::Debug for MemoryTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTable")
            .field("self_id", &self.self_id)
            .field("nodes", &self.len())
            .finish_non_exhaustive()
    }
}

impl MemoryTable {
    /// Create an empty table for the local node `self_id`.
    pub fn new(self_id: NodeId) -> Self {
        Self {
            self_id,
            nodes: RwLock::new(HashMap::new()),
            bucket_counts: std::array::from_fn(|_| AtomicUsize::new(0)),
            bucket_len_override: Mutex::new(None),
            failures: Mutex::new(HashMap::new()),
            deleted: Mutex::new(Vec::new()),
            seen: Mutex::new(Vec::new()),
            closed: CancellationToken::new(),
        }
    }

    /// Create a table pre-populated with `nodes`.
    pub fn with_nodes(self_id: NodeId, nodes: impl IntoIterator<Item = Node>) -> Self {
        let table = Self::new(self_id);
        for node in nodes {
            table.insert(node);
        }
        table
    }

    /// Pretend every bucket holds `len` nodes.
    pub fn with_bucket_len(self, len: usize) -> Self {
        *self.bucket_len_override.lock() = Some(len);
        self
    }

    /// Add a node. Returns `true` if it was not present.
    pub fn insert(&self, node: Node) -> bool {
        if node.id == self.self_id {
            return false;
        }

        let mut nodes = self.nodes.write();
        if nodes.contains_key(&node.id) {
            return false;
        }

        let bucket = log_distance(&self.self_id, &node.id);
        nodes.insert(node.id, (node, bucket));
        self.bucket_counts[bucket as usize].fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Remove a node. Returns `true` if it was present.
    pub fn remove(&self, id: &NodeId) -> bool {
        let mut nodes = self.nodes.write();
        if let Some((_, bucket)) = nodes.remove(id) {
            self.bucket_counts[bucket as usize].fetch_sub(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Whether a node is in the table.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.read().contains_key(id)
    }

    /// Total number of nodes (lock-free).
    pub fn len(&self) -> usize {
        self.bucket_counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum()
    }

    /// Whether the table is empty (lock-free).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recorded failure counter for a node, as the lookup left it.
    pub fn failures(&self, node: &Node) -> u32 {
        self.failures
            .lock()
            .get(&(node.id, node.ip()))
            .copied()
            .unwrap_or(0)
    }

    /// Nodes removed through [`RoutingTable::delete`], in order.
    pub fn deleted(&self) -> Vec<Node> {
        self.deleted.lock().clone()
    }

    /// Nodes offered through [`RoutingTable::add_seen_node`], in order.
    pub fn seen(&self) -> Vec<Node> {
        self.seen.lock().clone()
    }

    /// Fire the table's shutdown signal.
    pub fn close(&self) {
        self.closed.cancel();
    }
}

impl RoutingTable for MemoryTable {
    fn self_id(&self) -> NodeId {
        self.self_id
    }

    fn closest_known(&self, target: &NodeId, limit: usize) -> Vec<Node> {
        let mut closest = NodesByDistance::new(*target);
        for (node, _) in self.nodes.read().values() {
            closest.push(*node, limit);
        }
        closest.into_entries()
    }

    fn failure_count(&self, id: &NodeId, ip: IpAddr) -> u32 {
        self.failures.lock().get(&(*id, ip)).copied().unwrap_or(0)
    }

    fn set_failure_count(&self, id: &NodeId, ip: IpAddr, count: u32) {
        self.failures.lock().insert((*id, ip), count);
    }

    fn bucket_len(&self, id: &NodeId) -> usize {
        if let Some(len) = *self.bucket_len_override.lock() {
            return len;
        }
        let bucket = log_distance(&self.self_id, id) as usize;
        self.bucket_counts[bucket].load(Ordering::Relaxed)
    }

    fn delete(&self, node: &Node) {
        if self.remove(&node.id) {
            self.deleted.lock().push(*node);
        }
    }

    fn add_seen_node(&self, node: &Node) {
        self.seen.lock().push(*node);
        self.insert(*node);
    }

    fn shutdown_signal(&self) -> CancellationToken {
        self.closed.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_at;

    #[test]
    fn test_insert_remove() {
        let table = MemoryTable::new(NodeId::ZERO);

        assert!(table.insert(node_at(0x80)));
        assert!(!table.insert(node_at(0x80)));
        assert!(table.insert(node_at(0x01)));
        assert_eq!(table.len(), 2);

        assert!(table.remove(&node_at(0x80).id));
        assert!(!table.remove(&node_at(0x80).id));
        assert_eq!(table.len(), 1);
        assert!(table.contains(&node_at(0x01).id));
    }

    #[test]
    fn test_self_is_not_inserted() {
        let table = MemoryTable::new(node_at(7).id);
        assert!(!table.insert(node_at(7)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_bucket_len() {
        let table = MemoryTable::with_nodes(
            NodeId::ZERO,
            [node_at(0x80), node_at(0xc0), node_at(0x40)],
        );

        assert_eq!(table.bucket_len(&node_at(0xff).id), 2);
        assert_eq!(table.bucket_len(&node_at(0x41).id), 1);
        assert_eq!(table.bucket_len(&node_at(0x01).id), 0);

        let table = table.with_bucket_len(9);
        assert_eq!(table.bucket_len(&node_at(0x01).id), 9);
    }

    #[test]
    fn test_closest_known_is_sorted_and_limited() {
        let table = MemoryTable::with_nodes(
            node_at(0xff).id,
            [node_at(5), node_at(2), node_at(8)],
        );

        let closest = table.closest_known(&NodeId::ZERO, 2);
        assert_eq!(closest, vec![node_at(2), node_at(5)]);
    }

    #[test]
    fn test_delete_records_once() {
        let table = MemoryTable::with_nodes(NodeId::ZERO, [node_at(3)]);

        table.delete(&node_at(3));
        table.delete(&node_at(3));

        assert_eq!(table.deleted(), vec![node_at(3)]);
    }
}
