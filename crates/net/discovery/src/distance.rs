//! Distance-ordered, bounded result set.

use crate::{Node, NodeId, distance_cmp};

/// Nodes ordered by ascending XOR distance to a target.
///
/// The set is bounded by the capacity passed to [`push`](Self::push); the
/// farthest entries are dropped when it overflows. XOR is a bijection for a
/// fixed target, so two distinct identifiers never tie and the order is fully
/// determined by the contents, not by insertion order.
#[derive(Debug, Clone)]
pub struct NodesByDistance {
    target: NodeId,
    entries: Vec<Node>,
}

impl NodesByDistance {
    /// Create an empty set ordered around `target`.
    pub fn new(target: NodeId) -> Self {
        Self {
            target,
            entries: Vec::new(),
        }
    }

    /// The identifier distances are measured from.
    pub fn target(&self) -> &NodeId {
        &self.target
    }

    /// Insert `node`, keeping at most `capacity` entries.
    ///
    /// Returns `true` if the node is part of the set afterwards because of this
    /// call. Pushing a node that is already present, or one that is farther
    /// than every entry of a full set, is a no-op.
    pub fn push(&mut self, node: Node, capacity: usize) -> bool {
        let target = self.target;
        let ix = self
            .entries
            .partition_point(|e| distance_cmp(&target, &e.id, &node.id).is_lt());

        if self.entries.get(ix).is_some_and(|e| e.id == node.id) {
            return false;
        }
        if ix >= capacity {
            return false;
        }

        self.entries.insert(ix, node);
        self.entries.truncate(capacity);
        true
    }

    /// Entries, closest first.
    pub fn entries(&self) -> &[Node] {
        &self.entries
    }

    /// Iterate over entries, closest first.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.entries.iter()
    }

    /// Whether a node with the given identifier is in the set.
    pub fn contains(&self, id: &NodeId) -> bool {
        let target = self.target;
        self.entries
            .binary_search_by(|e| distance_cmp(&target, &e.id, id))
            .is_ok()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the set, returning its entries closest first.
    pub fn into_entries(self) -> Vec<Node> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};

    use proptest::prelude::*;

    use super::*;

    fn node(last: u8) -> Node {
        let mut bytes = [0u8; 32];
        bytes[31] = last;
        Node::new(
            NodeId::new(bytes),
            SocketAddr::from((Ipv4Addr::LOCALHOST, 30303 + last as u16)),
        )
    }

    fn ids(set: &NodesByDistance) -> Vec<u8> {
        set.iter().map(|n| n.id.as_bytes()[31]).collect()
    }

    #[test]
    fn test_push_orders_by_distance() {
        let mut set = NodesByDistance::new(NodeId::ZERO);

        assert!(set.push(node(5), 16));
        assert!(set.push(node(2), 16));
        assert!(set.push(node(8), 16));

        assert_eq!(ids(&set), vec![2, 5, 8]);
    }

    #[test]
    fn test_push_truncates_farthest() {
        let mut set = NodesByDistance::new(NodeId::ZERO);

        set.push(node(5), 2);
        set.push(node(2), 2);
        // Farther than everything in a full set.
        assert!(!set.push(node(8), 2));
        assert_eq!(ids(&set), vec![2, 5]);

        // Closer than everything: evicts the farthest entry.
        assert!(set.push(node(1), 2));
        assert_eq!(ids(&set), vec![1, 2]);
    }

    #[test]
    fn test_push_duplicate_is_noop() {
        let mut set = NodesByDistance::new(NodeId::ZERO);

        assert!(set.push(node(3), 4));
        assert!(!set.push(node(3), 4));
        assert_eq!(set.len(), 1);
        assert!(set.contains(&node(3).id));
        assert!(!set.contains(&node(4).id));
    }

    #[test]
    fn test_zero_capacity_stays_empty() {
        let mut set = NodesByDistance::new(NodeId::ZERO);
        assert!(!set.push(node(1), 0));
        assert!(set.is_empty());
    }

    fn arb_ids() -> impl Strategy<Value = Vec<[u8; 32]>> {
        prop::collection::vec(any::<[u8; 32]>(), 0..64)
    }

    proptest! {
        #[test]
        fn prop_sorted_unique_and_bounded(
            target in any::<[u8; 32]>(),
            raw in arb_ids(),
            capacity in 0usize..20,
        ) {
            let target = NodeId::new(target);
            let mut set = NodesByDistance::new(target);
            let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 30303));

            for bytes in &raw {
                set.push(Node::new(NodeId::new(*bytes), addr), capacity);
                prop_assert!(set.len() <= capacity);
            }

            for pair in set.entries().windows(2) {
                if let [a, b] = pair {
                    prop_assert!(distance_cmp(&target, &a.id, &b.id).is_lt());
                }
            }
        }

        #[test]
        fn prop_order_independent(
            target in any::<[u8; 32]>(),
            raw in arb_ids(),
            capacity in 1usize..20,
        ) {
            let target = NodeId::new(target);
            let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 30303));

            let mut forward = NodesByDistance::new(target);
            for bytes in &raw {
                forward.push(Node::new(NodeId::new(*bytes), addr), capacity);
            }

            let mut reverse = NodesByDistance::new(target);
            for bytes in raw.iter().rev() {
                reverse.push(Node::new(NodeId::new(*bytes), addr), capacity);
            }

            prop_assert_eq!(forward.entries(), reverse.entries());
        }
    }
}
