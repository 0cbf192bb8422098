//! Simulated overlay networks.

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use vertex_net_discovery::{Node, NodeId, NodesByDistance};

use crate::{MemoryTable, ScriptedQuery};

/// A fully converged network: every node answers FINDNODE with the nodes
/// closest to itself.
#[derive(Debug)]
pub struct SimNetwork {
    /// The local node.
    pub local: Node,
    /// Every remote node, in creation order.
    pub nodes: Vec<Node>,
    /// Local routing table, seeded with a few remote nodes.
    pub table: Arc<MemoryTable>,
    /// Transport answering for every remote node.
    pub query: Arc<ScriptedQuery>,
}

impl SimNetwork {
    /// Build a network of `size` random nodes from `seed`.
    ///
    /// Each node knows its `neighbors` closest peers. The local table starts
    /// with the first `known` nodes.
    pub fn random(seed: u64, size: usize, neighbors: usize, known: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let local = random_node(&mut rng);
        let nodes: Vec<Node> = (0..size).map(|_| random_node(&mut rng)).collect();

        let query = ScriptedQuery::new();
        for node in &nodes {
            let mut closest = NodesByDistance::new(node.id);
            for peer in nodes.iter().filter(|p| p.id != node.id) {
                closest.push(*peer, neighbors);
            }
            query.answer(node, closest.into_entries());
        }

        let table = MemoryTable::with_nodes(local.id, nodes.iter().take(known).copied());

        Self {
            local,
            nodes,
            table: Arc::new(table),
            query: Arc::new(query),
        }
    }
}

/// A node with a random identifier.
pub fn random_node<R: Rng>(rng: &mut R) -> Node {
    let id = NodeId::new(rng.random());
    let port = rng.random_range(1024..=u16::MAX);
    Node::new(id, SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
}
