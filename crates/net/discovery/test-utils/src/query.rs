//! Scripted FINDNODE transport.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, watch};
use vertex_net_discovery::{FindNode, Node, NodeId, QueryError};

/// FINDNODE transport answering from a fixed script.
///
/// Unscripted nodes answer with an empty list. With a gate installed, every
/// query blocks until [`release`](Self::release) lets it through.
#[derive(Debug)]
pub struct ScriptedQuery {
    answers: Mutex<HashMap<NodeId, Result<Vec<Node>, QueryError>>>,
    calls: Mutex<HashMap<NodeId, usize>>,
    gate: Option<Semaphore>,
    started: watch::Sender<usize>,
    completed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for ScriptedQuery {
    fn default() -> Self {
        Self {
            answers: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            gate: None,
            started: watch::channel(0).0,
            completed: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl ScriptedQuery {
    /// Create a transport where every node answers with an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport whose queries block until released.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// Make `node` answer with `neighbors`.
    pub fn answer(&self, node: &Node, neighbors: impl IntoIterator<Item = Node>) {
        self.answers
            .lock()
            .insert(node.id, Ok(neighbors.into_iter().collect()));
    }

    /// Make `node` fail with `err`.
    pub fn fail(&self, node: &Node, err: QueryError) {
        self.answers.lock().insert(node.id, Err(err));
    }

    /// Let `n` blocked queries through.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Let every current and future query through.
    pub fn release_all(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1 << 20);
        }
    }

    /// Number of times `node` was queried.
    pub fn calls(&self, node: &Node) -> usize {
        self.calls.lock().get(&node.id).copied().unwrap_or(0)
    }

    /// Total number of queries issued.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Number of queries that returned.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Highest number of queries observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` queries have started.
    pub async fn wait_started(&self, n: usize) {
        let mut rx = self.started.subscribe();
        // The sender lives as long as `self`.
        let _ = rx.wait_for(|started| *started >= n).await;
    }
}

#[async_trait]
impl FindNode for ScriptedQuery {
    async fn find_node(&self, node: &Node, _target: &NodeId) -> Result<Vec<Node>, QueryError> {
        *self.calls.lock().entry(node.id).or_default() += 1;
        self.started.send_modify(|started| *started += 1);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            match gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    return Err(QueryError::Closed);
                }
            }
        }
        // Give concurrent queries a chance to overlap.
        tokio::task::yield_now().await;

        let answer = self
            .answers
            .lock()
            .get(&node.id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        answer
    }
}
