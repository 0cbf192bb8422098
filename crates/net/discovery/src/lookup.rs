//! Iterative node lookup.
//!
//! A [`Lookup`] searches the network for the nodes closest to a target. It
//! approaches the target by querying nodes that are closer to it on each
//! iteration. The target does not need to be an actual node identifier.
//!
//! # Concurrency
//!
//! The lookup itself is a single control loop. Each FINDNODE query runs on its
//! own task and publishes its answer into a reply channel owned by the lookup;
//! the control loop is the only code that touches the search state (`asked`,
//! `seen`, the result set and the pending count). The channel holds at least
//! `alpha` replies, so a finished query never waits on the control loop.
//!
//! # Failure accounting
//!
//! Query tasks maintain the routing table's consecutive-failure counters:
//! an empty or failed answer increments the counter and may evict the node,
//! a useful answer resets it, and a [`QueryError::Closed`](crate::QueryError::Closed)
//! leaves it alone.

use std::{collections::HashSet, sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    FindNode, LookupConfig, Node, NodeId, NodesByDistance, RoutingTable,
    metrics::LookupMetrics,
    observer::{TopologyObservation, TopologySink},
};

/// Progress of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupState {
    /// The seed round has not been issued yet.
    NotStarted,
    /// Queries are being issued and answered.
    Probing,
    /// No more queries will be issued.
    Done,
}

/// A single bounded-concurrency search for the nodes closest to a target.
///
/// Drive it with [`advance`](Self::advance) to observe newly found nodes as
/// they arrive, or with [`run`](Self::run) to obtain only the final result.
pub struct Lookup<T, Q> {
    table: Arc<T>,
    query: Arc<Q>,
    config: LookupConfig,
    cancel: CancellationToken,
    observer: Option<TopologySink>,
    metrics: LookupMetrics,

    reply_tx: mpsc::Sender<Vec<Node>>,
    reply_rx: mpsc::Receiver<Vec<Node>>,

    state: LookupState,
    asked: HashSet<NodeId>,
    seen: HashSet<NodeId>,
    result: NodesByDistance,
    reply_buffer: Vec<Node>,
    /// Outstanding replies, the seed round included.
    pending: usize,
}

impl<T, Q> std::fmt::Debug for Lookup<T, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lookup")
            .field("target", self.result.target())
            .field("state", &self.state)
            .field("asked", &self.asked.len())
            .field("seen", &self.seen.len())
            .field("result", &self.result.len())
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl<T, Q> Lookup<T, Q>
where
    T: RoutingTable + 'static,
    Q: FindNode,
{
    /// Create a lookup for `target`.
    ///
    /// The lookup stops early when `cancel` fires. To tie it to the table's
    /// lifetime, pass a child of [`RoutingTable::shutdown_signal`].
    pub fn new(
        table: Arc<T>,
        query: Arc<Q>,
        target: NodeId,
        config: LookupConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (reply_tx, reply_rx) = mpsc::channel(config.reply_capacity());

        // Never query ourselves.
        let mut asked = HashSet::new();
        asked.insert(table.self_id());

        let metrics = LookupMetrics::default();
        metrics.inc_started();

        Self {
            table,
            query,
            config,
            cancel,
            observer: None,
            metrics,
            reply_tx,
            reply_rx,
            state: LookupState::NotStarted,
            asked,
            seen: HashSet::new(),
            result: NodesByDistance::new(target),
            reply_buffer: Vec::new(),
            pending: 0,
        }
    }

    /// Publish successful query answers to a topology observer.
    pub fn with_observer(mut self, sink: TopologySink) -> Self {
        self.observer = Some(sink);
        self
    }

    /// The identifier being searched for.
    pub fn target(&self) -> &NodeId {
        self.result.target()
    }

    /// Current best candidates, closest first.
    pub fn result(&self) -> &NodesByDistance {
        &self.result
    }

    /// Nodes first seen during the most recent successful [`advance`](Self::advance).
    pub fn reply_buffer(&self) -> &[Node] {
        &self.reply_buffer
    }

    /// Number of replies not yet consumed.
    pub fn pending_queries(&self) -> usize {
        self.pending
    }

    /// Whether the lookup has stopped issuing queries.
    pub fn is_done(&self) -> bool {
        self.state == LookupState::Done
    }

    /// Run the lookup to completion and return the closest nodes found.
    pub async fn run(mut self) -> Vec<Node> {
        while self.advance().await {}
        debug!(
            target_id = %self.result.target(),
            found = self.result.len(),
            asked = self.asked.len(),
            "lookup finished"
        );
        self.result.into_entries()
    }

    /// Advance the lookup until new nodes have been found.
    ///
    /// Returns `true` once a reply added at least one previously unseen node,
    /// available through [`reply_buffer`](Self::reply_buffer). Returns `false`
    /// when the lookup has ended: either no node is left to ask and no reply
    /// is outstanding, or the lookup was cancelled and its outstanding replies
    /// were drained.
    pub async fn advance(&mut self) -> bool {
        while self.start_queries().await {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    self.shutdown().await;
                }

                reply = self.reply_rx.recv() => {
                    let Some(nodes) = reply else {
                        unreachable!("lookup owns a reply sender");
                    };
                    if self.handle_reply(nodes) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Merge one reply into the search state.
    ///
    /// Returns `true` if the reply contained unseen nodes.
    fn handle_reply(&mut self, nodes: Vec<Node>) -> bool {
        self.reply_buffer.clear();
        for node in nodes {
            if self.seen.insert(node.id) {
                self.result.push(node, self.config.bucket_size);
                self.reply_buffer.push(node);
            }
        }

        let Some(pending) = self.pending.checked_sub(1) else {
            unreachable!("reply received without an outstanding query");
        };
        self.pending = pending;

        !self.reply_buffer.is_empty()
    }

    /// Discard every outstanding reply and stop issuing queries.
    async fn shutdown(&mut self) {
        debug!(
            target_id = %self.result.target(),
            pending = self.pending,
            "lookup cancelled, draining outstanding queries"
        );
        while self.pending > 0 {
            if self.reply_rx.recv().await.is_none() {
                break;
            }
            self.pending -= 1;
        }
        self.state = LookupState::Done;
        self.reply_buffer.clear();
    }

    /// Issue as many queries as the concurrency limit allows.
    ///
    /// Returns `false` once nothing is in flight and nothing is left to ask.
    async fn start_queries(&mut self) -> bool {
        match self.state {
            LookupState::Done => return false,
            LookupState::NotStarted => {
                self.seed().await;
                return true;
            }
            LookupState::Probing => {}
        }

        // A cancelled lookup only drains what is already in flight.
        if self.cancel.is_cancelled() {
            self.shutdown().await;
            return false;
        }

        let mut candidates = Vec::new();
        for node in self.result.iter() {
            if self.pending + candidates.len() >= self.config.alpha {
                break;
            }
            if self.asked.insert(node.id) {
                candidates.push(*node);
            }
        }

        for node in candidates {
            self.pending += 1;
            self.metrics.inc_queries();
            tokio::spawn(query_node(
                QueryContext {
                    table: self.table.clone(),
                    query: self.query.clone(),
                    target: *self.result.target(),
                    config: self.config.clone(),
                    observer: self.observer.clone(),
                    metrics: self.metrics.clone(),
                },
                node,
                self.reply_tx.clone(),
            ));
        }

        // The lookup ends when no more nodes can be asked.
        if self.pending == 0 {
            self.state = LookupState::Done;
            return false;
        }
        true
    }

    /// The first round answers from the local table instead of the network.
    async fn seed(&mut self) {
        let closest = self
            .table
            .closest_known(self.result.target(), self.config.bucket_size);

        // Avoid finishing too quickly if the table is empty. Waiting for the
        // table to fill would be better, but there is no signal for it.
        if closest.is_empty() {
            slowdown(
                self.config.seed_grace,
                self.table.shutdown_signal(),
                self.cancel.clone(),
            )
            .await;
        }

        trace!(
            target_id = %self.result.target(),
            seeds = closest.len(),
            "seeding lookup from local table"
        );

        self.state = LookupState::Probing;
        self.pending = 1;
        if self.reply_tx.send(closest).await.is_err() {
            unreachable!("lookup owns the reply receiver");
        }
    }
}

/// Wait out the seed grace interval, or less if shutting down.
async fn slowdown(grace: Duration, table_closed: CancellationToken, cancel: CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(grace) => {}
        _ = table_closed.cancelled() => {}
        _ = cancel.cancelled() => {}
    }
}

/// Everything a query task needs besides the node and the reply channel.
struct QueryContext<T, Q> {
    table: Arc<T>,
    query: Arc<Q>,
    target: NodeId,
    config: LookupConfig,
    observer: Option<TopologySink>,
    metrics: LookupMetrics,
}

/// Query `node`, update its failure record and publish the answer.
async fn query_node<T, Q>(ctx: QueryContext<T, Q>, node: Node, reply: mpsc::Sender<Vec<Node>>)
where
    T: RoutingTable,
    Q: FindNode,
{
    let fails = ctx.table.failure_count(&node.id, node.ip());
    let result = ctx.query.find_node(&node, &ctx.target).await;

    let nodes = match result {
        Err(err) if err.is_closed() => {
            // Shutdown is not the node's fault.
            trace!(%node, "FINDNODE aborted, transport closed");
            Vec::new()
        }
        Ok(nodes) if !nodes.is_empty() => {
            if fails > 0 {
                // The counter tracks consecutive failures only.
                ctx.table.set_failure_count(&node.id, node.ip(), 0);
            }

            // Keep as many nodes as possible. Dead ones are dropped again
            // when the table revalidates them.
            for n in &nodes {
                ctx.table.add_seen_node(n);
            }
            if let Some(observer) = &ctx.observer {
                observer.report(TopologyObservation::new(node, &nodes));
            }
            nodes
        }
        other => {
            let fails = fails.saturating_add(1);
            ctx.table.set_failure_count(&node.id, node.ip(), fails);
            ctx.metrics.inc_query_failures();

            // Only drop the node if enough others remain in its bucket.
            let dropped = fails >= ctx.config.max_findnode_failures
                && ctx.table.bucket_len(&node.id) >= ctx.config.eviction_min_bucket_len();
            if dropped {
                ctx.table.delete(&node);
                ctx.metrics.inc_evictions();
            }

            let err = other.err();
            trace!(%node, fails, dropped, err = ?err, "FINDNODE failed");
            Vec::new()
        }
    };

    // Fails only if the lookup was dropped, in which case nobody needs the reply.
    if reply.send(nodes).await.is_err() {
        trace!(%node, "lookup gone, discarding FINDNODE reply");
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        net::{IpAddr, Ipv4Addr, SocketAddr},
    };

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::QueryError;

    fn node(last: u8) -> Node {
        let mut bytes = [0u8; 32];
        bytes[31] = last;
        Node::new(
            NodeId::new(bytes),
            SocketAddr::from((Ipv4Addr::LOCALHOST, 30000 + last as u16)),
        )
    }

    #[derive(Default)]
    struct Table {
        seeds: Vec<Node>,
        failures: Mutex<HashMap<NodeId, u32>>,
        closed: CancellationToken,
    }

    impl RoutingTable for Table {
        fn self_id(&self) -> NodeId {
            node(0xff).id
        }

        fn closest_known(&self, _target: &NodeId, limit: usize) -> Vec<Node> {
            self.seeds.iter().take(limit).copied().collect()
        }

        fn failure_count(&self, id: &NodeId, _ip: IpAddr) -> u32 {
            self.failures.lock().get(id).copied().unwrap_or(0)
        }

        fn set_failure_count(&self, id: &NodeId, _ip: IpAddr, count: u32) {
            self.failures.lock().insert(*id, count);
        }

        fn bucket_len(&self, _id: &NodeId) -> usize {
            0
        }

        fn delete(&self, _node: &Node) {}

        fn add_seen_node(&self, _node: &Node) {}

        fn shutdown_signal(&self) -> CancellationToken {
            self.closed.clone()
        }
    }

    /// Every node reports the fixed neighbor list in `answers`, keyed by node.
    #[derive(Default)]
    struct Answers(HashMap<NodeId, Vec<Node>>);

    #[async_trait]
    impl FindNode for Answers {
        async fn find_node(&self, node: &Node, _target: &NodeId) -> Result<Vec<Node>, QueryError> {
            Ok(self.0.get(&node.id).cloned().unwrap_or_default())
        }
    }

    fn lookup(table: Table, answers: Answers, config: LookupConfig) -> Lookup<Table, Answers> {
        Lookup::new(
            Arc::new(table),
            Arc::new(answers),
            NodeId::ZERO,
            config,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_seed_round_reports_local_nodes() {
        let table = Table {
            seeds: vec![node(2), node(5)],
            ..Default::default()
        };
        let mut lookup = lookup(table, Answers::default(), LookupConfig::default());

        assert!(lookup.advance().await);
        assert_eq!(lookup.reply_buffer(), &[node(2), node(5)]);
        assert_eq!(lookup.pending_queries(), 0);
    }

    #[tokio::test]
    async fn test_failed_query_increments_counter() {
        let table = Table {
            seeds: vec![node(2)],
            ..Default::default()
        };
        let mut lookup = lookup(table, Answers::default(), LookupConfig::default());

        while lookup.advance().await {}

        assert!(lookup.is_done());
        let failures = lookup.table.failures.lock().get(&node(2).id).copied();
        assert_eq!(failures, Some(1));
    }

    #[tokio::test]
    async fn test_self_is_never_queried() {
        let table = Table {
            seeds: vec![node(0xff), node(3)],
            ..Default::default()
        };
        let mut answers = Answers::default();
        answers.0.insert(node(3).id, vec![node(0xff)]);
        let result = lookup(table, answers, LookupConfig::default()).run().await;

        // Self may be reported, but is never asked.
        assert_eq!(result, vec![node(3), node(0xff)]);
    }

    #[tokio::test]
    async fn test_zero_alpha_only_seeds() {
        let table = Table {
            seeds: vec![node(1), node(2)],
            ..Default::default()
        };
        let result = lookup(table, Answers::default(), LookupConfig::default().with_alpha(0))
            .run()
            .await;

        assert_eq!(result, vec![node(1), node(2)]);
    }
}
