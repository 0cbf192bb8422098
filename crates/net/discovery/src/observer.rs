//! Best-effort topology mirroring.
//!
//! Every successful FINDNODE answer describes a set of edges in the overlay
//! graph: the queried node knows each of the returned neighbors. Lookups can
//! publish these edges to an external store through a [`TopologyObserver`].
//!
//! Observations travel over a bounded channel to a dedicated consumer task:
//! - query tasks call [`TopologySink::report`], which never waits;
//! - when the channel is full the observation is dropped;
//! - observer errors are logged by the consumer and go no further.
//!
//! A slow or failing store therefore cannot hold up a lookup.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{Node, ObserverError, log_distance, metrics::LookupMetrics};

/// Default capacity of the observation channel.
pub const DEFAULT_OBSERVER_CAPACITY: usize = 256;

/// A neighbor reported by a queried node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyEdge {
    /// The reported neighbor.
    pub node: Node,
    /// Logarithmic distance between the queried node and the neighbor,
    /// i.e. the bucket of the queried node's table the neighbor came from.
    pub distance: u16,
}

/// The outcome of one successful FINDNODE query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyObservation {
    /// The node that answered.
    pub queried: Node,
    /// Nodes it reported.
    pub neighbors: Vec<TopologyEdge>,
}

impl TopologyObservation {
    /// Build an observation from a FINDNODE answer.
    pub fn new(queried: Node, neighbors: &[Node]) -> Self {
        let neighbors = neighbors
            .iter()
            .map(|n| TopologyEdge {
                node: *n,
                distance: log_distance(&queried.id, &n.id),
            })
            .collect();
        Self { queried, neighbors }
    }
}

/// Receives topology observations, typically to persist them.
#[async_trait]
pub trait TopologyObserver: Send + Sync + 'static {
    /// Record one observation.
    async fn observe(&self, observation: TopologyObservation) -> Result<(), ObserverError>;
}

/// Non-blocking handle used by lookups to publish observations.
#[derive(Debug, Clone)]
pub struct TopologySink {
    tx: mpsc::Sender<TopologyObservation>,
    metrics: LookupMetrics,
}

impl TopologySink {
    /// Publish an observation, dropping it if the observer is lagging.
    pub fn report(&self, observation: TopologyObservation) {
        match self.tx.try_send(observation) {
            Ok(()) => {}
            Err(TrySendError::Full(obs)) => {
                self.metrics.inc_observer_dropped();
                trace!(queried = %obs.queried, "topology observer lagging, dropping observation");
            }
            Err(TrySendError::Closed(_)) => {
                trace!("topology observer stopped");
            }
        }
    }
}

/// Spawn the consumer task for `observer`.
///
/// Returns the sink to hand to lookups and the task handle. The task exits
/// when `cancel` fires or every sink has been dropped.
pub fn spawn_topology_observer<O: TopologyObserver>(
    observer: Arc<O>,
    capacity: usize,
    cancel: CancellationToken,
) -> (TopologySink, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(run_topology_observer(observer, rx, cancel));
    let sink = TopologySink {
        tx,
        metrics: LookupMetrics::default(),
    };
    (sink, handle)
}

async fn run_topology_observer<O: TopologyObserver>(
    observer: Arc<O>,
    mut rx: mpsc::Receiver<TopologyObservation>,
    cancel: CancellationToken,
) {
    debug!("topology observer task started");
    let mut recorded = 0u64;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(recorded, "topology observer received shutdown signal");
                break;
            }

            observation = rx.recv() => {
                let Some(observation) = observation else {
                    debug!(recorded, "topology observation channel closed");
                    break;
                };

                let queried = observation.queried;
                let edges = observation.neighbors.len();
                match observer.observe(observation).await {
                    Ok(()) => {
                        recorded += 1;
                        trace!(%queried, edges, "recorded topology observation");
                    }
                    Err(e) => {
                        warn!(%queried, error = %e, "failed to record topology observation");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};

    use tokio::sync::Mutex;

    use super::*;
    use crate::NodeId;

    /// Records observations, optionally failing every other call.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<TopologyObservation>>,
        fail_odd: bool,
    }

    #[async_trait]
    impl TopologyObserver for Recorder {
        async fn observe(&self, observation: TopologyObservation) -> Result<(), ObserverError> {
            let mut seen = self.seen.lock().await;
            seen.push(observation);
            if self.fail_odd && seen.len() % 2 == 1 {
                return Err(ObserverError::Backend("unavailable".into()));
            }
            Ok(())
        }
    }

    fn node(first: u8) -> Node {
        let mut bytes = [0u8; 32];
        bytes[0] = first;
        Node::new(
            NodeId::new(bytes),
            SocketAddr::from((Ipv4Addr::LOCALHOST, 30303)),
        )
    }

    #[test]
    fn test_observation_distances() {
        let queried = node(0x00);
        let obs = TopologyObservation::new(queried, &[node(0x80), node(0x01)]);

        assert_eq!(obs.neighbors.len(), 2);
        assert_eq!(obs.neighbors[0].distance, 256);
        assert_eq!(obs.neighbors[1].distance, 249);
    }

    #[tokio::test]
    async fn test_observer_errors_do_not_stop_consumer() {
        let recorder = Arc::new(Recorder {
            fail_odd: true,
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let (sink, handle) = spawn_topology_observer(recorder.clone(), 8, cancel);

        for b in 1..=4 {
            sink.report(TopologyObservation::new(node(0), &[node(b)]));
        }
        drop(sink);
        handle.await.unwrap();

        assert_eq!(recorder.seen.lock().await.len(), 4);
    }

    #[tokio::test]
    async fn test_full_channel_drops_observations() {
        let recorder = Arc::new(Recorder::default());
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1);
        let sink = TopologySink {
            tx,
            metrics: LookupMetrics::default(),
        };

        // No consumer yet: the second report finds the channel full.
        sink.report(TopologyObservation::new(node(0), &[node(1)]));
        sink.report(TopologyObservation::new(node(0), &[node(2)]));
        drop(sink);

        run_topology_observer(recorder.clone(), rx, cancel).await;

        let seen = recorder.seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].neighbors[0].node, node(1));
    }

    #[tokio::test]
    async fn test_cancel_stops_consumer() {
        let recorder = Arc::new(Recorder::default());
        let cancel = CancellationToken::new();
        let (_sink, handle) = spawn_topology_observer(recorder, 8, cancel.clone());

        cancel.cancel();
        handle.await.unwrap();
    }
}
