//! Iterative Kademlia node discovery.
//!
//! This crate implements the lookup at the heart of node discovery: given a
//! target identifier, find the live nodes closest to it by repeatedly querying
//! the closest nodes seen so far.
//!
//! # Architecture
//!
//! - [`NodesByDistance`]: bounded result set ordered by XOR distance.
//! - [`RoutingTable`]: contract for the local routing table (seed nodes,
//!   failure counters, eviction). Implemented elsewhere.
//! - [`FindNode`]: contract for the FINDNODE transport. Implemented elsewhere.
//! - [`Lookup`]: one search, at most `alpha` queries in flight.
//! - [`LookupIterator`]: an endless stream of nodes from back-to-back lookups.
//! - [`TopologyObserver`]: optional, best-effort sink for the edges learned
//!   from each FINDNODE answer.
//!
//! # Usage
//!
//! ```ignore
//! use vertex_net_discovery::{Lookup, LookupConfig};
//!
//! let cancel = table.shutdown_signal().child_token();
//! let lookup = Lookup::new(table, transport, target, LookupConfig::default(), cancel);
//!
//! // Closest nodes found, closest first.
//! let closest = lookup.run().await;
//! ```

mod config;
mod distance;
mod error;
mod id;
mod iterator;
mod lookup;
mod metrics;
mod node;
mod observer;
mod query;
mod table;

pub use config::{
    DEFAULT_ALPHA, DEFAULT_BUCKET_SIZE, DEFAULT_MAX_FINDNODE_FAILURES, DEFAULT_SEED_GRACE,
    LookupConfig,
};
pub use distance::NodesByDistance;
pub use error::{ObserverError, QueryError};
pub use id::{ID_BITS, NodeId, distance_cmp, log_distance, xor_distance};
pub use iterator::{LookupIterator, NextLookup};
pub use lookup::Lookup;
pub use node::Node;
pub use observer::{
    DEFAULT_OBSERVER_CAPACITY, TopologyEdge, TopologyObservation, TopologyObserver, TopologySink,
    spawn_topology_observer,
};
pub use query::FindNode;
pub use table::RoutingTable;

pub use tokio_util::sync::CancellationToken;
