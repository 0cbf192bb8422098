//! Lookup configuration.
//!
//! # Parameters
//!
//! - **Alpha** (`alpha`, default 3): maximum number of FINDNODE queries a
//!   single lookup keeps in flight.
//!
//! - **Bucket size** (`bucket_size`, default 16): capacity of the result set
//!   and of a routing-table bucket. Also the number of locally known nodes a
//!   lookup is seeded with.
//!
//! - **Failure threshold** (`max_findnode_failures`, default 5): consecutive
//!   unhelpful FINDNODE answers after which a node is dropped from the
//!   routing table, provided its bucket holds at least `bucket_size / 2`
//!   entries.
//!
//! - **Seed grace** (`seed_grace`, default 1s): how long a lookup waits when
//!   the routing table has nothing to seed it with, so that a table still
//!   filling up is not mistaken for an empty network.

use std::time::Duration;

/// Default number of concurrent queries per lookup.
pub const DEFAULT_ALPHA: usize = 3;

/// Default result set and bucket capacity.
pub const DEFAULT_BUCKET_SIZE: usize = 16;

/// Default consecutive failure count that makes a node eligible for eviction.
pub const DEFAULT_MAX_FINDNODE_FAILURES: u32 = 5;

/// Default wait before an empty seed round is accepted.
pub const DEFAULT_SEED_GRACE: Duration = Duration::from_secs(1);

/// Configuration for a single [`Lookup`](crate::Lookup).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LookupConfig {
    /// Maximum number of outstanding queries.
    pub alpha: usize,

    /// Maximum number of nodes retained in the result set.
    pub bucket_size: usize,

    /// Consecutive failures before a node may be evicted from the table.
    pub max_findnode_failures: u32,

    /// Wait applied when the seed round finds no local nodes.
    pub seed_grace: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            bucket_size: DEFAULT_BUCKET_SIZE,
            max_findnode_failures: DEFAULT_MAX_FINDNODE_FAILURES,
            seed_grace: DEFAULT_SEED_GRACE,
        }
    }
}

impl LookupConfig {
    /// Set the query concurrency.
    pub fn with_alpha(mut self, alpha: usize) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set the result set capacity.
    pub fn with_bucket_size(mut self, bucket_size: usize) -> Self {
        self.bucket_size = bucket_size;
        self
    }

    /// Set the eviction failure threshold.
    pub fn with_max_findnode_failures(mut self, count: u32) -> Self {
        self.max_findnode_failures = count;
        self
    }

    /// Set the empty-seed grace interval.
    pub fn with_seed_grace(mut self, grace: Duration) -> Self {
        self.seed_grace = grace;
        self
    }

    /// Capacity of the reply channel.
    ///
    /// At least `alpha`, so a finished query never waits to hand off its reply.
    pub(crate) fn reply_capacity(&self) -> usize {
        self.alpha.max(1)
    }

    /// Bucket population at or above which a failing node may be evicted.
    pub fn eviction_min_bucket_len(&self) -> usize {
        self.bucket_size / 2
    }
}
