use thiserror::Error;

/// Failure of a single FINDNODE query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The transport is shutting down. Not evidence of a faulty node.
    #[error("transport closed")]
    Closed,
    /// No response within the transport's deadline.
    #[error("request timed out")]
    Timeout,
    /// The node could not be reached.
    #[error("node unreachable: {0}")]
    Unreachable(String),
    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl QueryError {
    /// Whether the query failed because the local side is shutting down.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Failure reported by a [`TopologyObserver`](crate::TopologyObserver).
///
/// These are logged by the observer task and never reach the lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObserverError {
    /// The backing store could not be reached or failed.
    #[error("observer backend error: {0}")]
    Backend(String),
    /// The backend refused the observation.
    #[error("observation rejected: {0}")]
    Rejected(String),
}
