//! FINDNODE transport contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Node, NodeId, QueryError};

/// Sends a FINDNODE request and returns the nodes the peer reported.
///
/// Each call runs on its own task. Its duration is bounded only by the
/// implementation's own timeouts; the lookup imposes none. Implementations
/// must return [`QueryError::Closed`] when failing because the local side is
/// shutting down, so that the failure is not charged to the remote node.
#[async_trait]
pub trait FindNode: Send + Sync + 'static {
    /// Ask `node` for the nodes it knows closest to `target`.
    async fn find_node(&self, node: &Node, target: &NodeId) -> Result<Vec<Node>, QueryError>;
}

#[async_trait]
impl<T: FindNode + ?Sized> FindNode for Arc<T> {
    async fn find_node(&self, node: &Node, target: &NodeId) -> Result<Vec<Node>, QueryError> {
        (**self).find_node(node, target).await
    }
}
