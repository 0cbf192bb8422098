//! Continuous discovery over successive lookups.

use std::collections::VecDeque;

use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{FindNode, Lookup, Node, RoutingTable};

/// Creates the next lookup for a [`LookupIterator`].
///
/// Receives the iterator's cancellation token; the returned lookup should
/// observe it (or a child of it) so that [`LookupIterator::close`] stops it.
pub type NextLookup<T, Q> = Box<dyn FnMut(CancellationToken) -> Lookup<T, Q> + Send>;

/// Runs lookups back to back and yields every node they find.
///
/// Nodes are unique within one lookup but may repeat across lookups. When a
/// lookup finishes, a new one is created through the `next_lookup` factory.
pub struct LookupIterator<T, Q> {
    buffer: VecDeque<Node>,
    next_lookup: NextLookup<T, Q>,
    cancel: CancellationToken,
    lookup: Option<Lookup<T, Q>>,
}

impl<T, Q> std::fmt::Debug for LookupIterator<T, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupIterator")
            .field("buffered", &self.buffer.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("lookup", &self.lookup)
            .finish_non_exhaustive()
    }
}

impl<T, Q> LookupIterator<T, Q>
where
    T: RoutingTable + 'static,
    Q: FindNode,
{
    /// Create an iterator that stops when `parent` is cancelled or when
    /// [`close`](Self::close) is called.
    pub fn new<F>(parent: &CancellationToken, next_lookup: F) -> Self
    where
        F: FnMut(CancellationToken) -> Lookup<T, Q> + Send + 'static,
    {
        Self {
            buffer: VecDeque::new(),
            next_lookup: Box::new(next_lookup),
            cancel: parent.child_token(),
            lookup: None,
        }
    }

    /// The current node, if any.
    pub fn node(&self) -> Option<&Node> {
        self.buffer.front()
    }

    /// Move to the next node.
    ///
    /// Returns `false` only once the iterator has been closed or its parent
    /// cancelled.
    pub async fn next(&mut self) -> bool {
        // Consume the current node.
        self.buffer.pop_front();

        // Advance lookups until the buffer refills.
        while self.buffer.is_empty() {
            if self.cancel.is_cancelled() {
                self.lookup = None;
                self.buffer.clear();
                return false;
            }

            let Some(lookup) = self.lookup.as_mut() else {
                self.lookup = Some((self.next_lookup)(self.cancel.clone()));
                continue;
            };

            if !lookup.advance().await {
                trace!(target_id = %lookup.target(), "lookup exhausted, starting next");
                self.lookup = None;
                continue;
            }
            self.buffer.extend(lookup.reply_buffer().iter().copied());
        }
        true
    }

    /// Stop the iterator.
    ///
    /// A lookup in progress drains its outstanding queries on its next
    /// cancellation check.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Token cancelled by [`close`](Self::close).
    ///
    /// Lets another task close the iterator while it is being advanced.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Turn the iterator into a stream of discovered nodes.
    pub fn into_stream(self) -> impl Stream<Item = Node> + Send {
        futures::stream::unfold(self, |mut it| async move {
            if !it.next().await {
                return None;
            }
            let node = it.node().copied()?;
            Some((node, it))
        })
    }
}
