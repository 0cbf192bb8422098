//! Node identifiers and the XOR metric.
//!
//! Distances are computed over the 256-bit identifier space. Two flavours are
//! used throughout the crate:
//!
//! - the full XOR distance, compared as a big-endian integer, which orders
//!   lookup candidates ([`distance_cmp`]);
//! - the logarithmic distance, the bit length of the XOR distance, which maps a
//!   node to its routing-table bucket ([`log_distance`]).

use core::{cmp::Ordering, fmt};

use alloy_primitives::B256;

/// Number of bits in a [`NodeId`].
pub const ID_BITS: u16 = 256;

/// A 256-bit node identifier.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(B256);

impl NodeId {
    /// The all-zero identifier.
    pub const ZERO: Self = Self(B256::ZERO);

    /// Create an identifier from raw bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(B256::new(bytes))
    }

    /// Raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0.0
    }

    /// Underlying fixed-size hash.
    pub const fn as_b256(&self) -> &B256 {
        &self.0
    }
}

impl From<[u8; 32]> for NodeId {
    fn from(bytes: [u8; 32]) -> Self {
        Self::new(bytes)
    }
}

impl From<B256> for NodeId {
    fn from(hash: B256) -> Self {
        Self(hash)
    }
}

impl From<NodeId> for B256 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// XOR distance between two identifiers.
pub fn xor_distance(a: &NodeId, b: &NodeId) -> B256 {
    let mut out = [0u8; 32];
    for ((o, x), y) in out.iter_mut().zip(a.as_bytes()).zip(b.as_bytes()) {
        *o = x ^ y;
    }
    B256::new(out)
}

/// Compare the distances of `a` and `b` to `target`.
///
/// Returns [`Ordering::Less`] if `a` is closer to `target` than `b`.
pub fn distance_cmp(target: &NodeId, a: &NodeId, b: &NodeId) -> Ordering {
    // Byte-wise order of fixed-size hashes is big-endian integer order.
    xor_distance(target, a).cmp(&xor_distance(target, b))
}

/// Logarithmic distance between two identifiers.
///
/// This is the bit length of `a ^ b`: `0` for equal identifiers and at most
/// [`ID_BITS`]. Nodes sharing a logarithmic distance to the local node live in
/// the same routing-table bucket.
pub fn log_distance(a: &NodeId, b: &NodeId) -> u16 {
    let mut leading_zeros = 0u16;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        let byte = x ^ y;
        if byte == 0 {
            leading_zeros += 8;
        } else {
            leading_zeros += byte.leading_zeros() as u16;
            break;
        }
    }
    ID_BITS - leading_zeros
}
