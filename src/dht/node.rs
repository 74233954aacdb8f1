use rand::Rng as _;
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use crate::constants::MAX_NODE_FAILURES;

/// A 160-bit DHT node identifier.
///
/// Ordering is numeric on the big-endian 20-byte form, which the derived
/// lexicographic ordering gives for free. The same representation doubles
/// as a point in the id space for bucket range bounds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub [u8; 20]);

/// An XOR distance between two ids, ordered like the ids themselves.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Distance(pub [u8; 20]);

impl NodeId {
    pub const MIN: NodeId = NodeId([0x00; 20]);
    pub const MAX: NodeId = NodeId([0xFF; 20]);

    pub fn generate() -> Self {
        let mut id = [0u8; 20];
        rand::rng().fill(&mut id);
        Self(id)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 20 {
            return None;
        }
        let mut id = [0u8; 20];
        id.copy_from_slice(bytes);
        Some(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// XOR distance to another id. Symmetric, zero iff equal, and obeys
    /// the triangle inequality.
    pub fn distance(&self, other: &NodeId) -> Distance {
        let mut dist = [0u8; 20];
        for (i, d) in dist.iter_mut().enumerate() {
            *d = self.0[i] ^ other.0[i];
        }
        Distance(dist)
    }

    /// The i-th bit, counting from the most significant bit of byte 0.
    pub fn bit(&self, i: usize) -> bool {
        debug_assert!(i < 160);
        (self.0[i / 8] >> (7 - i % 8)) & 1 == 1
    }

    /// `self - other` over the id space. Callers guarantee `self >= other`.
    pub(crate) fn offset_from(&self, other: &NodeId) -> NodeId {
        let mut out = [0u8; 20];
        let mut borrow = 0u16;
        for i in (0..20).rev() {
            let a = self.0[i] as u16;
            let b = other.0[i] as u16 + borrow;
            if a >= b {
                out[i] = (a - b) as u8;
                borrow = 0;
            } else {
                out[i] = (a + 256 - b) as u8;
                borrow = 1;
            }
        }
        NodeId(out)
    }

    /// `self + other`, wrapping. Bucket math never actually wraps.
    pub(crate) fn offset_by(&self, other: &NodeId) -> NodeId {
        let mut out = [0u8; 20];
        let mut carry = 0u16;
        for i in (0..20).rev() {
            let sum = self.0[i] as u16 + other.0[i] as u16 + carry;
            out[i] = sum as u8;
            carry = sum >> 8;
        }
        NodeId(out)
    }

    /// `self / 2`.
    pub(crate) fn half(&self) -> NodeId {
        let mut out = [0u8; 20];
        let mut carry = 0u8;
        for i in 0..20 {
            out[i] = (self.0[i] >> 1) | (carry << 7);
            carry = self.0[i] & 1;
        }
        NodeId(out)
    }

    /// `self + 1`, wrapping.
    pub(crate) fn next(&self) -> NodeId {
        let mut out = self.0;
        for byte in out.iter_mut().rev() {
            let (v, overflow) = byte.overflowing_add(1);
            *byte = v;
            if !overflow {
                break;
            }
        }
        NodeId(out)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// A known DHT node.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub addr: SocketAddr,
    pub last_seen: Instant,
    pub failures: u8,
}

impl Node {
    pub fn new(id: NodeId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            failures: 0,
        }
    }

    /// Records a response: resets the failure count and the LRU clock.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
        self.failures = 0;
    }

    pub fn fail(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    pub fn is_bad(&self) -> bool {
        self.failures >= MAX_NODE_FAILURES
    }
}
