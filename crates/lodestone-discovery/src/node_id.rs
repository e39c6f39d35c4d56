//! Node identity and XOR distance metric.
//!
//! A node is identified by the BLAKE3 hash of its Ed25519 identity key.
//! The XOR metric provides the symmetric, unidirectional distance
//! required by Kademlia routing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 256-bit node identifier.
///
/// Equality and hashing are byte-exact, so `NodeId` can key concurrent
/// maps directly.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId([u8; 32]);

impl NodeId {
    /// Number of bits in a NodeId
    pub const BITS: usize = 256;

    /// Create from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, if it is exactly 32 bytes.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Some(Self(bytes))
    }

    /// Derive a node id from an Ed25519 identity key.
    #[must_use]
    pub fn from_identity_key(pubkey: &[u8; 32]) -> Self {
        Self(*blake3::hash(pubkey).as_bytes())
    }

    /// Generate a random NodeId (testing and lookup targets).
    #[must_use]
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// XOR distance to another id.
    #[must_use]
    pub fn distance(&self, other: &NodeId) -> Distance {
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        Distance(bytes)
    }

    /// Index of the bucket another id falls into, relative to this id.
    ///
    /// This is the position of the highest set bit of the XOR distance
    /// (0..=255). Returns `None` for the id itself, which never belongs
    /// to any bucket.
    #[must_use]
    pub fn bucket_index(&self, other: &NodeId) -> Option<usize> {
        let distance = self.distance(other);
        for (i, byte) in distance.0.iter().enumerate() {
            if *byte != 0 {
                return Some(255 - (i * 8 + byte.leading_zeros() as usize));
            }
        }
        None
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full ids are noisy in logs; eight hex chars identify a peer.
        write!(f, "NodeId({}..)", hex::encode(&self.0[..4]))
    }
}

/// XOR distance between two node ids.
///
/// Ordering is big-endian lexicographic, which matches numeric ordering
/// of the 256-bit value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Distance([u8; 32]);

impl Distance {
    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The zero distance (id to itself).
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({}..)", hex::encode(&self.0[..4]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_self_is_zero() {
        let id = NodeId::random();
        assert_eq!(id.distance(&id), Distance::zero());
    }

    #[test]
    fn test_distance_symmetric() {
        let a = NodeId::random();
        let b = NodeId::random();
        assert_eq!(a.distance(&b), b.distance(&a));
    }

    #[test]
    fn test_bucket_index_none_for_self() {
        let id = NodeId::random();
        assert_eq!(id.bucket_index(&id), None);
    }

    #[test]
    fn test_bucket_index_highest_bit() {
        let zero = NodeId::from_bytes([0u8; 32]);

        let mut one = [0u8; 32];
        one[31] = 0x01;
        assert_eq!(zero.bucket_index(&NodeId::from_bytes(one)), Some(0));

        let mut top = [0u8; 32];
        top[0] = 0x80;
        assert_eq!(zero.bucket_index(&NodeId::from_bytes(top)), Some(255));

        let mut mid = [0u8; 32];
        mid[30] = 0x01;
        assert_eq!(zero.bucket_index(&NodeId::from_bytes(mid)), Some(8));
    }

    #[test]
    fn test_distance_ordering_matches_numeric() {
        let zero = NodeId::from_bytes([0u8; 32]);

        let mut small = [0u8; 32];
        small[31] = 0x02;
        let mut large = [0u8; 32];
        large[30] = 0x01;

        assert!(
            zero.distance(&NodeId::from_bytes(small)) < zero.distance(&NodeId::from_bytes(large))
        );
    }

    #[test]
    fn test_from_identity_key_deterministic() {
        let key = [9u8; 32];
        assert_eq!(NodeId::from_identity_key(&key), NodeId::from_identity_key(&key));
        assert_ne!(
            NodeId::from_identity_key(&key),
            NodeId::from_identity_key(&[8u8; 32])
        );
    }

    #[test]
    fn test_from_slice() {
        assert!(NodeId::from_slice(&[0u8; 31]).is_none());
        assert!(NodeId::from_slice(&[0u8; 32]).is_some());
    }
}
