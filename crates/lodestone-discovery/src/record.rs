//! Signed, versioned peer records.
//!
//! A record is a sorted key-value document describing a peer's identity
//! and reachability, carrying a sequence number and a detached Ed25519
//! signature over the encoded content. Records are immutable once built;
//! a newer sequence number replaces an older record for the same
//! identity. Consumers only ever go through [`PeerRecord::verify`],
//! [`PeerRecord::node_id`], [`PeerRecord::get`] and [`PeerRecord::seq`].

use crate::node_id::NodeId;
use lodestone_crypto::ecdh;
use lodestone_crypto::sig::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use thiserror::Error;

/// Entry key for the Ed25519 identity key (also defines the node id).
pub const ENTRY_ID_KEY: &str = "ed25519";

/// Entry key for the static X25519 key used in handshakes.
pub const ENTRY_DH_KEY: &str = "x25519";

/// Entry key for the advertised IP address (4 or 16 bytes).
pub const ENTRY_IP: &str = "ip";

/// Entry key for the advertised UDP port (2 bytes, big-endian).
pub const ENTRY_UDP: &str = "udp";

/// Record construction and decoding errors
#[derive(Debug, Error)]
pub enum RecordError {
    /// Serialization failed; signature validity is reported through
    /// [`PeerRecord::verify`], never as an error.
    #[error("record encoding failed: {0}")]
    Encoding(String),
}

/// A signed peer record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    seq: u64,
    entries: BTreeMap<String, Vec<u8>>,
    signature: Vec<u8>,
}

impl PeerRecord {
    fn signed_content(seq: u64, entries: &BTreeMap<String, Vec<u8>>) -> Option<Vec<u8>> {
        bincode::serialize(&(seq, entries)).ok()
    }

    /// Sequence number; newer wins for the same identity.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Look up an entry value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// The node id this record describes (BLAKE3 of the identity key).
    ///
    /// `None` if the record carries no identity key; such records never
    /// pass [`Self::verify`] and are dropped before insertion.
    #[must_use]
    pub fn node_id(&self) -> Option<NodeId> {
        let key = self.get(ENTRY_ID_KEY)?;
        let key: &[u8; 32] = key.try_into().ok()?;
        Some(NodeId::from_identity_key(key))
    }

    /// The peer's identity verification key.
    #[must_use]
    pub fn identity_key(&self) -> Option<VerifyingKey> {
        let bytes: &[u8; 32] = self.get(ENTRY_ID_KEY)?.try_into().ok()?;
        VerifyingKey::from_bytes(bytes).ok()
    }

    /// The peer's static X25519 key for handshake key agreement.
    #[must_use]
    pub fn dh_public_key(&self) -> Option<ecdh::PublicKey> {
        let bytes: &[u8; 32] = self.get(ENTRY_DH_KEY)?.try_into().ok()?;
        Some(ecdh::PublicKey::from_bytes(*bytes))
    }

    /// The peer's advertised UDP endpoint, if the record carries one.
    #[must_use]
    pub fn udp_endpoint(&self) -> Option<SocketAddr> {
        let ip = match self.get(ENTRY_IP)? {
            v4 if v4.len() == 4 => {
                let octets: [u8; 4] = v4.try_into().ok()?;
                IpAddr::V4(Ipv4Addr::from(octets))
            }
            v6 if v6.len() == 16 => {
                let octets: [u8; 16] = v6.try_into().ok()?;
                IpAddr::V6(Ipv6Addr::from(octets))
            }
            _ => return None,
        };
        let port: &[u8; 2] = self.get(ENTRY_UDP)?.try_into().ok()?;
        Some(SocketAddr::new(ip, u16::from_be_bytes(*port)))
    }

    /// Check the record's signature against its own identity key.
    ///
    /// Records that fail this check are dropped silently by the routing
    /// table - never an error surfaced to callers.
    #[must_use]
    pub fn verify(&self) -> bool {
        let Some(key) = self.identity_key() else {
            return false;
        };
        let Some(content) = Self::signed_content(self.seq, &self.entries) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&self.signature) else {
            return false;
        };
        key.verify(&content, &signature).is_ok()
    }

    /// Encode for transport (attachment to a Handshake packet).
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Encoding`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RecordError> {
        bincode::serialize(self).map_err(|e| RecordError::Encoding(e.to_string()))
    }

    /// Decode a record received from the wire.
    ///
    /// Decoding does not validate the signature; callers must
    /// [`Self::verify`] before trusting the content.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Encoding`] on malformed input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        bincode::deserialize(bytes).map_err(|e| RecordError::Encoding(e.to_string()))
    }
}

/// Builder assembling and signing a [`PeerRecord`].
pub struct RecordBuilder {
    seq: u64,
    entries: BTreeMap<String, Vec<u8>>,
}

impl RecordBuilder {
    /// Start a record with the given sequence number.
    #[must_use]
    pub fn new(seq: u64) -> Self {
        Self {
            seq,
            entries: BTreeMap::new(),
        }
    }

    /// Add an arbitrary entry.
    #[must_use]
    pub fn with_entry(mut self, key: &str, value: &[u8]) -> Self {
        self.entries.insert(key.to_string(), value.to_vec());
        self
    }

    /// Add the static X25519 handshake key.
    #[must_use]
    pub fn with_dh_key(self, key: &ecdh::PublicKey) -> Self {
        self.with_entry(ENTRY_DH_KEY, key.as_bytes())
    }

    /// Add the advertised UDP endpoint as ip + udp entries.
    #[must_use]
    pub fn with_udp_endpoint(self, addr: SocketAddr) -> Self {
        let ip_bytes = match addr.ip() {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        };
        self.with_entry(ENTRY_IP, &ip_bytes)
            .with_entry(ENTRY_UDP, &addr.port().to_be_bytes())
    }

    /// Insert the identity key and sign the record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Encoding`] if content serialization fails.
    pub fn sign(mut self, key: &SigningKey) -> Result<PeerRecord, RecordError> {
        self.entries.insert(
            ENTRY_ID_KEY.to_string(),
            key.verifying_key().to_bytes().to_vec(),
        );

        let content = PeerRecord::signed_content(self.seq, &self.entries)
            .ok_or_else(|| RecordError::Encoding("content serialization failed".into()))?;
        let signature = key.sign(&content);

        Ok(PeerRecord {
            seq: self.seq,
            entries: self.entries,
            signature: signature.as_bytes().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    fn test_record(seq: u64) -> (SigningKey, PeerRecord) {
        let key = SigningKey::generate(&mut OsRng);
        let dh = ecdh::PrivateKey::generate(&mut OsRng);
        let record = RecordBuilder::new(seq)
            .with_dh_key(&dh.public_key())
            .with_udp_endpoint("127.0.0.1:9000".parse().unwrap())
            .sign(&key)
            .unwrap();
        (key, record)
    }

    #[test]
    fn test_signed_record_verifies() {
        let (_, record) = test_record(1);
        assert!(record.verify());
    }

    #[test]
    fn test_node_id_derived_from_identity_key() {
        let (key, record) = test_record(1);
        let expected = NodeId::from_identity_key(&key.verifying_key().to_bytes());
        assert_eq!(record.node_id(), Some(expected));
    }

    #[test]
    fn test_tampered_record_fails_verification() {
        let (_, record) = test_record(1);
        let mut bytes = record.to_bytes().unwrap();

        // Flip a byte somewhere in the serialized entries.
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;

        // Either decoding fails outright or verification rejects it.
        if let Ok(tampered) = PeerRecord::from_bytes(&bytes) {
            assert!(!tampered.verify());
        }
    }

    #[test]
    fn test_wire_roundtrip() {
        let (_, record) = test_record(7);
        let decoded = PeerRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded, record);
        assert!(decoded.verify());
        assert_eq!(decoded.seq(), 7);
    }

    #[test]
    fn test_udp_endpoint_roundtrip() {
        let (_, record) = test_record(1);
        assert_eq!(
            record.udp_endpoint(),
            Some("127.0.0.1:9000".parse().unwrap())
        );
    }

    #[test]
    fn test_missing_identity_key_never_verifies() {
        // Hand-rolled record with no identity entry.
        let record = PeerRecord {
            seq: 1,
            entries: BTreeMap::new(),
            signature: vec![0u8; 64],
        };

        assert_eq!(record.node_id(), None);
        assert!(!record.verify());
    }

    #[test]
    fn test_dh_key_exposed() {
        let (_, record) = test_record(1);
        assert!(record.dh_public_key().is_some());
        assert!(record.get(ENTRY_DH_KEY).is_some());
    }
}
