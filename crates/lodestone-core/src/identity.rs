//! The local node's identity context.
//!
//! Every component receives this explicitly at construction; there is no
//! ambient global identity or session state anywhere in the crate.

use crate::error::ProtocolError;
use lodestone_crypto::ecdh;
use lodestone_crypto::sig::SigningKey;
use lodestone_discovery::{NodeId, PeerRecord, RecordBuilder};
use rand_core::OsRng;
use std::net::SocketAddr;

/// The local node: identity keys, static handshake key, and self record.
pub struct LocalIdentity {
    node_id: NodeId,
    signing_key: SigningKey,
    dh_secret: ecdh::PrivateKey,
    record: PeerRecord,
}

impl LocalIdentity {
    /// Generate a fresh identity advertising the given UDP endpoint.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError::Record`] if self-record signing fails.
    pub fn generate(endpoint: SocketAddr) -> Result<Self, ProtocolError> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let dh_secret = ecdh::PrivateKey::generate(&mut OsRng);
        Self::from_keys(signing_key, dh_secret, endpoint, 1)
    }

    /// Build an identity from existing keys.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError::Record`] if self-record signing fails.
    pub fn from_keys(
        signing_key: SigningKey,
        dh_secret: ecdh::PrivateKey,
        endpoint: SocketAddr,
        record_seq: u64,
    ) -> Result<Self, ProtocolError> {
        let record = RecordBuilder::new(record_seq)
            .with_dh_key(&dh_secret.public_key())
            .with_udp_endpoint(endpoint)
            .sign(&signing_key)?;

        let node_id = NodeId::from_identity_key(&signing_key.verifying_key().to_bytes());

        Ok(Self {
            node_id,
            signing_key,
            dh_secret,
            record,
        })
    }

    /// The local node id.
    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The identity signing key.
    #[must_use]
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// The static X25519 key used when answering handshakes.
    #[must_use]
    pub fn dh_secret(&self) -> &ecdh::PrivateKey {
        &self.dh_secret
    }

    /// The signed self record attached to handshakes on request.
    #[must_use]
    pub fn record(&self) -> &PeerRecord {
        &self.record
    }
}
