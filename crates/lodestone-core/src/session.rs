//! Per-peer cryptographic session state.
//!
//! A session is created in one of two roles: `Recipient` when we issue a
//! WHOAREYOU challenge, `Initiator` when we answer one. Once keys are
//! derived the session encrypts outbound packets with its own direction
//! key and decrypts inbound packets with the peer's, using nonces formed
//! from a session-scoped salt and a strictly increasing send counter.

use crate::error::ProtocolError;
use lodestone_crypto::aead::{AeadKey, Nonce};
use lodestone_crypto::ecdh;
use lodestone_crypto::sig::{self, Signature, SigningKey};
use lodestone_crypto::{SessionKeys, random};
use lodestone_discovery::NodeId;
use rand_core::OsRng;
use std::net::SocketAddr;

/// Which side of the handshake this session plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionRole {
    /// We answered a challenge and sent the Handshake packet
    Initiator,
    /// We issued the challenge
    Recipient,
}

/// One peer's live cryptographic session.
pub struct Session {
    role: SessionRole,
    peer_id: NodeId,
    endpoint: SocketAddr,
    ephemeral: ecdh::EphemeralKeypair,
    challenge_data: Option<Vec<u8>>,
    keys: Option<SessionKeys>,
    nonce_salt: [u8; 4],
    counter: u64,
}

impl Session {
    /// Create a fresh session with a new ephemeral keypair and a zeroed
    /// message counter.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Crypto`] if the OS CSPRNG fails.
    pub fn new(
        role: SessionRole,
        peer_id: NodeId,
        endpoint: SocketAddr,
        challenge_data: Option<Vec<u8>>,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            role,
            peer_id,
            endpoint,
            ephemeral: ecdh::EphemeralKeypair::generate(&mut OsRng),
            challenge_data,
            keys: None,
            nonce_salt: random::random_4()?,
            counter: 0,
        })
    }

    /// The session's handshake role.
    #[must_use]
    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// The peer this session belongs to.
    #[must_use]
    pub fn peer_id(&self) -> NodeId {
        self.peer_id
    }

    /// The peer's endpoint at session creation.
    #[must_use]
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Our ephemeral public key for this handshake.
    #[must_use]
    pub fn ephemeral_public(&self) -> &ecdh::PublicKey {
        self.ephemeral.public()
    }

    /// The challenge-data snapshot this session is bound to.
    #[must_use]
    pub fn challenge_data(&self) -> Option<&[u8]> {
        self.challenge_data.as_deref()
    }

    /// Bind the session to fresh challenge data.
    pub fn set_challenge_data(&mut self, data: Vec<u8>) {
        self.challenge_data = Some(data);
    }

    /// Whether keys have been derived.
    #[must_use]
    pub fn is_established(&self) -> bool {
        self.keys.is_some()
    }

    /// Number of packets sent under the current keys.
    #[must_use]
    pub fn message_count(&self) -> u64 {
        self.counter
    }

    /// Install freshly derived keys, replacing any prior set wholesale.
    pub fn install_keys(&mut self, keys: SessionKeys) {
        self.keys = Some(keys);
    }

    /// Sign the identity proof binding this session's challenge data and
    /// ephemeral key to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidState`] if no challenge data is
    /// bound yet.
    pub fn generate_id_signature(&self, key: &SigningKey) -> Result<Signature, ProtocolError> {
        let challenge = self
            .challenge_data
            .as_deref()
            .ok_or(ProtocolError::InvalidState(
                "session has no challenge data to sign",
            ))?;
        Ok(sig::sign_id_proof(
            key,
            challenge,
            &self.ephemeral_public().to_bytes(),
            self.peer_id.as_bytes(),
        ))
    }

    /// ECDH between our ephemeral key and the peer's static key.
    #[must_use]
    pub fn shared_secret(&self, peer_static: &ecdh::PublicKey) -> Option<ecdh::SharedSecret> {
        self.ephemeral.exchange(peer_static)
    }

    /// Draw the nonce for the next outbound packet, advancing the send
    /// counter exactly once.
    ///
    /// The salt occupies the first 4 bytes, so nonces never repeat for
    /// the lifetime of the keys.
    pub fn next_nonce(&mut self) -> [u8; 12] {
        let nonce = Nonce::from_counter(&self.nonce_salt, self.counter);
        self.counter += 1;
        *nonce.as_bytes()
    }

    fn direction_keys(&self) -> Option<(&[u8; 32], &[u8; 32])> {
        let keys = self.keys.as_ref()?;
        match self.role {
            SessionRole::Initiator => Some((&keys.initiator_key, &keys.recipient_key)),
            SessionRole::Recipient => Some((&keys.recipient_key, &keys.initiator_key)),
        }
    }

    /// Encrypt an outbound message body under our direction key.
    ///
    /// `nonce` must come from [`Self::next_nonce`] and match the packet
    /// header; `aad` is the encoded header (plus the masking IV for
    /// handshake packets).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::SessionNotEstablished`] before keys are
    /// installed.
    pub fn encrypt_message(
        &self,
        nonce: &[u8; 12],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        let (send_key, _) = self
            .direction_keys()
            .ok_or(ProtocolError::SessionNotEstablished(self.peer_id))?;
        let ciphertext =
            AeadKey::new(*send_key).encrypt(&Nonce::from_bytes(*nonce), plaintext, aad)?;
        Ok(ciphertext)
    }

    /// Decrypt an inbound message body with the peer's direction key.
    ///
    /// Returns `None` on authentication failure or when no keys exist -
    /// the caller answers with a challenge rather than treating this as
    /// an error. Never mutates the send counter.
    #[must_use]
    pub fn decrypt_message(&self, nonce: &[u8; 12], ciphertext: &[u8], aad: &[u8]) -> Option<Vec<u8>> {
        let (_, recv_key) = self.direction_keys()?;
        AeadKey::new(*recv_key).decrypt(&Nonce::from_bytes(*nonce), ciphertext, aad)
    }
}
