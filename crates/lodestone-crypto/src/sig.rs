//! Ed25519 identity signatures.
//!
//! A peer proves ownership of its identity key during the handshake by
//! signing the challenge data together with its ephemeral public key and
//! the peer's identity. The domain-separation prefix prevents the
//! signature from being confused with record signatures made by the same
//! key, and binding the challenge data prevents replay across sessions.

use crate::CryptoError;
use ed25519_dalek::{Signer, Verifier};
use rand_core::{CryptoRng, RngCore};
use zeroize::ZeroizeOnDrop;

/// Domain separation prefix for handshake identity proofs.
const ID_PROOF_CONTEXT: &[u8] = b"lodestone identity proof";

/// Ed25519 signature (64 bytes)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature([u8; 64]);

impl Signature {
    /// Create a signature from raw bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Create a signature from a slice
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if the slice is not exactly 64 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != 64 {
            return Err(CryptoError::InvalidSignature);
        }
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Get the raw signature bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    fn to_dalek(self) -> ed25519_dalek::Signature {
        ed25519_dalek::Signature::from_bytes(&self.0)
    }
}

/// Ed25519 signing key (private key)
///
/// Long-lived identity key. Zeroized on drop to prevent key material from
/// lingering in memory.
#[derive(ZeroizeOnDrop)]
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl SigningKey {
    /// Generate a new random signing key
    #[must_use]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::generate(rng),
        }
    }

    /// Create from raw 32-byte seed
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(bytes),
        }
    }

    /// Sign a message (deterministic).
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.inner.sign(message);
        Signature(sig.to_bytes())
    }

    /// Get the corresponding verifying key (public key)
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Export signing key bytes (use with extreme caution)
    ///
    /// # Security
    ///
    /// This exposes the raw secret key bytes. Handle with extreme care
    /// and ensure proper zeroization after use.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }
}

/// Ed25519 verifying key (public key)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifyingKey {
    inner: ed25519_dalek::VerifyingKey,
}

impl VerifyingKey {
    /// Create from raw 32-byte public key
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the bytes do not
    /// represent a valid Ed25519 public key point.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let inner = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { inner })
    }

    /// Get the raw public key bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Verify a signature on a message
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if the signature is invalid,
    /// malformed, or does not authenticate the message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        self.inner
            .verify(message, &signature.to_dalek())
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

/// Build the message an identity proof covers.
fn id_proof_input(challenge_data: &[u8], ephemeral_pubkey: &[u8; 32], peer_id: &[u8; 32]) -> Vec<u8> {
    let mut input =
        Vec::with_capacity(ID_PROOF_CONTEXT.len() + challenge_data.len() + 32 + 32);
    input.extend_from_slice(ID_PROOF_CONTEXT);
    input.extend_from_slice(challenge_data);
    input.extend_from_slice(ephemeral_pubkey);
    input.extend_from_slice(peer_id);
    input
}

/// Sign a handshake identity proof.
///
/// Binds the signature to the challenge data snapshot, the fresh
/// ephemeral public key, and the peer's identity, so it cannot be
/// replayed into another session.
#[must_use]
pub fn sign_id_proof(
    key: &SigningKey,
    challenge_data: &[u8],
    ephemeral_pubkey: &[u8; 32],
    peer_id: &[u8; 32],
) -> Signature {
    key.sign(&id_proof_input(challenge_data, ephemeral_pubkey, peer_id))
}

/// Verify a handshake identity proof.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidSignature`] if the proof does not
/// authenticate this exact (challenge, ephemeral key, peer) triple.
pub fn verify_id_proof(
    key: &VerifyingKey,
    challenge_data: &[u8],
    ephemeral_pubkey: &[u8; 32],
    peer_id: &[u8; 32],
    signature: &Signature,
) -> Result<(), CryptoError> {
    key.verify(
        &id_proof_input(challenge_data, ephemeral_pubkey, peer_id),
        signature,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn test_sign_verify_roundtrip() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        let message = b"authenticate this message";
        let signature = signing_key.sign(message);

        assert!(verifying_key.verify(message, &signature).is_ok());
    }

    #[test]
    fn test_id_proof_roundtrip() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        let challenge = b"challenge-data-snapshot";
        let eph = [7u8; 32];
        let peer = [9u8; 32];

        let sig = sign_id_proof(&signing_key, challenge, &eph, &peer);
        assert!(verify_id_proof(&verifying_key, challenge, &eph, &peer, &sig).is_ok());
    }

    #[test]
    fn test_id_proof_bound_to_challenge() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        let eph = [7u8; 32];
        let peer = [9u8; 32];
        let sig = sign_id_proof(&signing_key, b"challenge-a", &eph, &peer);

        // Replayed under a different challenge the proof must fail.
        assert!(verify_id_proof(&verifying_key, b"challenge-b", &eph, &peer, &sig).is_err());
    }

    #[test]
    fn test_id_proof_bound_to_ephemeral_key() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        let peer = [9u8; 32];
        let sig = sign_id_proof(&signing_key, b"challenge", &[7u8; 32], &peer);

        assert!(verify_id_proof(&verifying_key, b"challenge", &[8u8; 32], &peer, &sig).is_err());
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let signing_key1 = SigningKey::generate(&mut OsRng);
        let verifying_key2 = SigningKey::generate(&mut OsRng).verifying_key();

        let sig = sign_id_proof(&signing_key1, b"challenge", &[7u8; 32], &[9u8; 32]);
        assert!(verify_id_proof(&verifying_key2, b"challenge", &[7u8; 32], &[9u8; 32], &sig).is_err());
    }

    #[test]
    fn test_signature_from_slice_wrong_size() {
        assert!(Signature::from_slice(&[0u8; 32]).is_err());
        assert!(Signature::from_slice(&[0u8; 128]).is_err());
    }

    #[test]
    fn test_signing_key_from_bytes_roundtrip() {
        let original = SigningKey::generate(&mut OsRng);
        let recovered = SigningKey::from_bytes(&original.to_bytes());

        let message = b"test message";
        assert_eq!(original.sign(message), recovered.sign(message));
    }
}
