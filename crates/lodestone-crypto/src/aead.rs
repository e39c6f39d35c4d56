//! `ChaCha20-Poly1305` AEAD encryption for session payloads.
//!
//! The wire header carries a 96-bit nonce, so the 12-byte-nonce variant
//! is used rather than XChaCha. Nonces are never random: each one is a
//! 4-byte session salt followed by the session's big-endian send counter,
//! which makes reuse impossible for the lifetime of a key set as long as
//! the counter only moves forward.

use crate::{AEAD_KEY_SIZE, AEAD_NONCE_SIZE, AEAD_TAG_SIZE, CryptoError};
use chacha20poly1305::{
    ChaCha20Poly1305,
    aead::{Aead, KeyInit},
};
use zeroize::ZeroizeOnDrop;

/// AEAD nonce (12 bytes): session salt ‖ big-endian counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; AEAD_NONCE_SIZE]);

impl Nonce {
    /// Create a nonce from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; AEAD_NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a nonce from a slice.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != AEAD_NONCE_SIZE {
            return None;
        }
        let mut bytes = [0u8; AEAD_NONCE_SIZE];
        bytes.copy_from_slice(slice);
        Some(Self(bytes))
    }

    /// Create a nonce from a session salt and send counter.
    ///
    /// The salt occupies the first 4 bytes, the counter the remaining 8
    /// (big-endian). A fixed salt plus a strictly increasing counter
    /// guarantees uniqueness within one key set.
    #[must_use]
    pub fn from_counter(salt: &[u8; 4], counter: u64) -> Self {
        let mut bytes = [0u8; AEAD_NONCE_SIZE];
        bytes[..4].copy_from_slice(salt);
        bytes[4..].copy_from_slice(&counter.to_be_bytes());
        Self(bytes)
    }

    /// Get raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; AEAD_NONCE_SIZE] {
        &self.0
    }

    fn as_generic(&self) -> &chacha20poly1305::Nonce {
        chacha20poly1305::Nonce::from_slice(&self.0)
    }
}

/// AEAD encryption key (32 bytes).
///
/// Wraps the raw key material and provides encryption/decryption methods.
/// Key is zeroized on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct AeadKey([u8; AEAD_KEY_SIZE]);

impl AeadKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub fn new(bytes: [u8; AEAD_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from slice.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` if slice length is not 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != AEAD_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: AEAD_KEY_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; AEAD_KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Get raw key bytes.
    ///
    /// # Security
    ///
    /// Handle with extreme care - this exposes the raw key material.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; AEAD_KEY_SIZE] {
        &self.0
    }

    /// Encrypt plaintext with associated data.
    ///
    /// Returns ciphertext with appended authentication tag
    /// (`plaintext.len()` + 16 bytes).
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if AEAD encryption fails.
    pub fn encrypt(
        &self,
        nonce: &Nonce,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = ChaCha20Poly1305::new((&self.0).into());

        cipher
            .encrypt(
                nonce.as_generic(),
                chacha20poly1305::aead::Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt ciphertext with associated data.
    ///
    /// Input must include the authentication tag at the end. Returns
    /// `None` on authentication failure - the caller treats that as "no
    /// session" and challenges the sender, it is not an error path.
    #[must_use]
    pub fn decrypt(&self, nonce: &Nonce, ciphertext_and_tag: &[u8], aad: &[u8]) -> Option<Vec<u8>> {
        if ciphertext_and_tag.len() < AEAD_TAG_SIZE {
            return None;
        }

        let cipher = ChaCha20Poly1305::new((&self.0).into());

        cipher
            .decrypt(
                nonce.as_generic(),
                chacha20poly1305::aead::Payload {
                    msg: ciphertext_and_tag,
                    aad,
                },
            )
            .ok()
    }
}
