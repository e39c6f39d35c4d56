//! # Lodestone Crypto
//!
//! Cryptographic primitives for the Lodestone discovery protocol.
//!
//! This crate provides:
//! - X25519 ephemeral key exchange for the session handshake
//! - Ed25519 identity-proof signatures binding a handshake to its challenge
//! - BLAKE3-based session key derivation
//! - `ChaCha20-Poly1305` AEAD with counter-derived 96-bit nonces
//! - AES-128-CTR header masking (wire obfuscation, not secrecy)
//! - Secure random number generation
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Security Level |
//! |----------|-----------|----------------|
//! | Key Exchange | X25519 | 128-bit |
//! | AEAD | ChaCha20-Poly1305 | 256-bit key |
//! | Hash / KDF | BLAKE3 (keyed, XOF) | 128-bit collision |
//! | Signatures | Ed25519 | 128-bit |
//! | Header Masking | AES-128-CTR | obfuscation only |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod aead;
pub mod ecdh;
pub mod error;
pub mod kdf;
pub mod masking;
pub mod random;
pub mod sig;

pub use error::CryptoError;

/// X25519 public key size
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;

/// X25519 secret key size
pub const X25519_SECRET_KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 key size
pub const AEAD_KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 nonce size (96-bit, carried in the packet header)
pub const AEAD_NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size
pub const AEAD_TAG_SIZE: usize = 16;

/// AES-128-CTR masking key size (identity prefix)
pub const MASKING_KEY_SIZE: usize = 16;

/// Masking IV size (clear prefix of every packet)
pub const MASKING_IV_SIZE: usize = 16;

/// Ed25519 public key size
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Ed25519 signature size
pub const ED25519_SIGNATURE_SIZE: usize = 64;

/// Symmetric keys derived from one handshake exchange.
///
/// The initiator encrypts with `initiator_key` and decrypts with
/// `recipient_key`; the recipient does the opposite. Keys are unique per
/// handshake (the KDF binds the challenge data) and are zeroized on drop.
#[derive(Clone, zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Key for the initiator-to-recipient direction
    pub initiator_key: [u8; 32],
    /// Key for the recipient-to-initiator direction
    pub recipient_key: [u8; 32],
}
