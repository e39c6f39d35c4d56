//! BLAKE3 session key derivation.
//!
//! HKDF-style extract-then-expand built on keyed BLAKE3. The session KDF
//! mixes the ECDH shared secret with both node identities and the
//! challenge-data snapshot, so the derived keys are unique per handshake
//! and per peer pair. Both sides compute the same [`SessionKeys`]; role
//! determines which direction key each side encrypts with.

use crate::SessionKeys;

/// Info prefix for session key expansion.
const KEY_AGREEMENT_CONTEXT: &[u8] = b"lodestone key agreement";

/// Compute BLAKE3 hash of input data.
#[must_use]
pub fn hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// HKDF-Extract: extract a pseudorandom key from input key material.
///
/// Corresponds to HKDF-Extract from RFC 5869, but using BLAKE3.
#[must_use]
pub fn hkdf_extract(salt: &[u8], ikm: &[u8]) -> [u8; 32] {
    if salt.is_empty() {
        hash(ikm)
    } else {
        let salt_hash = hash(salt);
        let mut hasher = blake3::Hasher::new_keyed(&salt_hash);
        hasher.update(ikm);
        *hasher.finalize().as_bytes()
    }
}

/// HKDF-Expand: expand a pseudorandom key into arbitrary-length output.
///
/// Corresponds to HKDF-Expand from RFC 5869, but using BLAKE3's XOF.
pub fn hkdf_expand(prk: &[u8; 32], info: &[u8], output: &mut [u8]) {
    let mut hasher = blake3::Hasher::new_keyed(prk);
    hasher.update(info);

    let mut reader = hasher.finalize_xof();
    reader.fill(output);
}

/// Derive the per-handshake session keys.
///
/// The challenge data acts as the extraction salt, binding the keys to
/// this specific challenge exchange; identities order the info string so
/// a (A, B) handshake never derives the same keys as (B, A).
#[must_use]
pub fn derive_session_keys(
    shared_secret: &[u8; 32],
    initiator_id: &[u8; 32],
    recipient_id: &[u8; 32],
    challenge_data: &[u8],
) -> SessionKeys {
    let prk = hkdf_extract(challenge_data, shared_secret);

    let mut info = Vec::with_capacity(KEY_AGREEMENT_CONTEXT.len() + 64);
    info.extend_from_slice(KEY_AGREEMENT_CONTEXT);
    info.extend_from_slice(initiator_id);
    info.extend_from_slice(recipient_id);

    let mut output = [0u8; 64];
    hkdf_expand(&prk, &info, &mut output);

    let mut initiator_key = [0u8; 32];
    let mut recipient_key = [0u8; 32];
    initiator_key.copy_from_slice(&output[..32]);
    recipient_key.copy_from_slice(&output[32..]);

    SessionKeys {
        initiator_key,
        recipient_key,
    }
}
