//! AES-128-CTR header masking.
//!
//! The static header of every packet is masked with a stream cipher keyed
//! by the first 16 bytes of the *receiver's* identity, IV'd by the
//! 16-byte masking IV that prefixes the packet in the clear. Anyone who
//! knows the destination identity can unmask, so this is wire
//! obfuscation against passive classifiers, not a secrecy mechanism, and
//! it deliberately has no dependency on session state.

use crate::{MASKING_IV_SIZE, MASKING_KEY_SIZE};
use aes::cipher::{KeyIvInit, StreamCipher};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// Apply (or remove) the header mask in place.
///
/// CTR mode is an involution: calling this twice with the same key and IV
/// restores the original bytes.
pub fn apply_mask(
    dest_id_prefix: &[u8; MASKING_KEY_SIZE],
    masking_iv: &[u8; MASKING_IV_SIZE],
    buf: &mut [u8],
) {
    let mut cipher = Aes128Ctr::new(dest_id_prefix.into(), masking_iv.into());
    cipher.apply_keystream(buf);
}

/// Mask a header into a new buffer, leaving the input untouched.
#[must_use]
pub fn mask(
    dest_id_prefix: &[u8; MASKING_KEY_SIZE],
    masking_iv: &[u8; MASKING_IV_SIZE],
    header: &[u8],
) -> Vec<u8> {
    let mut out = header.to_vec();
    apply_mask(dest_id_prefix, masking_iv, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_is_involution() {
        let key = [0x11u8; 16];
        let iv = [0x22u8; 16];
        let header = b"protocol header bytes".to_vec();

        let mut buf = header.clone();
        apply_mask(&key, &iv, &mut buf);
        assert_ne!(buf, header);

        apply_mask(&key, &iv, &mut buf);
        assert_eq!(buf, header);
    }

    #[test]
    fn test_mask_depends_on_key() {
        let iv = [0x22u8; 16];
        let masked_a = mask(&[1u8; 16], &iv, b"header");
        let masked_b = mask(&[2u8; 16], &iv, b"header");

        assert_ne!(masked_a, masked_b);
    }

    #[test]
    fn test_mask_depends_on_iv() {
        let key = [0x11u8; 16];
        let masked_a = mask(&key, &[1u8; 16], b"header");
        let masked_b = mask(&key, &[2u8; 16], b"header");

        assert_ne!(masked_a, masked_b);
    }
}
