//! Property tests for the cryptographic agreement and codec invariants.

use lodestone_crypto::{ecdh, kdf, masking};
use lodestone_wire::HandshakeAuthData;
use proptest::prelude::*;

fn bytes64(a: [u8; 32], b: [u8; 32]) -> [u8; 64] {
    let mut out = [0u8; 64];
    out[..32].copy_from_slice(&a);
    out[32..].copy_from_slice(&b);
    out
}

proptest! {
    /// Both sides of a handshake derive identical session keys from the
    /// matching ECDH exchange, and the direction keys never coincide.
    #[test]
    fn prop_session_key_agreement(
        initiator_seed in prop::array::uniform32(any::<u8>()),
        recipient_seed in prop::array::uniform32(any::<u8>()),
        id_a in prop::array::uniform32(any::<u8>()),
        id_b in prop::array::uniform32(any::<u8>()),
        challenge in prop::collection::vec(any::<u8>(), 1..128),
    ) {
        let initiator_ephemeral = ecdh::PrivateKey::from_bytes(initiator_seed);
        let recipient_static = ecdh::PrivateKey::from_bytes(recipient_seed);

        // Initiator: own ephemeral x peer static.
        // Recipient: own static x peer ephemeral.
        let initiator_secret = initiator_ephemeral.exchange(&recipient_static.public_key());
        let recipient_secret = recipient_static.exchange(&initiator_ephemeral.public_key());

        if let (Some(initiator_secret), Some(recipient_secret)) =
            (initiator_secret, recipient_secret)
        {
            let initiator_keys = kdf::derive_session_keys(
                initiator_secret.as_bytes(), &id_a, &id_b, &challenge,
            );
            let recipient_keys = kdf::derive_session_keys(
                recipient_secret.as_bytes(), &id_a, &id_b, &challenge,
            );

            prop_assert_eq!(initiator_keys.initiator_key, recipient_keys.initiator_key);
            prop_assert_eq!(initiator_keys.recipient_key, recipient_keys.recipient_key);
            prop_assert_ne!(initiator_keys.initiator_key, initiator_keys.recipient_key);
        }
    }

    /// Keys are unique per handshake: changing the challenge data alone
    /// changes both direction keys.
    #[test]
    fn prop_keys_bound_to_challenge(
        secret in prop::array::uniform32(any::<u8>()),
        id_a in prop::array::uniform32(any::<u8>()),
        id_b in prop::array::uniform32(any::<u8>()),
        challenge in prop::collection::vec(any::<u8>(), 1..64),
        other_challenge in prop::collection::vec(any::<u8>(), 1..64),
    ) {
        prop_assume!(challenge != other_challenge);

        let keys = kdf::derive_session_keys(&secret, &id_a, &id_b, &challenge);
        let other = kdf::derive_session_keys(&secret, &id_a, &id_b, &other_challenge);

        prop_assert_ne!(keys.initiator_key, other.initiator_key);
        prop_assert_ne!(keys.recipient_key, other.recipient_key);
    }

    /// Masking is a perfect involution for any key, IV, and payload.
    #[test]
    fn prop_masking_involution(
        key in prop::array::uniform16(any::<u8>()),
        iv in prop::array::uniform16(any::<u8>()),
        data in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let mut buf = data.clone();
        masking::apply_mask(&key, &iv, &mut buf);
        masking::apply_mask(&key, &iv, &mut buf);
        prop_assert_eq!(buf, data);
    }

    /// Handshake auth data round-trips for any key material and any
    /// attached record payload.
    #[test]
    fn prop_handshake_authdata_roundtrip(
        src_id in prop::array::uniform32(any::<u8>()),
        sig_a in prop::array::uniform32(any::<u8>()),
        sig_b in prop::array::uniform32(any::<u8>()),
        ephemeral in prop::array::uniform32(any::<u8>()),
        record in prop::option::of(prop::collection::vec(any::<u8>(), 1..300)),
    ) {
        let authdata = HandshakeAuthData {
            src_id,
            id_signature: bytes64(sig_a, sig_b),
            ephemeral_pubkey: ephemeral,
            record,
        };

        let decoded = HandshakeAuthData::decode(&authdata.encode()).unwrap();
        prop_assert_eq!(decoded, authdata);
    }
}
