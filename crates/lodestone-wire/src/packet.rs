//! Packet-level parse and build transforms.
//!
//! Parsing is pure slicing plus unmasking: the caller's own identity
//! keys the unmask, so a packet addressed to someone else decodes to
//! garbage and fails the protocol-tag check. Builders return the packet
//! prefix (masking IV + masked header) together with the unmasked
//! header; the caller appends AEAD ciphertext using the encoded header
//! as associated data.

use crate::error::WireError;
use crate::header::{HandshakeAuthData, OrdinaryAuthData, PacketFlag, StaticHeader, WhoAreYouAuthData};
use crate::{FIXED_HEADER_SIZE, ID_NONCE_SIZE, MASKING_IV_SIZE, MAX_PACKET_SIZE, NONCE_SIZE};
use lodestone_crypto::masking;

fn masking_key(node_id: &[u8; 32]) -> [u8; 16] {
    let mut key = [0u8; 16];
    key.copy_from_slice(&node_id[..16]);
    key
}

/// Extract the clear masking IV prefix.
///
/// # Errors
///
/// Returns [`WireError::TooShort`] if the packet is shorter than the IV.
pub fn masking_iv(packet: &[u8]) -> Result<[u8; MASKING_IV_SIZE], WireError> {
    if packet.len() < MASKING_IV_SIZE {
        return Err(WireError::TooShort {
            expected: MASKING_IV_SIZE,
            actual: packet.len(),
        });
    }
    let mut iv = [0u8; MASKING_IV_SIZE];
    iv.copy_from_slice(&packet[..MASKING_IV_SIZE]);
    Ok(iv)
}

/// Unmask and decode the static header of a received packet.
///
/// `self_id` is the receiver's own identity; its first 16 bytes key the
/// unmask.
///
/// # Errors
///
/// Returns a [`WireError`] if the packet is truncated, oversized, or the
/// unmasked bytes do not form a valid header (which is also what happens
/// for packets addressed to a different identity).
pub fn static_header(self_id: &[u8; 32], packet: &[u8]) -> Result<StaticHeader, WireError> {
    if packet.len() > MAX_PACKET_SIZE {
        return Err(WireError::TooLarge(packet.len()));
    }
    if packet.len() < MASKING_IV_SIZE + FIXED_HEADER_SIZE {
        return Err(WireError::TooShort {
            expected: MASKING_IV_SIZE + FIXED_HEADER_SIZE,
            actual: packet.len(),
        });
    }

    let iv = masking_iv(packet)?;
    let mut unmasked = packet[MASKING_IV_SIZE..].to_vec();
    masking::apply_mask(&masking_key(self_id), &iv, &mut unmasked);

    StaticHeader::decode(&unmasked)
}

/// Slice the encrypted message body that follows the header.
///
/// Empty for WhoAreYou packets, which carry no body.
#[must_use]
pub fn encrypted_body<'a>(packet: &'a [u8], header: &StaticHeader) -> &'a [u8] {
    let start = MASKING_IV_SIZE + header.encoded_len();
    if start >= packet.len() {
        &[]
    } else {
        &packet[start..]
    }
}

fn assemble(
    dest_id: &[u8; 32],
    iv: [u8; MASKING_IV_SIZE],
    header: &StaticHeader,
) -> Vec<u8> {
    let encoded = header.encode();
    let mut packet = Vec::with_capacity(MASKING_IV_SIZE + encoded.len());
    packet.extend_from_slice(&iv);
    packet.extend_from_slice(&masking::mask(&masking_key(dest_id), &iv, &encoded));
    packet
}

/// Build an Ordinary packet prefix.
///
/// The nonce is the session's salt+counter nonce (or random bytes when
/// the sender has no session and is fishing for a challenge).
///
/// # Errors
///
/// Propagates header construction failures.
pub fn build_ordinary_packet(
    dest_id: &[u8; 32],
    src_id: [u8; 32],
    iv: [u8; MASKING_IV_SIZE],
    nonce: [u8; NONCE_SIZE],
) -> Result<(Vec<u8>, StaticHeader), WireError> {
    let header = StaticHeader::new(
        PacketFlag::Ordinary,
        nonce,
        OrdinaryAuthData { src_id }.encode(),
    )?;
    Ok((assemble(dest_id, iv, &header), header))
}

/// Build a WhoAreYou challenge packet.
///
/// The header nonce echoes the request nonce of the packet that could
/// not be decrypted, so the peer can correlate the challenge.
/// `record_seq` is the sequence number of the destination's record as
/// known to the challenger, 0 if no record is known.
///
/// # Errors
///
/// Propagates header construction failures.
pub fn build_who_are_you_packet(
    dest_id: &[u8; 32],
    request_nonce: [u8; NONCE_SIZE],
    id_nonce: [u8; ID_NONCE_SIZE],
    record_seq: u64,
    iv: [u8; MASKING_IV_SIZE],
) -> Result<(Vec<u8>, StaticHeader), WireError> {
    let header = StaticHeader::new(
        PacketFlag::WhoAreYou,
        request_nonce,
        WhoAreYouAuthData {
            id_nonce,
            record_seq,
        }
        .encode(),
    )?;
    Ok((assemble(dest_id, iv, &header), header))
}

/// Build a Handshake packet prefix.
///
/// `record` is attached only when the challenge indicated the peer's
/// copy is stale or absent; omitting it otherwise is a bandwidth
/// optimization, not a correctness requirement.
///
/// # Errors
///
/// Returns [`WireError::AuthDataTooLarge`] if the attached record pushes
/// the auth data past its length field.
#[allow(clippy::too_many_arguments)]
pub fn build_handshake_packet(
    dest_id: &[u8; 32],
    src_id: [u8; 32],
    id_signature: &[u8; 64],
    ephemeral_pubkey: &[u8; 32],
    record: Option<Vec<u8>>,
    iv: [u8; MASKING_IV_SIZE],
    nonce: [u8; NONCE_SIZE],
) -> Result<(Vec<u8>, StaticHeader), WireError> {
    let header = StaticHeader::new(
        PacketFlag::Handshake,
        nonce,
        HandshakeAuthData {
            src_id,
            id_signature: *id_signature,
            ephemeral_pubkey: *ephemeral_pubkey,
            record,
        }
        .encode(),
    )?;
    Ok((assemble(dest_id, iv, &header), header))
}
