//! Static header and per-flag auth data shapes.

use crate::error::WireError;
use crate::{
    FIXED_HEADER_SIZE, ID_NONCE_SIZE, NONCE_SIZE, ORDINARY_AUTHDATA_SIZE, PROTOCOL_TAG,
    PROTOCOL_VERSION, WHOAREYOU_AUTHDATA_SIZE,
};

/// Packet types as carried in the header flag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketFlag {
    /// Session-encrypted application message
    Ordinary = 0x00,
    /// Challenge issued when a packet cannot be decrypted
    WhoAreYou = 0x01,
    /// Challenge response carrying key material and a first message
    Handshake = 0x02,
}

impl TryFrom<u8> for PacketFlag {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Ordinary),
            0x01 => Ok(Self::WhoAreYou),
            0x02 => Ok(Self::Handshake),
            other => Err(WireError::UnknownFlag(other)),
        }
    }
}

/// Unmasked static header of a wire packet.
///
/// The nonce doubles as the AEAD nonce for the packet body; it must be
/// unique per sent packet within a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticHeader {
    flag: PacketFlag,
    nonce: [u8; NONCE_SIZE],
    authdata: Vec<u8>,
}

impl StaticHeader {
    /// Assemble a header.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::AuthDataTooLarge`] if the auth data exceeds
    /// the 16-bit length field.
    pub fn new(
        flag: PacketFlag,
        nonce: [u8; NONCE_SIZE],
        authdata: Vec<u8>,
    ) -> Result<Self, WireError> {
        if authdata.len() > u16::MAX as usize {
            return Err(WireError::AuthDataTooLarge(authdata.len()));
        }
        Ok(Self {
            flag,
            nonce,
            authdata,
        })
    }

    /// Packet type flag.
    #[must_use]
    pub fn flag(&self) -> PacketFlag {
        self.flag
    }

    /// Packet nonce (AEAD nonce of the body).
    #[must_use]
    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    /// Raw auth data bytes; shape depends on [`Self::flag`].
    #[must_use]
    pub fn authdata(&self) -> &[u8] {
        &self.authdata
    }

    /// Total encoded length of this header.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        FIXED_HEADER_SIZE + self.authdata.len()
    }

    /// Encode to unmasked bytes.
    ///
    /// The encoded form is also the AEAD associated data for the packet
    /// body, so it must be byte-stable.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(PROTOCOL_TAG);
        buf.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
        buf.push(self.flag as u8);
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&(self.authdata.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.authdata);
        buf
    }

    /// Decode from unmasked bytes. Trailing bytes beyond the declared
    /// auth data are ignored (they belong to the encrypted body).
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] on truncation, a wrong protocol tag, an
    /// unsupported version, or an unknown flag.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < FIXED_HEADER_SIZE {
            return Err(WireError::TooShort {
                expected: FIXED_HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        if &bytes[..6] != PROTOCOL_TAG {
            return Err(WireError::InvalidProtocolTag);
        }

        let version = u16::from_be_bytes([bytes[6], bytes[7]]);
        if version != PROTOCOL_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }

        let flag = PacketFlag::try_from(bytes[8])?;

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[9..21]);

        let authdata_size = u16::from_be_bytes([bytes[21], bytes[22]]) as usize;
        let available = bytes.len() - FIXED_HEADER_SIZE;
        if authdata_size > available {
            return Err(WireError::AuthDataTruncated {
                declared: authdata_size,
                available,
            });
        }

        let authdata = bytes[FIXED_HEADER_SIZE..FIXED_HEADER_SIZE + authdata_size].to_vec();

        Ok(Self {
            flag,
            nonce,
            authdata,
        })
    }
}

/// Ordinary auth data: the 32-byte sender identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrdinaryAuthData {
    /// Sender node identity
    pub src_id: [u8; 32],
}

impl OrdinaryAuthData {
    /// Encode to auth data bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.src_id.to_vec()
    }

    /// Decode from auth data bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::MalformedAuthData`] if the input is not
    /// exactly 32 bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() != ORDINARY_AUTHDATA_SIZE {
            return Err(WireError::MalformedAuthData(
                "ordinary auth data must be a 32-byte sender id",
            ));
        }
        let mut src_id = [0u8; 32];
        src_id.copy_from_slice(bytes);
        Ok(Self { src_id })
    }
}

/// WhoAreYou auth data: a fresh id-nonce plus the record sequence number
/// the challenger last saw for the destination (0 if unknown), telling
/// the peer whether to attach its record to the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhoAreYouAuthData {
    /// Challenge id-nonce
    pub id_nonce: [u8; ID_NONCE_SIZE],
    /// Destination record sequence number known to the challenger
    pub record_seq: u64,
}

impl WhoAreYouAuthData {
    /// Encode to auth data bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(WHOAREYOU_AUTHDATA_SIZE);
        buf.extend_from_slice(&self.id_nonce);
        buf.extend_from_slice(&self.record_seq.to_be_bytes());
        buf
    }

    /// Decode from auth data bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::MalformedAuthData`] on a wrong length.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() != WHOAREYOU_AUTHDATA_SIZE {
            return Err(WireError::MalformedAuthData(
                "whoareyou auth data must be id-nonce(16) + seq(8)",
            ));
        }
        let mut id_nonce = [0u8; ID_NONCE_SIZE];
        id_nonce.copy_from_slice(&bytes[..ID_NONCE_SIZE]);
        let mut seq = [0u8; 8];
        seq.copy_from_slice(&bytes[ID_NONCE_SIZE..]);
        Ok(Self {
            id_nonce,
            record_seq: u64::from_be_bytes(seq),
        })
    }
}

/// Handshake auth data: sender id, identity-proof signature, ephemeral
/// public key, and (only when the challenge reported a stale or absent
/// sequence number) the sender's own record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeAuthData {
    /// Sender node identity
    pub src_id: [u8; 32],
    /// Identity-proof signature over the challenge exchange
    pub id_signature: [u8; 64],
    /// Sender's ephemeral X25519 public key
    pub ephemeral_pubkey: [u8; 32],
    /// Sender's record, attached only when the challenger's copy is stale
    pub record: Option<Vec<u8>>,
}

impl HandshakeAuthData {
    // src(32) | sig-size(1) | eph-size(1)
    const HEAD_SIZE: usize = 34;

    /// Encode to auth data bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let record_len = self.record.as_ref().map_or(0, Vec::len);
        let mut buf = Vec::with_capacity(Self::HEAD_SIZE + 64 + 32 + record_len);
        buf.extend_from_slice(&self.src_id);
        buf.push(64);
        buf.push(32);
        buf.extend_from_slice(&self.id_signature);
        buf.extend_from_slice(&self.ephemeral_pubkey);
        if let Some(record) = &self.record {
            buf.extend_from_slice(record);
        }
        buf
    }

    /// Decode from auth data bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::MalformedAuthData`] if the sizes byte pair
    /// does not match the supported signature/key algorithms or the
    /// input is truncated.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < Self::HEAD_SIZE {
            return Err(WireError::MalformedAuthData(
                "handshake auth data head truncated",
            ));
        }

        let mut src_id = [0u8; 32];
        src_id.copy_from_slice(&bytes[..32]);

        let sig_size = bytes[32] as usize;
        let eph_size = bytes[33] as usize;
        if sig_size != 64 || eph_size != 32 {
            return Err(WireError::MalformedAuthData(
                "unsupported signature or ephemeral key size",
            ));
        }

        let rest = &bytes[Self::HEAD_SIZE..];
        if rest.len() < sig_size + eph_size {
            return Err(WireError::MalformedAuthData(
                "handshake auth data key material truncated",
            ));
        }

        let mut id_signature = [0u8; 64];
        id_signature.copy_from_slice(&rest[..64]);
        let mut ephemeral_pubkey = [0u8; 32];
        ephemeral_pubkey.copy_from_slice(&rest[64..96]);

        let record_bytes = &rest[96..];
        let record = if record_bytes.is_empty() {
            None
        } else {
            Some(record_bytes.to_vec())
        };

        Ok(Self {
            src_id,
            id_signature,
            ephemeral_pubkey,
            record,
        })
    }
}
