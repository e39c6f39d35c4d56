//! # Lodestone Wire
//!
//! Stateless encode/decode for the three Lodestone packet shapes.
//!
//! Every packet starts with a 16-byte masking IV in the clear, followed
//! by the static header masked with AES-128-CTR keyed by the first 16
//! bytes of the receiver's identity, followed (for Ordinary and
//! Handshake packets) by the AEAD-encrypted message body:
//!
//! ```text
//! packet  := masking-iv(16) | masked(header) | body
//! header  := tag(6) | version(2) | flag(1) | nonce(12) | authdata-size(2) | authdata
//! flag    := 0 Ordinary | 1 WhoAreYou | 2 Handshake
//! ```
//!
//! This crate never touches session state: callers supply nonces and
//! append ciphertext. All multi-byte fields are big-endian.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod header;
pub mod packet;

pub use error::WireError;
pub use header::{
    HandshakeAuthData, OrdinaryAuthData, PacketFlag, StaticHeader, WhoAreYouAuthData,
};
pub use packet::{
    build_handshake_packet, build_ordinary_packet, build_who_are_you_packet, encrypted_body,
    masking_iv, static_header,
};

/// Protocol tag carried by every static header.
pub const PROTOCOL_TAG: &[u8; 6] = b"lodstn";

/// Current wire protocol version.
pub const PROTOCOL_VERSION: u16 = 1;

/// Masking IV size (clear packet prefix).
pub const MASKING_IV_SIZE: usize = 16;

/// Packet nonce size (also the AEAD nonce).
pub const NONCE_SIZE: usize = 12;

/// Fixed header length before the variable auth data:
/// tag(6) + version(2) + flag(1) + nonce(12) + authdata-size(2).
pub const FIXED_HEADER_SIZE: usize = 23;

/// Id-nonce size inside WhoAreYou auth data.
pub const ID_NONCE_SIZE: usize = 16;

/// Ordinary auth data is exactly the 32-byte sender identity.
pub const ORDINARY_AUTHDATA_SIZE: usize = 32;

/// WhoAreYou auth data: id-nonce(16) + record-seq(8).
pub const WHOAREYOU_AUTHDATA_SIZE: usize = 24;

/// Maximum total packet size accepted or produced.
pub const MAX_PACKET_SIZE: usize = 1280;
