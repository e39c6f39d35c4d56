//! Wire codec error types.

use thiserror::Error;

/// Errors produced while parsing or building packets.
///
/// Parse failures are never fatal upstream: a malformed datagram is
/// dropped and logged by the handler layer.
#[derive(Debug, Error)]
pub enum WireError {
    /// Input shorter than the structure being parsed
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum required length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Packet exceeds the protocol MTU
    #[error("packet too large: {0} bytes")]
    TooLarge(usize),

    /// Header did not start with the protocol tag
    #[error("invalid protocol tag")]
    InvalidProtocolTag,

    /// Unsupported protocol version
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),

    /// Flag byte did not name a known packet type
    #[error("unknown packet flag {0}")]
    UnknownFlag(u8),

    /// Auth data length field disagrees with the packet length
    #[error("auth data truncated: header declares {declared} bytes, {available} available")]
    AuthDataTruncated {
        /// Length declared in the header
        declared: usize,
        /// Bytes actually present
        available: usize,
    },

    /// Auth data does not fit the shape required by the packet flag
    #[error("malformed auth data: {0}")]
    MalformedAuthData(&'static str),

    /// Auth data exceeds the 16-bit length field
    #[error("auth data too large: {0} bytes")]
    AuthDataTooLarge(usize),
}
