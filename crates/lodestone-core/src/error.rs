//! Core protocol error types.

use lodestone_discovery::NodeId;
use thiserror::Error;

/// Errors surfaced by the core protocol layer.
///
/// None of these are fatal to the process: handlers log and drop, and
/// the protocol recovers through the next discovery cycle.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Packet codec failure
    #[error(transparent)]
    Wire(#[from] lodestone_wire::WireError),

    /// Cryptographic primitive failure
    #[error(transparent)]
    Crypto(#[from] lodestone_crypto::CryptoError),

    /// Record encoding/validation failure
    #[error(transparent)]
    Record(#[from] lodestone_discovery::RecordError),

    /// Transport I/O failure
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// Session is not in a state that permits the operation
    #[error("session not established with node {0}")]
    SessionNotEstablished(NodeId),

    /// ECDH produced a degenerate secret
    #[error("key exchange failed")]
    KeyExchangeFailed,

    /// Component is not in a state that permits the operation
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}
