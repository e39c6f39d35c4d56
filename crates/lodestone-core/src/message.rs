//! The external message layer consumed by the packet handlers.
//!
//! The core never interprets decrypted application messages; it hands
//! them to a [`MessageResponder`] and forwards whatever replies come
//! back as Ordinary packets. The [`MessageRequester`] supplies the
//! liveness probe embedded in a Handshake packet.

use async_trait::async_trait;
use lodestone_discovery::NodeId;
use std::net::SocketAddr;

/// Handles decrypted inbound messages.
#[async_trait]
pub trait MessageResponder: Send + Sync {
    /// Process one decrypted message and return the replies to send,
    /// each as an opaque byte string. An empty vector means no reply.
    async fn handle_message(&self, message: &[u8], from: SocketAddr) -> Vec<Vec<u8>>;
}

/// Constructs outbound protocol messages.
pub trait MessageRequester: Send + Sync {
    /// Build the liveness probe carried by a Handshake packet to `dest`.
    fn construct_probe(&self, dest: NodeId) -> Vec<u8>;
}
