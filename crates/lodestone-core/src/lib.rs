//! # Lodestone Core
//!
//! The control layer of the Lodestone discovery protocol. This crate
//! wires the stateless packet codec, the per-peer session store, the
//! request lifecycle manager, and the routing table into the three
//! packet handlers that define protocol behavior.
//!
//! # Packet Flow
//!
//! ```text
//! UDP socket → receive loop → PacketDispatcher ── Ordinary ──→ decrypt / challenge
//!                                   │
//!                                   ├─ WhoAreYou ─→ correlate, derive keys, Handshake
//!                                   │
//!                                   └─ Handshake ─→ verify proof, derive keys, dispatch
//! ```
//!
//! A background sweep task expires stale requests and feeds peer
//! failures back into the routing table. Nothing in this crate surfaces
//! an unrecoverable error for a hostile datagram: malformed input is
//! dropped and logged, and decryption failure is answered with a
//! challenge.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod message;
pub mod requests;
pub mod service;
pub mod session;
pub mod session_store;
pub mod transport;

pub use config::ConnectionOptions;
pub use error::ProtocolError;
pub use handlers::PacketDispatcher;
pub use identity::LocalIdentity;
pub use message::{MessageRequester, MessageResponder};
pub use requests::{CachedRequest, PendingRequest, RequestId, RequestManager};
pub use service::DiscoveryService;
pub use session::{Session, SessionRole};
pub use session_store::SessionStore;
pub use transport::{PacketTransport, UdpTransport};
