//! # Lodestone Discovery
//!
//! The peer database for the Lodestone protocol:
//!
//! - 256-bit node identifiers derived from identity keys using BLAKE3
//! - XOR distance metric for Kademlia routing
//! - Signed, versioned peer records (sorted key-value entries with a
//!   detached Ed25519 signature)
//! - K-bucket routing table with health tracking, failure-count
//!   eviction, and a bounded replacement cache
//! - Iterative closest-node lookup with alpha parallelism
//!
//! The routing table is safe for concurrent use from many packet-handling
//! tasks; all mutation goes through its documented operations.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lookup;
pub mod node_id;
pub mod record;
pub mod table;

pub use lookup::NodeQuerier;
pub use node_id::{Distance, NodeId};
pub use record::{PeerRecord, RecordBuilder, RecordError};
pub use table::{K, NUM_BUCKETS, NodeStatus, NodeTableEntry, RoutingTable, TableOptions};
