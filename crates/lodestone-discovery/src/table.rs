//! Kademlia routing table.
//!
//! Peers are stored in 256 buckets indexed by XOR distance from the
//! local identity. Each bucket holds up to [`K`] live entries ordered by
//! most-recently-seen, plus a bounded replacement cache of candidates
//! that arrived while the bucket was full. Repeated request failures
//! transition an entry to [`NodeStatus::Dead`], evicting it to the
//! replacement cache and promoting the freshest candidate.
//!
//! The table is safe for concurrent use; every operation is
//! independently atomic. It deliberately offers no way to reach into
//! bucket internals.

use crate::node_id::NodeId;
use crate::record::PeerRecord;
use std::collections::VecDeque;
use std::sync::RwLock;
use std::time::Instant;
use tracing::{debug, trace};

/// Maximum live entries per bucket.
pub const K: usize = 16;

/// Number of distance buckets.
pub const NUM_BUCKETS: usize = 256;

/// Routing table configuration.
///
/// All values have defaults; override through the builder.
#[derive(Clone, Debug)]
pub struct TableOptions {
    /// Interval between liveness probes of table entries, in ms.
    pub ping_interval_ms: u64,
    /// Interval between self-lookup table refreshes, in ms.
    pub refresh_interval_ms: u64,
    /// Wall-clock budget for one iterative lookup, in ms.
    pub lookup_timeout_ms: u64,
    /// Request failures tolerated before a peer is marked dead.
    pub max_allowed_failures: u32,
    /// Bound on each bucket's replacement cache.
    pub replacement_cache_size: usize,
    /// Concurrent probes per lookup round (alpha).
    pub concurrency_parameter: usize,
    /// Maximum lookup rounds.
    pub lookup_parallelism: usize,
    /// Records seeded into the table at startup.
    pub bootstrap_records: Vec<PeerRecord>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            ping_interval_ms: 5_000,
            refresh_interval_ms: 300_000,
            lookup_timeout_ms: 60_000,
            max_allowed_failures: 3,
            replacement_cache_size: 300,
            concurrency_parameter: 3,
            lookup_parallelism: 2,
            bootstrap_records: Vec::new(),
        }
    }
}

impl TableOptions {
    /// Start from defaults.
    #[must_use]
    pub fn builder() -> TableOptionsBuilder {
        TableOptionsBuilder {
            options: Self::default(),
        }
    }
}

/// Builder for [`TableOptions`].
pub struct TableOptionsBuilder {
    options: TableOptions,
}

impl TableOptionsBuilder {
    /// Set the liveness probe interval.
    #[must_use]
    pub fn ping_interval_ms(mut self, ms: u64) -> Self {
        self.options.ping_interval_ms = ms;
        self
    }

    /// Set the table refresh interval.
    #[must_use]
    pub fn refresh_interval_ms(mut self, ms: u64) -> Self {
        self.options.refresh_interval_ms = ms;
        self
    }

    /// Set the lookup wall-clock budget.
    #[must_use]
    pub fn lookup_timeout_ms(mut self, ms: u64) -> Self {
        self.options.lookup_timeout_ms = ms;
        self
    }

    /// Set the failure ceiling.
    #[must_use]
    pub fn max_allowed_failures(mut self, failures: u32) -> Self {
        self.options.max_allowed_failures = failures;
        self
    }

    /// Set the replacement cache bound.
    #[must_use]
    pub fn replacement_cache_size(mut self, size: usize) -> Self {
        self.options.replacement_cache_size = size;
        self
    }

    /// Set the lookup concurrency (alpha).
    #[must_use]
    pub fn concurrency_parameter(mut self, alpha: usize) -> Self {
        self.options.concurrency_parameter = alpha;
        self
    }

    /// Set the lookup round cap.
    #[must_use]
    pub fn lookup_parallelism(mut self, rounds: usize) -> Self {
        self.options.lookup_parallelism = rounds;
        self
    }

    /// Set the bootstrap record list.
    #[must_use]
    pub fn bootstrap_records(mut self, records: Vec<PeerRecord>) -> Self {
        self.options.bootstrap_records = records;
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> TableOptions {
        self.options
    }
}

/// Liveness state of a table entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStatus {
    /// Recently discovered, not yet contacted
    New,
    /// A request to this peer is in flight
    Pending,
    /// A session was established with this peer
    Connected,
    /// Failure ceiling reached or unreachable; candidate for replacement
    Dead,
}

/// Routing-table view of one peer.
#[derive(Clone, Debug)]
pub struct NodeTableEntry {
    /// The peer's signed record
    pub record: PeerRecord,
    /// Cached node id of the record
    pub id: NodeId,
    /// Current liveness state
    pub status: NodeStatus,
    /// Consecutive request failures since the last success
    pub failure_counter: u32,
    /// When this peer was last seen or refreshed
    pub last_seen: Instant,
}

impl NodeTableEntry {
    fn new(id: NodeId, record: PeerRecord) -> Self {
        Self {
            record,
            id,
            status: NodeStatus::New,
            failure_counter: 0,
            last_seen: Instant::now(),
        }
    }

    /// Build a fresh entry from a verified record.
    ///
    /// Returns `None` if the record fails validation. Used by the lookup
    /// to carry shortlist members that did not make it into a bucket.
    #[must_use]
    pub fn from_record(record: PeerRecord) -> Option<Self> {
        if !record.verify() {
            return None;
        }
        let id = record.node_id()?;
        Some(Self::new(id, record))
    }
}

#[derive(Default)]
struct KBucket {
    // Most-recently-seen first.
    entries: Vec<NodeTableEntry>,
    replacements: VecDeque<NodeTableEntry>,
}

impl KBucket {
    fn position(&self, id: &NodeId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == *id)
    }
}

/// The full peer database.
pub struct RoutingTable {
    self_id: NodeId,
    buckets: RwLock<Vec<KBucket>>,
    options: TableOptions,
}

impl RoutingTable {
    /// Create an empty table for the given local identity.
    #[must_use]
    pub fn new(self_id: NodeId, options: TableOptions) -> Self {
        let mut buckets = Vec::with_capacity(NUM_BUCKETS);
        buckets.resize_with(NUM_BUCKETS, KBucket::default);
        Self {
            self_id,
            buckets: RwLock::new(buckets),
            options,
        }
    }

    /// The local identity the table is centered on.
    #[must_use]
    pub fn self_id(&self) -> NodeId {
        self.self_id
    }

    /// The table's configuration.
    #[must_use]
    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    /// Insert a record or refresh the existing entry for its identity.
    ///
    /// Records failing signature validation (or describing the local
    /// identity) are dropped silently. If the target bucket is full, the
    /// peer lands in the bucket's replacement cache instead. Returns
    /// whether the peer was newly added to the live bucket.
    pub fn insert_or_update(&self, record: PeerRecord) -> bool {
        if !record.verify() {
            trace!("dropping record with invalid signature");
            return false;
        }
        let Some(id) = record.node_id() else {
            return false;
        };
        let Some(index) = self.self_id.bucket_index(&id) else {
            // Never hold the local identity.
            return false;
        };

        let mut buckets = self.buckets.write().expect("routing table lock poisoned");
        let bucket = &mut buckets[index];

        if let Some(pos) = bucket.position(&id) {
            let mut entry = bucket.entries.remove(pos);
            if record.seq() > entry.record.seq() {
                entry.record = record;
            }
            entry.last_seen = Instant::now();
            bucket.entries.insert(0, entry);
            return false;
        }

        let entry = NodeTableEntry::new(id, record);
        if bucket.entries.len() < K {
            debug!(node_id = %id, bucket = index, "added peer to routing table");
            bucket.entries.insert(0, entry);
            true
        } else {
            trace!(node_id = %id, bucket = index, "bucket full, caching replacement");
            bucket.replacements.push_back(entry);
            while bucket.replacements.len() > self.options.replacement_cache_size {
                bucket.replacements.pop_front();
            }
            false
        }
    }

    /// Fetch a copy of the entry for an identity.
    #[must_use]
    pub fn get_entry(&self, id: &NodeId) -> Option<NodeTableEntry> {
        let buckets = self.buckets.read().expect("routing table lock poisoned");
        let index = self.self_id.bucket_index(id)?;
        let bucket = &buckets[index];
        bucket.position(id).map(|pos| bucket.entries[pos].clone())
    }

    fn with_entry<F: FnOnce(&mut NodeTableEntry)>(&self, id: &NodeId, f: F) {
        let Some(index) = self.self_id.bucket_index(id) else {
            return;
        };
        let mut buckets = self.buckets.write().expect("routing table lock poisoned");
        let bucket = &mut buckets[index];
        if let Some(pos) = bucket.position(id) {
            f(&mut bucket.entries[pos]);
        }
    }

    /// Mark a peer as having a request in flight.
    pub fn mark_pending(&self, id: &NodeId) {
        self.with_entry(id, |entry| {
            if entry.status != NodeStatus::Connected {
                entry.status = NodeStatus::Pending;
            }
        });
    }

    /// Mark a peer as connected and reset its failure count.
    pub fn mark_connected(&self, id: &NodeId) {
        self.with_entry(id, |entry| {
            entry.status = NodeStatus::Connected;
            entry.failure_counter = 0;
            entry.last_seen = Instant::now();
        });
    }

    /// Mark a peer dead, evicting it to the replacement cache and
    /// promoting the freshest candidate if one exists.
    pub fn mark_dead(&self, id: &NodeId) {
        let Some(index) = self.self_id.bucket_index(id) else {
            return;
        };
        let mut buckets = self.buckets.write().expect("routing table lock poisoned");
        Self::evict(&mut buckets[index], id, self.options.replacement_cache_size);
    }

    /// Record one request failure for a peer.
    ///
    /// Crossing the configured ceiling transitions the entry to Dead and
    /// frees the bucket slot for a replacement candidate. This is the
    /// protocol's peer-level retry/backoff mechanism.
    pub fn increase_failure_counter(&self, id: &NodeId) {
        let Some(index) = self.self_id.bucket_index(id) else {
            return;
        };
        let mut buckets = self.buckets.write().expect("routing table lock poisoned");
        let bucket = &mut buckets[index];
        let Some(pos) = bucket.position(id) else {
            return;
        };

        let entry = &mut bucket.entries[pos];
        entry.failure_counter += 1;
        trace!(node_id = %id, failures = entry.failure_counter, "peer failure recorded");

        if entry.failure_counter >= self.options.max_allowed_failures {
            Self::evict(bucket, id, self.options.replacement_cache_size);
        }
    }

    fn evict(bucket: &mut KBucket, id: &NodeId, cache_size: usize) {
        let Some(pos) = bucket.position(id) else {
            return;
        };
        let mut dead = bucket.entries.remove(pos);
        dead.status = NodeStatus::Dead;
        debug!(node_id = %id, "peer marked dead, evicted to replacement cache");

        // Dead peers queue at the stale end so live candidates win.
        bucket.replacements.push_front(dead);
        while bucket.replacements.len() > cache_size {
            bucket.replacements.pop_front();
        }

        // Promote the most-recently-seen live candidate.
        let candidate = bucket
            .replacements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.status != NodeStatus::Dead)
            .max_by_key(|(_, e)| e.last_seen)
            .map(|(i, _)| i);
        if let Some(promoted_pos) = candidate {
            if let Some(mut promoted) = bucket.replacements.remove(promoted_pos) {
                debug!(node_id = %promoted.id, "promoted replacement candidate");
                promoted.status = NodeStatus::New;
                promoted.failure_counter = 0;
                bucket.entries.push(promoted);
            }
        }
    }

    /// The `count` live entries closest to `target`, XOR-distance
    /// ascending, ties broken by most-recently-seen.
    #[must_use]
    pub fn closest_to(&self, target: &NodeId, count: usize) -> Vec<NodeTableEntry> {
        let buckets = self.buckets.read().expect("routing table lock poisoned");
        let mut entries: Vec<NodeTableEntry> = buckets
            .iter()
            .flat_map(|b| b.entries.iter())
            .filter(|e| e.status != NodeStatus::Dead)
            .cloned()
            .collect();

        entries.sort_by(|a, b| {
            a.id.distance(target)
                .cmp(&b.id.distance(target))
                .then_with(|| b.last_seen.cmp(&a.last_seen))
        });
        entries.truncate(count);
        entries
    }

    /// Number of live entries across all buckets.
    #[must_use]
    pub fn live_count(&self) -> usize {
        let buckets = self.buckets.read().expect("routing table lock poisoned");
        buckets.iter().map(|b| b.entries.len()).sum()
    }

    /// Number of cached replacement candidates across all buckets.
    #[must_use]
    pub fn replacement_count(&self) -> usize {
        let buckets = self.buckets.read().expect("routing table lock poisoned");
        buckets.iter().map(|b| b.replacements.len()).sum()
    }
}
