//! Request lifecycle management.
//!
//! Outbound requests move through `Cached` (no session yet) or `Pending`
//! (sent, awaiting reply) states in concurrent maps keyed by request id.
//! A single background sweep task expires stale requests on a timer and
//! feeds the failures back into routing-table peer health. The handshake
//! interaction cache correlates the nonce of an outgoing packet with the
//! peer it was addressed to, so a later WHOAREYOU challenge can be
//! matched to its target.
//!
//! Handlers insert and remove entries concurrently with the sweep; every
//! operation is independently atomic, and the sweep iterates over
//! point-in-time snapshots rather than the live maps. The manager does
//! not make read-then-write sequences atomic for callers - a racing
//! duplicate insertion silently overwrites, which is benign here.

use crate::config::ConnectionOptions;
use dashmap::DashMap;
use lodestone_discovery::{NodeId, RoutingTable};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outbound request identifier.
///
/// Fixed-size so the concurrent maps hash by value, never by reference
/// identity.
pub type RequestId = [u8; 8];

/// Ceiling at which the handshake interaction cache is pruned.
const INTERACTION_CACHE_CEILING: usize = 500;

/// How many of the oldest interactions one pruning pass removes. A
/// generous batch so the cache does not thrash at the ceiling.
const INTERACTION_EVICTION_BATCH: usize = 400;

/// An outbound request that has been sent and awaits replies.
#[derive(Clone, Debug)]
pub struct PendingRequest {
    /// Target peer
    pub node_id: NodeId,
    /// The sent message, kept for retry/diagnostic purposes
    pub message: Vec<u8>,
    /// Fulfillment flag set when a reply arrives
    pub is_fulfilled: bool,
    /// Replies observed so far
    pub responses_count: u32,
    /// Replies expected before the request is complete (1 for most kinds)
    pub max_responses: u32,
    created_at: Instant,
}

impl PendingRequest {
    /// A single-response request.
    #[must_use]
    pub fn new(node_id: NodeId, message: Vec<u8>) -> Self {
        Self::with_max_responses(node_id, message, 1)
    }

    /// A request expecting `max_responses` replies (closest-node queries
    /// answer with several datagrams).
    #[must_use]
    pub fn with_max_responses(node_id: NodeId, message: Vec<u8>, max_responses: u32) -> Self {
        Self {
            node_id,
            message,
            is_fulfilled: false,
            responses_count: 0,
            max_responses,
            created_at: Instant::now(),
        }
    }

    /// Time since the request was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// An outbound request deferred until a session exists.
#[derive(Clone, Debug)]
pub struct CachedRequest {
    /// Target peer
    pub node_id: NodeId,
    /// The message to send once a session completes
    pub message: Vec<u8>,
    created_at: Instant,
}

impl CachedRequest {
    /// Create a cached request.
    #[must_use]
    pub fn new(node_id: NodeId, message: Vec<u8>) -> Self {
        Self {
            node_id,
            message,
            created_at: Instant::now(),
        }
    }

    /// Time since the request was cached.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }
}

#[derive(Clone)]
struct HandshakeInteraction {
    node_id: NodeId,
    created_at: Instant,
}

/// Owns the pending/cached request maps and the background sweep.
pub struct RequestManager {
    pending: DashMap<RequestId, PendingRequest>,
    cached: DashMap<RequestId, CachedRequest>,
    interactions: DashMap<[u8; 12], HandshakeInteraction>,
    table: Arc<RoutingTable>,
    options: ConnectionOptions,
    running: AtomicBool,
    shutdown: Notify,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl RequestManager {
    /// Create a manager feeding failures into `table`.
    #[must_use]
    pub fn new(table: Arc<RoutingTable>, options: ConnectionOptions) -> Self {
        Self {
            pending: DashMap::new(),
            cached: DashMap::new(),
            interactions: DashMap::new(),
            table,
            options,
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
            sweep_task: Mutex::new(None),
        }
    }

    /// Number of pending requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of cached requests.
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.cached.len()
    }

    /// Number of cached handshake interactions.
    #[must_use]
    pub fn interaction_count(&self) -> usize {
        self.interactions.len()
    }

    /// Insert or replace a pending request.
    ///
    /// On first insertion the target peer is marked Pending in the
    /// routing table. Returns whether the id was new.
    pub fn add_pending_request(&self, id: RequestId, request: PendingRequest) -> bool {
        let node_id = request.node_id;
        let is_new = !self.pending.contains_key(&id);
        self.pending.insert(id, request);

        if is_new {
            self.table.mark_pending(&node_id);
            debug!(request_id = %hex::encode(id), node_id = %node_id, "added pending request");
        }
        is_new
    }

    /// Insert or replace a cached request awaiting a session.
    ///
    /// Returns whether the id was new.
    pub fn add_cached_request(&self, id: RequestId, request: CachedRequest) -> bool {
        let node_id = request.node_id;
        let is_new = !self.cached.contains_key(&id);
        self.cached.insert(id, request);

        if is_new {
            self.table.mark_pending(&node_id);
            debug!(request_id = %hex::encode(id), node_id = %node_id, "added cached request");
        }
        is_new
    }

    /// Fetch a copy of a pending request.
    #[must_use]
    pub fn get_pending_request(&self, id: &RequestId) -> Option<PendingRequest> {
        self.pending.get(id).map(|entry| entry.value().clone())
    }

    /// Find any pending request addressed to a peer.
    #[must_use]
    pub fn get_pending_request_by_node_id(&self, node_id: &NodeId) -> Option<PendingRequest> {
        self.pending
            .iter()
            .find(|entry| entry.value().node_id == *node_id)
            .map(|entry| entry.value().clone())
    }

    /// Whether a cached request exists for this id.
    #[must_use]
    pub fn contains_cached_request(&self, id: &RequestId) -> bool {
        self.cached.contains_key(id)
    }

    /// Flag a pending request fulfilled and count the response.
    ///
    /// Removal happens on the next sweep tick: immediately for
    /// single-response kinds, or once the response count reaches the
    /// declared maximum for multi-response kinds. Returns the updated
    /// request, or `None` for an unknown id.
    pub fn mark_request_as_fulfilled(&self, id: &RequestId) -> Option<PendingRequest> {
        let mut entry = self.pending.get_mut(id)?;
        entry.is_fulfilled = true;
        entry.responses_count += 1;
        Some(entry.value().clone())
    }

    /// Pop and return a cached request once its session completed.
    pub fn mark_cached_request_as_fulfilled(&self, id: &RequestId) -> Option<CachedRequest> {
        debug!(request_id = %hex::encode(id), "marking cached request as fulfilled");
        self.cached.remove(id).map(|(_, request)| request)
    }

    /// Pop any cached request addressed to a peer, for promotion after a
    /// handshake completes.
    pub fn pop_cached_request_by_node_id(
        &self,
        node_id: &NodeId,
    ) -> Option<(RequestId, CachedRequest)> {
        let id = self
            .cached
            .iter()
            .find(|entry| entry.value().node_id == *node_id)
            .map(|entry| *entry.key())?;
        self.cached.remove(&id)
    }

    /// Remember which peer an outgoing packet nonce was addressed to, so
    /// a WHOAREYOU challenge echoing that nonce can be correlated.
    ///
    /// At the cache ceiling the oldest entries are evicted in bulk
    /// before admission.
    pub fn add_cached_handshake_interaction(&self, nonce: [u8; 12], node_id: NodeId) {
        if self.interactions.len() >= INTERACTION_CACHE_CEILING {
            let mut by_age: Vec<([u8; 12], Instant)> = self
                .interactions
                .iter()
                .map(|entry| (*entry.key(), entry.value().created_at))
                .collect();
            by_age.sort_by_key(|(_, created_at)| *created_at);

            for (stale, _) in by_age.into_iter().take(INTERACTION_EVICTION_BATCH) {
                self.interactions.remove(&stale);
            }
            debug!("pruned handshake interaction cache");
        }

        self.interactions.insert(
            nonce,
            HandshakeInteraction {
                node_id,
                created_at: Instant::now(),
            },
        );
    }

    /// Resolve a challenge nonce to its target peer. Single-use: the
    /// entry is consumed on read.
    #[must_use]
    pub fn get_cached_handshake_interaction(&self, nonce: &[u8; 12]) -> Option<NodeId> {
        match self.interactions.remove(nonce) {
            Some((_, interaction)) => Some(interaction.node_id),
            None => {
                warn!("no handshake interaction for packet nonce, ignoring challenge");
                None
            }
        }
    }

    /// Start the background sweep task.
    pub fn start(self: &Arc<Self>) {
        info!("starting request manager sweep");
        self.running.store(true, Ordering::SeqCst);

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move { manager.run_sweep().await });

        let mut slot = self.sweep_task.lock().expect("sweep task lock poisoned");
        *slot = Some(handle);
    }

    async fn run_sweep(self: Arc<Self>) {
        let interval = Duration::from_millis(self.options.sweep_interval_ms);
        loop {
            tokio::select! {
                () = self.shutdown.notified() => {}
                () = tokio::time::sleep(interval) => {}
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            // One tick is purely synchronous: a cancellation signal can
            // only land between ticks, never mid-mutation.
            self.sweep_tick();
        }
    }

    /// Stop the sweep and wait for it to finish its current tick.
    pub async fn stop(&self) {
        info!("stopping request manager sweep");
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();

        let handle = {
            let mut slot = self.sweep_task.lock().expect("sweep task lock poisoned");
            slot.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("request manager sweep stopped");
    }

    fn sweep_tick(&self) {
        self.check_timeouts();
        self.remove_fulfilled();
    }

    fn check_timeouts(&self) {
        let timeout = Duration::from_millis(self.options.request_timeout_ms);

        // Snapshot before iterating: handlers mutate these maps while the
        // sweep runs.
        let pending: Vec<(RequestId, PendingRequest)> = self
            .pending
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        let cached: Vec<(RequestId, CachedRequest)> = self
            .cached
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        for (id, request) in pending {
            if request.elapsed() <= timeout {
                continue;
            }
            debug!(node_id = %request.node_id, "pending request timed out");
            self.pending.remove(&id);

            let Some(entry) = self.table.get_entry(&request.node_id) else {
                continue;
            };
            if entry.failure_counter >= self.table.options().max_allowed_failures {
                debug!(node_id = %request.node_id, "peer already at failure ceiling");
            } else {
                self.table.increase_failure_counter(&request.node_id);
            }
        }

        for (id, request) in cached {
            if request.elapsed() <= timeout {
                continue;
            }
            debug!(node_id = %request.node_id, "cached request timed out, no session was reachable");
            self.cached.remove(&id);

            if self.table.get_entry(&request.node_id).is_some() {
                self.table.mark_dead(&request.node_id);
            } else {
                debug!(node_id = %request.node_id, "timed-out peer not in routing table");
            }
        }
    }

    fn remove_fulfilled(&self) {
        let fulfilled: Vec<(RequestId, PendingRequest)> = self
            .pending
            .iter()
            .filter(|entry| entry.value().is_fulfilled)
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        for (id, request) in fulfilled {
            if request.max_responses > 1 && request.responses_count < request.max_responses {
                continue;
            }
            self.pending.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_discovery::{NodeStatus, PeerRecord, RecordBuilder, TableOptions};
    use lodestone_crypto::sig::SigningKey;
    use rand_core::OsRng;

    fn signed_record() -> PeerRecord {
        let key = SigningKey::generate(&mut OsRng);
        RecordBuilder::new(1).sign(&key).unwrap()
    }

    fn manager(timeout_ms: u64) -> (Arc<RequestManager>, Arc<RoutingTable>) {
        let table = Arc::new(RoutingTable::new(
            NodeId::random(),
            TableOptions::default(),
        ));
        let options = ConnectionOptions::builder()
            .request_timeout_ms(timeout_ms)
            .sweep_interval_ms(20)
            .build();
        (
            Arc::new(RequestManager::new(Arc::clone(&table), options)),
            table,
        )
    }

    #[test]
    fn test_add_pending_marks_peer_pending() {
        let (manager, table) = manager(2_000);
        let record = signed_record();
        let node_id = record.node_id().unwrap();
        table.insert_or_update(record);

        assert!(manager.add_pending_request([1u8; 8], PendingRequest::new(node_id, vec![1])));
        assert_eq!(table.get_entry(&node_id).unwrap().status, NodeStatus::Pending);

        // Replacing an existing id is not a new insertion.
        assert!(!manager.add_pending_request([1u8; 8], PendingRequest::new(node_id, vec![2])));
        assert_eq!(manager.pending_count(), 1);

        assert!(manager.get_pending_request(&[1u8; 8]).is_some());
        assert_eq!(
            manager
                .get_pending_request_by_node_id(&node_id)
                .unwrap()
                .message,
            vec![2]
        );
    }

    #[test]
    fn test_pending_timeout_increases_failure_counter_once() {
        let (manager, table) = manager(0);
        let record = signed_record();
        let node_id = record.node_id().unwrap();
        table.insert_or_update(record);

        manager.add_pending_request([1u8; 8], PendingRequest::new(node_id, vec![]));
        std::thread::sleep(Duration::from_millis(5));
        manager.sweep_tick();

        assert_eq!(manager.pending_count(), 0);
        assert_eq!(table.get_entry(&node_id).unwrap().failure_counter, 1);
    }

    #[test]
    fn test_pending_within_timeout_left_alone() {
        let (manager, table) = manager(60_000);
        let record = signed_record();
        let node_id = record.node_id().unwrap();
        table.insert_or_update(record);

        manager.add_pending_request([1u8; 8], PendingRequest::new(node_id, vec![]));
        manager.sweep_tick();

        assert_eq!(manager.pending_count(), 1);
        assert_eq!(table.get_entry(&node_id).unwrap().failure_counter, 0);
    }

    #[test]
    fn test_cached_timeout_marks_peer_dead() {
        let (manager, table) = manager(0);
        let record = signed_record();
        let node_id = record.node_id().unwrap();
        table.insert_or_update(record);

        manager.add_cached_request([2u8; 8], CachedRequest::new(node_id, vec![]));
        std::thread::sleep(Duration::from_millis(5));
        manager.sweep_tick();

        assert_eq!(manager.cached_count(), 0);
        // mark_dead evicts the entry from the live bucket.
        assert!(table.get_entry(&node_id).is_none());
    }

    #[test]
    fn test_fulfilled_single_response_removed_by_sweep() {
        let (manager, _table) = manager(60_000);
        let node_id = NodeId::random();

        manager.add_pending_request([3u8; 8], PendingRequest::new(node_id, vec![]));
        assert!(manager.mark_request_as_fulfilled(&[3u8; 8]).is_some());

        manager.sweep_tick();
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_multi_response_retained_until_max() {
        let (manager, _table) = manager(60_000);
        let node_id = NodeId::random();

        manager.add_pending_request(
            [4u8; 8],
            PendingRequest::with_max_responses(node_id, vec![], 3),
        );

        manager.mark_request_as_fulfilled(&[4u8; 8]);
        manager.sweep_tick();
        assert_eq!(manager.pending_count(), 1, "one of three responses seen");

        manager.mark_request_as_fulfilled(&[4u8; 8]);
        manager.sweep_tick();
        assert_eq!(manager.pending_count(), 1, "two of three responses seen");

        manager.mark_request_as_fulfilled(&[4u8; 8]);
        manager.sweep_tick();
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_cached_request_fulfillment_pops() {
        let (manager, _table) = manager(60_000);
        let node_id = NodeId::random();

        manager.add_cached_request([5u8; 8], CachedRequest::new(node_id, vec![9]));
        assert!(manager.contains_cached_request(&[5u8; 8]));

        let popped = manager.mark_cached_request_as_fulfilled(&[5u8; 8]).unwrap();
        assert_eq!(popped.message, vec![9]);
        assert!(!manager.contains_cached_request(&[5u8; 8]));
        assert!(manager.mark_cached_request_as_fulfilled(&[5u8; 8]).is_none());
    }

    #[test]
    fn test_handshake_interaction_single_use() {
        let (manager, _table) = manager(2_000);
        let node_id = NodeId::random();
        let nonce = [7u8; 12];

        manager.add_cached_handshake_interaction(nonce, node_id);

        assert_eq!(manager.get_cached_handshake_interaction(&nonce), Some(node_id));
        assert_eq!(manager.get_cached_handshake_interaction(&nonce), None);
    }

    #[test]
    fn test_handshake_interaction_bulk_eviction() {
        let (manager, _table) = manager(2_000);

        for i in 0..INTERACTION_CACHE_CEILING {
            let mut nonce = [0u8; 12];
            nonce[..8].copy_from_slice(&(i as u64).to_be_bytes());
            manager.add_cached_handshake_interaction(nonce, NodeId::random());
        }
        assert_eq!(manager.interaction_count(), INTERACTION_CACHE_CEILING);

        // The insert that finds the cache at its ceiling evicts the
        // oldest batch before admitting the new entry.
        manager.add_cached_handshake_interaction([0xFF; 12], NodeId::random());
        assert_eq!(
            manager.interaction_count(),
            INTERACTION_CACHE_CEILING - INTERACTION_EVICTION_BATCH + 1
        );
        // The newest entry survived the pruning.
        assert!(manager.get_cached_handshake_interaction(&[0xFF; 12]).is_some());
    }

    #[tokio::test]
    async fn test_sweep_task_lifecycle() {
        let (manager, table) = manager(0);
        let record = signed_record();
        let node_id = record.node_id().unwrap();
        table.insert_or_update(record);

        manager.add_pending_request([6u8; 8], PendingRequest::new(node_id, vec![]));
        manager.start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(manager.pending_count(), 0);

        manager.stop().await;
    }
}
