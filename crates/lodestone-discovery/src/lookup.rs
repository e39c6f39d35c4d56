//! Iterative closest-node lookup.
//!
//! The lookup keeps a shortlist seeded from the local table, queries up
//! to alpha unqueried shortlist members in parallel each round through a
//! [`NodeQuerier`], merges returned records back into the shortlist (and
//! the table), and stops on the first round that gets no closer to the
//! target - or at the round cap or wall-clock budget, whichever comes
//! first.

use crate::node_id::NodeId;
use crate::record::PeerRecord;
use crate::table::{K, NodeTableEntry, RoutingTable};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, trace};

/// The external message layer driving discovery probes.
///
/// Implementations send a closest-node request to `peer` and return
/// whatever records came back; an unreachable peer simply yields an
/// empty list (the request manager separately tracks that failure).
pub trait NodeQuerier: Send + Sync + 'static {
    /// Ask `peer` for the nodes it knows closest to `target`.
    fn find_closest(
        &self,
        peer: NodeTableEntry,
        target: NodeId,
    ) -> impl Future<Output = Vec<PeerRecord>> + Send;
}

impl RoutingTable {
    /// Run an iterative lookup for the nodes closest to `target`.
    ///
    /// Discovered records are merged into the table as a side effect.
    /// Returns the final shortlist, XOR-distance ascending, at most
    /// [`K`] entries.
    pub async fn lookup<Q: NodeQuerier>(
        &self,
        target: NodeId,
        querier: Arc<Q>,
    ) -> Vec<NodeTableEntry> {
        let options = self.options();
        let alpha = options.concurrency_parameter;
        let max_rounds = options.lookup_parallelism;
        let deadline = Instant::now() + Duration::from_millis(options.lookup_timeout_ms);

        let mut queried: HashSet<NodeId> = HashSet::new();
        let mut shortlist = self.closest_to(&target, K);
        let mut best = shortlist.first().map(|e| e.id.distance(&target));

        for round in 0..max_rounds {
            let to_query: Vec<NodeTableEntry> = shortlist
                .iter()
                .filter(|e| !queried.contains(&e.id))
                .take(alpha)
                .cloned()
                .collect();

            if to_query.is_empty() {
                trace!(round, "lookup exhausted shortlist");
                break;
            }

            let mut probes = JoinSet::new();
            for peer in to_query {
                queried.insert(peer.id);
                let querier = Arc::clone(&querier);
                probes.spawn(async move { querier.find_closest(peer, target).await });
            }

            let mut discovered: Vec<PeerRecord> = Vec::new();
            let mut timed_out = false;
            loop {
                match timeout_at(deadline, probes.join_next()).await {
                    Ok(Some(Ok(records))) => discovered.extend(records),
                    Ok(Some(Err(_))) => {}
                    Ok(None) => break,
                    Err(_) => {
                        debug!(round, "lookup hit wall-clock budget");
                        probes.abort_all();
                        timed_out = true;
                        break;
                    }
                }
            }

            for record in discovered {
                if !record.verify() {
                    continue;
                }
                let Some(id) = record.node_id() else {
                    continue;
                };
                if id == self.self_id() {
                    continue;
                }
                self.insert_or_update(record.clone());
                if shortlist.iter().all(|e| e.id != id) {
                    let entry = self
                        .get_entry(&id)
                        .or_else(|| NodeTableEntry::from_record(record));
                    if let Some(entry) = entry {
                        shortlist.push(entry);
                    }
                }
            }

            shortlist.sort_by(|a, b| a.id.distance(&target).cmp(&b.id.distance(&target)));
            shortlist.truncate(K);

            let new_best = shortlist.first().map(|e| e.id.distance(&target));
            let progressed = match (best, new_best) {
                (Some(old), Some(new)) => new < old,
                (None, Some(_)) => true,
                _ => false,
            };
            best = new_best;

            if timed_out {
                break;
            }
            if !progressed {
                trace!(round, "lookup round made no progress, terminating");
                break;
            }
        }

        shortlist
    }
}
