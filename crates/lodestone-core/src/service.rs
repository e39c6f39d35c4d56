//! Service wiring: receive loop, background tasks, lifecycle.
//!
//! Startup seeds the routing table from the configured bootstrap
//! records, starts the request sweep, and spawns the receive loop (one
//! task per received datagram). Shutdown reverses the order: the receive
//! loop drains first, then the sweep finishes its in-flight tick before
//! the shared maps are released.

use crate::config::ConnectionOptions;
use crate::error::ProtocolError;
use crate::handlers::PacketDispatcher;
use crate::identity::LocalIdentity;
use crate::message::{MessageRequester, MessageResponder};
use crate::requests::RequestManager;
use crate::session_store::SessionStore;
use crate::transport::PacketTransport;
use lodestone_discovery::{RoutingTable, TableOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A running discovery node: dispatcher plus background tasks.
pub struct DiscoveryService<R, M, T> {
    dispatcher: Arc<PacketDispatcher<R, M, T>>,
    table: Arc<RoutingTable>,
    requests: Arc<RequestManager>,
    transport: Arc<T>,
    running: Arc<AtomicBool>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl<R, M, T> DiscoveryService<R, M, T>
where
    R: MessageResponder + 'static,
    M: MessageRequester + 'static,
    T: PacketTransport + 'static,
{
    /// Assemble a service from its collaborators.
    #[must_use]
    pub fn new(
        identity: LocalIdentity,
        table_options: TableOptions,
        connection_options: ConnectionOptions,
        responder: Arc<R>,
        requester: Arc<M>,
        transport: Arc<T>,
    ) -> Self {
        let identity = Arc::new(identity);
        let table = Arc::new(RoutingTable::new(identity.node_id(), table_options));
        let sessions = Arc::new(SessionStore::new());
        let requests = Arc::new(RequestManager::new(
            Arc::clone(&table),
            connection_options,
        ));
        let dispatcher = Arc::new(PacketDispatcher::new(
            identity,
            Arc::clone(&table),
            sessions,
            Arc::clone(&requests),
            responder,
            requester,
            Arc::clone(&transport),
        ));

        Self {
            dispatcher,
            table,
            requests,
            transport,
            running: Arc::new(AtomicBool::new(false)),
            recv_task: Mutex::new(None),
        }
    }

    /// The packet dispatcher (also the outbound request path).
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<PacketDispatcher<R, M, T>> {
        &self.dispatcher
    }

    /// The routing table.
    #[must_use]
    pub fn table(&self) -> &Arc<RoutingTable> {
        &self.table
    }

    /// The request manager.
    #[must_use]
    pub fn requests(&self) -> &Arc<RequestManager> {
        &self.requests
    }

    /// Seed bootstrap records, start the sweep, and spawn the receive
    /// loop.
    pub fn start(&self) {
        let bootstrap = self.table.options().bootstrap_records.clone();
        let mut seeded = 0usize;
        for record in bootstrap {
            if self.table.insert_or_update(record) {
                seeded += 1;
            }
        }
        info!(seeded, "seeded routing table from bootstrap records");

        self.requests.start();
        self.running.store(true, Ordering::SeqCst);

        let dispatcher = Arc::clone(&self.dispatcher);
        let transport = Arc::clone(&self.transport);
        let running = Arc::clone(&self.running);

        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            loop {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                match tokio::time::timeout(
                    Duration::from_millis(100),
                    transport.recv_from(&mut buf),
                )
                .await
                {
                    Ok(Ok((len, from))) => {
                        let data = buf[..len].to_vec();
                        let dispatcher = Arc::clone(&dispatcher);
                        tokio::spawn(async move {
                            dispatcher.dispatch(&data, from).await;
                        });
                    }
                    Ok(Err(error)) => warn!(%error, "error receiving packet"),
                    Err(_) => {
                        // Receive timeout: loop to re-check the running flag.
                    }
                }
            }
        });

        let mut slot = self.recv_task.lock().expect("recv task lock poisoned");
        *slot = Some(handle);
        info!("discovery service started");
    }

    /// Stop the receive loop, then the sweep. Returns once both tasks
    /// have exited.
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);

        let handle = {
            let mut slot = self.recv_task.lock().expect("recv task lock poisoned");
            slot.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        // Sweep last: it must not outlive a tick while the maps go away.
        self.requests.stop().await;
        info!("discovery service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::{ProbeRequester, RecordingResponder};
    use crate::transport::UdpTransport;
    use lodestone_discovery::RecordBuilder;
    use lodestone_crypto::sig::SigningKey;
    use rand_core::OsRng;
    use tokio::sync::Mutex as AsyncMutex;

    #[tokio::test]
    async fn test_start_seeds_bootstrap_and_shuts_down_cleanly() {
        let bootstrap = RecordBuilder::new(1)
            .sign(&SigningKey::generate(&mut OsRng))
            .unwrap();

        let identity = LocalIdentity::generate("127.0.0.1:9000".parse().unwrap()).unwrap();
        let transport = Arc::new(
            UdpTransport::bind("127.0.0.1:0".parse().unwrap())
                .await
                .unwrap(),
        );
        let responder = Arc::new(RecordingResponder {
            received: AsyncMutex::new(Vec::new()),
            replies: vec![],
        });

        let service = DiscoveryService::new(
            identity,
            TableOptions::builder()
                .bootstrap_records(vec![bootstrap])
                .build(),
            ConnectionOptions::default(),
            responder,
            Arc::new(ProbeRequester),
            transport,
        );

        service.start();
        assert_eq!(service.table().live_count(), 1);

        service.shutdown().await;
    }
}
