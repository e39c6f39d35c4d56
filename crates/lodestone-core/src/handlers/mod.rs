//! Packet handling and dispatch.
//!
//! One [`PacketDispatcher`] per node orchestrates the codec, session
//! store, routing table and request manager for every received datagram,
//! and owns the outbound request path. Handler logic for each packet
//! type lives in its own module; all of it follows one rule for hostile
//! input: log and drop, never fail the caller.

mod handshake;
mod ordinary;
mod who_are_you;

use crate::error::ProtocolError;
use crate::identity::LocalIdentity;
use crate::message::{MessageRequester, MessageResponder};
use crate::requests::{CachedRequest, PendingRequest, RequestId, RequestManager};
use crate::session::{Session, SessionRole};
use crate::session_store::SessionStore;
use crate::transport::PacketTransport;
use lodestone_crypto::random;
use lodestone_discovery::{NodeId, NodeTableEntry, RoutingTable};
use lodestone_wire::PacketFlag;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Routes each received datagram to the handler for its packet type.
pub struct PacketDispatcher<R, M, T> {
    identity: Arc<LocalIdentity>,
    table: Arc<RoutingTable>,
    sessions: Arc<SessionStore>,
    requests: Arc<RequestManager>,
    responder: Arc<R>,
    requester: Arc<M>,
    transport: Arc<T>,
}

impl<R, M, T> PacketDispatcher<R, M, T>
where
    R: MessageResponder,
    M: MessageRequester,
    T: PacketTransport,
{
    /// Wire up a dispatcher. Every collaborator is passed in explicitly;
    /// the dispatcher holds no ambient state.
    #[must_use]
    pub fn new(
        identity: Arc<LocalIdentity>,
        table: Arc<RoutingTable>,
        sessions: Arc<SessionStore>,
        requests: Arc<RequestManager>,
        responder: Arc<R>,
        requester: Arc<M>,
        transport: Arc<T>,
    ) -> Self {
        Self {
            identity,
            table,
            sessions,
            requests,
            responder,
            requester,
            transport,
        }
    }

    /// The routing table this dispatcher feeds.
    #[must_use]
    pub fn table(&self) -> &Arc<RoutingTable> {
        &self.table
    }

    /// The request manager this dispatcher feeds.
    #[must_use]
    pub fn requests(&self) -> &Arc<RequestManager> {
        &self.requests
    }

    /// The session store.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Process one received datagram.
    ///
    /// Malformed packets and handler failures are logged and dropped;
    /// this never returns an error to the receive loop.
    pub async fn dispatch(&self, packet: &[u8], from: SocketAddr) {
        let header = match lodestone_wire::static_header(
            self.identity.node_id().as_bytes(),
            packet,
        ) {
            Ok(header) => header,
            Err(error) => {
                debug!(%from, %error, "dropping malformed packet");
                return;
            }
        };

        let result = match header.flag() {
            PacketFlag::Ordinary => self.handle_ordinary(&header, packet, from).await,
            PacketFlag::WhoAreYou => self.handle_who_are_you(&header, packet, from).await,
            PacketFlag::Handshake => self.handle_handshake(&header, packet, from).await,
        };

        if let Err(error) = result {
            debug!(%from, flag = ?header.flag(), %error, "packet handling failed");
        }
    }

    /// Send an application message to a peer.
    ///
    /// With a live session the message goes out as an Ordinary packet
    /// and a pending request is registered. Without one, the request is
    /// cached and a random-payload packet is sent to provoke a WHOAREYOU
    /// challenge; the packet's nonce is remembered so the challenge can
    /// be correlated back to this peer.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on encryption or transport failure.
    pub async fn send_message(
        &self,
        dest: NodeId,
        endpoint: SocketAddr,
        request_id: RequestId,
        message: Vec<u8>,
        max_responses: u32,
    ) -> Result<(), ProtocolError> {
        if let Some(session) = self.sessions.get(&dest) {
            let mut session = session.lock().await;
            if session.is_established() {
                self.requests.add_pending_request(
                    request_id,
                    PendingRequest::with_max_responses(dest, message.clone(), max_responses),
                );
                self.send_session_message(&mut session, dest, endpoint, &message)
                    .await?;
                return Ok(());
            }
        }

        self.requests
            .add_cached_request(request_id, CachedRequest::new(dest, message));

        let iv = random::random_16()?;
        let mut nonce = [0u8; 12];
        random::fill_random(&mut nonce)?;
        let (mut packet, _header) = lodestone_wire::build_ordinary_packet(
            dest.as_bytes(),
            *self.identity.node_id().as_bytes(),
            iv,
            nonce,
        )?;
        // Random filler stands in for a message we cannot encrypt yet.
        let mut filler = [0u8; 44];
        random::fill_random(&mut filler)?;
        packet.extend_from_slice(&filler);

        self.requests.add_cached_handshake_interaction(nonce, dest);
        self.transport.send_to(&packet, endpoint).await?;
        debug!(node_id = %dest, %endpoint, "sent random packet to provoke challenge");
        Ok(())
    }

    /// Issue a WHOAREYOU challenge and open the Recipient-role session
    /// that snapshots the challenge data.
    pub(crate) async fn send_who_are_you(
        &self,
        request_nonce: [u8; 12],
        dest_id: NodeId,
        entry: Option<&NodeTableEntry>,
        endpoint: SocketAddr,
    ) -> Result<(), ProtocolError> {
        let iv = random::random_16()?;
        let id_nonce = random::random_16()?;
        let record_seq = entry.map_or(0, |e| e.record.seq());

        let (packet, header) = lodestone_wire::build_who_are_you_packet(
            dest_id.as_bytes(),
            request_nonce,
            id_nonce,
            record_seq,
            iv,
        )?;

        let mut challenge_data = Vec::with_capacity(iv.len() + header.encoded_len());
        challenge_data.extend_from_slice(&iv);
        challenge_data.extend_from_slice(&header.encode());

        let guard = self.sessions.handshake_guard(&dest_id);
        let _guard = guard.lock().await;
        self.sessions.create(
            SessionRole::Recipient,
            dest_id,
            endpoint,
            Some(challenge_data),
        )?;

        self.transport.send_to(&packet, endpoint).await?;
        info!(%endpoint, node_id = %dest_id, known_seq = record_seq, "sent WHOAREYOU packet");
        Ok(())
    }

    /// Encrypt and send one Ordinary packet under an established
    /// session, drawing a fresh masking IV and the session's next
    /// counter value.
    pub(crate) async fn send_session_message(
        &self,
        session: &mut Session,
        dest: NodeId,
        endpoint: SocketAddr,
        payload: &[u8],
    ) -> Result<(), ProtocolError> {
        let iv = random::random_16()?;
        let nonce = session.next_nonce();
        let (mut packet, header) = lodestone_wire::build_ordinary_packet(
            dest.as_bytes(),
            *self.identity.node_id().as_bytes(),
            iv,
            nonce,
        )?;
        let ciphertext = session.encrypt_message(&nonce, payload, &header.encode())?;
        packet.extend_from_slice(&ciphertext);

        self.transport.send_to(&packet, endpoint).await?;
        debug!(%endpoint, node_id = %dest, "sent ORDINARY packet");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ConnectionOptions;
    use async_trait::async_trait;
    use lodestone_crypto::kdf;
    use lodestone_discovery::{PeerRecord, TableOptions};
    use lodestone_wire::{PacketFlag, WhoAreYouAuthData};
    use std::io;
    use tokio::sync::Mutex;

    /// Transport that records every sent packet.
    pub(crate) struct MockTransport {
        pub sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    }

    impl MockTransport {
        pub(crate) fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PacketTransport for MockTransport {
        async fn send_to(&self, data: &[u8], dest: SocketAddr) -> io::Result<()> {
            self.sent.lock().await.push((data.to_vec(), dest));
            Ok(())
        }

        async fn recv_from(&self, _buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            std::future::pending().await
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok("127.0.0.1:0".parse().expect("static addr"))
        }
    }

    /// Responder that records messages and echoes a canned reply.
    pub(crate) struct RecordingResponder {
        pub received: Mutex<Vec<Vec<u8>>>,
        pub replies: Vec<Vec<u8>>,
    }

    #[async_trait]
    impl MessageResponder for RecordingResponder {
        async fn handle_message(&self, message: &[u8], _from: SocketAddr) -> Vec<Vec<u8>> {
            self.received.lock().await.push(message.to_vec());
            self.replies.clone()
        }
    }

    pub(crate) struct ProbeRequester;

    impl MessageRequester for ProbeRequester {
        fn construct_probe(&self, _dest: NodeId) -> Vec<u8> {
            b"liveness-probe".to_vec()
        }
    }

    pub(crate) type TestDispatcher =
        PacketDispatcher<RecordingResponder, ProbeRequester, MockTransport>;

    pub(crate) struct TestNode {
        pub dispatcher: TestDispatcher,
        pub identity: Arc<LocalIdentity>,
        pub transport: Arc<MockTransport>,
        pub responder: Arc<RecordingResponder>,
    }

    pub(crate) fn test_node(replies: Vec<Vec<u8>>) -> TestNode {
        let identity =
            Arc::new(LocalIdentity::generate("127.0.0.1:9000".parse().unwrap()).unwrap());
        let table = Arc::new(RoutingTable::new(
            identity.node_id(),
            TableOptions::default(),
        ));
        let sessions = Arc::new(SessionStore::new());
        let requests = Arc::new(RequestManager::new(
            Arc::clone(&table),
            ConnectionOptions::default(),
        ));
        let responder = Arc::new(RecordingResponder {
            received: Mutex::new(Vec::new()),
            replies,
        });
        let transport = Arc::new(MockTransport::new());

        let dispatcher = PacketDispatcher::new(
            Arc::clone(&identity),
            table,
            sessions,
            requests,
            Arc::clone(&responder),
            Arc::new(ProbeRequester),
            Arc::clone(&transport),
        );

        TestNode {
            dispatcher,
            identity,
            transport,
            responder,
        }
    }

    pub(crate) fn peer_identity() -> (Arc<LocalIdentity>, PeerRecord) {
        let identity =
            Arc::new(LocalIdentity::generate("127.0.0.1:9001".parse().unwrap()).unwrap());
        let record = identity.record().clone();
        (identity, record)
    }

    fn from_addr() -> SocketAddr {
        "127.0.0.1:9001".parse().unwrap()
    }

    #[tokio::test]
    async fn test_ordinary_from_unknown_peer_challenged_without_record() {
        let node = test_node(vec![]);
        let (peer, _record) = peer_identity();

        let (mut packet, _) = lodestone_wire::build_ordinary_packet(
            node.identity.node_id().as_bytes(),
            *peer.node_id().as_bytes(),
            [1u8; 16],
            [2u8; 12],
        )
        .unwrap();
        packet.extend_from_slice(&[0u8; 32]);

        node.dispatcher.dispatch(&packet, from_addr()).await;

        let sent = node.transport.sent.lock().await;
        assert_eq!(sent.len(), 1);

        let header =
            lodestone_wire::static_header(peer.node_id().as_bytes(), &sent[0].0).unwrap();
        assert_eq!(header.flag(), PacketFlag::WhoAreYou);
        assert_eq!(header.nonce(), &[2u8; 12]);

        let auth = WhoAreYouAuthData::decode(header.authdata()).unwrap();
        assert_eq!(auth.record_seq, 0, "no record known for unknown peer");
    }

    #[tokio::test]
    async fn test_ordinary_known_peer_without_session_challenged_with_seq() {
        let node = test_node(vec![]);
        let (peer, record) = peer_identity();
        node.dispatcher.table().insert_or_update(record.clone());

        let (mut packet, _) = lodestone_wire::build_ordinary_packet(
            node.identity.node_id().as_bytes(),
            *peer.node_id().as_bytes(),
            [1u8; 16],
            [2u8; 12],
        )
        .unwrap();
        packet.extend_from_slice(&[0u8; 32]);

        node.dispatcher.dispatch(&packet, from_addr()).await;

        let sent = node.transport.sent.lock().await;
        assert_eq!(sent.len(), 1);
        let header =
            lodestone_wire::static_header(peer.node_id().as_bytes(), &sent[0].0).unwrap();
        let auth = WhoAreYouAuthData::decode(header.authdata()).unwrap();
        assert_eq!(auth.record_seq, record.seq());

        // The challenge opened a Recipient session holding challenge data.
        let session = node.dispatcher.sessions().get(&peer.node_id()).unwrap();
        let session = session.lock().await;
        assert_eq!(session.role(), SessionRole::Recipient);
        assert!(session.challenge_data().is_some());
    }

    #[tokio::test]
    async fn test_corrupted_tag_triggers_exactly_one_challenge_no_dispatch() {
        let node = test_node(vec![]);
        let (peer, record) = peer_identity();
        node.dispatcher.table().insert_or_update(record);

        // Establish a session so decryption is actually attempted.
        let session = node
            .dispatcher
            .sessions()
            .create(SessionRole::Recipient, peer.node_id(), from_addr(), None)
            .unwrap();
        let keys = kdf::derive_session_keys(
            &[42u8; 32],
            peer.node_id().as_bytes(),
            node.identity.node_id().as_bytes(),
            b"challenge",
        );
        session.lock().await.install_keys(keys);

        let (mut packet, _) = lodestone_wire::build_ordinary_packet(
            node.identity.node_id().as_bytes(),
            *peer.node_id().as_bytes(),
            [1u8; 16],
            [2u8; 12],
        )
        .unwrap();
        // Garbage where AEAD ciphertext should be.
        packet.extend_from_slice(&[0xEE; 48]);

        node.dispatcher.dispatch(&packet, from_addr()).await;

        let sent = node.transport.sent.lock().await;
        assert_eq!(sent.len(), 1, "exactly one challenge");
        let header =
            lodestone_wire::static_header(peer.node_id().as_bytes(), &sent[0].0).unwrap();
        assert_eq!(header.flag(), PacketFlag::WhoAreYou);

        assert!(
            node.responder.received.lock().await.is_empty(),
            "no application message dispatched"
        );
    }

    #[tokio::test]
    async fn test_who_are_you_without_interaction_dropped() {
        let node = test_node(vec![]);

        // A challenge whose nonce we never sent: correlation must miss.
        let (packet, _) = lodestone_wire::build_who_are_you_packet(
            node.identity.node_id().as_bytes(),
            [9u8; 12],
            [8u8; 16],
            0,
            [1u8; 16],
        )
        .unwrap();

        node.dispatcher.dispatch(&packet, from_addr()).await;
        assert!(node.transport.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_handshake_without_outstanding_challenge_dropped() {
        let node = test_node(vec![]);
        let (peer, _) = peer_identity();

        let (mut packet, _) = lodestone_wire::build_handshake_packet(
            node.identity.node_id().as_bytes(),
            *peer.node_id().as_bytes(),
            &[1u8; 64],
            &[2u8; 32],
            None,
            [1u8; 16],
            [2u8; 12],
        )
        .unwrap();
        packet.extend_from_slice(&[0u8; 32]);

        node.dispatcher.dispatch(&packet, from_addr()).await;
        assert!(node.transport.sent.lock().await.is_empty());
        assert!(node.responder.received.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_send_message_without_session_caches_and_provokes() {
        let node = test_node(vec![]);
        let (peer, _) = peer_identity();

        node.dispatcher
            .send_message(peer.node_id(), from_addr(), [7u8; 8], b"findnode".to_vec(), 1)
            .await
            .unwrap();

        assert!(node.dispatcher.requests().contains_cached_request(&[7u8; 8]));
        assert_eq!(node.dispatcher.requests().interaction_count(), 1);

        let sent = node.transport.sent.lock().await;
        assert_eq!(sent.len(), 1);
        // The provocation packet parses as Ordinary at the peer.
        let header =
            lodestone_wire::static_header(peer.node_id().as_bytes(), &sent[0].0).unwrap();
        assert_eq!(header.flag(), PacketFlag::Ordinary);

        // Its nonce correlates back to the peer.
        assert_eq!(
            node.dispatcher
                .requests()
                .get_cached_handshake_interaction(header.nonce()),
            Some(peer.node_id())
        );
    }

    #[tokio::test]
    async fn test_malformed_packet_dropped_silently() {
        let node = test_node(vec![]);
        node.dispatcher.dispatch(&[0u8; 5], from_addr()).await;
        node.dispatcher.dispatch(&[0u8; 200], from_addr()).await;
        assert!(node.transport.sent.lock().await.is_empty());
    }
}
