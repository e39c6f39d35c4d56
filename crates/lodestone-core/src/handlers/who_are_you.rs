//! WhoAreYou packet handling (initiator side of the handshake).

use crate::error::ProtocolError;
use crate::handlers::PacketDispatcher;
use crate::message::{MessageRequester, MessageResponder};
use crate::requests::PendingRequest;
use crate::session::SessionRole;
use crate::transport::PacketTransport;
use lodestone_crypto::{kdf, random};
use lodestone_wire::{StaticHeader, WhoAreYouAuthData};
use std::net::SocketAddr;
use tracing::{info, warn};

impl<R, M, T> PacketDispatcher<R, M, T>
where
    R: MessageResponder,
    M: MessageRequester,
    T: PacketTransport,
{
    /// Handle a WHOAREYOU challenge.
    ///
    /// The challenge nonce is correlated (single-use) to the peer the
    /// original packet was addressed to; on a correlation or table miss
    /// the challenge is dropped. Otherwise an Initiator-role session is
    /// created over the fresh challenge data, keys are derived, and a
    /// Handshake packet goes out carrying an encrypted first message -
    /// the cached request if one is waiting, a liveness probe otherwise.
    pub(crate) async fn handle_who_are_you(
        &self,
        header: &StaticHeader,
        packet: &[u8],
        from: SocketAddr,
    ) -> Result<(), ProtocolError> {
        info!(%from, "received WHOAREYOU packet");

        let auth = WhoAreYouAuthData::decode(header.authdata())?;

        let Some(dest_id) = self
            .requests
            .get_cached_handshake_interaction(header.nonce())
        else {
            return Ok(());
        };

        let Some(entry) = self.table.get_entry(&dest_id) else {
            warn!(node_id = %dest_id, "challenged for a peer missing from the routing table");
            return Ok(());
        };
        let Some(peer_static) = entry.record.dh_public_key() else {
            warn!(node_id = %dest_id, "peer record lacks a handshake key");
            return Ok(());
        };

        // Challenge data binds the handshake to this exact exchange.
        let iv = lodestone_wire::masking_iv(packet)?;
        let mut challenge_data = Vec::with_capacity(iv.len() + header.encoded_len());
        challenge_data.extend_from_slice(&iv);
        challenge_data.extend_from_slice(&header.encode());

        let guard = self.sessions.handshake_guard(&dest_id);
        let _guard = guard.lock().await;

        // A fresh Initiator session: new ephemeral key, zeroed counter.
        // Any prior session for this peer is superseded.
        let session = self.sessions.create(
            SessionRole::Initiator,
            dest_id,
            from,
            Some(challenge_data.clone()),
        )?;
        let mut session = session.lock().await;

        let id_signature = session.generate_id_signature(self.identity.signing_key())?;
        let shared = session
            .shared_secret(&peer_static)
            .ok_or(ProtocolError::KeyExchangeFailed)?;
        let keys = kdf::derive_session_keys(
            shared.as_bytes(),
            self.identity.node_id().as_bytes(),
            dest_id.as_bytes(),
            &challenge_data,
        );
        session.install_keys(keys);

        // Attach our record only when the challenger's copy is stale.
        let record = if auth.record_seq < self.identity.record().seq() {
            Some(self.identity.record().to_bytes()?)
        } else {
            None
        };

        let packet_iv = random::random_16()?;
        let nonce = session.next_nonce();
        let ephemeral_pubkey = session.ephemeral_public().to_bytes();
        let (mut out, hs_header) = lodestone_wire::build_handshake_packet(
            dest_id.as_bytes(),
            *self.identity.node_id().as_bytes(),
            id_signature.as_bytes(),
            &ephemeral_pubkey,
            record,
            packet_iv,
            nonce,
        )?;

        // First encrypted message: promote the cached request if one is
        // waiting for this peer, otherwise send a liveness probe.
        let (request_id, message) = match self.requests.pop_cached_request_by_node_id(&dest_id) {
            Some((id, cached)) => (id, cached.message),
            None => (random::random_8()?, self.requester.construct_probe(dest_id)),
        };
        self.requests
            .add_pending_request(request_id, PendingRequest::new(dest_id, message.clone()));

        let mut aad = Vec::with_capacity(packet_iv.len() + hs_header.encoded_len());
        aad.extend_from_slice(&packet_iv);
        aad.extend_from_slice(&hs_header.encode());
        let ciphertext = session.encrypt_message(&nonce, &message, &aad)?;
        out.extend_from_slice(&ciphertext);

        self.transport.send_to(&out, from).await?;
        info!(%from, node_id = %dest_id, "sent HANDSHAKE packet with encrypted message");
        Ok(())
    }
}
