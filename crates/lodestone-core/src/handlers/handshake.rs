//! Handshake packet handling (recipient side, completing a challenge).

use crate::error::ProtocolError;
use crate::handlers::PacketDispatcher;
use crate::message::{MessageRequester, MessageResponder};
use crate::session::SessionRole;
use crate::transport::PacketTransport;
use lodestone_crypto::ecdh;
use lodestone_crypto::kdf;
use lodestone_crypto::sig::{self, Signature};
use lodestone_discovery::{NodeId, PeerRecord};
use lodestone_wire::{HandshakeAuthData, StaticHeader};
use std::net::SocketAddr;
use tracing::{info, warn};

impl<R, M, T> PacketDispatcher<R, M, T>
where
    R: MessageResponder,
    M: MessageRequester,
    T: PacketTransport,
{
    /// Handle a Handshake packet answering a challenge we issued.
    ///
    /// The identity proof is verified against the peer's record
    /// (attached, or already in the table), keys are derived from the
    /// challenge snapshot held by the Recipient-role session, and the
    /// embedded first message is decrypted and dispatched. Every failure
    /// path drops the packet without a reply.
    pub(crate) async fn handle_handshake(
        &self,
        header: &StaticHeader,
        packet: &[u8],
        from: SocketAddr,
    ) -> Result<(), ProtocolError> {
        info!(%from, "received HANDSHAKE packet");

        let auth = HandshakeAuthData::decode(header.authdata())?;
        let src_id = NodeId::from_bytes(auth.src_id);

        let guard = self.sessions.handshake_guard(&src_id);
        let _guard = guard.lock().await;

        let Some(session) = self.sessions.get(&src_id) else {
            warn!(node_id = %src_id, "handshake without an outstanding challenge, dropping");
            return Ok(());
        };
        let mut session = session.lock().await;
        if session.role() != SessionRole::Recipient {
            warn!(node_id = %src_id, "handshake received on an initiator session, dropping");
            return Ok(());
        }
        let Some(challenge_data) = session.challenge_data().map(<[u8]>::to_vec) else {
            warn!(node_id = %src_id, "challenge session holds no challenge data, dropping");
            return Ok(());
        };

        // The peer's record: attached when our challenge reported a
        // stale sequence number, otherwise already in the table.
        let record = match &auth.record {
            Some(bytes) => {
                let record = PeerRecord::from_bytes(bytes)?;
                if !record.verify() || record.node_id() != Some(src_id) {
                    warn!(node_id = %src_id, "attached record failed validation, dropping");
                    return Ok(());
                }
                self.table.insert_or_update(record.clone());
                record
            }
            None => match self.table.get_entry(&src_id) {
                Some(entry) => entry.record,
                None => {
                    warn!(node_id = %src_id, "no record available for handshake peer, dropping");
                    return Ok(());
                }
            },
        };

        let Some(identity_key) = record.identity_key() else {
            warn!(node_id = %src_id, "peer record lacks an identity key, dropping");
            return Ok(());
        };
        let signature = Signature::from_bytes(auth.id_signature);
        if sig::verify_id_proof(
            &identity_key,
            &challenge_data,
            &auth.ephemeral_pubkey,
            self.identity.node_id().as_bytes(),
            &signature,
        )
        .is_err()
        {
            warn!(node_id = %src_id, "handshake identity proof failed, dropping");
            return Ok(());
        }

        let peer_ephemeral = ecdh::PublicKey::from_bytes(auth.ephemeral_pubkey);
        let Some(shared) = self.identity.dh_secret().exchange(&peer_ephemeral) else {
            warn!(node_id = %src_id, "degenerate handshake key exchange, dropping");
            return Ok(());
        };
        let keys = kdf::derive_session_keys(
            shared.as_bytes(),
            src_id.as_bytes(),
            self.identity.node_id().as_bytes(),
            &challenge_data,
        );
        session.install_keys(keys);

        // The embedded message authenticates under the new keys with
        // AD = masking IV ‖ header; failure here means the handshake
        // does not complete.
        let iv = lodestone_wire::masking_iv(packet)?;
        let mut aad = Vec::with_capacity(iv.len() + header.encoded_len());
        aad.extend_from_slice(&iv);
        aad.extend_from_slice(&header.encode());
        let body = lodestone_wire::encrypted_body(packet, header);

        let Some(message) = session.decrypt_message(header.nonce(), body, &aad) else {
            warn!(node_id = %src_id, "handshake message failed to decrypt, dropping");
            return Ok(());
        };

        self.table.mark_connected(&src_id);
        info!(node_id = %src_id, "session established");

        let replies = self.responder.handle_message(&message, from).await;
        for reply in replies {
            self.send_session_message(&mut session, src_id, from, &reply)
                .await?;
        }
        Ok(())
    }
}
