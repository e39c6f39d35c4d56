//! Ordinary packet handling.

use crate::error::ProtocolError;
use crate::handlers::PacketDispatcher;
use crate::message::{MessageRequester, MessageResponder};
use crate::transport::PacketTransport;
use lodestone_discovery::NodeId;
use lodestone_wire::{OrdinaryAuthData, StaticHeader};
use std::net::SocketAddr;
use tracing::{debug, info};

impl<R, M, T> PacketDispatcher<R, M, T>
where
    R: MessageResponder,
    M: MessageRequester,
    T: PacketTransport,
{
    /// Handle an Ordinary packet.
    ///
    /// Unknown sender: challenge without a known record sequence. Known
    /// sender without a decryptable session: challenge with the known
    /// sequence so the peer skips re-attaching its record. Valid
    /// session: dispatch the message and send each reply as a fresh
    /// Ordinary packet.
    pub(crate) async fn handle_ordinary(
        &self,
        header: &StaticHeader,
        packet: &[u8],
        from: SocketAddr,
    ) -> Result<(), ProtocolError> {
        info!(%from, "received ORDINARY packet");

        let auth = OrdinaryAuthData::decode(header.authdata())?;
        let src_id = NodeId::from_bytes(auth.src_id);

        let Some(entry) = self.table.get_entry(&src_id) else {
            info!(node_id = %src_id, "sender not in routing table, sending WHOAREYOU");
            return self
                .send_who_are_you(*header.nonce(), src_id, None, from)
                .await;
        };

        let Some(session) = self.sessions.get(&src_id) else {
            info!(node_id = %src_id, "no session for ORDINARY packet, sending WHOAREYOU");
            return self
                .send_who_are_you(*header.nonce(), src_id, Some(&entry), from)
                .await;
        };

        let aad = header.encode();
        let body = lodestone_wire::encrypted_body(packet, header);
        let decrypted = {
            let session = session.lock().await;
            session.decrypt_message(header.nonce(), body, &aad)
        };

        let Some(message) = decrypted else {
            info!(node_id = %src_id, "decryption failed, sending WHOAREYOU");
            return self
                .send_who_are_you(*header.nonce(), src_id, Some(&entry), from)
                .await;
        };
        debug!(node_id = %src_id, "successfully decrypted ORDINARY packet");

        // Evidence of a live session resets the peer's failure count.
        self.table.mark_connected(&src_id);

        let replies = self.responder.handle_message(&message, from).await;
        if !replies.is_empty() {
            let mut session = session.lock().await;
            for reply in replies {
                self.send_session_message(&mut session, src_id, from, &reply)
                    .await?;
            }
        }
        Ok(())
    }
}
