//! Unreliable-channel listener.
//!
//! One socket serves every player. Each datagram carries a player id at a
//! fixed offset inside the (not yet authenticated) payload; that id picks
//! the session key to verify the tag with. Anything that fails a check is
//! dropped silently: on this channel a bad datagram is indistinguishable
//! from loss, and unverified traffic must not produce observable effects.

use std::sync::Arc;

use skirmish_netproto::{
    Packet,
    codec_udp::decode_datagram,
    packet::DATAGRAM_PLAYER_ID_OFFSET,
    seal::open,
};
use tokio::{net::UdpSocket, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::inbound::InboundEvent;
use crate::registry::Registry;

pub async fn run_udp_listener(
    socket: Arc<UdpSocket>,
    registry: Arc<Registry>,
    tx: mpsc::Sender<InboundEvent>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; 2048];

    loop {
        let recv_res = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            res = socket.recv_from(&mut buf) => res,
        };

        let (n, peer) = match recv_res {
            Ok(pair) => pair,
            Err(e) => {
                trace!("datagram recv error: {e}");
                continue;
            }
        };

        let frame = match decode_datagram(&buf[..n]) {
            Ok(frame) => frame,
            Err(e) => {
                trace!(%peer, "dropping malformed datagram ({e})");
                continue;
            }
        };

        // Pre-auth peek: the claimed player id selects the verify key. A
        // forged id fails verification under that player's key below.
        let player_id = u32::from_le_bytes(
            frame[DATAGRAM_PLAYER_ID_OFFSET..DATAGRAM_PLAYER_ID_OFFSET + 4]
                .try_into()
                .unwrap_or_default(),
        );

        let Some(entry) = registry.get(&player_id).map(|e| Arc::clone(e.value())) else {
            trace!(%peer, player_id, "dropping datagram for unknown player");
            continue;
        };

        let key = entry.session.current();
        let payload = match open(frame, key.as_deref()) {
            Ok(payload) => payload,
            Err(_) => {
                trace!(%peer, player_id, "dropping datagram with bad authentication tag");
                continue;
            }
        };

        let packet = match Packet::decode(payload) {
            Ok(packet) => packet,
            Err(e) => {
                trace!(%peer, player_id, "dropping malformed datagram payload ({e})");
                continue;
            }
        };

        if !matches!(packet, Packet::MoveInput { .. }) {
            trace!(player_id, kind = ?packet.kind(), "dropping non-datagram packet on unreliable channel");
            continue;
        }

        // Verified traffic teaches us where to send snapshots back.
        entry.learn_addr(peer);

        if tx
            .send(InboundEvent::Datagram {
                player_id,
                peer,
                packet,
            })
            .await
            .is_err()
        {
            return Ok(());
        }
    }
}
