use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use skirmish_netproto::{Packet, SessionContext};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Unique connection identifier assigned by the server.
pub type ConnId = u64;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_conn_id() -> ConnId {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

/// Sender used by the main loop to write already-framed bytes back to a
/// connection's reliable channel.
pub type OutboundTx = mpsc::Sender<bytes::Bytes>;

/// Events produced by the network layer and consumed by the main loop.
///
/// - `Connected` is emitted once per accepted reliable connection, carrying
///   the outbound sender, the connection's session-key cell and a cancel
///   token the main loop can use to force-close it.
/// - `Packet` is one authenticated, decoded reliable-channel packet.
/// - `Datagram` is one verified unreliable-channel packet, already resolved
///   to a player id.
/// - `Disconnected` is emitted exactly once when the connection task exits.
#[derive(Debug)]
pub enum InboundEvent {
    Connected {
        conn_id: ConnId,
        peer: SocketAddr,
        outbound: OutboundTx,
        session: Arc<SessionContext>,
        cancel: CancellationToken,
    },

    Packet {
        conn_id: ConnId,
        peer: SocketAddr,
        packet: Packet,
    },

    Datagram {
        player_id: u32,
        peer: SocketAddr,
        packet: Packet,
    },

    Disconnected {
        conn_id: ConnId,
        peer: SocketAddr,
        /// Best-effort human-readable reason (logging/debug).
        reason: String,
    },
}
