//! Shared player registry.
//!
//! Keyed by player id, shared between the main loop (which inserts and
//! removes entries), the unreliable-channel listener (key lookup and
//! address learning) and the snapshot tick (world-state reads). Body state
//! sits behind its own lock so reads on the tick path never contend with
//! the main loop's map operations.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use skirmish_netproto::{SessionContext, packet::EntityState};
use tracing::debug;

use crate::net::inbound::{ConnId, OutboundTx};

pub type Registry = DashMap<u32, Arc<PlayerSession>>;

/// Distance one full-deflection input sample moves a player.
const MOVE_STEP: f32 = 0.05;
/// Playfield half-extent; positions clamp to `[-EXTENT, EXTENT]`.
const ARENA_EXTENT: f32 = 512.0;
/// Spawn health.
pub const FULL_HP: u16 = 100;

/// Server-authoritative body state for one player.
#[derive(Debug, Clone, Copy, Default)]
pub struct Body {
    pub x: f32,
    pub y: f32,
    pub hp: u16,
    pub flags: u8,
    pub last_seq: u32,
}

pub struct PlayerSession {
    pub conn_id: ConnId,
    pub outbound: OutboundTx,
    pub session: Arc<SessionContext>,
    udp_addr: Mutex<Option<SocketAddr>>,
    body: Mutex<Body>,
}

impl PlayerSession {
    pub fn new(conn_id: ConnId, outbound: OutboundTx, session: Arc<SessionContext>) -> Self {
        Self {
            conn_id,
            outbound,
            session,
            udp_addr: Mutex::new(None),
            body: Mutex::new(Body::default()),
        }
    }

    /// Record the source address of a verified datagram. Snapshots go back
    /// to the most recent one, which tracks NAT rebinds for free.
    pub fn learn_addr(&self, peer: SocketAddr) {
        let mut slot = self.udp_addr.lock();
        if *slot != Some(peer) {
            debug!(conn_id = self.conn_id, %peer, "learned datagram return address");
            *slot = Some(peer);
        }
    }

    pub fn udp_addr(&self) -> Option<SocketAddr> {
        *self.udp_addr.lock()
    }

    /// Place the body at an arena spawn point.
    pub fn respawn(&self, x: f32, y: f32) {
        *self.body.lock() = Body {
            x,
            y,
            hp: FULL_HP,
            flags: 0,
            last_seq: 0,
        };
    }

    /// Apply one movement sample. Returns false when the sample is stale
    /// (sequence at or below the newest applied one) and was ignored;
    /// datagrams can arrive reordered as well as lost.
    pub fn apply_input(&self, seq: u32, dx: i8, dy: i8) -> bool {
        let mut body = self.body.lock();
        if seq <= body.last_seq && body.last_seq != 0 {
            return false;
        }
        body.last_seq = seq;
        body.x = (body.x + f32::from(dx) * MOVE_STEP).clamp(-ARENA_EXTENT, ARENA_EXTENT);
        body.y = (body.y + f32::from(dy) * MOVE_STEP).clamp(-ARENA_EXTENT, ARENA_EXTENT);
        true
    }

    pub fn body(&self) -> Body {
        *self.body.lock()
    }

    /// The body as a snapshot entity. Entity ids reuse the low 16 bits of
    /// the player id.
    pub fn entity_state(&self, player_id: u32) -> EntityState {
        let body = self.body();
        EntityState {
            id: player_id as u16,
            x: body.x,
            y: body.y,
            hp: body.hp,
            flags: body.flags,
        }
    }
}
