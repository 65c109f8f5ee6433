//! Server library - main loop logic extracted for testing.
//!
//! The network layer funnels everything into one [`InboundEvent`] queue;
//! `run_server` drains it and owns all game-session state. Timers for the
//! snapshot tick, token rotation and idle sweep run in the same select so
//! session state never needs a lock on the main-loop side.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use ring::rand::{SecureRandom, SystemRandom};
use skirmish_netproto::{
    Packet, SessionContext,
    constants::{SNAPSHOT_MAX_ENTITIES, TOKEN_LEN, VERSION},
    packet::{EntityState, ErrorCode, PlayerName},
    seal::seal_packet,
};
use tokio::{net::UdpSocket, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::net::inbound::{ConnId, InboundEvent, OutboundTx};
use crate::net::outbound::send_packet;
use crate::registry::{PlayerSession, Registry};

pub mod net;
pub mod registry;

/// Monotonically increasing IDs.
static NEXT_PLAYER_ID: AtomicU32 = AtomicU32::new(1);
static NEXT_SERVER_NONCE: AtomicU32 = AtomicU32::new(1);

/// Main-loop tunables.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Snapshot broadcast rate, advertised to clients in `Welcome`.
    pub tick_hz: u16,
    /// How often each session's signing token is rotated.
    pub token_rotate_interval: Duration,
    /// Connections with no reliable-channel traffic for this long are
    /// force-closed.
    pub idle_timeout: Duration,
    /// How often to check for idle connections.
    pub sweep_interval: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            tick_hz: 20,
            token_rotate_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

/// Per-connection server-side context.
struct ConnCtx {
    outbound: OutboundTx,
    session: Arc<SessionContext>,
    cancel: CancellationToken,
    peer: SocketAddr,
    /// Assigned on `Hello`; zero until then.
    player_id: u32,
    name: PlayerName,
    champion: u8,
    arena: Option<u16>,
    last_activity: Instant,
}

/// Run the server main loop until `cancel` fires or the event queue closes.
pub async fn run_server(
    mut rx: mpsc::Receiver<InboundEvent>,
    udp: Arc<UdpSocket>,
    registry: Arc<Registry>,
    opts: ServerOptions,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut conns: HashMap<ConnId, ConnCtx> = HashMap::new();
    let mut tick: u32 = 0;

    let mut snapshot_timer =
        tokio::time::interval(Duration::from_secs(1) / u32::from(opts.tick_hz.max(1)));
    let mut rotate_timer = tokio::time::interval(opts.token_rotate_interval);
    let mut sweep_timer = tokio::time::interval(opts.sweep_interval);
    snapshot_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    rotate_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!("server main loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            ev = rx.recv() => {
                let Some(ev) = ev else {
                    break;
                };
                match ev {
                    InboundEvent::Connected { conn_id, peer, outbound, session, cancel } => {
                        conns.insert(conn_id, ConnCtx {
                            outbound,
                            session,
                            cancel,
                            peer,
                            player_id: 0,
                            name: PlayerName::default(),
                            champion: 0,
                            arena: None,
                            last_activity: Instant::now(),
                        });
                        debug!(conn_id, %peer, "client connected");
                    }

                    InboundEvent::Packet { conn_id, peer, packet } => {
                        handle_packet(&mut conns, &registry, &opts, conn_id, peer, packet).await;
                    }

                    InboundEvent::Datagram { player_id, packet, .. } => {
                        handle_datagram(&mut conns, &registry, player_id, packet);
                    }

                    InboundEvent::Disconnected { conn_id, peer, reason } => {
                        handle_disconnected(&mut conns, &registry, conn_id, peer, reason).await;
                    }
                }
            }

            _ = snapshot_timer.tick() => {
                tick = tick.wrapping_add(1);
                broadcast_snapshots(&conns, &registry, &udp, tick).await;
            }

            _ = rotate_timer.tick() => {
                for ctx in conns.values() {
                    if ctx.player_id == 0 {
                        continue;
                    }
                    if let Err(e) = rotate_token(&ctx.outbound, &ctx.session).await {
                        debug!(player_id = ctx.player_id, "token rotation failed: {e}");
                    }
                }
            }

            _ = sweep_timer.tick() => {
                let now = Instant::now();
                for (&conn_id, ctx) in conns.iter() {
                    if now.duration_since(ctx.last_activity) > opts.idle_timeout {
                        info!(conn_id, peer = %ctx.peer, "disconnecting idle connection");
                        ctx.cancel.cancel();
                    }
                }
            }
        }
    }

    Ok(())
}

/// Generate a fresh token, deliver it sealed under the session's current
/// key, then install the new key. Ordered delivery on the reliable channel
/// means the client applies the rotation before any frame signed with it.
async fn rotate_token(outbound: &OutboundTx, session: &SessionContext) -> anyhow::Result<()> {
    let mut token = [0u8; TOKEN_LEN];
    SystemRandom::new()
        .fill(&mut token)
        .map_err(|_| anyhow::anyhow!("rng failure"))?;

    let old_key = session.current();
    send_packet(outbound, &Packet::SessionToken { token }, old_key.as_deref()).await?;
    session.install(&token);
    Ok(())
}

async fn send_to_conn(ctx: &ConnCtx, packet: &Packet) {
    let key = ctx.session.current();
    if let Err(e) = send_packet(&ctx.outbound, packet, key.as_deref()).await {
        debug!(peer = %ctx.peer, "outbound send failed: {e}");
    }
}

async fn send_error(ctx: &ConnCtx, code: ErrorCode) {
    send_to_conn(ctx, &Packet::ServerError { code }).await;
}

/// Arena spawn points sit on a ring, one slot per snapshot entity.
fn spawn_point(slot: usize) -> (f32, f32) {
    const SPAWN_RADIUS: f32 = 32.0;
    let angle = (slot as f32) * (std::f32::consts::TAU / SNAPSHOT_MAX_ENTITIES as f32);
    (SPAWN_RADIUS * angle.cos(), SPAWN_RADIUS * angle.sin())
}

async fn handle_packet(
    conns: &mut HashMap<ConnId, ConnCtx>,
    registry: &Registry,
    opts: &ServerOptions,
    conn_id: ConnId,
    peer: SocketAddr,
    packet: Packet,
) {
    {
        let Some(ctx) = conns.get_mut(&conn_id) else {
            return;
        };
        ctx.last_activity = Instant::now();
    }

    match packet {
        Packet::Hello {
            proto_min,
            proto_max,
            name,
            ..
        } => {
            let Some(ctx) = conns.get_mut(&conn_id) else {
                return;
            };
            if ctx.player_id != 0 {
                warn!(conn_id, %peer, "duplicate hello ignored");
                return;
            }
            if proto_min > VERSION || proto_max < VERSION {
                warn!(conn_id, %peer, proto_min, proto_max, "protocol version mismatch");
                send_error(ctx, ErrorCode::ProtocolMismatch).await;
                ctx.cancel.cancel();
                return;
            }

            let player_id = NEXT_PLAYER_ID.fetch_add(1, Ordering::Relaxed);
            ctx.player_id = player_id;
            ctx.name = name;
            registry.insert(
                player_id,
                Arc::new(PlayerSession::new(
                    conn_id,
                    ctx.outbound.clone(),
                    ctx.session.clone(),
                )),
            );

            let welcome = Packet::Welcome {
                server_nonce: NEXT_SERVER_NONCE.fetch_add(1, Ordering::Relaxed),
                player_id,
                tick_hz: opts.tick_hz,
            };
            send_to_conn(ctx, &welcome).await;

            // First token goes out unsigned (there is no key yet), and the
            // session is authenticated from here on.
            if let Err(e) = rotate_token(&ctx.outbound, &ctx.session).await {
                warn!(conn_id, "initial token delivery failed: {e}");
                ctx.cancel.cancel();
                return;
            }

            info!(conn_id, %peer, player_id, name = %name, "player handshake complete");
        }

        Packet::KeepAlive { t_ms } => {
            // Echo it back: the client's idle timer needs inbound traffic
            // on the reliable channel even when no snapshots are flowing.
            trace!(conn_id, t_ms, "keep-alive");
            if let Some(ctx) = conns.get(&conn_id) {
                send_to_conn(ctx, &Packet::KeepAlive { t_ms }).await;
            }
        }

        Packet::JoinArena { arena_id, champion } => {
            let Some(ctx) = conns.get(&conn_id) else {
                return;
            };
            if ctx.player_id == 0 {
                send_error(ctx, ErrorCode::BadMessage).await;
                return;
            }
            if ctx.arena.is_some() {
                send_error(ctx, ErrorCode::AlreadyJoined).await;
                return;
            }

            let members: Vec<ConnId> = conns
                .iter()
                .filter(|(_, c)| c.arena == Some(arena_id))
                .map(|(&id, _)| id)
                .collect();
            if members.len() >= SNAPSHOT_MAX_ENTITIES {
                send_error(ctx, ErrorCode::ArenaFull).await;
                return;
            }

            let (spawn_x, spawn_y) = spawn_point(members.len());
            let (player_id, name) = {
                let Some(ctx) = conns.get_mut(&conn_id) else {
                    return;
                };
                ctx.arena = Some(arena_id);
                ctx.champion = champion;
                (ctx.player_id, ctx.name)
            };

            if let Some(entry) = registry.get(&player_id) {
                entry.respawn(spawn_x, spawn_y);
            }

            let Some(ctx) = conns.get(&conn_id) else {
                return;
            };
            send_to_conn(
                ctx,
                &Packet::JoinAck {
                    ok: true,
                    arena_id,
                    spawn_x,
                    spawn_y,
                },
            )
            .await;

            // Roster catch-up for the joiner, then announce the joiner.
            for member_id in &members {
                let Some(member) = conns.get(member_id) else {
                    continue;
                };
                send_to_conn(
                    ctx,
                    &Packet::PlayerJoined {
                        player_id: member.player_id,
                        champion: member.champion,
                        name: member.name,
                    },
                )
                .await;
            }
            let joined = Packet::PlayerJoined {
                player_id,
                champion,
                name,
            };
            for member_id in &members {
                if let Some(member) = conns.get(member_id) {
                    send_to_conn(member, &joined).await;
                }
            }

            info!(conn_id, player_id, arena_id, champion, "player joined arena");
        }

        Packet::Chat { lane, text } => {
            let Some(ctx) = conns.get(&conn_id) else {
                return;
            };
            let Some(arena_id) = ctx.arena else {
                send_error(ctx, ErrorCode::NotJoined).await;
                return;
            };
            let line = Packet::Chat { lane, text };
            for member in conns.values().filter(|c| c.arena == Some(arena_id)) {
                send_to_conn(member, &line).await;
            }
        }

        Packet::AbilityCast {
            ability,
            target_x,
            target_y,
            ..
        } => {
            let Some(ctx) = conns.get(&conn_id) else {
                return;
            };
            let Some(arena_id) = ctx.arena else {
                send_error(ctx, ErrorCode::NotJoined).await;
                return;
            };
            // The sender's claimed id is never trusted.
            let cast = Packet::AbilityCast {
                player_id: ctx.player_id,
                ability,
                target_x,
                target_y,
            };
            for member in conns.values().filter(|c| c.arena == Some(arena_id)) {
                send_to_conn(member, &cast).await;
            }
        }

        Packet::Leave { reason } => {
            let (player_id, arena) = {
                let Some(ctx) = conns.get_mut(&conn_id) else {
                    return;
                };
                let arena = ctx.arena.take();
                (ctx.player_id, arena)
            };
            if let Some(arena_id) = arena {
                let left = Packet::PlayerLeft { player_id, reason };
                for member in conns.values().filter(|c| c.arena == Some(arena_id)) {
                    send_to_conn(member, &left).await;
                }
            }
            if let Some(ctx) = conns.get(&conn_id) {
                info!(conn_id, player_id, "player leaving");
                ctx.cancel.cancel();
            }
        }

        Packet::MoveInput { .. } => {
            warn!(conn_id, "move input on reliable channel ignored");
        }

        Packet::Welcome { .. }
        | Packet::SessionToken { .. }
        | Packet::JoinAck { .. }
        | Packet::ServerError { .. }
        | Packet::PlayerJoined { .. }
        | Packet::PlayerLeft { .. }
        | Packet::EntitySnapshot { .. } => {
            warn!(conn_id, kind = ?packet.kind(), "client sent server-only packet");
            if let Some(ctx) = conns.get(&conn_id) {
                send_error(ctx, ErrorCode::BadMessage).await;
            }
        }
    }
}

fn handle_datagram(
    conns: &mut HashMap<ConnId, ConnCtx>,
    registry: &Registry,
    player_id: u32,
    packet: Packet,
) {
    let Packet::MoveInput { seq, dx, dy, .. } = packet else {
        return;
    };
    let Some(entry) = registry.get(&player_id) else {
        return;
    };
    if !entry.apply_input(seq, dx, dy) {
        trace!(player_id, seq, "stale input sample ignored");
    }
    if let Some(ctx) = conns.get_mut(&entry.conn_id) {
        ctx.last_activity = Instant::now();
    }
}

async fn handle_disconnected(
    conns: &mut HashMap<ConnId, ConnCtx>,
    registry: &Registry,
    conn_id: ConnId,
    peer: SocketAddr,
    reason: String,
) {
    let Some(ctx) = conns.remove(&conn_id) else {
        return;
    };

    if ctx.player_id != 0 {
        registry.remove(&ctx.player_id);
        if let Some(arena_id) = ctx.arena {
            let left = Packet::PlayerLeft {
                player_id: ctx.player_id,
                reason: 0,
            };
            for member in conns.values().filter(|c| c.arena == Some(arena_id)) {
                send_to_conn(member, &left).await;
            }
        }
    }

    info!(conn_id, %peer, %reason, "client disconnected");
}

/// Build one snapshot per arena and send it to each member over UDP,
/// sealed under that member's own session key. Members without a learned
/// return address or an established key are skipped.
async fn broadcast_snapshots(
    conns: &HashMap<ConnId, ConnCtx>,
    registry: &Registry,
    udp: &UdpSocket,
    tick: u32,
) {
    let mut arenas: HashMap<u16, Vec<u32>> = HashMap::new();
    for ctx in conns.values() {
        if let Some(arena_id) = ctx.arena
            && ctx.player_id != 0
        {
            arenas.entry(arena_id).or_default().push(ctx.player_id);
        }
    }

    for players in arenas.values() {
        let entities: Vec<EntityState> = players
            .iter()
            .filter_map(|id| registry.get(id).map(|e| e.entity_state(*id)))
            .collect();
        let snapshot = Packet::EntitySnapshot { tick, entities };

        for id in players {
            let Some(entry) = registry.get(id).map(|e| Arc::clone(e.value())) else {
                continue;
            };
            let Some(addr) = entry.udp_addr() else {
                continue;
            };
            let Some(key) = entry.session.current() else {
                continue;
            };
            match seal_packet(&snapshot, Some(&key)) {
                Ok(frame) => {
                    if let Err(e) = udp.send_to(&frame, addr).await {
                        trace!(player_id = id, "snapshot send failed: {e}");
                    }
                }
                Err(e) => warn!(tick, "failed to seal snapshot: {e}"),
            }
        }
    }
}
