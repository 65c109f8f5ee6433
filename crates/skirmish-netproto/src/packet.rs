//! Packet catalogue and fixed binary layouts.
//!
//! Every packet serializes into a zero-padded `PAYLOAD_MAX` buffer with the
//! kind tag at offset 0 and fields at fixed offsets behind it. Layouts are
//! part of the wire contract; changing one is a protocol version bump.

use std::fmt;

use strum::FromRepr;

use crate::{
    constants::{CHAT_MAX, NAME_MAX, PAYLOAD_MAX, SNAPSHOT_MAX_ENTITIES, TOKEN_LEN},
    error::ProtoError,
    kind::PacketKind,
    wire::{WireReader, WireWriter},
};

/// A fixed-capacity UTF-8 string: one length byte followed by `N` bytes,
/// zero-padded past the length. Keeps variable text inside a fixed layout.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BoundedStr<const N: usize> {
    len: u8,
    bytes: [u8; N],
}

impl<const N: usize> BoundedStr<N> {
    pub fn new(s: &str) -> Result<Self, ProtoError> {
        if s.len() > N {
            return Err(ProtoError::LengthOutOfRange(s.len()));
        }
        let mut bytes = [0u8; N];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self {
            len: s.len() as u8,
            bytes,
        })
    }

    pub fn as_str(&self) -> &str {
        // Both construction paths validate UTF-8.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn encode_into(&self, w: &mut WireWriter<'_>) -> Result<(), ProtoError> {
        w.put_u8(self.len)?;
        w.put_bytes(&self.bytes)
    }

    fn decode_from(r: &mut WireReader<'_>) -> Result<Self, ProtoError> {
        let len = r.u8()?;
        if len as usize > N {
            return Err(ProtoError::LengthOutOfRange(len as usize));
        }
        let raw: [u8; N] = r.array()?;
        std::str::from_utf8(&raw[..len as usize]).map_err(|_| ProtoError::InvalidText)?;

        // Normalize the tail so equality is over the text, not leftover bytes.
        let mut bytes = [0u8; N];
        bytes[..len as usize].copy_from_slice(&raw[..len as usize]);
        Ok(Self { len, bytes })
    }
}

impl<const N: usize> Default for BoundedStr<N> {
    fn default() -> Self {
        Self {
            len: 0,
            bytes: [0u8; N],
        }
    }
}

impl<const N: usize> fmt::Debug for BoundedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl<const N: usize> fmt::Display for BoundedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type PlayerName = BoundedStr<NAME_MAX>;
pub type ChatText = BoundedStr<CHAT_MAX>;

/// Server error codes sent to clients.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
pub enum ErrorCode {
    /// Unspecified error
    Unknown = 0,
    /// Packet parsing/decoding failed
    BadMessage = 1,
    /// Arena with the given id does not exist
    ArenaNotFound = 2,
    /// Arena is at maximum player capacity
    ArenaFull = 3,
    /// Client is already in an arena
    AlreadyJoined = 4,
    /// Client is not in any arena
    NotJoined = 5,
    /// Server is at maximum capacity
    ServerFull = 6,
    /// No overlap between client and server protocol versions
    ProtocolMismatch = 7,
}

/// One entity's state inside an `EntitySnapshot`. 13 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntityState {
    pub id: u16,
    pub x: f32,
    pub y: f32,
    pub hp: u16,
    pub flags: u8,
}

impl EntityState {
    fn encode_into(&self, w: &mut WireWriter<'_>) -> Result<(), ProtoError> {
        w.put_u16(self.id)?;
        w.put_f32(self.x)?;
        w.put_f32(self.y)?;
        w.put_u16(self.hp)?;
        w.put_u8(self.flags)
    }

    fn decode_from(r: &mut WireReader<'_>) -> Result<Self, ProtoError> {
        Ok(Self {
            id: r.u16()?,
            x: r.f32()?,
            y: r.f32()?,
            hp: r.u16()?,
            flags: r.u8()?,
        })
    }
}

/// Application packets exchanged between client and server.
///
/// Each variant's channel is fixed; see [`crate::channel::channel_for`].
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Client -> server, first packet on the reliable channel.
    Hello {
        client_nonce: u32,
        proto_min: u8,
        proto_max: u8,
        name: PlayerName,
    },
    /// Server -> client handshake acceptance.
    Welcome {
        server_nonce: u32,
        player_id: u32,
        tick_hz: u16,
    },
    /// Server -> client: install (or rotate) the frame-signing secret.
    /// Consumed by the transport layer; never surfaced to the application.
    SessionToken { token: [u8; TOKEN_LEN] },
    /// Heartbeat, both directions.
    KeepAlive { t_ms: u32 },
    /// Client -> server arena join request.
    JoinArena { arena_id: u16, champion: u8 },
    /// Server -> client join response with the assigned spawn point.
    JoinAck {
        ok: bool,
        arena_id: u16,
        spawn_x: f32,
        spawn_y: f32,
    },
    /// Client -> server graceful leave.
    Leave { reason: u8 },
    /// Server -> client error report.
    ServerError { code: ErrorCode },

    /// Chat line; `lane` selects arena/team/whisper.
    Chat { lane: u8, text: ChatText },
    /// Server -> clients: a player entered the arena.
    PlayerJoined {
        player_id: u32,
        champion: u8,
        name: PlayerName,
    },
    /// Server -> clients: a player left or was dropped.
    PlayerLeft { player_id: u32, reason: u8 },
    /// Ability activation; ordered delivery matters for resolution.
    AbilityCast {
        player_id: u32,
        ability: u8,
        target_x: f32,
        target_y: f32,
    },

    /// Client -> server per-tick input sample. Superseded by the next one,
    /// so loss is acceptable.
    MoveInput {
        player_id: u32,
        seq: u32,
        dx: i8,
        dy: i8,
        aim: u16,
        buttons: u16,
    },
    /// Server -> clients world-state broadcast.
    EntitySnapshot {
        tick: u32,
        entities: Vec<EntityState>,
    },
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Hello { .. } => PacketKind::Hello,
            Packet::Welcome { .. } => PacketKind::Welcome,
            Packet::SessionToken { .. } => PacketKind::SessionToken,
            Packet::KeepAlive { .. } => PacketKind::KeepAlive,
            Packet::JoinArena { .. } => PacketKind::JoinArena,
            Packet::JoinAck { .. } => PacketKind::JoinAck,
            Packet::Leave { .. } => PacketKind::Leave,
            Packet::ServerError { .. } => PacketKind::ServerError,
            Packet::Chat { .. } => PacketKind::Chat,
            Packet::PlayerJoined { .. } => PacketKind::PlayerJoined,
            Packet::PlayerLeft { .. } => PacketKind::PlayerLeft,
            Packet::AbilityCast { .. } => PacketKind::AbilityCast,
            Packet::MoveInput { .. } => PacketKind::MoveInput,
            Packet::EntitySnapshot { .. } => PacketKind::EntitySnapshot,
        }
    }

    pub fn channel(&self) -> crate::channel::ChannelKind {
        crate::channel::channel_for(self.kind())
    }

    /// Serialize into a zero-padded payload buffer of exactly `PAYLOAD_MAX`
    /// bytes. Deterministic: the same packet always yields the same bytes.
    pub fn encode(&self) -> Result<[u8; PAYLOAD_MAX], ProtoError> {
        let mut buf = [0u8; PAYLOAD_MAX];
        let mut w = WireWriter::new(&mut buf);
        w.put_u8(self.kind() as u8)?;

        match self {
            Packet::Hello {
                client_nonce,
                proto_min,
                proto_max,
                name,
            } => {
                w.put_u32(*client_nonce)?;
                w.put_u8(*proto_min)?;
                w.put_u8(*proto_max)?;
                name.encode_into(&mut w)?;
            }
            Packet::Welcome {
                server_nonce,
                player_id,
                tick_hz,
            } => {
                w.put_u32(*server_nonce)?;
                w.put_u32(*player_id)?;
                w.put_u16(*tick_hz)?;
            }
            Packet::SessionToken { token } => {
                w.put_bytes(token)?;
            }
            Packet::KeepAlive { t_ms } => {
                w.put_u32(*t_ms)?;
            }
            Packet::JoinArena { arena_id, champion } => {
                w.put_u16(*arena_id)?;
                w.put_u8(*champion)?;
            }
            Packet::JoinAck {
                ok,
                arena_id,
                spawn_x,
                spawn_y,
            } => {
                w.put_u8(u8::from(*ok))?;
                w.put_u16(*arena_id)?;
                w.put_f32(*spawn_x)?;
                w.put_f32(*spawn_y)?;
            }
            Packet::Leave { reason } => {
                w.put_u8(*reason)?;
            }
            Packet::ServerError { code } => {
                w.put_u8(*code as u8)?;
            }
            Packet::Chat { lane, text } => {
                w.put_u8(*lane)?;
                text.encode_into(&mut w)?;
            }
            Packet::PlayerJoined {
                player_id,
                champion,
                name,
            } => {
                w.put_u32(*player_id)?;
                w.put_u8(*champion)?;
                name.encode_into(&mut w)?;
            }
            Packet::PlayerLeft { player_id, reason } => {
                w.put_u32(*player_id)?;
                w.put_u8(*reason)?;
            }
            Packet::AbilityCast {
                player_id,
                ability,
                target_x,
                target_y,
            } => {
                w.put_u32(*player_id)?;
                w.put_u8(*ability)?;
                w.put_f32(*target_x)?;
                w.put_f32(*target_y)?;
            }
            Packet::MoveInput {
                player_id,
                seq,
                dx,
                dy,
                aim,
                buttons,
            } => {
                w.put_u32(*player_id)?;
                w.put_u32(*seq)?;
                w.put_i8(*dx)?;
                w.put_i8(*dy)?;
                w.put_u16(*aim)?;
                w.put_u16(*buttons)?;
            }
            Packet::EntitySnapshot { tick, entities } => {
                if entities.len() > SNAPSHOT_MAX_ENTITIES {
                    return Err(ProtoError::CountOutOfRange(entities.len()));
                }
                w.put_u32(*tick)?;
                w.put_u8(entities.len() as u8)?;
                for entity in entities {
                    entity.encode_into(&mut w)?;
                }
            }
        }

        Ok(buf)
    }

    /// Deserialize a padded payload. Rejects buffers of the wrong total
    /// length, unknown kind tags and out-of-range length/count fields.
    /// Trailing padding past a packet's fixed layout is ignored.
    pub fn decode(payload: &[u8]) -> Result<Packet, ProtoError> {
        if payload.len() != PAYLOAD_MAX {
            return Err(ProtoError::FrameSizeMismatch(payload.len()));
        }

        let mut r = WireReader::new(payload);
        let tag = r.u8()?;
        let kind = PacketKind::from_repr(tag).ok_or(ProtoError::UnknownKind(tag))?;

        let packet = match kind {
            PacketKind::Hello => Packet::Hello {
                client_nonce: r.u32()?,
                proto_min: r.u8()?,
                proto_max: r.u8()?,
                name: PlayerName::decode_from(&mut r)?,
            },
            PacketKind::Welcome => Packet::Welcome {
                server_nonce: r.u32()?,
                player_id: r.u32()?,
                tick_hz: r.u16()?,
            },
            PacketKind::SessionToken => Packet::SessionToken { token: r.array()? },
            PacketKind::KeepAlive => Packet::KeepAlive { t_ms: r.u32()? },
            PacketKind::JoinArena => Packet::JoinArena {
                arena_id: r.u16()?,
                champion: r.u8()?,
            },
            PacketKind::JoinAck => Packet::JoinAck {
                ok: r.u8()? != 0,
                arena_id: r.u16()?,
                spawn_x: r.f32()?,
                spawn_y: r.f32()?,
            },
            PacketKind::Leave => Packet::Leave { reason: r.u8()? },
            PacketKind::ServerError => {
                let raw = r.u8()?;
                let code =
                    ErrorCode::from_repr(raw).ok_or(ProtoError::UnknownErrorCode(raw))?;
                Packet::ServerError { code }
            }
            PacketKind::Chat => Packet::Chat {
                lane: r.u8()?,
                text: ChatText::decode_from(&mut r)?,
            },
            PacketKind::PlayerJoined => Packet::PlayerJoined {
                player_id: r.u32()?,
                champion: r.u8()?,
                name: PlayerName::decode_from(&mut r)?,
            },
            PacketKind::PlayerLeft => Packet::PlayerLeft {
                player_id: r.u32()?,
                reason: r.u8()?,
            },
            PacketKind::AbilityCast => Packet::AbilityCast {
                player_id: r.u32()?,
                ability: r.u8()?,
                target_x: r.f32()?,
                target_y: r.f32()?,
            },
            PacketKind::MoveInput => Packet::MoveInput {
                player_id: r.u32()?,
                seq: r.u32()?,
                dx: r.i8()?,
                dy: r.i8()?,
                aim: r.u16()?,
                buttons: r.u16()?,
            },
            PacketKind::EntitySnapshot => {
                let tick = r.u32()?;
                let count = r.u8()? as usize;
                if count > SNAPSHOT_MAX_ENTITIES {
                    return Err(ProtoError::CountOutOfRange(count));
                }
                let mut entities = Vec::with_capacity(count);
                for _ in 0..count {
                    entities.push(EntityState::decode_from(&mut r)?);
                }
                Packet::EntitySnapshot { tick, entities }
            }
        };

        Ok(packet)
    }
}

/// Byte offset of the `player_id` field shared by datagram packets.
///
/// The server reads it before authentication to pick the session key for
/// an incoming datagram; the layout of `MoveInput` places it right after
/// the kind tag for that reason.
pub const DATAGRAM_PLAYER_ID_OFFSET: usize = 1;
