use strum::{FromRepr, VariantArray};

/// Packet type tag. The first byte of every payload.
///
/// Tag values are part of the wire contract and must match between client
/// and server builds; renumbering is a protocol version bump.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, VariantArray)]
pub enum PacketKind {
    Hello = 1,
    Welcome = 2,
    SessionToken = 3,
    KeepAlive = 4,
    JoinArena = 5,
    JoinAck = 6,
    Leave = 7,
    ServerError = 8,

    Chat = 10,
    PlayerJoined = 11,
    PlayerLeft = 12,
    AbilityCast = 13,

    MoveInput = 30,
    EntitySnapshot = 31,
}
