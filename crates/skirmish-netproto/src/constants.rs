/// Wire-format protocol version.
/// Bump this only for breaking changes to the frame layout or packet formats.
/// Clients advertise the supported range in `Hello`.
pub const VERSION: u8 = 1;

/// Maximum packet payload size in bytes (kind tag included).
/// Every payload is zero-padded to exactly this length before signing, so
/// both channels exchange uniform records regardless of packet type.
pub const PAYLOAD_MAX: usize = 480;

/// Authentication tag length in bytes (HMAC-SHA256).
pub const TAG_LEN: usize = 32;

/// Total frame size in bytes: padded payload followed by the tag.
/// This is the unit exchanged on both channels. Pre-auth frames carry a
/// zeroed tag region so the size never varies.
pub const FRAME_SIZE: usize = PAYLOAD_MAX + TAG_LEN;

/// Reliable-channel framing prefix length in bytes.
///
/// TCP is a byte stream, so each frame is sent as
/// `[u16 frame_len_be][Frame]`. The prefix is not covered by the tag.
pub const TCP_LEN_PREFIX: usize = 2;

/// Bytes written to the reliable channel per frame (prefix + frame).
pub const WIRE_FRAME_SIZE: usize = TCP_LEN_PREFIX + FRAME_SIZE;

/// Session token length in bytes. The token doubles as the HMAC key.
pub const TOKEN_LEN: usize = 32;

/// Maximum chat message length in bytes (UTF-8).
pub const CHAT_MAX: usize = 160;

/// Maximum player name length in bytes (UTF-8).
pub const NAME_MAX: usize = 24;

/// Maximum entities carried by a single `EntitySnapshot`.
pub const SNAPSHOT_MAX_ENTITIES: usize = 16;
