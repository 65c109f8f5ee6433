//! Skirmish wire protocol.
//!
//! Everything both peers must agree on lives here: the packet catalogue
//! and its fixed binary layouts, static channel affinity, fixed-size frame
//! sealing with HMAC-SHA256, per-channel framing and the shared
//! session-key cell. Transport policy (sockets, TLS, retries, timeouts)
//! belongs to `skirmish-netplay` and `skirmish-netd`.

pub mod channel;
pub mod codec_tcp;
pub mod codec_udp;
pub mod constants;
pub mod error;
pub mod kind;
pub mod packet;
pub mod seal;
pub mod session;

mod wire;

pub use channel::{ChannelKind, channel_for};
pub use error::ProtoError;
pub use kind::PacketKind;
pub use packet::Packet;
pub use session::SessionContext;
