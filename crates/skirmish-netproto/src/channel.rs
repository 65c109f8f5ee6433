use crate::kind::PacketKind;

/// Transport channels available to a connection.
///
/// - `Reliable`: ordered, retransmitting TLS stream. Handshake, session
///   control and anything whose loss or reordering would corrupt state.
/// - `Unreliable`: best-effort datagrams. Per-tick data that is superseded
///   by the next sample anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Reliable,
    Unreliable,
}

/// Map a packet kind to the channel it travels on.
///
/// The mapping is total and fixed for a given protocol version; it is a
/// property of the protocol, not of connection state.
pub const fn channel_for(kind: PacketKind) -> ChannelKind {
    match kind {
        PacketKind::MoveInput | PacketKind::EntitySnapshot => ChannelKind::Unreliable,

        PacketKind::Hello
        | PacketKind::Welcome
        | PacketKind::SessionToken
        | PacketKind::KeepAlive
        | PacketKind::JoinArena
        | PacketKind::JoinAck
        | PacketKind::Leave
        | PacketKind::ServerError
        | PacketKind::Chat
        | PacketKind::PlayerJoined
        | PacketKind::PlayerLeft
        | PacketKind::AbilityCast => ChannelKind::Reliable,
    }
}

#[cfg(test)]
mod tests {
    use strum::VariantArray;

    use super::{ChannelKind, channel_for};
    use crate::kind::PacketKind;

    #[test]
    fn affinity_is_total_and_stable() {
        // The match in `channel_for` is exhaustive, so totality is enforced
        // by the compiler; repeated lookups must agree.
        for kind in PacketKind::VARIANTS {
            assert_eq!(channel_for(*kind), channel_for(*kind));
        }
    }

    #[test]
    fn inputs_and_snapshots_are_unreliable() {
        assert_eq!(channel_for(PacketKind::MoveInput), ChannelKind::Unreliable);
        assert_eq!(
            channel_for(PacketKind::EntitySnapshot),
            ChannelKind::Unreliable
        );
        assert_eq!(channel_for(PacketKind::Hello), ChannelKind::Reliable);
        assert_eq!(channel_for(PacketKind::KeepAlive), ChannelKind::Reliable);
        assert_eq!(
            channel_for(PacketKind::SessionToken),
            ChannelKind::Reliable
        );
    }
}
