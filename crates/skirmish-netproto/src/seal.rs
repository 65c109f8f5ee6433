//! Frame authentication.
//!
//! A frame is the padded payload followed by an HMAC-SHA256 tag over the
//! padded bytes. Before a session token exists the tag region is zeroed and
//! verification only extracts the payload, so the handshake can proceed
//! over frames of the same fixed size.

use ring::hmac;

use crate::{
    constants::{FRAME_SIZE, PAYLOAD_MAX, TAG_LEN},
    error::ProtoError,
    packet::Packet,
};

// HMAC-SHA256 output must fill the tag region exactly.
const _: () = assert!(TAG_LEN == 32);

/// Build an HMAC key from raw session-token bytes.
pub fn signing_key(token: &[u8]) -> hmac::Key {
    hmac::Key::new(hmac::HMAC_SHA256, token)
}

/// Pad `payload` to `PAYLOAD_MAX` and append the authentication tag.
///
/// With no key (pre-auth), the tag region stays zeroed. The output is
/// always exactly `FRAME_SIZE` bytes.
pub fn seal(payload: &[u8], key: Option<&hmac::Key>) -> Result<[u8; FRAME_SIZE], ProtoError> {
    if payload.len() > PAYLOAD_MAX {
        return Err(ProtoError::PayloadTooLarge(payload.len()));
    }

    let mut frame = [0u8; FRAME_SIZE];
    frame[..payload.len()].copy_from_slice(payload);

    if let Some(key) = key {
        let tag = hmac::sign(key, &frame[..PAYLOAD_MAX]);
        frame[PAYLOAD_MAX..].copy_from_slice(tag.as_ref());
    }

    Ok(frame)
}

/// Encode and seal a packet in one step.
pub fn seal_packet(
    packet: &Packet,
    key: Option<&hmac::Key>,
) -> Result<[u8; FRAME_SIZE], ProtoError> {
    seal(&packet.encode()?, key)
}

/// Verify a frame's tag and return the padded payload.
///
/// `ring::hmac::verify` compares in constant time, so tag mismatches do not
/// leak key material through timing. With no key the tag region is ignored
/// and the payload extracted as-is (pre-auth mode).
pub fn open<'a>(frame: &'a [u8], key: Option<&hmac::Key>) -> Result<&'a [u8], ProtoError> {
    if frame.len() != FRAME_SIZE {
        return Err(ProtoError::FrameSizeMismatch(frame.len()));
    }

    let (payload, tag) = frame.split_at(PAYLOAD_MAX);
    if let Some(key) = key {
        hmac::verify(key, payload, tag).map_err(|_| ProtoError::BadTag)?;
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;

    #[test]
    fn sealed_frames_are_always_frame_size() {
        let key = signing_key(b"0123456789abcdef0123456789abcdef");
        for payload_len in [0usize, 1, 17, PAYLOAD_MAX] {
            let payload = vec![0x5A; payload_len];
            assert_eq!(seal(&payload, Some(&key)).unwrap().len(), FRAME_SIZE);
            assert_eq!(seal(&payload, None).unwrap().len(), FRAME_SIZE);
        }
        assert!(seal(&vec![0u8; PAYLOAD_MAX + 1], None).is_err());
    }

    #[test]
    fn open_accepts_matching_key() {
        let key = signing_key(b"k1");
        let payload = b"hello arena";
        let frame = seal(payload, Some(&key)).unwrap();
        let opened = open(&frame, Some(&key)).unwrap();
        assert_eq!(&opened[..payload.len()], payload);
    }

    #[test]
    fn open_rejects_wrong_key() {
        let k1 = signing_key(b"k1");
        let k2 = signing_key(b"k2");
        let frame = seal(b"payload", Some(&k1)).unwrap();
        assert!(matches!(open(&frame, Some(&k2)), Err(ProtoError::BadTag)));
    }

    #[test]
    fn open_rejects_tampered_payload() {
        let key = signing_key(b"k1");
        let mut frame = seal(b"payload", Some(&key)).unwrap();
        frame[0] ^= 0xFF;
        assert!(matches!(open(&frame, Some(&key)), Err(ProtoError::BadTag)));
    }

    #[test]
    fn pre_auth_mode_ignores_the_tag_region() {
        let payload = b"pre-auth";
        let mut frame = seal(payload, None).unwrap();
        assert!(frame[PAYLOAD_MAX..].iter().all(|b| *b == 0));

        // Garbage in the tag region must not matter without a key.
        frame[PAYLOAD_MAX] = 0xFF;
        let opened = open(&frame, None).unwrap();
        assert_eq!(&opened[..payload.len()], payload);
    }

    #[test]
    fn open_rejects_short_frames() {
        assert!(matches!(
            open(&[0u8; FRAME_SIZE - 1], None),
            Err(ProtoError::FrameSizeMismatch(_))
        ));
    }

    #[test]
    fn seal_packet_round_trips_through_open() {
        let key = signing_key(b"session");
        let packet = Packet::KeepAlive { t_ms: 77 };
        let frame = seal_packet(&packet, Some(&key)).unwrap();
        let payload = open(&frame, Some(&key)).unwrap();
        assert_eq!(Packet::decode(payload).unwrap(), packet);
    }
}
