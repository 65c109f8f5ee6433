//! Reliable-channel framing.
//!
//! The stream carries `[u16 frame_len_be][Frame]` records. Frames are fixed
//! size, so the prefix always encodes `FRAME_SIZE`; it is still validated
//! on decode to catch stream desync early.

use crate::{
    constants::{FRAME_SIZE, TCP_LEN_PREFIX, WIRE_FRAME_SIZE},
    error::ProtoError,
};

/// Prefix a sealed frame for the reliable channel.
pub fn encode_wire(frame: &[u8; FRAME_SIZE]) -> [u8; WIRE_FRAME_SIZE] {
    let mut out = [0u8; WIRE_FRAME_SIZE];
    out[..TCP_LEN_PREFIX].copy_from_slice(&(FRAME_SIZE as u16).to_be_bytes());
    out[TCP_LEN_PREFIX..].copy_from_slice(frame);
    out
}

/// Extract as many complete frames as the buffer holds.
///
/// Returns the frame slices plus the number of bytes consumed; the caller
/// advances its receive buffer by that amount and retries after the next
/// read. A prefix that does not announce `FRAME_SIZE` means the stream is
/// desynchronized and the connection must be dropped.
pub fn try_decode_frames(in_buf: &[u8]) -> Result<(Vec<&[u8]>, usize), ProtoError> {
    let mut frames = Vec::new();
    let mut offset = 0usize;

    loop {
        let remaining = in_buf.len().saturating_sub(offset);
        if remaining < TCP_LEN_PREFIX {
            break;
        }

        let announced = u16::from_be_bytes(
            in_buf[offset..offset + TCP_LEN_PREFIX]
                .try_into()
                .map_err(|_| ProtoError::TooShort)?,
        ) as usize;
        if announced != FRAME_SIZE {
            return Err(ProtoError::FrameSizeMismatch(announced));
        }

        if remaining < WIRE_FRAME_SIZE {
            break;
        }

        frames.push(&in_buf[offset + TCP_LEN_PREFIX..offset + WIRE_FRAME_SIZE]);
        offset += WIRE_FRAME_SIZE;
    }

    Ok((frames, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_marker(marker: u8) -> [u8; FRAME_SIZE] {
        let mut frame = [0u8; FRAME_SIZE];
        frame[0] = marker;
        frame
    }

    #[test]
    fn prefix_is_big_endian_frame_size() {
        let wire = encode_wire(&frame_with_marker(1));
        assert_eq!(wire.len(), WIRE_FRAME_SIZE);
        assert_eq!(
            u16::from_be_bytes([wire[0], wire[1]]) as usize,
            FRAME_SIZE
        );
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&encode_wire(&frame_with_marker(1)));
        buf.extend_from_slice(&encode_wire(&frame_with_marker(2)));

        let (frames, consumed) = try_decode_frames(&buf).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][0], 1);
        assert_eq!(frames[1][0], 2);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let wire = encode_wire(&frame_with_marker(3));

        // One byte of prefix: nothing to decode, nothing consumed.
        let (frames, consumed) = try_decode_frames(&wire[..1]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(consumed, 0);

        // Full prefix but truncated frame: same.
        let (frames, consumed) = try_decode_frames(&wire[..WIRE_FRAME_SIZE - 1]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(consumed, 0);

        // One full frame plus a partial second one.
        let mut buf = wire.to_vec();
        buf.extend_from_slice(&wire[..10]);
        let (frames, consumed) = try_decode_frames(&buf).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(consumed, WIRE_FRAME_SIZE);
    }

    #[test]
    fn bad_prefix_is_a_hard_error() {
        let mut wire = encode_wire(&frame_with_marker(4));
        wire[0] = 0xFF;
        wire[1] = 0xFF;
        assert!(matches!(
            try_decode_frames(&wire),
            Err(ProtoError::FrameSizeMismatch(_))
        ));
    }
}
