//! Unreliable-channel framing: one datagram carries exactly one frame, no
//! prefix. Anything else is treated as loss and dropped by the caller.

use crate::{constants::FRAME_SIZE, error::ProtoError};

pub fn decode_datagram(datagram: &[u8]) -> Result<&[u8], ProtoError> {
    if datagram.len() < FRAME_SIZE {
        return Err(ProtoError::TooShort);
    }
    if datagram.len() > FRAME_SIZE {
        return Err(ProtoError::FrameSizeMismatch(datagram.len()));
    }
    Ok(datagram)
}
