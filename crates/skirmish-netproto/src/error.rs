use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("buffer too short")]
    TooShort,
    #[error("frame size mismatch: {0}")]
    FrameSizeMismatch(usize),
    #[error("unknown packet kind: {0}")]
    UnknownKind(u8),
    #[error("payload too large: {0}")]
    PayloadTooLarge(usize),
    #[error("length field out of range: {0}")]
    LengthOutOfRange(usize),
    #[error("entity count out of range: {0}")]
    CountOutOfRange(usize),
    #[error("text is not valid UTF-8")]
    InvalidText,
    #[error("unknown error code: {0}")]
    UnknownErrorCode(u8),
    #[error("authentication tag mismatch")]
    BadTag,
}
