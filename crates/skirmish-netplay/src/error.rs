//! Client error types.

use skirmish_netproto::{ChannelKind, ProtoError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("not connected to server")]
    NotConnected,

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("connect timed out")]
    ConnectTimeout,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("{0:?} channel is not active")]
    ChannelInactive(ChannelKind),

    #[error("send queue full")]
    SendQueueFull,

    #[error("protocol error: {0}")]
    Proto(#[from] ProtoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
