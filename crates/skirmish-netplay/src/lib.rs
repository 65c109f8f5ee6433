//! Skirmish client networking.
//!
//! This crate owns the client side of the transport: a TLS 1.3 reliable
//! channel plus a connected UDP unreliable channel to the same server,
//! authenticated fixed-size frames, a heartbeat, and per-channel decode
//! pipelines feeding one inbound queue.
//!
//! The game loop interacts with it through [`Transport::send`],
//! [`Transport::poll_inbound`] and [`Transport::events`]; all three are
//! non-blocking. Only [`Transport::connect`] suspends.
//!
//! # Architecture
//!
//! - [`transport`]: channel ownership, connect/handshake/shutdown, send path
//! - `pipeline`: framing -> authentication -> decode -> dispatch stages
//! - `heartbeat`: periodic keep-alive on the reliable channel
//! - [`config`], [`error`]: knobs and error types

pub mod config;
pub mod error;
pub mod transport;

mod heartbeat;
mod pipeline;
mod tls;

pub use config::ClientConfig;
pub use error::ClientError;
pub use transport::{LinkEvent, LinkState, Transport};
