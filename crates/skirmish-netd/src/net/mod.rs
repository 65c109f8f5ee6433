pub mod inbound;
pub mod outbound;
pub mod tcp;
pub mod tls_config;
pub mod udp;
