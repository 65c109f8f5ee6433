use std::time::Duration;

/// Client transport configuration.
///
/// Defaults are tuned for a 30 Hz arena server on a WAN link; tests dial
/// the timeouts down.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// TLS server name (SNI / certificate verification).
    pub server_name: String,

    /// Pin the server certificate to a SHA-256 fingerprint (hex, optional
    /// colons) instead of validating against system roots. Used with
    /// self-hosted servers that run on auto-generated certificates.
    pub pinned_cert_sha256: Option<String>,

    /// Player name advertised in the hello packet.
    pub player_name: String,

    /// Bound on the whole `connect` call, TLS handshake and protocol
    /// handshake included.
    pub connect_timeout: Duration,

    /// Interval between keep-alive packets on the reliable channel.
    pub heartbeat_interval: Duration,

    /// Force-close the reliable channel after this long without inbound
    /// bytes. Must comfortably exceed `heartbeat_interval`, since the
    /// server echoes keep-alives.
    pub idle_timeout: Duration,

    /// Depth of each channel's outbound queue; `send` fails once full
    /// rather than blocking the game loop.
    pub send_queue_depth: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_name: "localhost".to_string(),
            pinned_cert_sha256: None,
            player_name: String::new(),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(2),
            idle_timeout: Duration::from_secs(15),
            send_queue_depth: 256,
        }
    }
}
