//! Dual-channel transport.
//!
//! Owns one TLS 1.3 stream (reliable) and one connected UDP socket
//! (unreliable) to the same server endpoint. Outbound packets pick their
//! channel by static affinity; inbound packets from both channels land in
//! one queue the game loop drains every tick. Everything the game loop
//! touches (`send`, `poll_inbound`, `events`) is non-blocking.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use ring::rand::{SecureRandom, SystemRandom};
use skirmish_netproto::{
    ChannelKind, Packet, SessionContext,
    codec_tcp::encode_wire,
    constants::VERSION,
    packet::PlayerName,
    seal::seal_packet,
};
use tokio::{
    net::{TcpStream, UdpSocket, lookup_host},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{config::ClientConfig, error::ClientError, heartbeat, pipeline, tls};

/// How long `shutdown` waits for the heartbeat task to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Connection lifecycle. Terminal once `Disconnected`; there is no
/// automatic reconnect, callers observe the event stream and call
/// `connect` again if they want a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Ready,
}

/// Transport lifecycle events, consumed via [`Transport::events`].
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Handshake complete; both channels usable.
    Ready { player_id: u32, tick_hz: u16 },
    /// Connection lost or shut down. Delivered exactly once.
    Disconnected { reason: String },
}

/// Commands consumed by the writer loops.
#[derive(Debug)]
pub(crate) enum WriteCmd {
    Frame(Bytes),
    Shutdown,
}

/// Shared link state plus the once-only disconnect notification.
pub(crate) struct LinkNotifier {
    state: Mutex<LinkState>,
    event_tx: crossbeam_channel::Sender<LinkEvent>,
    disconnect_fired: AtomicBool,
}

impl LinkNotifier {
    fn new(event_tx: crossbeam_channel::Sender<LinkEvent>) -> Self {
        Self {
            state: Mutex::new(LinkState::Connecting),
            event_tx,
            disconnect_fired: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> LinkState {
        *self.state.lock()
    }

    fn ready(&self, player_id: u32, tick_hz: u16) {
        *self.state.lock() = LinkState::Ready;
        let _ = self.event_tx.send(LinkEvent::Ready { player_id, tick_hz });
    }

    /// Mark the link dead and deliver the disconnect event, exactly once
    /// no matter how many pipeline tasks report a failure.
    pub(crate) fn disconnected(&self, reason: impl Into<String>) {
        *self.state.lock() = LinkState::Disconnected;
        if !self.disconnect_fired.swap(true, Ordering::SeqCst) {
            let reason = reason.into();
            info!("connection lost: {reason}");
            let _ = self.event_tx.send(LinkEvent::Disconnected { reason });
        }
    }
}

struct Inner {
    session: Arc<SessionContext>,
    notifier: Arc<LinkNotifier>,
    cancel: CancellationToken,
    reliable_tx: mpsc::Sender<WriteCmd>,
    unreliable_tx: mpsc::Sender<WriteCmd>,
    inbound_rx: crossbeam_channel::Receiver<Packet>,
    event_rx: crossbeam_channel::Receiver<LinkEvent>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    player_id: AtomicU32,
    shutdown_started: AtomicBool,
}

/// Handle to a live dual-channel connection. Cheap to clone; all clones
/// share the same connection.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

impl Transport {
    /// Connect both channels and run the protocol handshake.
    ///
    /// Blocks the caller until the transport is ready or
    /// `cfg.connect_timeout` elapses. The reliable channel comes up first
    /// (it carries the handshake), then the unreliable socket is bound and
    /// connected to the same endpoint.
    pub async fn connect(
        cfg: ClientConfig,
        host: &str,
        port: u16,
    ) -> Result<Transport, ClientError> {
        let cancel = CancellationToken::new();
        match tokio::time::timeout(
            cfg.connect_timeout,
            Self::establish(&cfg, host, port, cancel.clone()),
        )
        .await
        {
            Ok(Ok(transport)) => Ok(transport),
            Ok(Err(e)) => {
                cancel.cancel();
                Err(e)
            }
            Err(_) => {
                cancel.cancel();
                Err(ClientError::ConnectTimeout)
            }
        }
    }

    async fn establish(
        cfg: &ClientConfig,
        host: &str,
        port: u16,
        cancel: CancellationToken,
    ) -> Result<Transport, ClientError> {
        let addr = lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| ClientError::ConnectFailed(format!("no address for {host}:{port}")))?;

        info!("connecting to {addr}");
        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|e| ClientError::ConnectFailed(format!("connect to {addr} failed: {e}")))?;
        let _ = tcp.set_nodelay(true);

        let pinned = cfg
            .pinned_cert_sha256
            .as_deref()
            .map(tls::parse_sha256_fingerprint)
            .transpose()?;
        let connector = TlsConnector::from(Arc::new(tls::build_tls_config(pinned)?));
        let server_name = rustls::pki_types::ServerName::try_from(cfg.server_name.clone())
            .map_err(|e| ClientError::ConnectFailed(format!("bad server name: {e}")))?;
        let stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| ClientError::ConnectFailed(format!("TLS handshake failed: {e}")))?;
        let (read_half, write_half) = tokio::io::split(stream);

        // Unreliable socket to the same endpoint; `connect` filters out
        // datagrams from anyone else.
        let local_any = if addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let udp = UdpSocket::bind(local_any).await?;
        udp.connect(addr).await?;
        let udp = Arc::new(udp);

        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (reliable_tx, reliable_rx) = mpsc::channel(cfg.send_queue_depth);
        let (unreliable_tx, unreliable_rx) = mpsc::channel(cfg.send_queue_depth);
        let (welcome_tx, welcome_rx) = oneshot::channel();

        let session = Arc::new(SessionContext::new());
        let notifier = Arc::new(LinkNotifier::new(event_tx));

        tokio::spawn(pipeline::reliable_writer(
            write_half,
            reliable_rx,
            notifier.clone(),
        ));
        tokio::spawn(pipeline::reliable_reader(
            read_half,
            session.clone(),
            inbound_tx.clone(),
            notifier.clone(),
            cancel.clone(),
            cfg.idle_timeout,
            welcome_tx,
        ));
        tokio::spawn(pipeline::unreliable_writer(udp.clone(), unreliable_rx));
        tokio::spawn(pipeline::unreliable_reader(
            udp,
            session.clone(),
            inbound_tx,
            cancel.clone(),
        ));

        // Protocol handshake: hello travels unsigned (no token yet).
        let mut nonce = [0u8; 4];
        let _ = SystemRandom::new().fill(&mut nonce);
        let hello = Packet::Hello {
            client_nonce: u32::from_le_bytes(nonce),
            proto_min: VERSION,
            proto_max: VERSION,
            name: PlayerName::new(&cfg.player_name)
                .map_err(|_| ClientError::Handshake("player name too long".to_string()))?,
        };
        let frame = seal_packet(&hello, None)?;
        reliable_tx
            .send(WriteCmd::Frame(Bytes::copy_from_slice(&encode_wire(&frame))))
            .await
            .map_err(|_| ClientError::ChannelInactive(ChannelKind::Reliable))?;

        let (player_id, tick_hz) = welcome_rx
            .await
            .map_err(|_| ClientError::Handshake("connection closed before welcome".to_string()))?;
        info!(player_id, tick_hz, "handshake complete");
        notifier.ready(player_id, tick_hz);

        let hb = heartbeat::spawn(
            reliable_tx.clone(),
            session.clone(),
            cancel.clone(),
            cfg.heartbeat_interval,
        );

        Ok(Transport {
            inner: Arc::new(Inner {
                session,
                notifier,
                cancel,
                reliable_tx,
                unreliable_tx,
                inbound_rx,
                event_rx,
                heartbeat: Mutex::new(Some(hb)),
                player_id: AtomicU32::new(player_id),
                shutdown_started: AtomicBool::new(false),
            }),
        })
    }

    /// Seal and queue a packet on its channel. Non-blocking; fails when
    /// the transport is down, the channel's writer has exited, or the
    /// outbound queue is full. Never silently succeeds on a dead channel.
    pub fn send(&self, packet: &Packet) -> Result<(), ClientError> {
        if self.inner.notifier.state() != LinkState::Ready {
            return Err(ClientError::NotConnected);
        }

        let key = self.inner.session.current();
        let frame = seal_packet(packet, key.as_deref())?;

        let channel = packet.channel();
        let (tx, bytes) = match channel {
            ChannelKind::Reliable => (
                &self.inner.reliable_tx,
                Bytes::copy_from_slice(&encode_wire(&frame)),
            ),
            ChannelKind::Unreliable => (&self.inner.unreliable_tx, Bytes::copy_from_slice(&frame)),
        };

        tx.try_send(WriteCmd::Frame(bytes)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ClientError::SendQueueFull,
            mpsc::error::TrySendError::Closed(_) => ClientError::ChannelInactive(channel),
        })
    }

    /// Non-blocking drain of the shared inbound queue. Per-channel arrival
    /// order is preserved; there is no ordering across channels.
    pub fn poll_inbound(&self) -> Option<Packet> {
        self.inner.inbound_rx.try_recv().ok()
    }

    /// Lifecycle event stream. `LinkEvent::Disconnected` arrives exactly
    /// once per connection, whether the close was local or remote.
    pub fn events(&self) -> crossbeam_channel::Receiver<LinkEvent> {
        self.inner.event_rx.clone()
    }

    pub fn state(&self) -> LinkState {
        self.inner.notifier.state()
    }

    /// Server-assigned player id, available once ready.
    pub fn player_id(&self) -> u32 {
        self.inner.player_id.load(Ordering::Relaxed)
    }

    /// The shared session-key cell (the send path and both decoders read
    /// it; the reliable decoder installs rotations).
    pub fn session(&self) -> &SessionContext {
        &self.inner.session
    }

    /// Tear the connection down. Idempotent: repeated calls are no-ops.
    /// Each step is best-effort and bounded, so shutdown cannot hang.
    pub async fn shutdown(&self) {
        if self.inner.shutdown_started.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("shutting down transport");

        self.inner.cancel.cancel();
        let _ = self.inner.reliable_tx.try_send(WriteCmd::Shutdown);
        let _ = self.inner.unreliable_tx.try_send(WriteCmd::Shutdown);

        let heartbeat = self.inner.heartbeat.lock().take();
        if let Some(handle) = heartbeat
            && tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err()
        {
            warn!("heartbeat task did not stop within the grace period");
        }

        self.inner.session.clear();
        self.inner.notifier.disconnected("shutdown requested");
    }
}
