//! Shared harness: an in-process server plus client helpers.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use skirmish_netd::net::{tcp, tls_config, udp};
use skirmish_netd::registry::Registry;
use skirmish_netd::{ServerOptions, run_server};
use skirmish_netplay::{ClientConfig, LinkEvent, Transport};
use skirmish_netproto::Packet;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct TestServer {
    pub addr: SocketAddr,
    pub fingerprint: String,
    cancel: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub async fn spawn_test_server(opts: ServerOptions) -> anyhow::Result<TestServer> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let dir = std::env::temp_dir().join(format!("skirmish-netd-test-{}", std::process::id()));
    let (cert, key) = tls_config::ensure_cert_pair(&dir)?;
    let tls = tls_config::build_acceptor(&cert, &key)?;
    let fingerprint = tls_config::sha256_fingerprint_hex(&cert)?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    // Both channels share the port number.
    let udp_socket = Arc::new(UdpSocket::bind(addr).await?);

    let (tx, rx) = mpsc::channel(1024);
    let registry = Arc::new(Registry::new());
    let cancel = CancellationToken::new();

    let tx_tcp = tx.clone();
    let cancel_tcp = cancel.clone();
    tokio::spawn(async move {
        let _ = tcp::run_tcp_listener(listener, tls, tx_tcp, cancel_tcp).await;
    });

    let udp_rx_socket = udp_socket.clone();
    let registry_udp = registry.clone();
    let cancel_udp = cancel.clone();
    tokio::spawn(async move {
        let _ = udp::run_udp_listener(udp_rx_socket, registry_udp, tx, cancel_udp).await;
    });

    let cancel_main = cancel.clone();
    tokio::spawn(async move {
        let _ = run_server(rx, udp_socket, registry, opts, cancel_main).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(TestServer {
        addr,
        fingerprint,
        cancel,
    })
}

pub fn client_config(server: &TestServer, player_name: &str) -> ClientConfig {
    ClientConfig {
        server_name: "localhost".to_string(),
        pinned_cert_sha256: Some(server.fingerprint.clone()),
        player_name: player_name.to_string(),
        connect_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    }
}

/// Wait until the session token has been installed (the rotation right
/// after welcome may still be in flight when `connect` returns).
pub async fn wait_established(transport: &Transport) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !transport.session().is_established() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("session token never arrived"))
}

/// Poll the inbound queue until a packet matches `pred`.
pub async fn wait_packet<F>(
    transport: &Transport,
    wait: Duration,
    mut pred: F,
) -> anyhow::Result<Packet>
where
    F: FnMut(&Packet) -> bool,
{
    tokio::time::timeout(wait, async {
        loop {
            while let Some(packet) = transport.poll_inbound() {
                if pred(&packet) {
                    return packet;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("expected packet never arrived"))
}

/// Poll the event stream for the next lifecycle event.
pub async fn wait_event(
    events: &crossbeam_channel::Receiver<LinkEvent>,
    wait: Duration,
) -> anyhow::Result<LinkEvent> {
    tokio::time::timeout(wait, async {
        loop {
            if let Ok(event) = events.try_recv() {
                return event;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("expected event never arrived"))
}
