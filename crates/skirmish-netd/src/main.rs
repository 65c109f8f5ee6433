use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use skirmish_netd::net::tls_config;
use skirmish_netd::{ServerOptions, run_server};

/// Skirmish Arena Server
#[derive(Parser, Debug)]
#[command(name = "skirmish-netd")]
#[command(about = "Authoritative arena game server", long_about = None)]
struct Args {
    /// Bind address for both channels (TCP and UDP share the port)
    #[arg(short, long, default_value = "0.0.0.0:7667")]
    bind: String,

    /// TLS certificate (PEM); auto-generated when omitted
    #[arg(long)]
    cert: Option<PathBuf>,

    /// TLS private key (PEM); auto-generated when omitted
    #[arg(long)]
    key: Option<PathBuf>,

    /// Directory used to store auto-generated cert/key material
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Snapshot broadcast rate
    #[arg(long, default_value = "20")]
    tick_hz: u16,

    /// Session token rotation interval in seconds
    #[arg(long, default_value = "30")]
    token_rotate_secs: u64,

    /// Idle connection timeout in seconds
    #[arg(long, default_value = "30")]
    idle_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let (cert, key, auto_generated) = match (&args.cert, &args.key) {
        (Some(cert), Some(key)) => (cert.clone(), key.clone(), false),
        (None, None) => {
            let dir = args
                .data_dir
                .clone()
                .unwrap_or_else(|| tls_config::default_data_dir("skirmish-netd"));
            let (cert, key) = tls_config::ensure_cert_pair(&dir)?;
            (cert, key, true)
        }
        _ => {
            anyhow::bail!("must provide both --cert and --key, or neither (auto-generate)");
        }
    };
    let tls = tls_config::build_acceptor(&cert, &key)?;

    if auto_generated {
        info!(
            "TLS cert/key auto-generated at {} and {}",
            cert.display(),
            key.display()
        );
    }
    if let Ok(fp) = tls_config::sha256_fingerprint_hex(&cert) {
        info!("TLS cert SHA-256 fingerprint: {fp}");
        info!("Self-hosted clients pin this fingerprint when connecting.");
    }

    let bind_addr: SocketAddr = args.bind.parse()?;
    let listener = TcpListener::bind(bind_addr).await?;
    let udp = Arc::new(UdpSocket::bind(bind_addr).await?);

    // Network layer -> main loop events.
    let (tx, rx) = mpsc::channel(1024);
    let registry = Arc::new(skirmish_netd::registry::Registry::new());
    let cancel = CancellationToken::new();

    let tx_tcp = tx.clone();
    let cancel_tcp = cancel.clone();
    tokio::spawn(async move {
        let _ = skirmish_netd::net::tcp::run_tcp_listener(listener, tls, tx_tcp, cancel_tcp).await;
    });

    let udp_listener = udp.clone();
    let registry_udp = registry.clone();
    let cancel_udp = cancel.clone();
    tokio::spawn(async move {
        let _ =
            skirmish_netd::net::udp::run_udp_listener(udp_listener, registry_udp, tx, cancel_udp)
                .await;
    });

    info!("Arena server started on {}", args.bind);
    info!("Log level: {}", args.log_level);

    let opts = ServerOptions {
        tick_hz: args.tick_hz,
        token_rotate_interval: Duration::from_secs(args.token_rotate_secs),
        idle_timeout: Duration::from_secs(args.idle_timeout_secs),
        ..ServerOptions::default()
    };

    run_server(rx, udp, registry, opts, cancel).await
}
