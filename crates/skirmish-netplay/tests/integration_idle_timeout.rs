mod common;

use std::time::Duration;

use common::{client_config, spawn_test_server, wait_event};
use skirmish_netd::ServerOptions;
use skirmish_netplay::{ClientError, LinkEvent, LinkState, Transport};
use skirmish_netproto::Packet;

/// With heartbeats effectively disabled and nothing else flowing, the
/// idle-read timer must close the connection and report it exactly once.
#[tokio::test]
async fn silent_connection_hits_idle_timeout() -> anyhow::Result<()> {
    let server = spawn_test_server(ServerOptions {
        // Keep server-side activity out of the picture.
        token_rotate_interval: Duration::from_secs(120),
        idle_timeout: Duration::from_secs(120),
        ..ServerOptions::default()
    })
    .await?;

    let mut cfg = client_config(&server, "idler");
    cfg.heartbeat_interval = Duration::from_secs(60);
    cfg.idle_timeout = Duration::from_millis(400);

    let client = Transport::connect(cfg, "127.0.0.1", server.addr.port()).await?;
    let events = client.events();
    assert!(matches!(
        wait_event(&events, Duration::from_secs(1)).await?,
        LinkEvent::Ready { .. }
    ));

    let event = wait_event(&events, Duration::from_secs(3)).await?;
    let LinkEvent::Disconnected { reason } = event else {
        anyhow::bail!("expected a disconnect event, got {event:?}");
    };
    assert!(reason.contains("idle"), "unexpected reason: {reason}");

    // Exactly once: no second disconnect, even after an explicit shutdown.
    client.shutdown().await;
    assert!(wait_event(&events, Duration::from_millis(300)).await.is_err());

    assert_eq!(client.state(), LinkState::Disconnected);
    assert!(matches!(
        client.send(&Packet::KeepAlive { t_ms: 1 }),
        Err(ClientError::NotConnected)
    ));

    Ok(())
}

/// Heartbeats keep an otherwise quiet connection alive well past the idle
/// timeout, because the server echoes them back.
#[tokio::test]
async fn heartbeats_keep_a_quiet_connection_alive() -> anyhow::Result<()> {
    let server = spawn_test_server(ServerOptions {
        token_rotate_interval: Duration::from_secs(120),
        ..ServerOptions::default()
    })
    .await?;

    let mut cfg = client_config(&server, "keeper");
    cfg.heartbeat_interval = Duration::from_millis(100);
    cfg.idle_timeout = Duration::from_millis(600);

    let client = Transport::connect(cfg, "127.0.0.1", server.addr.port()).await?;
    let events = client.events();
    assert!(matches!(
        wait_event(&events, Duration::from_secs(1)).await?,
        LinkEvent::Ready { .. }
    ));

    // Several idle windows pass without a disconnect.
    assert!(wait_event(&events, Duration::from_millis(1_800)).await.is_err());
    assert_eq!(client.state(), LinkState::Ready);

    client.shutdown().await;
    Ok(())
}
