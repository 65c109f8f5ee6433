mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{client_config, spawn_test_server, wait_established, wait_event, wait_packet};
use skirmish_netd::ServerOptions;
use skirmish_netplay::{LinkState, Transport};
use skirmish_netproto::{Packet, packet::ChatText};

/// Both channels keep working across several signing-token rotations: the
/// reliable channel survives the rotation window and snapshots verify
/// under each new key.
#[tokio::test]
async fn channels_survive_token_rotation() -> anyhow::Result<()> {
    let server = spawn_test_server(ServerOptions {
        token_rotate_interval: Duration::from_millis(200),
        tick_hz: 30,
        ..ServerOptions::default()
    })
    .await?;

    let mut cfg = client_config(&server, "rotator");
    cfg.heartbeat_interval = Duration::from_millis(100);
    let client = Transport::connect(cfg, "127.0.0.1", server.addr.port()).await?;
    let events = client.events();
    wait_established(&client).await?;

    let first_key = client.session().current().expect("established");

    client.send(&Packet::JoinArena {
        arena_id: 7,
        champion: 0,
    })?;
    wait_packet(&client, Duration::from_secs(2), |p| {
        matches!(p, Packet::JoinAck { ok: true, .. })
    })
    .await?;

    // Open the unreliable return path, then let a few rotations happen
    // while inputs keep flowing.
    let player_id = client.player_id();
    for seq in 1..=60u32 {
        let _ = client.send(&Packet::MoveInput {
            player_id,
            seq,
            dx: 10,
            dy: 0,
            aim: 0,
            buttons: 0,
        });
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    let rotated_key = client.session().current().expect("still established");
    assert!(
        !Arc::ptr_eq(&first_key, &rotated_key),
        "signing key never rotated"
    );

    // Snapshots sealed under the rotated key still verify client-side.
    let snapshot = wait_packet(&client, Duration::from_secs(2), |p| {
        matches!(p, Packet::EntitySnapshot { .. })
    })
    .await?;
    if let Packet::EntitySnapshot { entities, .. } = &snapshot {
        assert!(entities.iter().any(|e| e.id == player_id as u16));
    }

    // The reliable channel is still healthy too.
    client.send(&Packet::Chat {
        lane: 0,
        text: ChatText::new("still here")?,
    })?;
    let line = wait_packet(&client, Duration::from_secs(2), |p| {
        matches!(p, Packet::Chat { .. })
    })
    .await?;
    if let Packet::Chat { text, .. } = &line {
        assert_eq!(text.as_str(), "still here");
    }

    // No rotation ever produced a disconnect.
    assert_eq!(client.state(), LinkState::Ready);
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, skirmish_netplay::LinkEvent::Disconnected { .. }),
            "unexpected disconnect during rotation"
        );
    }

    client.shutdown().await;
    let _ = wait_event(&events, Duration::from_secs(1)).await;
    Ok(())
}
