mod common;

use std::time::Duration;

use common::{client_config, spawn_test_server, wait_established, wait_packet};
use skirmish_netd::ServerOptions;
use skirmish_netplay::{LinkState, Transport};
use skirmish_netproto::{Packet, constants::FRAME_SIZE, packet::ChatText};

/// A burst of inputs plus hostile datagrams: the server applies what
/// verifies, silently drops the rest, and neither channel is disturbed.
#[tokio::test]
async fn input_burst_and_garbage_datagrams() -> anyhow::Result<()> {
    let server = spawn_test_server(ServerOptions {
        token_rotate_interval: Duration::from_secs(60),
        tick_hz: 30,
        ..ServerOptions::default()
    })
    .await?;

    let client = Transport::connect(client_config(&server, "burst"), "127.0.0.1", server.addr.port())
        .await?;
    wait_established(&client).await?;

    client.send(&Packet::JoinArena {
        arena_id: 1,
        champion: 0,
    })?;
    let ack = wait_packet(&client, Duration::from_secs(2), |p| {
        matches!(p, Packet::JoinAck { ok: true, .. })
    })
    .await?;
    let Packet::JoinAck { spawn_x, .. } = ack else {
        unreachable!()
    };

    // Confirm the unreliable round trip works at all before the burst.
    let player_id = client.player_id();
    client.send(&Packet::MoveInput {
        player_id,
        seq: 1,
        dx: 0,
        dy: 0,
        aim: 0,
        buttons: 0,
    })?;
    wait_packet(&client, Duration::from_secs(2), |p| {
        matches!(p, Packet::EntitySnapshot { .. })
    })
    .await?;

    // Hostile traffic at the server's port: truncated frames, oversized
    // datagrams, correctly sized garbage, and a forged player id.
    let attacker = tokio::net::UdpSocket::bind("127.0.0.1:0").await?;
    attacker.send_to(&[0u8; 10], server.addr).await?;
    attacker.send_to(&[0u8; FRAME_SIZE + 1], server.addr).await?;
    attacker.send_to(&[0xFFu8; FRAME_SIZE], server.addr).await?;
    let mut forged = [0u8; FRAME_SIZE];
    forged[0] = 30; // input packet tag
    forged[1..5].copy_from_slice(&player_id.to_le_bytes());
    attacker.send_to(&forged, server.addr).await?;

    // Back-to-back input burst; datagram loss along the way is fine.
    let mut queued = 0u32;
    for seq in 2..=101u32 {
        if client
            .send(&Packet::MoveInput {
                player_id,
                seq,
                dx: 127,
                dy: 0,
                aim: 0,
                buttons: 0,
            })
            .is_ok()
        {
            queued += 1;
        }
    }
    assert!(queued > 0);

    // Movement shows up in subsequent snapshots, so a usable subset of the
    // burst was applied and the garbage had no effect.
    let moved = wait_packet(&client, Duration::from_secs(3), |p| {
        if let Packet::EntitySnapshot { entities, .. } = p {
            entities
                .iter()
                .any(|e| e.id == player_id as u16 && e.x > spawn_x + 0.5)
        } else {
            false
        }
    })
    .await;
    assert!(moved.is_ok(), "input burst never reflected in snapshots");

    // The reliable channel never noticed any of it.
    client.send(&Packet::Chat {
        lane: 0,
        text: ChatText::new("unaffected")?,
    })?;
    wait_packet(&client, Duration::from_secs(2), |p| {
        matches!(p, Packet::Chat { .. })
    })
    .await?;
    assert_eq!(client.state(), LinkState::Ready);

    client.shutdown().await;
    Ok(())
}
