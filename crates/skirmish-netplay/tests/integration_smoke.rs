mod common;

use std::time::Duration;

use common::{client_config, spawn_test_server, wait_established, wait_event, wait_packet};
use skirmish_netd::ServerOptions;
use skirmish_netplay::{ClientError, LinkEvent, LinkState, Transport};
use skirmish_netproto::{Packet, packet::ChatText};

#[tokio::test]
async fn handshake_join_chat_and_shutdown() -> anyhow::Result<()> {
    let server = spawn_test_server(ServerOptions {
        token_rotate_interval: Duration::from_secs(60),
        ..ServerOptions::default()
    })
    .await?;

    let alice = Transport::connect(client_config(&server, "alice"), "127.0.0.1", server.addr.port())
        .await?;
    assert_eq!(alice.state(), LinkState::Ready);
    assert!(alice.player_id() > 0);
    let alice_events = alice.events();
    assert!(matches!(
        wait_event(&alice_events, Duration::from_secs(1)).await?,
        LinkEvent::Ready { .. }
    ));
    wait_established(&alice).await?;

    alice.send(&Packet::JoinArena {
        arena_id: 1,
        champion: 3,
    })?;
    let ack = wait_packet(&alice, Duration::from_secs(2), |p| {
        matches!(p, Packet::JoinAck { .. })
    })
    .await?;
    assert!(matches!(
        ack,
        Packet::JoinAck {
            ok: true,
            arena_id: 1,
            ..
        }
    ));

    // Second player joins the same arena; both sides hear about each other.
    let bob = Transport::connect(client_config(&server, "bob"), "127.0.0.1", server.addr.port())
        .await?;
    wait_established(&bob).await?;
    bob.send(&Packet::JoinArena {
        arena_id: 1,
        champion: 1,
    })?;

    let joined = wait_packet(&alice, Duration::from_secs(2), |p| {
        matches!(p, Packet::PlayerJoined { .. })
    })
    .await?;
    if let Packet::PlayerJoined { player_id, name, .. } = &joined {
        assert_eq!(*player_id, bob.player_id());
        assert_eq!(name.as_str(), "bob");
    }
    let roster = wait_packet(&bob, Duration::from_secs(2), |p| {
        matches!(p, Packet::PlayerJoined { .. })
    })
    .await?;
    if let Packet::PlayerJoined { player_id, .. } = &roster {
        assert_eq!(*player_id, alice.player_id());
    }

    // Chat is broadcast to the whole arena, sender included.
    alice.send(&Packet::Chat {
        lane: 0,
        text: ChatText::new("gl hf")?,
    })?;
    for client in [&alice, &bob] {
        let line = wait_packet(client, Duration::from_secs(2), |p| {
            matches!(p, Packet::Chat { .. })
        })
        .await?;
        if let Packet::Chat { text, .. } = &line {
            assert_eq!(text.as_str(), "gl hf");
        }
    }

    // Ability casts carry the server-verified caster id, not the claimed one.
    bob.send(&Packet::AbilityCast {
        player_id: 999_999,
        ability: 2,
        target_x: 5.0,
        target_y: -5.0,
    })?;
    let cast = wait_packet(&alice, Duration::from_secs(2), |p| {
        matches!(p, Packet::AbilityCast { .. })
    })
    .await?;
    if let Packet::AbilityCast { player_id, .. } = &cast {
        assert_eq!(*player_id, bob.player_id());
    }

    // Shutdown is idempotent and emits exactly one disconnect event.
    alice.shutdown().await;
    alice.shutdown().await;
    assert_eq!(alice.state(), LinkState::Disconnected);
    assert!(matches!(
        wait_event(&alice_events, Duration::from_secs(1)).await?,
        LinkEvent::Disconnected { .. }
    ));
    assert!(wait_event(&alice_events, Duration::from_millis(300)).await.is_err());
    assert!(matches!(
        alice.send(&Packet::KeepAlive { t_ms: 0 }),
        Err(ClientError::NotConnected)
    ));

    Ok(())
}

#[tokio::test]
async fn join_before_hello_state_is_rejected() -> anyhow::Result<()> {
    let server = spawn_test_server(ServerOptions::default()).await?;
    let client =
        Transport::connect(client_config(&server, "carol"), "127.0.0.1", server.addr.port())
            .await?;
    wait_established(&client).await?;

    // Chat without joining an arena draws an error, not silence.
    client.send(&Packet::Chat {
        lane: 0,
        text: ChatText::new("anyone here?")?,
    })?;
    let err = wait_packet(&client, Duration::from_secs(2), |p| {
        matches!(p, Packet::ServerError { .. })
    })
    .await?;
    assert!(matches!(
        err,
        Packet::ServerError {
            code: skirmish_netproto::packet::ErrorCode::NotJoined
        }
    ));

    Ok(())
}
