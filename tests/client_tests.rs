#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Integration-style client tests for the LobbyLink client.
//!
//! Uses the channel-backed `MockConnector` from `tests/common` to play the
//! server side and verify that `LobbyClient` sends the right frames, applies
//! responses to its state, and publishes the expected events.

mod common;

use std::time::Duration;

use lobbylink_client::{
    CreateLobbyParams, EventKind, JoinLobbyParams, LaunchOutcome, ListLobbiesParams, LobbyClient,
    LobbyContext, LobbyError, LobbyEvent, Phase, PlatformLaunch,
};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use common::{
    error_json, lobby_created_json, lobby_state_json, start_client, test_config, ConnectMode,
    EventLog, MockHub, MockServer, SERVER_URL,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

/// Create `lobby_name` and answer as the server. Returns the socket.
async fn create_as_owner(client: &LobbyClient, hub: &mut MockHub, lobby_name: &str) -> MockServer {
    let task = tokio::spawn({
        let client = client.clone();
        let params = CreateLobbyParams::new(lobby_name, 4);
        async move { client.create_lobby(params).await }
    });
    let mut server = hub.accept().await;
    let frame = server.next_sent().await;
    assert_eq!(frame["type"], "lobby_create");
    let player_id = frame["playerId"].as_str().expect("playerId").to_string();
    server.push(lobby_created_json("L1", lobby_name, &player_id));
    assert_ok!(task.await.expect("create task"));
    server
}

/// Join `L1` owned by `p_ann` and answer as the server. Returns the socket.
async fn join_as_member(client: &LobbyClient, hub: &mut MockHub) -> MockServer {
    let task = tokio::spawn({
        let client = client.clone();
        async move { client.join_lobby(JoinLobbyParams::new("L1")).await }
    });
    let mut server = hub.accept().await;
    let frame = server.next_sent().await;
    assert_eq!(frame["type"], "lobby_join");
    server.push(lobby_state_json("L1", "p_ann", &[("p_ann", "Ann")]));
    assert_ok!(task.await.expect("join task"));
    server
}

// ════════════════════════════════════════════════════════════════════
// Lobby create / join
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn create_public_lobby_makes_caller_host() {
    let (client, mut hub) = start_client(test_config().with_username("Someone"));
    let mut events = EventLog::attach(&client);

    let task = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .create_lobby(
                    CreateLobbyParams::new("PUBLIC_Arena", 4)
                        .with_game_id("g1")
                        .with_username("Ann"),
                )
                .await
        }
    });

    let mut server = hub.accept().await;
    let frame = server.next_sent().await;
    assert_eq!(frame["type"], "lobby_create");
    assert_eq!(frame["gameId"], "g1");
    assert_eq!(frame["lobbyName"], "PUBLIC_Arena");
    assert_eq!(frame["maxPlayers"], 4);
    assert_eq!(frame["username"], "Ann");
    assert!(frame.get("lobbyId").is_none());
    let player_id = frame["playerId"].as_str().unwrap().to_string();
    assert!(player_id.starts_with("p_"));

    server.push(lobby_created_json("L1", "PUBLIC_Arena", &player_id));

    let lobby = assert_ok!(task.await.unwrap());
    assert_eq!(lobby.lobby_id, "L1");
    assert!(lobby.is_public);
    assert_eq!(lobby.owner_id, player_id);
    assert!(client.is_host());
    assert_eq!(client.phase(), Phase::LobbyOwner);
    assert_eq!(client.username(), "Ann");
    assert_eq!(client.player_id().as_deref(), Some(player_id.as_str()));

    assert_eq!(events.next().await, LobbyEvent::Connected);
    match events.next().await {
        LobbyEvent::LobbyCreated { lobby } => {
            assert_eq!(lobby.lobby_id, "L1");
            assert!(lobby.is_public);
        }
        other => panic!("expected LobbyCreated, got {other:?}"),
    }
}

#[tokio::test]
async fn private_lobby_name_is_not_public_even_if_server_says_so() {
    let (client, mut hub) = start_client(test_config());
    let task = tokio::spawn({
        let client = client.clone();
        async move { client.create_lobby(CreateLobbyParams::new("Arena", 2)).await }
    });
    let mut server = hub.accept().await;
    let frame = server.next_sent().await;
    let mut reply = lobby_created_json("L9", "Arena", frame["playerId"].as_str().unwrap());
    reply["isPublic"] = json!(true);
    server.push(reply);

    let lobby = assert_ok!(task.await.unwrap());
    assert!(!lobby.is_public);
}

#[tokio::test]
async fn create_with_preferred_lobby_id_sends_it() {
    let (client, mut hub) = start_client(test_config());
    let task = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .create_lobby(CreateLobbyParams::new("Arena", 4).with_lobby_id("MY-LOBBY"))
                .await
        }
    });
    let mut server = hub.accept().await;
    let frame = server.next_sent().await;
    assert_eq!(frame["lobbyId"], "MY-LOBBY");
    server.push(lobby_created_json("MY-LOBBY", "Arena", frame["playerId"].as_str().unwrap()));
    assert_eq!(assert_ok!(task.await.unwrap()).lobby_id, "MY-LOBBY");
}

#[tokio::test]
async fn join_lobby_reports_members_and_is_not_host() {
    let (client, mut hub) = start_client(test_config());
    let mut events = EventLog::attach(&client);

    let task = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .join_lobby(
                    JoinLobbyParams::new("L1")
                        .with_game_id("g1")
                        .with_username("Bob"),
                )
                .await
        }
    });

    let mut server = hub.accept().await;
    let frame = server.next_sent().await;
    assert_eq!(frame["type"], "lobby_join");
    assert_eq!(frame["lobbyId"], "L1");
    assert_eq!(frame["gameId"], "g1");
    assert_eq!(frame["username"], "Bob");

    server.push(lobby_state_json("L1", "p_ann", &[("p_ann", "Ann")]));

    let snapshot = assert_ok!(task.await.unwrap());
    assert_eq!(snapshot.lobby.owner_id, "p_ann");
    assert_eq!(snapshot.players.len(), 1);
    assert!(!client.is_host());
    assert_eq!(client.phase(), Phase::LobbyMember);
    assert_eq!(client.players()[0].id, "p_ann");

    match events.next_of(EventKind::LobbyJoined).await {
        LobbyEvent::LobbyJoined { lobby, players } => {
            assert_eq!(lobby.lobby_id, "L1");
            assert_eq!(players.len(), 1);
            assert_eq!(players[0].id, "p_ann");
            assert_eq!(players[0].username, "Ann");
        }
        other => panic!("expected LobbyJoined, got {other:?}"),
    }
}

#[tokio::test]
async fn join_snapshot_naming_self_as_owner_makes_host() {
    let (client, mut hub) = start_client(test_config().with_player_id("p_me"));
    let task = tokio::spawn({
        let client = client.clone();
        async move { client.join_lobby(JoinLobbyParams::new("L1")).await }
    });
    let mut server = hub.accept().await;
    server.next_sent().await;
    server.push(lobby_state_json("L1", "p_me", &[("p_me", "Me"), ("p_b", "Bob")]));

    assert_ok!(task.await.unwrap());
    assert!(client.is_host());
    // The local player never appears among the remote players.
    let players = client.players();
    assert_eq!(players.len(), 1);
    assert_eq!(players[0].id, "p_b");
}

#[tokio::test]
async fn server_error_rejects_create() {
    let (client, mut hub) = start_client(test_config());
    let mut events = EventLog::attach(&client);

    let task = tokio::spawn({
        let client = client.clone();
        async move { client.create_lobby(CreateLobbyParams::new("Arena", 4)).await }
    });
    let mut server = hub.accept().await;
    server.next_sent().await;
    server.push(error_json("lobby limit reached"));

    let err = assert_err!(task.await.unwrap());
    assert!(matches!(err, LobbyError::Server { ref message } if message == "lobby limit reached"));
    assert!(client.lobby().is_none());
    assert!(!client.is_host());
    assert_eq!(client.phase(), Phase::Idle);

    match events.next_of(EventKind::Error).await {
        LobbyEvent::Error { message } => assert_eq!(message, "lobby limit reached"),
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_during_join_rejects_it() {
    let (client, mut hub) = start_client(test_config());
    let task = tokio::spawn({
        let client = client.clone();
        async move { client.join_lobby(JoinLobbyParams::new("L1")).await }
    });
    let mut server = hub.accept().await;
    server.next_sent().await;
    server.hang_up();

    let err = assert_err!(task.await.unwrap());
    assert!(matches!(err, LobbyError::Disconnected));
}

#[tokio::test]
async fn handshake_timeout_rejects_unanswered_create() {
    let (client, mut hub) =
        start_client(test_config().with_handshake_timeout(Duration::from_millis(50)));
    let task = tokio::spawn({
        let client = client.clone();
        async move { client.create_lobby(CreateLobbyParams::new("Arena", 4)).await }
    });
    let mut server = hub.accept().await;
    server.next_sent().await;

    let err = assert_err!(task.await.unwrap());
    assert!(matches!(err, LobbyError::Timeout));
    assert!(client.is_connected());
}

#[tokio::test]
async fn phase_is_connecting_while_handshake_is_outstanding() {
    let (client, mut hub) = start_client(test_config());
    let task = tokio::spawn({
        let client = client.clone();
        async move { client.create_lobby(CreateLobbyParams::new("Arena", 4)).await }
    });
    let mut server = hub.accept().await;
    let frame = server.next_sent().await;
    assert_eq!(client.phase(), Phase::Connecting);

    server.push(lobby_created_json("L1", "Arena", frame["playerId"].as_str().unwrap()));
    assert_ok!(task.await.unwrap());
    assert_eq!(client.phase(), Phase::LobbyOwner);
}

// ════════════════════════════════════════════════════════════════════
// Server-driven lobby transitions
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn kicked_fires_once_and_resets_state() {
    let (client, mut hub) = start_client(test_config());
    let server = join_as_member(&client, &mut hub).await;
    let mut events = EventLog::attach(&client);

    server.push(json!({"type": "lobby_kicked", "reason": "inactive"}));
    server.push(json!({"type": "lobby_kicked", "reason": "inactive"}));
    // Listings are always published, so this marks the end of the burst.
    server.push(json!({"type": "lobby_list", "lobbies": []}));

    assert_eq!(
        events.next().await,
        LobbyEvent::LobbyKicked {
            reason: Some("inactive".into())
        }
    );
    assert_eq!(
        events.next().await,
        LobbyEvent::LobbyList { lobbies: vec![] }
    );
    assert!(client.lobby().is_none());
    assert!(client.players().is_empty());
    assert_eq!(client.phase(), Phase::Idle);
    // Only the membership ended, not the connection.
    assert!(client.is_connected());
}

#[tokio::test]
async fn closed_is_distinct_from_kicked() {
    let (client, mut hub) = start_client(test_config());
    let server = join_as_member(&client, &mut hub).await;
    let mut events = EventLog::attach(&client);

    server.push(json!({"type": "lobby_closed", "reason": "host left"}));
    assert_eq!(
        events.next().await,
        LobbyEvent::LobbyClosed {
            reason: Some("host left".into())
        }
    );
    assert!(client.lobby().is_none());
    assert_eq!(client.phase(), Phase::Idle);
}

#[tokio::test]
async fn membership_deltas_update_players() {
    let (client, mut hub) = start_client(test_config().with_player_id("p_me"));
    let server = create_as_owner(&client, &mut hub, "Arena").await;
    let mut events = EventLog::attach(&client);

    server.push(json!({"type": "lobby_player_joined", "playerId": "p_bob", "username": "Bob"}));
    match events.next_of(EventKind::LobbyPlayerJoined).await {
        LobbyEvent::LobbyPlayerJoined { player } => assert_eq!(player.username, "Bob"),
        other => panic!("expected LobbyPlayerJoined, got {other:?}"),
    }
    assert_eq!(client.player("p_bob").unwrap().username, "Bob");

    // Own-id echo is not a remote player.
    server.push(json!({"type": "lobby_player_joined", "playerId": "p_me", "username": "Ann"}));
    server.push(json!({"type": "lobby_player_left", "playerId": "p_bob", "reason": "quit"}));
    match events.next_of(EventKind::LobbyPlayerLeft).await {
        LobbyEvent::LobbyPlayerLeft {
            player_id,
            username,
            reason,
        } => {
            assert_eq!(player_id, "p_bob");
            assert_eq!(username, "Bob");
            assert_eq!(reason.as_deref(), Some("quit"));
        }
        other => panic!("expected LobbyPlayerLeft, got {other:?}"),
    }
    assert!(client.players().is_empty());
}

#[tokio::test]
async fn owner_change_updates_is_host_in_place() {
    let (client, mut hub) = start_client(test_config().with_player_id("p_me"));
    let server = join_as_member(&client, &mut hub).await;
    let mut events = EventLog::attach(&client);
    assert!(!client.is_host());

    server.push(json!({"type": "lobby_owner_changed", "newOwnerId": "p_me"}));
    match events.next_of(EventKind::LobbyOwnerChanged).await {
        LobbyEvent::LobbyOwnerChanged { owner_id, is_host } => {
            assert_eq!(owner_id, "p_me");
            assert!(is_host);
        }
        other => panic!("expected LobbyOwnerChanged, got {other:?}"),
    }
    assert!(client.is_host());
    assert_eq!(client.lobby().unwrap().lobby_id, "L1");
}

#[tokio::test]
async fn state_updates_merge_in_arrival_order() {
    let (client, mut hub) = start_client(test_config());
    let server = join_as_member(&client, &mut hub).await;
    let mut events = EventLog::attach(&client);

    server.push(json!({"type": "state_update", "playerId": "p_ann", "data": {"hp": 10, "x": 1}}));
    server.push(json!({"type": "state_update", "playerId": "p_ann", "data": {"hp": 7}}));
    events.next_of(EventKind::StateUpdate).await;
    match events.next_of(EventKind::StateUpdate).await {
        LobbyEvent::StateUpdate { player_id, data } => {
            assert_eq!(player_id, "p_ann");
            assert_eq!(serde_json::Value::Object(data), json!({"hp": 7, "x": 1}));
        }
        other => panic!("expected StateUpdate, got {other:?}"),
    }
    let ann = client.player("p_ann").unwrap();
    assert_eq!(ann.username, "Ann");
    assert_eq!(ann.data["hp"], 7);
}

#[tokio::test]
async fn malformed_frames_produce_no_event_or_change() {
    let (client, mut hub) = start_client(test_config());
    let server = join_as_member(&client, &mut hub).await;
    let mut events = EventLog::attach(&client);
    let before = client.players();

    server.push_text("not json at all");
    server.push_text(r#"{"type":"lobby_kicked""#);
    server.push_text(r#"{"type":"lobby_owner_changed"}"#);
    server.push(json!({"type": "some_future_message", "x": 1}));
    server.push(json!({"type": "lobby_list", "lobbies": []}));

    assert_eq!(
        events.next().await,
        LobbyEvent::LobbyList { lobbies: vec![] }
    );
    assert_eq!(client.players(), before);
    assert!(client.lobby().is_some());
    assert!(client.is_connected());
}

// ════════════════════════════════════════════════════════════════════
// Leave / kick / close
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn leave_lobby_clears_state_without_waiting() {
    let (client, mut hub) = start_client(test_config());
    let mut server = join_as_member(&client, &mut hub).await;
    let mut events = EventLog::attach(&client);

    client.leave_lobby();
    assert!(client.lobby().is_none());
    assert!(client.players().is_empty());
    assert!(!client.is_host());
    assert_eq!(client.phase(), Phase::Idle);
    assert_eq!(events.drain(), vec![LobbyEvent::LobbyLeft { reason: None }]);

    assert_eq!(server.next_sent().await, json!({"type": "lobby_leave"}));

    // The server's acknowledgement arrives after the fact and is ignored.
    server.push(json!({"type": "lobby_left"}));
    server.push(json!({"type": "lobby_list", "lobbies": []}));
    assert_eq!(
        events.next().await,
        LobbyEvent::LobbyList { lobbies: vec![] }
    );
}

#[tokio::test]
async fn peer_traffic_after_leave_does_not_refill_players() {
    let (client, mut hub) = start_client(test_config());
    let mut server = join_as_member(&client, &mut hub).await;
    let mut events = EventLog::attach(&client);

    client.leave_lobby();
    assert_eq!(server.next_sent().await, json!({"type": "lobby_leave"}));
    let _ = events.drain();

    // Broadcasts the server sent before it handled the leave.
    server.push(json!({"type": "state_update", "playerId": "p_ann", "data": {"x": 1}}));
    server.push(json!({"type": "lobby_player_joined", "playerId": "p_bob", "username": "Bob"}));
    server.push(json!({"type": "lobby_list", "lobbies": []}));

    assert_eq!(
        events.next().await,
        LobbyEvent::LobbyList { lobbies: vec![] }
    );
    assert!(client.players().is_empty());
    assert!(client.lobby().is_none());
    assert_eq!(client.phase(), Phase::Idle);
}

#[tokio::test]
async fn leave_lobby_when_idle_publishes_nothing() {
    let (client, _hub) = start_client(test_config());
    let mut events = EventLog::attach(&client);
    client.leave_lobby();
    assert!(client.lobby().is_none());
    assert!(events.drain().is_empty());
}

#[tokio::test]
async fn kick_and_close_are_fire_and_forget() {
    let (client, mut hub) = start_client(test_config());
    let mut server = create_as_owner(&client, &mut hub, "Arena").await;

    client.kick_from_lobby("p_bob");
    client.close_lobby();
    assert_eq!(
        server.next_sent().await,
        json!({"type": "lobby_kick", "targetId": "p_bob"})
    );
    assert_eq!(server.next_sent().await, json!({"type": "lobby_close"}));
    // Nothing changes locally until the server says so.
    assert!(client.lobby().is_some());
}

// ════════════════════════════════════════════════════════════════════
// Listing
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn list_lobbies_returns_server_payload() {
    let (client, mut hub) = start_client(test_config());
    let task = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .list_lobbies(ListLobbiesParams::default().with_game_id("g2"))
                .await
        }
    });
    let mut server = hub.accept().await;
    assert_eq!(
        server.next_sent().await,
        json!({"type": "lobby_list", "gameId": "g2"})
    );
    server.push(json!({
        "type": "lobby_list",
        "lobbies": [{
            "lobbyId": "L1", "lobbyName": "PUBLIC_Arena", "isPublic": true,
            "playerCount": 2, "maxPlayers": 4, "ownerId": "p_ann"
        }]
    }));

    let lobbies = task.await.unwrap();
    assert_eq!(lobbies.len(), 1);
    assert_eq!(lobbies[0].lobby_id, "L1");
    assert_eq!(lobbies[0].player_count, 2);
}

#[tokio::test]
async fn list_lobbies_times_out_to_empty() {
    let (client, mut hub) =
        start_client(test_config().with_list_timeout(Duration::from_millis(50)));
    let task = tokio::spawn({
        let client = client.clone();
        async move { client.list_lobbies(ListLobbiesParams::default()).await }
    });
    let mut server = hub.accept().await;
    assert_eq!(server.next_sent().await["gameId"], "g1");

    assert!(task.await.unwrap().is_empty());
    assert!(client.is_connected());
}

#[tokio::test]
async fn list_lobbies_never_errors_when_unreachable() {
    let (client, hub) = start_client(test_config());
    hub.set_mode(ConnectMode::Refuse);
    assert!(client.list_lobbies(ListLobbiesParams::default()).await.is_empty());
    assert_eq!(hub.attempts(), 1);
}

// ════════════════════════════════════════════════════════════════════
// Connection lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn connect_is_idempotent() {
    let (client, mut hub) = start_client(test_config());
    let mut events = EventLog::attach(&client);

    assert_ok!(client.connect().await);
    let _server = hub.accept().await;
    assert_ok!(client.connect().await);

    assert_eq!(hub.attempts(), 1);
    assert!(client.is_connected());
    assert_eq!(events.drain(), vec![LobbyEvent::Connected]);
}

#[tokio::test]
async fn connect_without_server_url_fails() {
    let (client, hub) = start_client(lobbylink_client::ClientConfig::new("g1"));
    let err = assert_err!(client.connect().await);
    assert!(matches!(err, LobbyError::NoServerUrl));
    assert_eq!(hub.attempts(), 0);
}

#[tokio::test]
async fn connect_timeout_surfaces_error_event() {
    let (client, hub) =
        start_client(test_config().with_connect_timeout(Duration::from_millis(50)));
    hub.set_mode(ConnectMode::Hang);
    let mut events = EventLog::attach(&client);

    let err = assert_err!(client.create_lobby(CreateLobbyParams::new("Arena", 4)).await);
    assert!(matches!(err, LobbyError::ConnectTimeout));
    assert!(!client.is_connected());
    assert_eq!(client.phase(), Phase::Idle);
    assert!(matches!(events.next().await, LobbyEvent::Error { .. }));
}

#[tokio::test]
async fn unexpected_disconnect_resets_everything() {
    let (client, mut hub) = start_client(test_config());
    let server = join_as_member(&client, &mut hub).await;
    let mut events = EventLog::attach(&client);

    server.hang_up();
    assert_eq!(
        events.next().await,
        LobbyEvent::Disconnected { reason: None }
    );
    assert!(!client.is_connected());
    assert!(client.lobby().is_none());
    assert!(client.players().is_empty());
    assert!(!client.is_host());
    assert_eq!(client.phase(), Phase::Idle);
}

#[tokio::test]
async fn transport_error_publishes_error_then_disconnected() {
    let (client, mut hub) = start_client(test_config());
    let server = create_as_owner(&client, &mut hub, "Arena").await;
    let mut events = EventLog::attach(&client);

    server.fail("connection reset");
    assert!(matches!(events.next().await, LobbyEvent::Error { .. }));
    assert!(matches!(
        events.next().await,
        LobbyEvent::Disconnected { reason: Some(_) }
    ));
    assert!(client.lobby().is_none());
}

#[tokio::test]
async fn sends_on_closed_socket_are_dropped() {
    let (client, mut hub) = start_client(test_config());
    let server = create_as_owner(&client, &mut hub, "Arena").await;
    let mut events = EventLog::attach(&client);
    server.hang_up();
    events.next_of(EventKind::Disconnected).await;

    client.send_custom("ping", json!({}));
    client.kick_from_lobby("p_x");
    client.leave_lobby();
    assert!(events.drain().is_empty());
}

#[tokio::test]
async fn disconnect_closes_socket_and_reconnect_keeps_player_id() {
    let (client, mut hub) = start_client(test_config());
    let server = create_as_owner(&client, &mut hub, "Arena").await;
    let first_id = client.player_id().unwrap();
    let mut events = EventLog::attach(&client);

    client.disconnect().await;
    assert!(server.closed.load(std::sync::atomic::Ordering::Relaxed));
    assert_eq!(
        events.drain(),
        vec![LobbyEvent::Disconnected {
            reason: Some("client shut down".into())
        }]
    );
    assert!(!client.is_connected());
    assert!(client.lobby().is_none());

    // A later operation opens a fresh socket under the same identity.
    let _server = create_as_owner(&client, &mut hub, "Arena").await;
    assert_eq!(client.player_id().unwrap(), first_id);
    assert_eq!(hub.attempts(), 2);
}

#[tokio::test]
async fn disconnect_when_idle_is_a_no_op() {
    let (client, _hub) = start_client(test_config());
    let mut events = EventLog::attach(&client);
    client.disconnect().await;
    assert!(events.drain().is_empty());
}

// ════════════════════════════════════════════════════════════════════
// Legacy room and relay
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn legacy_room_flow() {
    let (client, mut hub) = start_client(test_config().with_player_id("p_me"));
    let mut events = EventLog::attach(&client);

    assert_ok!(client.join_room("room-7").await);
    let mut server = hub.accept().await;
    assert_eq!(
        server.next_sent().await,
        json!({
            "type": "join", "gameId": "g1", "roomId": "room-7",
            "playerId": "p_me", "username": "Ann"
        })
    );
    assert_eq!(client.phase(), Phase::LegacyRoom);
    assert_eq!(client.room_id().as_deref(), Some("room-7"));
    assert!(!client.is_host());

    server.push(json!({
        "type": "room_state",
        "players": [{"id": "p_me", "username": "Ann"}, {"id": "p_b", "username": "Bob"}]
    }));
    match events.next_of(EventKind::RoomState).await {
        LobbyEvent::RoomState { players } => {
            assert_eq!(players.len(), 1);
            assert_eq!(players[0].id, "p_b");
        }
        other => panic!("expected RoomState, got {other:?}"),
    }

    server.push(json!({"type": "player_joined", "playerId": "p_c", "username": "Cy"}));
    events.next_of(EventKind::PlayerJoined).await;
    server.push(json!({"type": "player_left", "playerId": "p_b"}));
    events.next_of(EventKind::PlayerLeft).await;

    let ids: Vec<_> = client.players().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec!["p_c".to_string()]);
}

#[tokio::test]
async fn relay_messages_carry_local_player_id() {
    let (client, mut hub) = start_client(test_config().with_player_id("p_me"));
    let mut server = create_as_owner(&client, &mut hub, "Arena").await;
    let mut events = EventLog::attach(&client);

    let data = json!({"ready": true}).as_object().cloned().unwrap();
    client.send_state_update(data);
    client.send_custom("emote", json!({"id": 3}));

    assert_eq!(
        server.next_sent().await,
        json!({"type": "state_update", "playerId": "p_me", "data": {"ready": true}})
    );
    assert_eq!(
        server.next_sent().await,
        json!({"type": "custom", "playerId": "p_me", "event": "emote", "data": {"id": 3}})
    );

    // Echo of our own update is not a remote player; relayed customs are
    // published as-is.
    server.push(json!({"type": "state_update", "playerId": "p_me", "data": {"ready": true}}));
    server.push(json!({"type": "custom", "playerId": "p_b", "event": "emote", "data": 1}));
    match events.next().await {
        LobbyEvent::Custom {
            player_id,
            event,
            data,
        } => {
            assert_eq!(player_id, "p_b");
            assert_eq!(event, "emote");
            assert_eq!(data, json!(1));
        }
        other => panic!("expected Custom, got {other:?}"),
    }
    assert!(client.players().is_empty());
}

#[tokio::test]
async fn panicking_handler_does_not_stop_dispatch() {
    let (client, mut hub) = start_client(test_config());
    let server = join_as_member(&client, &mut hub).await;
    client.subscribe(EventKind::Custom, |_| panic!("handler bug"));
    let mut events = EventLog::attach(&client);

    server.push(json!({"type": "custom", "playerId": "p_ann", "event": "a", "data": null}));
    server.push(json!({"type": "custom", "playerId": "p_ann", "event": "b", "data": null}));

    assert!(matches!(events.next().await, LobbyEvent::Custom { ref event, .. } if event == "a"));
    assert!(matches!(events.next().await, LobbyEvent::Custom { ref event, .. } if event == "b"));
    assert!(client.is_connected());
}

// ════════════════════════════════════════════════════════════════════
// Platform startup
// ════════════════════════════════════════════════════════════════════

fn platform_launch(lobby: Option<LobbyContext>) -> PlatformLaunch {
    PlatformLaunch {
        server_url: Some(SERVER_URL.into()),
        room_id: "room-1".into(),
        username: "Ann".into(),
        game_id: "g1".into(),
        lobby,
    }
}

#[tokio::test]
async fn launch_create_reaches_lobby_then_ready() {
    let (client, mut hub) = start_client(lobbylink_client::ClientConfig::new("unset"));
    let mut events = EventLog::attach(&client);

    let task = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .launch(platform_launch(Some(LobbyContext::Create {
                    lobby_name: "PUBLIC_Arena".into(),
                    max_players: 4,
                })))
                .await
        }
    });
    let mut server = hub.accept().await;
    let frame = server.next_sent().await;
    assert_eq!(frame["type"], "lobby_create");
    assert_eq!(frame["gameId"], "g1");
    server.push(lobby_created_json("L1", "PUBLIC_Arena", frame["playerId"].as_str().unwrap()));

    let outcome = task.await.unwrap();
    assert!(matches!(outcome, LaunchOutcome::LobbyCreated(ref lobby) if lobby.is_public));
    assert_eq!(
        events.next_of(EventKind::Ready).await,
        LobbyEvent::Ready { multiplayer: true }
    );
    assert!(client.is_host());
}

#[tokio::test]
async fn launch_join_rejection_falls_back_to_legacy_room() {
    let (client, mut hub) = start_client(lobbylink_client::ClientConfig::new("unset"));
    let mut events = EventLog::attach(&client);

    let task = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .launch(platform_launch(Some(LobbyContext::Join {
                    lobby_id: "GONE".into(),
                })))
                .await
        }
    });
    let mut server = hub.accept().await;
    assert_eq!(server.next_sent().await["type"], "lobby_join");
    server.push(error_json("lobby not found"));

    let fallback = server.next_sent().await;
    assert_eq!(fallback["type"], "join");
    assert_eq!(fallback["roomId"], "room-1");

    let outcome = task.await.unwrap();
    assert!(matches!(outcome, LaunchOutcome::LegacyRoom));
    assert_eq!(client.phase(), Phase::LegacyRoom);
    assert_eq!(
        events.next_of(EventKind::Ready).await,
        LobbyEvent::Ready { multiplayer: true }
    );
}

#[tokio::test]
async fn launch_without_lobby_context_joins_room() {
    let (client, mut hub) = start_client(lobbylink_client::ClientConfig::new("unset"));
    let outcome = client.launch(platform_launch(None)).await;
    assert!(matches!(outcome, LaunchOutcome::LegacyRoom));

    let mut server = hub.accept().await;
    assert_eq!(server.next_sent().await["type"], "join");
    assert!(server.try_next_sent().is_none());
}
