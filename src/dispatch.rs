//! Inbound frame decoding and routing.
//!
//! [`decode`] turns a text frame into a [`ServerMessage`], discarding frames
//! that are not valid JSON or do not fit their tag's shape. [`route`] applies
//! one decoded message to the session state and pending handshakes and
//! returns the events to publish. It never touches the bus itself, so the
//! caller can publish after releasing the state lock.

use tracing::{debug, warn};

use crate::event::LobbyEvent;
use crate::pending::{LobbySnapshot, PendingRequests};
use crate::protocol::{LobbyInfo, RemotePlayer, ServerMessage};
use crate::session::SessionState;

/// Parse one text frame. Malformed frames yield `None` and are only logged.
pub(crate) fn decode(text: &str) -> Option<ServerMessage> {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!("discarding malformed frame: {e}");
            None
        }
    }
}

/// Apply `msg` and return the events it produces, in publish order.
pub(crate) fn route(
    state: &mut SessionState,
    pending: &mut PendingRequests,
    msg: ServerMessage,
) -> Vec<LobbyEvent> {
    match msg {
        ServerMessage::LobbyCreated {
            lobby_id,
            lobby_name,
            max_players,
            player_id,
            ..
        } => {
            let own = state.session.ensure_player_id();
            if let Some(echoed) = player_id.filter(|p| p != &own) {
                warn!(%echoed, %own, "lobby_created names a different player id; keeping local id");
            }
            let lobby = LobbyInfo::new(lobby_id, lobby_name, own, max_players);
            state.room_id = None;
            state.roster.clear();
            state.lobby = Some(lobby.clone());
            debug!(lobby_id = %lobby.lobby_id, "state: lobby created");

            pending.resolve_create(lobby.clone());
            vec![LobbyEvent::LobbyCreated { lobby }]
        }

        ServerMessage::LobbyState {
            lobby_id,
            lobby_name,
            owner_id,
            max_players,
            players,
            ..
        } => {
            let lobby = LobbyInfo::new(lobby_id, lobby_name, owner_id, max_players);
            state.room_id = None;
            let own = state.session.player_id.clone();
            state.roster.replace(players.clone(), own.as_deref());
            state.lobby = Some(lobby.clone());
            debug!(lobby_id = %lobby.lobby_id, members = players.len(), "state: lobby joined");

            pending.resolve_join(LobbySnapshot {
                lobby: lobby.clone(),
                players: players.clone(),
            });
            vec![LobbyEvent::LobbyJoined { lobby, players }]
        }

        ServerMessage::LobbyPlayerJoined {
            player_id,
            username,
            ..
        } => {
            if !accepts_peer_traffic(state, &player_id) {
                return Vec::new();
            }
            let player = state.roster.upsert(RemotePlayer::new(player_id, username));
            vec![LobbyEvent::LobbyPlayerJoined { player }]
        }

        ServerMessage::LobbyPlayerLeft {
            player_id,
            username,
            reason,
        } => {
            if state.is_own(&player_id) {
                return Vec::new();
            }
            let removed = state.roster.remove(&player_id);
            let username = if username.is_empty() {
                removed.map(|p| p.username).unwrap_or_default()
            } else {
                username
            };
            vec![LobbyEvent::LobbyPlayerLeft {
                player_id,
                username,
                reason,
            }]
        }

        ServerMessage::LobbyLeft { reason } if exit_lobby(state, "left") => {
            vec![LobbyEvent::LobbyLeft { reason }]
        }
        ServerMessage::LobbyKicked { reason } if exit_lobby(state, "kicked") => {
            vec![LobbyEvent::LobbyKicked { reason }]
        }
        ServerMessage::LobbyClosed { reason } if exit_lobby(state, "closed") => {
            vec![LobbyEvent::LobbyClosed { reason }]
        }
        ServerMessage::LobbyLeft { .. }
        | ServerMessage::LobbyKicked { .. }
        | ServerMessage::LobbyClosed { .. } => {
            debug!("ignoring lobby exit outside a lobby");
            Vec::new()
        }

        ServerMessage::LobbyOwnerChanged { new_owner_id } => {
            let Some(lobby) = state.lobby.as_mut() else {
                debug!("ignoring owner change outside a lobby");
                return Vec::new();
            };
            lobby.owner_id = new_owner_id.clone();
            let is_host = state.is_host();
            debug!(owner = %new_owner_id, is_host, "state: lobby owner changed");
            vec![LobbyEvent::LobbyOwnerChanged {
                owner_id: new_owner_id,
                is_host,
            }]
        }

        ServerMessage::LobbyList { lobbies } => {
            pending.resolve_list(lobbies.clone());
            vec![LobbyEvent::LobbyList { lobbies }]
        }

        ServerMessage::StateUpdate { player_id, data } => {
            if !accepts_peer_traffic(state, &player_id) {
                return Vec::new();
            }
            let data = state.roster.merge(&player_id, data);
            vec![LobbyEvent::StateUpdate { player_id, data }]
        }

        ServerMessage::Custom {
            player_id,
            event,
            data,
        } => {
            if state.is_own(&player_id) {
                return Vec::new();
            }
            vec![LobbyEvent::Custom {
                player_id,
                event,
                data,
            }]
        }

        ServerMessage::PlayerJoined {
            player_id,
            username,
            data,
        } => {
            if !accepts_peer_traffic(state, &player_id) {
                return Vec::new();
            }
            let player = state.roster.upsert(RemotePlayer {
                id: player_id,
                username,
                data,
            });
            vec![LobbyEvent::PlayerJoined { player }]
        }

        ServerMessage::PlayerLeft { player_id } => {
            state.roster.remove(&player_id);
            vec![LobbyEvent::PlayerLeft { player_id }]
        }

        ServerMessage::RoomState { players } => {
            if !state.has_membership() {
                debug!("ignoring room snapshot outside a room");
                return Vec::new();
            }
            let own = state.session.player_id.clone();
            state.roster.replace(players, own.as_deref());
            vec![LobbyEvent::RoomState {
                players: state.roster.to_vec(),
            }]
        }

        ServerMessage::Error { message } => {
            warn!(%message, "server reported an error");
            pending.reject_handshake(&message);
            vec![LobbyEvent::Error { message }]
        }

        ServerMessage::Unknown => {
            debug!("ignoring frame with unrecognized type");
            Vec::new()
        }
    }
}

/// Peer broadcasts only apply to a current lobby or room, and never to the
/// local player's own echoes.
fn accepts_peer_traffic(state: &SessionState, player_id: &str) -> bool {
    if !state.has_membership() {
        debug!(player_id, "ignoring peer traffic outside a lobby or room");
        return false;
    }
    !state.is_own(player_id)
}

/// Forced exit from the current lobby. `false` if there was no lobby.
fn exit_lobby(state: &mut SessionState, how: &str) -> bool {
    if state.lobby.is_none() {
        return false;
    }
    state.clear_membership();
    debug!(how, "state: lobby exited");
    true
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn state_as(own: &str) -> SessionState {
        let mut state = SessionState::default();
        state.session.player_id = Some(own.into());
        state.session.connected = true;
        state
    }

    fn frame(state: &mut SessionState, pending: &mut PendingRequests, v: Value) -> Vec<LobbyEvent> {
        let msg = decode(&v.to_string()).expect("valid frame");
        route(state, pending, msg)
    }

    fn member_of_lobby(own: &str) -> (SessionState, PendingRequests) {
        let mut state = state_as(own);
        let mut pending = PendingRequests::default();
        frame(
            &mut state,
            &mut pending,
            json!({
                "type": "lobby_state", "lobbyId": "L1", "lobbyName": "Arena",
                "isPublic": false, "ownerId": "p_ann", "maxPlayers": 4,
                "players": [{"id": "p_ann", "username": "Ann", "data": {}},
                            {"id": own, "username": "Me", "data": {}}]
            }),
        );
        (state, pending)
    }

    #[test]
    fn malformed_frames_decode_to_none() {
        assert!(decode("not json").is_none());
        assert!(decode(r#"{"type":"lobby_owner_changed"}"#).is_none());
        assert!(decode("{}").is_none());
    }

    #[test]
    fn lobby_created_makes_local_player_owner() {
        let mut state = state_as("p_me");
        let mut pending = PendingRequests::default();
        state.room_id = Some("legacy".into());

        let events = frame(
            &mut state,
            &mut pending,
            json!({"type": "lobby_created", "lobbyId": "L1", "lobbyName": "PUBLIC_Arena",
                   "isPublic": true, "maxPlayers": 4, "playerId": "p_me"}),
        );

        assert!(state.is_host());
        assert!(state.room_id.is_none());
        let lobby = state.lobby.clone().unwrap();
        assert!(lobby.is_public);
        assert_eq!(events, vec![LobbyEvent::LobbyCreated { lobby }]);
    }

    #[test]
    fn is_public_ignores_server_flag() {
        let mut state = state_as("p_me");
        let mut pending = PendingRequests::default();
        frame(
            &mut state,
            &mut pending,
            json!({"type": "lobby_created", "lobbyId": "L1", "lobbyName": "Arena",
                   "isPublic": true, "maxPlayers": 4}),
        );
        assert!(!state.lobby.unwrap().is_public);
    }

    #[test]
    fn lobby_state_mirrors_peers_but_not_self() {
        let (state, _pending) = member_of_lobby("p_me");
        assert!(!state.is_host());
        assert_eq!(state.roster.len(), 1);
        assert!(state.roster.get("p_ann").is_some());
    }

    #[test]
    fn membership_deltas_update_roster() {
        let (mut state, mut pending) = member_of_lobby("p_me");

        let joined = frame(
            &mut state,
            &mut pending,
            json!({"type": "lobby_player_joined", "playerId": "p_bob", "username": "Bob"}),
        );
        assert_eq!(
            joined,
            vec![LobbyEvent::LobbyPlayerJoined {
                player: RemotePlayer::new("p_bob", "Bob")
            }]
        );
        assert_eq!(state.roster.len(), 2);

        let left = frame(
            &mut state,
            &mut pending,
            json!({"type": "lobby_player_left", "playerId": "p_bob", "reason": "quit"}),
        );
        assert_eq!(
            left,
            vec![LobbyEvent::LobbyPlayerLeft {
                player_id: "p_bob".into(),
                username: "Bob".into(),
                reason: Some("quit".into()),
            }]
        );
        assert_eq!(state.roster.len(), 1);
        assert!(state.lobby.is_some());
    }

    #[test]
    fn owner_change_updates_is_host_in_place() {
        let (mut state, mut pending) = member_of_lobby("p_me");
        let events = frame(
            &mut state,
            &mut pending,
            json!({"type": "lobby_owner_changed", "newOwnerId": "p_me"}),
        );
        assert!(state.is_host());
        assert_eq!(
            events,
            vec![LobbyEvent::LobbyOwnerChanged {
                owner_id: "p_me".into(),
                is_host: true
            }]
        );
    }

    #[test]
    fn kicked_and_closed_are_distinct_and_reset_membership() {
        let (mut state, mut pending) = member_of_lobby("p_me");
        let kicked = frame(
            &mut state,
            &mut pending,
            json!({"type": "lobby_kicked", "reason": "inactive"}),
        );
        assert_eq!(
            kicked,
            vec![LobbyEvent::LobbyKicked {
                reason: Some("inactive".into())
            }]
        );
        assert!(state.lobby.is_none());
        assert!(state.roster.is_empty());

        // A second exit notice after the lobby is gone is a no-op.
        let again = frame(&mut state, &mut pending, json!({"type": "lobby_closed"}));
        assert!(again.is_empty());

        let (mut state, mut pending) = member_of_lobby("p_me");
        let closed = frame(&mut state, &mut pending, json!({"type": "lobby_closed"}));
        assert_eq!(closed, vec![LobbyEvent::LobbyClosed { reason: None }]);
    }

    #[test]
    fn state_updates_merge_in_arrival_order() {
        let (mut state, mut pending) = member_of_lobby("p_me");
        let updates = [
            json!({"x": 1, "y": 1}),
            json!({"y": 2}),
            json!({"z": 3, "x": 4}),
        ];
        let mut last = Vec::new();
        for data in updates {
            last = frame(
                &mut state,
                &mut pending,
                json!({"type": "state_update", "playerId": "p_ann", "data": data}),
            );
        }
        let expected = json!({"x": 4, "y": 2, "z": 3});
        assert_eq!(
            Value::Object(state.roster.get("p_ann").unwrap().data.clone()),
            expected
        );
        assert_eq!(
            last,
            vec![LobbyEvent::StateUpdate {
                player_id: "p_ann".into(),
                data: expected.as_object().cloned().unwrap(),
            }]
        );
    }

    #[test]
    fn own_state_echo_is_ignored() {
        let (mut state, mut pending) = member_of_lobby("p_me");
        let events = frame(
            &mut state,
            &mut pending,
            json!({"type": "state_update", "playerId": "p_me", "data": {"x": 1}}),
        );
        assert!(events.is_empty());
        assert!(state.roster.get("p_me").is_none());
    }

    #[test]
    fn legacy_room_family_maintains_roster() {
        let mut state = state_as("p_me");
        let mut pending = PendingRequests::default();
        state.room_id = Some("room-1".into());

        let snapshot = frame(
            &mut state,
            &mut pending,
            json!({"type": "room_state", "players": [
                {"id": "p_me", "username": "Me"},
                {"id": "p_a", "username": "A", "data": {"hp": 3}}
            ]}),
        );
        assert_eq!(snapshot.len(), 1);
        assert_eq!(state.roster.len(), 1);

        frame(
            &mut state,
            &mut pending,
            json!({"type": "player_joined", "playerId": "p_b", "username": "B"}),
        );
        frame(
            &mut state,
            &mut pending,
            json!({"type": "player_left", "playerId": "p_a"}),
        );
        assert!(state.roster.get("p_a").is_none());
        assert!(state.roster.get("p_b").is_some());
    }

    #[test]
    fn peer_traffic_outside_lobby_or_room_is_ignored() {
        let (mut state, mut pending) = member_of_lobby("p_me");
        frame(&mut state, &mut pending, json!({"type": "lobby_kicked"}));
        assert_eq!(state.phase(), crate::session::Phase::Idle);

        let late = [
            json!({"type": "state_update", "playerId": "p_ann", "data": {"x": 1}}),
            json!({"type": "lobby_player_joined", "playerId": "p_bob", "username": "Bob"}),
            json!({"type": "player_joined", "playerId": "p_cy", "username": "Cy"}),
            json!({"type": "room_state", "players": [{"id": "p_dee"}]}),
        ];
        for msg in late {
            assert!(frame(&mut state, &mut pending, msg).is_empty());
        }
        assert!(state.roster.is_empty());
    }

    #[test]
    fn own_custom_echo_is_ignored() {
        let (mut state, mut pending) = member_of_lobby("p_me");
        let own = frame(
            &mut state,
            &mut pending,
            json!({"type": "custom", "playerId": "p_me", "event": "emote", "data": 1}),
        );
        assert!(own.is_empty());

        let peer = frame(
            &mut state,
            &mut pending,
            json!({"type": "custom", "playerId": "p_ann", "event": "emote", "data": 1}),
        );
        assert_eq!(
            peer,
            vec![LobbyEvent::Custom {
                player_id: "p_ann".into(),
                event: "emote".into(),
                data: json!(1),
            }]
        );
    }

    #[test]
    fn repeated_join_notice_keeps_merged_data() {
        let (mut state, mut pending) = member_of_lobby("p_me");
        frame(
            &mut state,
            &mut pending,
            json!({"type": "state_update", "playerId": "p_ann", "data": {"ready": true}}),
        );
        let events = frame(
            &mut state,
            &mut pending,
            json!({"type": "lobby_player_joined", "playerId": "p_ann", "username": "Ann"}),
        );

        let ann = state.roster.get("p_ann").unwrap();
        assert_eq!(ann.data["ready"], true);
        assert_eq!(
            events,
            vec![LobbyEvent::LobbyPlayerJoined { player: ann.clone() }]
        );
    }

    #[test]
    fn server_error_is_published_and_rejects_handshake() {
        let mut state = state_as("p_me");
        let mut pending = PendingRequests::default();
        let (_, mut rx) = pending.register_join();

        let events = frame(
            &mut state,
            &mut pending,
            json!({"type": "error", "message": "lobby full"}),
        );
        assert_eq!(
            events,
            vec![LobbyEvent::Error {
                message: "lobby full".into()
            }]
        );
        assert!(rx.try_recv().unwrap().is_err());
        assert!(state.lobby.is_none());
    }

    #[test]
    fn unknown_frames_produce_nothing() {
        let (mut state, mut pending) = member_of_lobby("p_me");
        let before = state.roster.clone();
        let events = frame(&mut state, &mut pending, json!({"type": "motd", "text": "hi"}));
        assert!(events.is_empty());
        assert_eq!(state.roster, before);
    }
}
