//! Wire protocol types for the lobby server.
//!
//! Every frame is a JSON object whose `type` field carries a snake_case tag
//! and whose remaining fields are camelCase, e.g.
//! `{"type":"lobby_join","gameId":"g1","lobbyId":"L1",...}`.
//!
//! Both directions are closed enums. Inbound frames with a tag this client
//! does not know decode to [`ServerMessage::Unknown`] rather than failing, so
//! the dispatcher can match exhaustively and ignore them explicitly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lobby names starting with this marker are listed publicly.
pub const PUBLIC_LOBBY_PREFIX: &str = "PUBLIC_";

/// Returns `true` if `lobby_name` carries the public listing marker.
pub fn is_public_lobby_name(lobby_name: &str) -> bool {
    lobby_name.starts_with(PUBLIC_LOBBY_PREFIX)
}

/// Opaque per-player state, shallow-merged on every `state_update`.
pub type PlayerData = Map<String, Value>;

// ── Structs ─────────────────────────────────────────────────────────

/// A peer known to the local session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePlayer {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub data: PlayerData,
}

impl RemotePlayer {
    /// Create a player with empty data.
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            data: PlayerData::new(),
        }
    }

    /// Shallow-merge `patch` into this player's data; later keys win.
    pub fn merge(&mut self, patch: PlayerData) {
        self.data.extend(patch);
    }
}

/// Metadata of the lobby the local session belongs to.
///
/// `is_public` is derived from the lobby name (see [`PUBLIC_LOBBY_PREFIX`]),
/// never set independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyInfo {
    pub lobby_id: String,
    pub lobby_name: String,
    pub is_public: bool,
    pub owner_id: String,
    pub max_players: u32,
}

impl LobbyInfo {
    pub fn new(
        lobby_id: impl Into<String>,
        lobby_name: impl Into<String>,
        owner_id: impl Into<String>,
        max_players: u32,
    ) -> Self {
        let lobby_name = lobby_name.into();
        Self {
            lobby_id: lobby_id.into(),
            is_public: is_public_lobby_name(&lobby_name),
            lobby_name,
            owner_id: owner_id.into(),
            max_players,
        }
    }
}

/// One entry of a `lobby_list` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySummary {
    pub lobby_id: String,
    pub lobby_name: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub player_count: u32,
    #[serde(default)]
    pub max_players: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

// ── Messages ────────────────────────────────────────────────────────

/// Frames sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Request lobby creation.
    LobbyCreate {
        game_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lobby_id: Option<String>,
        lobby_name: String,
        max_players: u32,
        player_id: String,
        username: String,
    },
    /// Request to join an existing lobby.
    LobbyJoin {
        game_id: String,
        lobby_id: String,
        player_id: String,
        username: String,
    },
    /// Leave the current lobby.
    LobbyLeave,
    /// Request the public lobby listing for a game.
    LobbyList { game_id: String },
    /// Ask the server to remove a member (owner only, enforced server-side).
    LobbyKick { target_id: String },
    /// Ask the server to tear the lobby down (owner only, enforced server-side).
    LobbyClose,
    /// Legacy direct room join.
    Join {
        game_id: String,
        room_id: String,
        player_id: String,
        username: String,
    },
    /// Merge-broadcast local player data.
    StateUpdate { player_id: String, data: PlayerData },
    /// Application-defined relay message.
    Custom {
        player_id: String,
        event: String,
        data: Value,
    },
}

/// Frames sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Lobby creation confirmed; the requester owns it.
    LobbyCreated {
        lobby_id: String,
        lobby_name: String,
        #[serde(default)]
        is_public: bool,
        #[serde(default)]
        max_players: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<String>,
    },
    /// Full lobby snapshot sent on join.
    LobbyState {
        lobby_id: String,
        lobby_name: String,
        #[serde(default)]
        is_public: bool,
        owner_id: String,
        #[serde(default)]
        max_players: u32,
        #[serde(default)]
        players: Vec<RemotePlayer>,
    },
    LobbyPlayerJoined {
        player_id: String,
        #[serde(default)]
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    LobbyPlayerLeft {
        player_id: String,
        #[serde(default)]
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    LobbyLeft {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    LobbyKicked {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    LobbyClosed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    LobbyOwnerChanged { new_owner_id: String },
    LobbyList {
        #[serde(default)]
        lobbies: Vec<LobbySummary>,
    },
    StateUpdate {
        player_id: String,
        #[serde(default)]
        data: PlayerData,
    },
    Custom {
        player_id: String,
        event: String,
        #[serde(default)]
        data: Value,
    },
    /// Legacy room: a peer joined.
    PlayerJoined {
        player_id: String,
        #[serde(default)]
        username: String,
        #[serde(default)]
        data: PlayerData,
    },
    /// Legacy room: a peer left.
    PlayerLeft { player_id: String },
    /// Legacy room: full member snapshot.
    RoomState {
        #[serde(default)]
        players: Vec<RemotePlayer>,
    },
    /// Protocol-level failure notice.
    Error { message: String },
    /// Any tag this client does not understand.
    #[serde(other)]
    Unknown,
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
    use serde_json::json;

    #[test]
    fn public_marker_drives_is_public() {
        assert!(LobbyInfo::new("L1", "PUBLIC_Arena", "p_a", 4).is_public);
        assert!(!LobbyInfo::new("L1", "Arena", "p_a", 4).is_public);
        assert!(!LobbyInfo::new("L1", "public_Arena", "p_a", 4).is_public);
    }

    #[test]
    fn merge_is_shallow_and_later_keys_win() {
        let mut player = RemotePlayer::new("p_1", "Ann");
        player.merge(json!({"x": 1, "pos": {"a": 1}}).as_object().cloned().unwrap());
        player.merge(json!({"x": 2, "pos": {"b": 2}}).as_object().cloned().unwrap());
        assert_eq!(Value::Object(player.data), json!({"x": 2, "pos": {"b": 2}}));
    }

    #[test]
    fn lobby_leave_is_bare_tag() {
        let json = serde_json::to_value(ClientMessage::LobbyLeave).unwrap();
        assert_eq!(json, json!({"type": "lobby_leave"}));
    }

    #[test]
    fn lobby_create_omits_absent_lobby_id() {
        let msg = ClientMessage::LobbyCreate {
            game_id: "g1".into(),
            lobby_id: None,
            lobby_name: "PUBLIC_Arena".into(),
            max_players: 4,
            player_id: "p_1".into(),
            username: "Ann".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "lobby_create",
                "gameId": "g1",
                "lobbyName": "PUBLIC_Arena",
                "maxPlayers": 4,
                "playerId": "p_1",
                "username": "Ann"
            })
        );
    }

    #[test]
    fn unknown_tag_decodes_to_unknown() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"server_motd","text":"hi"}"#).unwrap();
        assert_eq!(msg, ServerMessage::Unknown);
    }

    #[test]
    fn owner_changed_reads_camel_case() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"lobby_owner_changed","newOwnerId":"p_b"}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::LobbyOwnerChanged {
                new_owner_id: "p_b".into()
            }
        );
    }

    #[test]
    fn kicked_without_reason_decodes() {
        let msg: ServerMessage = serde_json::from_str(r#"{"type":"lobby_kicked"}"#).unwrap();
        assert_eq!(msg, ServerMessage::LobbyKicked { reason: None });
    }
}
