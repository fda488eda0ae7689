//! Local identity and the mirrored view of remote players.

use serde::Serialize;
use uuid::Uuid;

use crate::protocol::{LobbyInfo, PlayerData, RemotePlayer};

/// Length of the random suffix in generated player ids.
const PLAYER_ID_SUFFIX_LEN: usize = 12;

/// Generate a fresh player id of the form `p_<random>`.
pub fn generate_player_id() -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(PLAYER_ID_SUFFIX_LEN)
        .collect();
    format!("p_{suffix}")
}

/// Where the lobby state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No lobby or room membership.
    Idle,
    /// Opening the socket or waiting on a create/join handshake.
    Connecting,
    /// Member of a lobby the local player owns.
    LobbyOwner,
    /// Member of a lobby someone else owns.
    LobbyMember,
    /// Joined a legacy room.
    LegacyRoom,
}

/// Local player identity for one client lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Assigned once on the first connection attempt, then stable.
    pub player_id: Option<String>,
    pub username: String,
    pub game_id: String,
    pub connected: bool,
}

impl Session {
    /// Return the player id, generating it on first use.
    pub fn ensure_player_id(&mut self) -> String {
        self.player_id
            .get_or_insert_with(generate_player_id)
            .clone()
    }
}

/// Remote players keyed by id, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    players: Vec<RemotePlayer>,
}

impl Roster {
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn get(&self, id: &str) -> Option<&RemotePlayer> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn to_vec(&self) -> Vec<RemotePlayer> {
        self.players.clone()
    }

    /// Insert a player, or refresh a known one: the username is replaced and
    /// `player.data` is shallow-merged into what is already known. Returns
    /// the stored entry.
    pub fn upsert(&mut self, player: RemotePlayer) -> RemotePlayer {
        if let Some(existing) = self.players.iter_mut().find(|p| p.id == player.id) {
            existing.username = player.username;
            existing.merge(player.data);
            return existing.clone();
        }
        self.players.push(player.clone());
        player
    }

    /// Shallow-merge `patch` into a player's data, creating the entry if
    /// unknown. Returns the merged data.
    pub fn merge(&mut self, id: &str, patch: PlayerData) -> PlayerData {
        let idx = match self.players.iter().position(|p| p.id == id) {
            Some(idx) => idx,
            None => {
                self.players.push(RemotePlayer::new(id, ""));
                self.players.len() - 1
            }
        };
        match self.players.get_mut(idx) {
            Some(player) => {
                player.merge(patch);
                player.data.clone()
            }
            None => PlayerData::new(),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<RemotePlayer> {
        let idx = self.players.iter().position(|p| p.id == id)?;
        Some(self.players.remove(idx))
    }

    /// Replace the whole roster, dropping `own_id` from the snapshot.
    pub fn replace(&mut self, players: Vec<RemotePlayer>, own_id: Option<&str>) {
        self.players = players
            .into_iter()
            .filter(|p| Some(p.id.as_str()) != own_id)
            .collect();
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }
}

/// Everything the client mutates while handling frames and operations.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub session: Session,
    pub server_url: Option<String>,
    pub lobby: Option<LobbyInfo>,
    pub room_id: Option<String>,
    pub roster: Roster,
    /// Opens or create/join handshakes currently in flight.
    pub in_flight: usize,
}

impl SessionState {
    pub fn is_host(&self) -> bool {
        match (&self.lobby, &self.session.player_id) {
            (Some(lobby), Some(own)) => &lobby.owner_id == own,
            _ => false,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.lobby.is_some() {
            if self.is_host() {
                Phase::LobbyOwner
            } else {
                Phase::LobbyMember
            }
        } else if self.room_id.is_some() {
            Phase::LegacyRoom
        } else if self.in_flight > 0 {
            Phase::Connecting
        } else {
            Phase::Idle
        }
    }

    /// `true` while in a lobby or a legacy room.
    pub fn has_membership(&self) -> bool {
        self.lobby.is_some() || self.room_id.is_some()
    }

    pub fn is_own(&self, player_id: &str) -> bool {
        self.session.player_id.as_deref() == Some(player_id)
    }

    /// Drop lobby and room membership along with every remote player.
    pub fn clear_membership(&mut self) {
        self.lobby = None;
        self.room_id = None;
        self.roster.clear();
    }

    /// Reset after the socket is gone.
    pub fn reset_connection(&mut self) {
        self.session.connected = false;
        self.clear_membership();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(v: serde_json::Value) -> PlayerData {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn player_id_has_prefix_and_is_stable() {
        let mut session = Session::default();
        let first = session.ensure_player_id();
        assert!(first.starts_with("p_"));
        assert_eq!(first.len(), 2 + PLAYER_ID_SUFFIX_LEN);
        assert_eq!(session.ensure_player_id(), first);
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(generate_player_id(), generate_player_id());
    }

    #[test]
    fn merge_accumulates_in_arrival_order() {
        let mut roster = Roster::default();
        roster.upsert(RemotePlayer::new("p_a", "Ann"));
        roster.merge("p_a", data(json!({"hp": 10, "x": 1})));
        let merged = roster.merge("p_a", data(json!({"hp": 7})));
        assert_eq!(merged, data(json!({"hp": 7, "x": 1})));
        assert_eq!(roster.get("p_a").unwrap().username, "Ann");
    }

    #[test]
    fn rejoin_keeps_known_data() {
        let mut roster = Roster::default();
        roster.upsert(RemotePlayer::new("p_a", "Ann"));
        roster.merge("p_a", data(json!({"hp": 10})));

        let stored = roster.upsert(RemotePlayer::new("p_a", "Annie"));
        assert_eq!(stored.username, "Annie");
        assert_eq!(stored.data, data(json!({"hp": 10})));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.get("p_a").unwrap(), &stored);
    }

    #[test]
    fn merge_creates_unknown_player() {
        let mut roster = Roster::default();
        roster.merge("p_z", data(json!({"ready": true})));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.get("p_z").unwrap().data, data(json!({"ready": true})));
    }

    #[test]
    fn replace_skips_own_id() {
        let mut roster = Roster::default();
        roster.replace(
            vec![RemotePlayer::new("p_me", "Me"), RemotePlayer::new("p_b", "Bob")],
            Some("p_me"),
        );
        assert_eq!(roster.len(), 1);
        assert!(roster.get("p_me").is_none());
    }

    #[test]
    fn is_host_follows_owner_id() {
        let mut state = SessionState::default();
        state.session.player_id = Some("p_me".into());
        assert!(!state.is_host());
        assert_eq!(state.phase(), Phase::Idle);

        state.lobby = Some(LobbyInfo::new("L1", "Arena", "p_me", 4));
        assert!(state.is_host());
        assert_eq!(state.phase(), Phase::LobbyOwner);

        if let Some(lobby) = state.lobby.as_mut() {
            lobby.owner_id = "p_other".into();
        }
        assert!(!state.is_host());
        assert_eq!(state.phase(), Phase::LobbyMember);
    }

    #[test]
    fn reset_connection_clears_everything() {
        let mut state = SessionState::default();
        state.session.connected = true;
        state.lobby = Some(LobbyInfo::new("L1", "Arena", "p_x", 4));
        state.roster.upsert(RemotePlayer::new("p_x", "X"));

        state.reset_connection();
        assert!(!state.session.connected);
        assert!(state.lobby.is_none());
        assert!(state.roster.is_empty());
        assert_eq!(state.phase(), Phase::Idle);
    }
}
