//! Platform init adapter: one-shot startup for an embedded game.
//!
//! The hosting shell calls [`LobbyClient::launch`] once per page load with
//! whatever it knows about the session. The adapter picks singleplayer,
//! lobby create, lobby join, or the legacy room path, and always finishes by
//! publishing `ready`.

use tracing::{info, warn};

use crate::client::{CreateLobbyParams, JoinLobbyParams, LobbyClient};
use crate::error::LobbyError;
use crate::event::LobbyEvent;
use crate::pending::LobbySnapshot;
use crate::protocol::LobbyInfo;

/// Lobby the shell wants the session to start in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyContext {
    Create { lobby_name: String, max_players: u32 },
    Join { lobby_id: String },
}

/// Everything the hosting shell passes at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformLaunch {
    /// `None` starts a pure singleplayer session.
    pub server_url: Option<String>,
    /// Legacy room, used directly without a lobby context and as the
    /// fallback when a lobby handshake is rejected.
    pub room_id: String,
    pub username: String,
    pub game_id: String,
    pub lobby: Option<LobbyContext>,
}

/// Which path [`LobbyClient::launch`] ended up on.
///
/// The `ready` event carries only the multiplayer flag; this is the finer
/// grained answer for callers that care.
#[derive(Debug)]
pub enum LaunchOutcome {
    Singleplayer,
    LobbyCreated(LobbyInfo),
    LobbyJoined(LobbySnapshot),
    LegacyRoom,
    /// The legacy room could not be joined either.
    Failed(LobbyError),
}

impl LaunchOutcome {
    pub fn is_multiplayer(&self) -> bool {
        !matches!(self, Self::Singleplayer)
    }
}

impl LobbyClient {
    /// Start the session described by `launch`.
    ///
    /// Without a server URL this publishes `ready { multiplayer: false }` and
    /// touches no network. Otherwise it creates or joins the requested lobby,
    /// falling back to the legacy room on rejection, and then publishes
    /// `ready { multiplayer: true }` whichever path was taken.
    pub async fn launch(&self, launch: PlatformLaunch) -> LaunchOutcome {
        let PlatformLaunch {
            server_url,
            room_id,
            username,
            game_id,
            lobby,
        } = launch;

        self.apply_identity(Some(game_id), Some(username));
        let Some(server_url) = server_url else {
            info!("no server configured, starting singleplayer");
            self.events()
                .publish(&LobbyEvent::Ready { multiplayer: false });
            return LaunchOutcome::Singleplayer;
        };
        self.set_server_url(Some(server_url));

        let lobby_attempt = match lobby {
            Some(LobbyContext::Create {
                lobby_name,
                max_players,
            }) => Some(
                self.create_lobby(CreateLobbyParams::new(lobby_name, max_players))
                    .await
                    .map(LaunchOutcome::LobbyCreated),
            ),
            Some(LobbyContext::Join { lobby_id }) => Some(
                self.join_lobby(JoinLobbyParams::new(lobby_id))
                    .await
                    .map(LaunchOutcome::LobbyJoined),
            ),
            None => None,
        };

        let outcome = match lobby_attempt {
            Some(Ok(outcome)) => outcome,
            Some(Err(e)) => {
                warn!("lobby startup failed, falling back to legacy room: {e}");
                self.enter_room(room_id).await
            }
            None => self.enter_room(room_id).await,
        };

        self.events()
            .publish(&LobbyEvent::Ready { multiplayer: true });
        outcome
    }

    async fn enter_room(&self, room_id: String) -> LaunchOutcome {
        match self.join_room(room_id).await {
            Ok(()) => LaunchOutcome::LegacyRoom,
            Err(e) => {
                warn!("legacy room join failed: {e}");
                LaunchOutcome::Failed(e)
            }
        }
    }
}
