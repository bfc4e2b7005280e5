//! Local mirror of the relay's player table.

use shared::{Motion, PlayerId, PlayerView, ServerMessage};
use std::collections::HashMap;

/// What this client believes every connected player looks like.
///
/// Every message is applied as an idempotent merge, so a duplicated or
/// late event never corrupts the view: joining twice overwrites, updating
/// an unknown player is ignored, leaving twice is a no-op.
#[derive(Debug, Clone, Default)]
pub struct WorldView {
    self_id: Option<PlayerId>,
    username: Option<String>,
    players: HashMap<PlayerId, PlayerView>,
}

impl WorldView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Our own id, known once `init` has arrived.
    pub fn self_id(&self) -> Option<&PlayerId> {
        self.self_id.as_ref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn get(&self, id: &PlayerId) -> Option<&PlayerView> {
        self.players.get(id)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerView> {
        self.players.values()
    }

    /// Players other than ourselves.
    pub fn others(&self) -> impl Iterator<Item = &PlayerView> {
        self.players
            .values()
            .filter(move |p| Some(&p.id) != self.self_id.as_ref())
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Records our own motion locally after sending it.
    pub fn set_own_motion(&mut self, motion: Motion) {
        if let Some(id) = &self.self_id {
            if let Some(player) = self.players.get_mut(id) {
                player.motion = motion;
            }
        }
    }

    pub fn apply(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Init {
                id,
                username,
                players,
            } => {
                self.self_id = Some(id);
                self.username = username;
                self.players.extend(players);
            }
            ServerMessage::PlayerJoined(view) => {
                self.players.insert(view.id.clone(), view);
            }
            ServerMessage::PlayerUpdate { id, motion } => {
                if let Some(player) = self.players.get_mut(&id) {
                    player.motion = motion;
                }
            }
            ServerMessage::PlayerLeft { id } => {
                self.players.remove(&id);
            }
        }
    }
}
