use serde::{Deserialize, Serialize};

use crate::events::{Event, Player};

/// Static per-round configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSettings {
    /// Round length in seconds
    pub round_length: u64,
    pub pan: bool,
    pub zoom: bool,
    #[serde(rename = "move")]
    pub movement: bool,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            round_length: 60,
            pan: true,
            zoom: true,
            movement: true,
        }
    }
}

/// The cluster-wide view of who is present. Every instance folds the same
/// log into one of these, so they all converge on the same player list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    #[serde(flatten)]
    pub settings: RoundSettings,
    pub players: Vec<Player>,
}

impl GameState {
    pub fn new(settings: RoundSettings) -> Self {
        Self {
            settings,
            players: Vec::new(),
        }
    }

    /// Fold one event into the player list.
    ///
    /// Joins append in log order. Leaves remove the earliest matching entry
    /// and do nothing for an id that is not present.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::PlayerJoined { player } => self.players.push(player.clone()),
            Event::PlayerLeft { player } => {
                if let Some(idx) = self.players.iter().position(|p| p.id == player.id) {
                    self.players.remove(idx);
                }
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.players.iter().any(|p| p.id.as_str() == id)
    }
}
