//! Game State Definitions
//!
//! Player identity and the tagged states the engine transitions
//! through. Elimination progress and turn progress are explicit enums
//! so that every reachable combination is a handled one.

use serde::{Deserialize, Serialize};

use crate::game::card::Hand;

/// Durable player identifier.
///
/// Minted when a player first joins a room and stable across
/// reconnection; the transport connection is mapped to it, never the
/// other way around.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(uuid::Uuid);

impl PlayerId {
    /// Mint a fresh identity.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse from its string form.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Elimination progress of a player across rounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    /// Holding one or more lives.
    #[default]
    Active,
    /// Lives exhausted; one more loss eliminates.
    OnCloud,
    /// Out of the game for good.
    Eliminated,
}

impl PlayerStatus {
    /// Players still dealt into rounds.
    pub fn is_in_round(self) -> bool {
        !matches!(self, PlayerStatus::Eliminated)
    }
}

/// Where the active player is within their turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// Must draw one card (deck or discard) before anything else.
    #[default]
    AwaitingDraw,
    /// Holding four cards; must discard one.
    AwaitingDiscard,
}

/// Lifecycle of a game.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    /// Lobby: players may still join or leave freely.
    #[default]
    Waiting,
    /// Rounds in progress.
    Playing,
    /// At most one player left standing.
    GameOver,
}

/// Number of lives each player starts with.
pub const STARTING_LIVES: u8 = 3;

/// One seat in a game. Seating order is shared with the room.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GamePlayer {
    /// Durable identity.
    pub id: PlayerId,
    /// Display name, shown to the whole room.
    pub name: String,
    /// Cards currently held.
    pub hand: Hand,
    /// Lives remaining; pinned at 0 once on the cloud.
    pub lives: u8,
    /// Elimination progress.
    pub status: PlayerStatus,
}

impl GamePlayer {
    /// A fresh seat with full lives and an empty hand.
    pub fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            hand: Hand::new(),
            lives: STARTING_LIVES,
            status: PlayerStatus::Active,
        }
    }

    /// Apply one round loss: Active with spare lives decrements,
    /// Active on the last life steps onto the cloud, OnCloud falls off
    /// into elimination. Eliminated players never lose again.
    pub fn lose_life(&mut self) {
        match self.status {
            PlayerStatus::Active => {
                if self.lives > 1 {
                    self.lives -= 1;
                } else {
                    self.lives = 0;
                    self.status = PlayerStatus::OnCloud;
                }
            }
            PlayerStatus::OnCloud => {
                self.status = PlayerStatus::Eliminated;
            }
            PlayerStatus::Eliminated => {}
        }
    }
}
