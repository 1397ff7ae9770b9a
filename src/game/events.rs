//! Round and Game Outcome Events
//!
//! Payloads the engine hands back when a discard closes a round or the
//! whole game. The network layer forwards them to the room verbatim.

use serde::{Deserialize, Serialize};

use crate::game::card::HandScore;
use crate::game::state::{PlayerId, PlayerStatus};

/// One player's revealed score at round end.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerScore {
    /// Player identity.
    pub player_id: PlayerId,
    /// Display name, for clients that only render names.
    pub name: String,
    /// Final hand score for the round.
    pub score: HandScore,
}

/// Post-round standing of a surviving player.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerStanding {
    /// Player identity.
    pub player_id: PlayerId,
    /// Display name.
    pub name: String,
    /// Lives left after the penalty.
    pub lives: u8,
    /// Active, on the cloud, or eliminated.
    pub status: PlayerStatus,
}

/// Everything a round reveals when it closes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundSummary {
    /// Round that just ended (1-based).
    pub round_number: u32,
    /// Revealed scores of every settled hand in the round. A seat
    /// caught mid-turn by a forced finish has no settled hand and
    /// does not appear.
    pub scores: Vec<PlayerScore>,
    /// Players who paid a life: the lowest scorers (ties share), or
    /// everyone but the winner when a 31 closed the round.
    pub losers: Vec<PlayerId>,
    /// Standing of every non-eliminated player after penalties.
    pub remaining: Vec<PlayerStanding>,
}

/// Terminal result of a game.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameOutcome {
    /// Sole survivor, or `None` when the last players fell together.
    pub winner: Option<PlayerStanding>,
    /// Round on which the game ended.
    pub final_round: u32,
}

/// What a state-changing engine call produced beyond the mutation
/// itself.
#[derive(Clone, Debug)]
pub enum TurnEvent {
    /// Turn advanced (or stayed) without closing the round.
    Continued,
    /// The round closed; a fresh one has already been dealt.
    RoundEnded(RoundSummary),
    /// The round closed and ended the game with it.
    GameOver {
        /// Scores and penalties of the closing round.
        summary: RoundSummary,
        /// Final result.
        outcome: GameOutcome,
    },
}
