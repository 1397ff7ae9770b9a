//! Turn State Machine
//!
//! A single room's authoritative game: deal, draw-then-discard
//! enforcement, knock/final-round accounting, and the lives → cloud →
//! eliminated progression. Every mutating call validates first and
//! leaves state untouched on rejection; nothing in here panics across
//! the room boundary.

use tracing::debug;

use crate::game::card::{Card, Deck, HandScore};
use crate::game::events::{GameOutcome, PlayerScore, PlayerStanding, RoundSummary, TurnEvent};
use crate::game::state::{GamePhase, GamePlayer, PlayerId, TurnPhase};
use crate::MAX_PLAYERS;

/// Cards dealt to each seat at the start of a round.
pub const HAND_SIZE: usize = 3;

/// Rejections produced by the engine. All leave state unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Out of turn, wrong phase, double draw, discard before draw, or
    /// knock after a knock.
    #[error("Invalid action")]
    InvalidAction,

    /// Discard index outside the hand.
    #[error("Card index out of range")]
    IndexOutOfRange,

    /// Seat limit reached.
    #[error("Game is full")]
    GameFull,

    /// Join attempted after the first deal.
    #[error("Game already started")]
    AlreadyStarted,

    /// Start attempted with fewer than two seats.
    #[error("Not enough players")]
    NotEnoughPlayers,

    /// Draw pile and recycled discards both exhausted. Unreachable
    /// with 52 cards and six 3-card hands; kept so draws can never
    /// panic.
    #[error("Deck exhausted")]
    EmptyDeck,
}

/// An armed knock: the round ends when the turn returns to the
/// knocker's seat.
#[derive(Debug, Clone, Copy)]
pub struct Knock {
    /// Who knocked.
    pub knocker: PlayerId,
    /// Seat index the turn must come back around to.
    pub last_seat: usize,
}

/// The turn-based state machine for one room.
#[derive(Debug, Clone)]
pub struct Game {
    players: Vec<GamePlayer>,
    deck: Deck,
    discard: Vec<Card>,
    current: usize,
    starting: usize,
    round_number: u32,
    knock: Option<Knock>,
    turn_phase: TurnPhase,
    phase: GamePhase,
}

impl Game {
    /// An empty game in the lobby phase.
    pub fn new() -> Self {
        Self {
            players: Vec::new(),
            deck: Deck::shuffled(),
            discard: Vec::new(),
            current: 0,
            starting: 0,
            round_number: 1,
            knock: None,
            turn_phase: TurnPhase::AwaitingDraw,
            phase: GamePhase::Waiting,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Lifecycle phase.
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Seats in seating order.
    pub fn players(&self) -> &[GamePlayer] {
        &self.players
    }

    /// Seat index whose turn it is.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// The player whose turn it is.
    pub fn current_player(&self) -> Option<&GamePlayer> {
        self.players.get(self.current)
    }

    /// Current round, 1-based.
    pub fn round_number(&self) -> u32 {
        self.round_number
    }

    /// The armed knock, if any. `Some` iff the final round is running.
    pub fn knock_state(&self) -> Option<&Knock> {
        self.knock.as_ref()
    }

    /// Whether the current player still has to draw or has to discard.
    pub fn turn_phase(&self) -> TurnPhase {
        self.turn_phase
    }

    /// Top of the discard pile.
    pub fn top_discard(&self) -> Option<Card> {
        self.discard.last().copied()
    }

    /// Cards left in the draw pile.
    pub fn deck_len(&self) -> usize {
        self.deck.len()
    }

    fn seat_of(&self, player_id: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id == player_id)
    }

    fn in_round_count(&self) -> usize {
        self.players
            .iter()
            .filter(|p| p.status.is_in_round())
            .count()
    }

    // -------------------------------------------------------------------------
    // Membership
    // -------------------------------------------------------------------------

    /// Seat a player. Only possible before the first deal.
    pub fn add_player(&mut self, id: PlayerId, name: String) -> Result<(), GameError> {
        if self.phase != GamePhase::Waiting {
            return Err(GameError::AlreadyStarted);
        }
        if self.players.len() >= MAX_PLAYERS {
            return Err(GameError::GameFull);
        }
        self.players.push(GamePlayer::new(id, name));
        Ok(())
    }

    /// Remove a seat (leave or disconnect timeout). Their cards leave
    /// play until the next deal rebuilds the full deck.
    ///
    /// Returns a closing [`TurnEvent`] when the removal ends the game.
    pub fn remove_player(&mut self, id: PlayerId) -> Option<TurnEvent> {
        let idx = self.seat_of(id)?;
        let was_current = idx == self.current;
        self.players.remove(idx);

        if self.players.is_empty() {
            return None;
        }

        // Shift seat references left past the removed index, wrapping
        // any reference that fell off the end.
        let len = self.players.len();
        if idx < self.current {
            self.current -= 1;
        }
        if self.current >= len {
            self.current = 0;
        }
        if idx < self.starting {
            self.starting -= 1;
        }
        if self.starting >= len {
            self.starting = 0;
        }
        if let Some(knock) = self.knock.as_mut() {
            if idx < knock.last_seat {
                knock.last_seat -= 1;
            }
            if knock.last_seat >= len {
                knock.last_seat = 0;
            }
        }

        if self.phase != GamePhase::Playing {
            return None;
        }

        // A removal can leave the game unwinnable.
        if self.in_round_count() <= 1 {
            return Some(self.finish_game(self.round_summary()));
        }

        // The removed player may have left mid-turn holding four cards
        // elsewhere; the turn passes cleanly to the next seat.
        if was_current {
            self.turn_phase = TurnPhase::AwaitingDraw;
            while !self.players[self.current].status.is_in_round() {
                self.current = (self.current + 1) % self.players.len();
            }
            if let Some(knock) = self.knock {
                if self.current == knock.last_seat {
                    return Some(self.end_round());
                }
            }
        }

        None
    }

    // -------------------------------------------------------------------------
    // Round lifecycle
    // -------------------------------------------------------------------------

    /// Begin play: first deal, first turn.
    pub fn start(&mut self) -> Result<(), GameError> {
        if self.phase != GamePhase::Waiting {
            return Err(GameError::AlreadyStarted);
        }
        if self.players.len() < crate::MIN_PLAYERS {
            return Err(GameError::NotEnoughPlayers);
        }
        self.phase = GamePhase::Playing;
        self.deal_round();
        Ok(())
    }

    /// Deal a fresh round: new shuffled deck, three cards round-robin
    /// to every non-eliminated seat, one card flipped to the discard
    /// pile, starting seat rotated one seat onward.
    fn deal_round(&mut self) {
        self.deck = Deck::shuffled();
        self.discard.clear();
        self.knock = None;
        self.turn_phase = TurnPhase::AwaitingDraw;

        for player in &mut self.players {
            player.hand.clear();
        }

        for _ in 0..HAND_SIZE {
            for player in &mut self.players {
                if player.status.is_in_round() {
                    // A fresh 52-card deck always covers six 3-card hands.
                    if let Some(card) = self.deck.draw() {
                        player.hand.add(card);
                    }
                }
            }
        }

        if let Some(card) = self.deck.draw() {
            self.discard.push(card);
        }

        // Rotate the opening seat, skipping eliminated players.
        self.starting = (self.starting + 1) % self.players.len();
        self.current = self.starting;
        while !self.players[self.current].status.is_in_round() {
            self.current = (self.current + 1) % self.players.len();
        }

        debug!(
            round = self.round_number,
            opener = %self.players[self.current].id,
            "dealt new round"
        );
    }

    // -------------------------------------------------------------------------
    // Turn actions
    // -------------------------------------------------------------------------

    fn guard_turn(&self, player_id: PlayerId, expected: TurnPhase) -> Result<(), GameError> {
        if self.phase != GamePhase::Playing {
            return Err(GameError::InvalidAction);
        }
        let current = self.current_player().ok_or(GameError::InvalidAction)?;
        if current.id != player_id {
            return Err(GameError::InvalidAction);
        }
        if self.turn_phase != expected {
            return Err(GameError::InvalidAction);
        }
        Ok(())
    }

    /// Draw the top card of the deck. When the deck is empty, the
    /// discard pile minus its top card is reshuffled back in first, so
    /// the visible top card survives the recycle.
    pub fn draw_from_deck(&mut self, player_id: PlayerId) -> Result<Card, GameError> {
        self.guard_turn(player_id, TurnPhase::AwaitingDraw)?;

        if self.deck.is_empty() {
            let top = self.discard.pop().ok_or(GameError::EmptyDeck)?;
            let recycled = std::mem::take(&mut self.discard);
            self.deck = Deck::reshuffled(recycled);
            self.discard.push(top);
            debug!(recycled = self.deck.len(), "reshuffled discards into deck");
        }

        let card = self.deck.draw().ok_or(GameError::EmptyDeck)?;
        self.players[self.current].hand.add(card);
        self.turn_phase = TurnPhase::AwaitingDiscard;
        Ok(card)
    }

    /// Take the top card of the discard pile instead.
    pub fn draw_from_discard(&mut self, player_id: PlayerId) -> Result<Card, GameError> {
        self.guard_turn(player_id, TurnPhase::AwaitingDraw)?;

        let card = self.discard.pop().ok_or(GameError::InvalidAction)?;
        self.players[self.current].hand.add(card);
        self.turn_phase = TurnPhase::AwaitingDiscard;
        Ok(card)
    }

    /// Discard one card by hand index, completing the turn. A hand
    /// left at exactly 31 wins the round instantly: every other
    /// non-eliminated player pays a life and the round closes.
    pub fn discard(&mut self, player_id: PlayerId, index: usize) -> Result<TurnEvent, GameError> {
        self.guard_turn(player_id, TurnPhase::AwaitingDiscard)?;

        let card = self.players[self.current]
            .hand
            .remove(index)
            .ok_or(GameError::IndexOutOfRange)?;
        self.discard.push(card);

        if self.players[self.current].hand.is_complete() {
            debug!(player = %player_id, "instant 31, round over");
            let summary = self.round_summary();
            let mut losers = Vec::new();
            for i in 0..self.players.len() {
                if i != self.current && self.players[i].status.is_in_round() {
                    self.players[i].lose_life();
                    losers.push(self.players[i].id);
                }
            }
            return Ok(self.close_round(summary, losers));
        }

        Ok(self.advance_turn())
    }

    /// Knock: declare the final round instead of playing a turn.
    /// Allowed once per round, only on your turn and before drawing.
    /// Everyone else gets exactly one more turn; the knocker gets none.
    pub fn knock(&mut self, player_id: PlayerId) -> Result<TurnEvent, GameError> {
        self.guard_turn(player_id, TurnPhase::AwaitingDraw)?;
        if self.knock.is_some() {
            return Err(GameError::InvalidAction);
        }

        debug!(player = %player_id, seat = self.current, "knock, final round begins");
        self.knock = Some(Knock {
            knocker: player_id,
            last_seat: self.current,
        });
        Ok(self.advance_turn())
    }

    /// Pass the turn to the next non-eliminated seat. When a knock is
    /// armed and the turn comes back to the knocker's seat, the round
    /// ends instead.
    fn advance_turn(&mut self) -> TurnEvent {
        self.turn_phase = TurnPhase::AwaitingDraw;
        loop {
            self.current = (self.current + 1) % self.players.len();
            if self.players[self.current].status.is_in_round() {
                break;
            }
        }

        if let Some(knock) = self.knock {
            if self.current == knock.last_seat {
                debug!("final round complete");
                return self.end_round();
            }
        }

        TurnEvent::Continued
    }

    // -------------------------------------------------------------------------
    // Round end
    // -------------------------------------------------------------------------

    /// Revealed scores for the closing round. A forced finish can
    /// catch a seat mid-turn holding four cards; that hand never
    /// settled and is left out rather than reported as zero.
    fn round_summary(&self) -> RoundSummary {
        let scores: Vec<PlayerScore> = self
            .players
            .iter()
            .filter(|p| p.status.is_in_round() && p.hand.len() == HAND_SIZE)
            .map(|p| PlayerScore {
                player_id: p.id,
                name: p.name.clone(),
                score: p.hand.score(),
            })
            .collect();

        RoundSummary {
            round_number: self.round_number,
            scores,
            losers: Vec::new(),
            remaining: Vec::new(),
        }
    }

    /// Normal round end: lowest score pays a life, ties share the
    /// penalty.
    fn end_round(&mut self) -> TurnEvent {
        let summary = self.round_summary();

        let min = summary
            .scores
            .iter()
            .map(|s| s.score)
            .min()
            .unwrap_or(HandScore::ZERO);
        let losers: Vec<PlayerId> = summary
            .scores
            .iter()
            .filter(|s| s.score == min)
            .map(|s| s.player_id)
            .collect();

        for player in &mut self.players {
            if losers.contains(&player.id) {
                player.lose_life();
            }
        }

        self.close_round(summary, losers)
    }

    /// Shared tail of both round-end paths: penalties are already
    /// applied, standings are collected, and either the next round is
    /// dealt or the game finishes.
    fn close_round(&mut self, mut summary: RoundSummary, losers: Vec<PlayerId>) -> TurnEvent {
        summary.losers = losers;
        summary.remaining = self
            .players
            .iter()
            .filter(|p| p.status.is_in_round())
            .map(|p| PlayerStanding {
                player_id: p.id,
                name: p.name.clone(),
                lives: p.lives,
                status: p.status,
            })
            .collect();

        if summary.remaining.len() <= 1 {
            return self.finish_game(summary);
        }

        self.round_number += 1;
        self.deal_round();
        TurnEvent::RoundEnded(summary)
    }

    fn finish_game(&mut self, summary: RoundSummary) -> TurnEvent {
        self.phase = GamePhase::GameOver;
        let winner = self
            .players
            .iter()
            .find(|p| p.status.is_in_round())
            .map(|p| PlayerStanding {
                player_id: p.id,
                name: p.name.clone(),
                lives: p.lives,
                status: p.status,
            });

        debug!(
            winner = winner.as_ref().map(|w| w.name.as_str()).unwrap_or("none"),
            round = self.round_number,
            "game over"
        );

        TurnEvent::GameOver {
            summary,
            outcome: GameOutcome {
                winner,
                final_round: self.round_number,
            },
        }
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}
