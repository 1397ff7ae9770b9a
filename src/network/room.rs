//! Rooms and the Room Registry
//!
//! A room binds a member list (seating order, host flag, per-member
//! outbound channels) to its one game instance. The registry owns all
//! live rooms behind per-room locks: every action on a room runs under
//! that room's write lock, so membership changes, host migration, and
//! engine calls serialize per room while distinct rooms proceed in
//! parallel.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::game::engine::{Game, GameError};
use crate::game::state::PlayerId;
use crate::network::protocol::{ErrorCode, GameSnapshot, MemberInfo, PlayerView, ServerMessage};

/// Characters a room code is drawn from.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a room code.
const CODE_LEN: usize = 6;

/// Room-level rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// No live room under that code.
    #[error("Room not found")]
    RoomNotFound,

    /// Only the host may start the game.
    #[error("Only the host can do that")]
    NotHost,

    /// Engine rejection, forwarded.
    #[error(transparent)]
    Game(#[from] GameError),
}

impl From<GameError> for ErrorCode {
    fn from(err: GameError) -> Self {
        match err {
            GameError::InvalidAction | GameError::EmptyDeck => ErrorCode::InvalidAction,
            GameError::IndexOutOfRange => ErrorCode::IndexOutOfRange,
            GameError::GameFull => ErrorCode::RoomFull,
            GameError::AlreadyStarted => ErrorCode::GameAlreadyStarted,
            GameError::NotEnoughPlayers => ErrorCode::NotEnoughPlayers,
        }
    }
}

impl From<RoomError> for ErrorCode {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::RoomNotFound => ErrorCode::RoomNotFound,
            RoomError::NotHost => ErrorCode::NotHost,
            RoomError::Game(g) => g.into(),
        }
    }
}

/// Outbound channel to one client connection.
pub type MemberSender = mpsc::Sender<ServerMessage>;

/// One seat's membership record. Game state for the seat lives in the
/// engine; this carries only room-level concerns.
#[derive(Debug)]
pub struct Seat {
    /// Durable identity, shared with the engine's seat.
    pub player_id: PlayerId,
    /// Display name.
    pub name: String,
    /// Host flag; exactly one seat holds it while the room is occupied.
    pub is_host: bool,
    /// Outbound channel; `None` while disconnected.
    pub sender: Option<MemberSender>,
    /// Bumped on every disconnect and reconnect, so a stale grace
    /// timer can tell its disconnect apart from a later one.
    pub epoch: u64,
}

impl Seat {
    /// Whether the member is currently reachable.
    pub fn is_connected(&self) -> bool {
        self.sender.is_some()
    }
}

/// A room: seating, host, and the game it hosts.
#[derive(Debug)]
pub struct Room {
    /// Shareable room code.
    pub code: String,
    seats: Vec<Seat>,
    /// The room's game. Seat order mirrors `seats`.
    pub game: Game,
}

impl Room {
    /// Create a room with its host seated.
    pub fn new(code: String, host_name: String, sender: MemberSender) -> (Self, PlayerId) {
        let host_id = PlayerId::generate();
        let mut game = Game::new();
        // A fresh game always has space for its first seat.
        let _ = game.add_player(host_id, host_name.clone());

        let room = Self {
            code,
            seats: vec![Seat {
                player_id: host_id,
                name: host_name,
                is_host: true,
                sender: Some(sender),
                epoch: 0,
            }],
            game,
        };
        (room, host_id)
    }

    // -------------------------------------------------------------------------
    // Membership
    // -------------------------------------------------------------------------

    /// Seat a new member. Fails once the game has started or the room
    /// is full; both checks are the engine's.
    pub fn add_member(&mut self, name: String, sender: MemberSender) -> Result<PlayerId, RoomError> {
        let player_id = PlayerId::generate();
        self.game.add_player(player_id, name.clone())?;
        self.seats.push(Seat {
            player_id,
            name,
            is_host: false,
            sender: Some(sender),
            epoch: 0,
        });
        Ok(player_id)
    }

    /// Remove a member from both the room and the game. If the host
    /// left, the flag moves to the first connected member in seating
    /// order (first seat outright when nobody is connected). Returns
    /// the new host when migration happened, plus any game-closing
    /// event the removal caused.
    pub fn remove_member(
        &mut self,
        player_id: PlayerId,
    ) -> (Option<PlayerId>, Option<crate::game::events::TurnEvent>) {
        let Some(idx) = self.seats.iter().position(|s| s.player_id == player_id) else {
            return (None, None);
        };
        let was_host = self.seats[idx].is_host;
        self.seats.remove(idx);
        let event = self.game.remove_player(player_id);

        let mut new_host = None;
        if was_host && !self.seats.is_empty() {
            let pick = self
                .seats
                .iter()
                .position(Seat::is_connected)
                .unwrap_or(0);
            self.seats[pick].is_host = true;
            new_host = Some(self.seats[pick].player_id);
            info!(room = %self.code, host = %self.seats[pick].player_id, "host migrated");
        }

        (new_host, event)
    }

    /// Mark a member unreachable, keeping their seat. Returns the
    /// epoch the grace timer must present to complete the removal.
    pub fn mark_disconnected(&mut self, player_id: PlayerId) -> Option<u64> {
        let seat = self.seat_mut(player_id)?;
        seat.sender = None;
        seat.epoch += 1;
        Some(seat.epoch)
    }

    /// Rebind a held seat to a fresh connection. Hand, lives, cloud
    /// status, and seating position are untouched; bumping the epoch
    /// disarms any pending grace timer.
    pub fn reconnect(&mut self, player_id: PlayerId, sender: MemberSender) -> bool {
        match self.seat_mut(player_id) {
            Some(seat) if !seat.is_connected() => {
                seat.sender = Some(sender);
                seat.epoch += 1;
                true
            }
            _ => false,
        }
    }

    /// A disconnected member with this display name, if any: the
    /// reconnection match.
    pub fn find_disconnected(&self, name: &str) -> Option<PlayerId> {
        self.seats
            .iter()
            .find(|s| !s.is_connected() && s.name == name)
            .map(|s| s.player_id)
    }

    /// True when the grace timer for (`player_id`, `epoch`) is still
    /// the live one. A reconnection in between bumped the epoch.
    pub fn disconnect_epoch_is(&self, player_id: PlayerId, epoch: u64) -> bool {
        self.seat(player_id)
            .map(|s| !s.is_connected() && s.epoch == epoch)
            .unwrap_or(false)
    }

    /// Move the host flag to the first connected member, if the
    /// current host is unreachable and anyone else is. Returns the new
    /// host's seat data.
    pub fn migrate_host(&mut self) -> Option<(PlayerId, String)> {
        let host_connected = self
            .seats
            .iter()
            .any(|s| s.is_host && s.is_connected());
        if host_connected {
            return None;
        }
        let pick = self.seats.iter().position(Seat::is_connected)?;
        for seat in &mut self.seats {
            seat.is_host = false;
        }
        self.seats[pick].is_host = true;
        let seat = &self.seats[pick];
        info!(room = %self.code, host = %seat.player_id, "host migrated");
        Some((seat.player_id, seat.name.clone()))
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    fn seat(&self, player_id: PlayerId) -> Option<&Seat> {
        self.seats.iter().find(|s| s.player_id == player_id)
    }

    fn seat_mut(&mut self, player_id: PlayerId) -> Option<&mut Seat> {
        self.seats.iter_mut().find(|s| s.player_id == player_id)
    }

    /// All seats in seating order.
    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    /// The current host.
    pub fn host_id(&self) -> Option<PlayerId> {
        self.seats.iter().find(|s| s.is_host).map(|s| s.player_id)
    }

    /// Whether a member holds the host flag.
    pub fn is_host(&self, player_id: PlayerId) -> bool {
        self.seat(player_id).map(|s| s.is_host).unwrap_or(false)
    }

    /// Nobody seated; the room should be torn down.
    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    /// Seated member count.
    pub fn member_count(&self) -> usize {
        self.seats.len()
    }

    /// Member list for lobby views.
    pub fn members(&self) -> Vec<MemberInfo> {
        self.seats
            .iter()
            .map(|s| MemberInfo {
                player_id: s.player_id,
                name: s.name.clone(),
                is_host: s.is_host,
                connected: s.is_connected(),
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Broadcasting
    // -------------------------------------------------------------------------

    /// Send to every connected member.
    pub async fn broadcast(&self, message: ServerMessage) {
        for seat in &self.seats {
            if let Some(sender) = &seat.sender {
                let _ = sender.send(message.clone()).await;
            }
        }
    }

    /// Send to one member, if reachable.
    pub async fn send_to(&self, player_id: PlayerId, message: ServerMessage) {
        if let Some(sender) = self.seat(player_id).and_then(|s| s.sender.as_ref()) {
            let _ = sender.send(message).await;
        }
    }

    /// Build `viewer`'s redacted view of the table: their own hand and
    /// score in full, everyone else's hand reduced to a count.
    /// Recomputed per recipient on every broadcast, never cached.
    pub fn snapshot_for(&self, viewer: PlayerId) -> GameSnapshot {
        let players = self
            .game
            .players()
            .iter()
            .map(|p| {
                let own = p.id == viewer;
                PlayerView {
                    player_id: p.id,
                    name: p.name.clone(),
                    lives: p.lives,
                    status: p.status,
                    connected: self
                        .seat(p.id)
                        .map(|s| s.is_connected())
                        .unwrap_or(false),
                    hand_size: p.hand.len(),
                    hand: own.then(|| p.hand.cards().to_vec()),
                    score: own.then(|| p.hand.score()),
                }
            })
            .collect();

        GameSnapshot {
            phase: self.game.phase(),
            round_number: self.game.round_number(),
            current_index: self.game.current_index(),
            current_player: self.game.current_player().map(|p| p.id),
            turn_phase: self.game.turn_phase(),
            top_discard: self.game.top_discard(),
            deck_size: self.game.deck_len(),
            final_round: self.game.knock_state().is_some(),
            knocker: self.game.knock_state().map(|k| k.knocker),
            players,
        }
    }

    /// Push a personalized snapshot to every connected member, built
    /// from a template the caller fills per recipient.
    pub async fn broadcast_snapshots<F>(&self, build: F)
    where
        F: Fn(GameSnapshot) -> ServerMessage,
    {
        for seat in &self.seats {
            if let Some(sender) = &seat.sender {
                let snapshot = self.snapshot_for(seat.player_id);
                let _ = sender.send(build(snapshot)).await;
            }
        }
    }

    /// Announce a round or game closing to the whole room.
    pub async fn broadcast_turn_event(&self, event: &crate::game::events::TurnEvent) {
        match event {
            crate::game::events::TurnEvent::Continued => {}
            crate::game::events::TurnEvent::RoundEnded(summary) => {
                self.broadcast(ServerMessage::RoundEnded(summary.clone())).await;
            }
            crate::game::events::TurnEvent::GameOver { summary, outcome } => {
                self.broadcast(ServerMessage::RoundEnded(summary.clone())).await;
                self.broadcast(ServerMessage::GameOver(outcome.clone())).await;
            }
        }
    }
}

// =============================================================================
// ROOM REGISTRY
// =============================================================================

/// Owns every live room. No ambient globals: all room lookups go
/// through here, and each room's state is only reachable behind its
/// own lock.
pub struct RoomRegistry {
    rooms: RwLock<BTreeMap<String, Arc<RwLock<Room>>>>,
}

impl RoomRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a room with the requester as host. Returns the code,
    /// the host's identity, and the room handle.
    pub async fn create_room(
        &self,
        host_name: String,
        sender: MemberSender,
    ) -> (String, PlayerId, Arc<RwLock<Room>>) {
        let mut rooms = self.rooms.write().await;
        let code = loop {
            let candidate = generate_room_code();
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
        };

        let (room, host_id) = Room::new(code.clone(), host_name, sender);
        let handle = Arc::new(RwLock::new(room));
        rooms.insert(code.clone(), handle.clone());
        info!(room = %code, host = %host_id, "room created");
        (code, host_id, handle)
    }

    /// Look up a room by code.
    pub async fn get(&self, code: &str) -> Option<Arc<RwLock<Room>>> {
        self.rooms.read().await.get(code).cloned()
    }

    /// Tear a room down.
    pub async fn remove(&self, code: &str) {
        if self.rooms.write().await.remove(code).is_some() {
            debug!(room = %code, "room destroyed");
        }
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A 6-character code from the unambiguous-ish uppercase alphabet.
fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
