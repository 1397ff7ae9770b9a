//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket. All
//! messages are tagged JSON; the tagged-enum layout rules out a binary
//! codec, and nothing here is hot enough to want one.

use serde::{Deserialize, Serialize};

use crate::game::card::{Card, HandScore};
use crate::game::events::{GameOutcome, RoundSummary};
use crate::game::state::{GamePhase, PlayerId, PlayerStatus, TurnPhase};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a room and take the host seat.
    CreateRoom {
        /// Display name for the new player.
        player_name: String,
    },

    /// Join an existing room by code. Also the reconnection entry
    /// point: a name matching a disconnected member resumes that seat.
    JoinRoom {
        /// Code of the room to join.
        room_code: String,
        /// Display name for the joining player.
        player_name: String,
    },

    /// Leave the current room.
    LeaveRoom,

    /// Start the game (host only, two or more members).
    StartGame,

    /// Draw the top card of the deck.
    DrawFromDeck,

    /// Draw the top card of the discard pile.
    DrawFromDiscard,

    /// Discard one card from the hand by index.
    DiscardCard {
        /// Index into the hand, as last shown to this player.
        index: usize,
    },

    /// Knock, declaring the final round.
    Knock,

    /// Ping for latency measurement.
    Ping {
        /// Echoed back in the pong.
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Room created; the requester is the host.
    RoomCreated {
        /// Shareable room code.
        room_code: String,
        /// The creator's durable identity.
        player_id: PlayerId,
        /// Current member list (just the creator).
        members: Vec<MemberInfo>,
    },

    /// Result of a join (or reconnection) attempt.
    JoinResult(JoinResult),

    /// A new player joined the room.
    PlayerJoined {
        /// Who joined.
        player_id: PlayerId,
        /// Their display name.
        player_name: String,
        /// Refreshed member list.
        members: Vec<MemberInfo>,
        /// Whether the room now has enough members to start.
        can_start: bool,
    },

    /// A player left the room, voluntarily or by timeout.
    PlayerLeft {
        /// Who left.
        player_id: PlayerId,
        /// Refreshed member list.
        members: Vec<MemberInfo>,
        /// New host, when the departure triggered migration.
        new_host: Option<PlayerId>,
        /// Why they left.
        reason: LeaveReason,
    },

    /// A player's connection dropped mid-game; their seat is held.
    PlayerDisconnected {
        /// Who dropped.
        player_id: PlayerId,
        /// Their display name.
        player_name: String,
        /// Whether they were the host at the time.
        was_host: bool,
    },

    /// A disconnected player is back on a new connection.
    PlayerReconnected {
        /// Who returned.
        player_id: PlayerId,
        /// Their display name.
        player_name: String,
        /// Refreshed member list.
        members: Vec<MemberInfo>,
    },

    /// Host authority moved to another member.
    HostMigrated {
        /// The new host.
        new_host_id: PlayerId,
        /// The new host's name.
        new_host_name: String,
        /// Name of the departed host.
        disconnected_player: String,
    },

    /// The game began; carries this recipient's first snapshot.
    GameStarted {
        /// Personalized, redacted view of the table.
        snapshot: GameSnapshot,
    },

    /// Visible game state changed; one per recipient, redacted.
    StateUpdate {
        /// Personalized, redacted view of the table.
        snapshot: GameSnapshot,
        /// What happened.
        action: ActionKind,
        /// Who did it.
        actor: PlayerId,
    },

    /// Acknowledgement of the acting connection's own request.
    ActionResult {
        /// Which request this answers.
        action: ActionKind,
        /// Whether it was applied.
        success: bool,
        /// Rejection reason when not.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorCode>,
    },

    /// A round closed; scores revealed, penalties applied.
    RoundEnded(RoundSummary),

    /// The game is over.
    GameOver(GameOutcome),

    /// Request-scoped error.
    Error(ServerError),

    /// Pong response.
    Pong {
        /// Client timestamp echoed back.
        timestamp: u64,
        /// Server wall-clock millis.
        server_time: u64,
    },

    /// Server is shutting down.
    Shutdown {
        /// Human-readable reason.
        reason: String,
    },
}

/// Why a player left a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveReason {
    /// Chose to leave.
    Left,
    /// Disconnect grace period expired.
    Timeout,
}

/// One room member as shown in lobby lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberInfo {
    /// Durable identity.
    pub player_id: PlayerId,
    /// Display name.
    pub name: String,
    /// Holds the host flag.
    pub is_host: bool,
    /// Currently reachable.
    pub connected: bool,
}

/// Result of a join or reconnection attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResult {
    /// Whether the join was accepted.
    pub success: bool,
    /// Room code, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_code: Option<String>,
    /// Assigned (or restored) identity, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
    /// Whether this player holds the host flag.
    #[serde(default)]
    pub is_host: bool,
    /// Member list, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<MemberInfo>>,
    /// True when this was a reconnection to a held seat.
    #[serde(default)]
    pub reconnected: bool,
    /// Mid-game reconnections get their full view back immediately.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<GameSnapshot>,
    /// Rejection reason, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
}

impl JoinResult {
    /// A rejection carrying only the reason.
    pub fn failure(error: ErrorCode) -> Self {
        Self {
            success: false,
            room_code: None,
            player_id: None,
            is_host: false,
            members: None,
            reconnected: false,
            snapshot: None,
            error: Some(error),
        }
    }
}

/// The game-changing verbs, for acks and state-update attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// `StartGame`
    StartGame,
    /// `DrawFromDeck`
    DrawFromDeck,
    /// `DrawFromDiscard`
    DrawFromDiscard,
    /// `DiscardCard`
    DiscardCard,
    /// `Knock`
    Knock,
}

// =============================================================================
// SNAPSHOTS (per-recipient, redacted)
// =============================================================================

/// One player's appearance in a snapshot. Hand contents and score are
/// present only in the snapshot sent to that player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    /// Durable identity.
    pub player_id: PlayerId,
    /// Display name.
    pub name: String,
    /// Lives remaining.
    pub lives: u8,
    /// Active, on the cloud, or eliminated.
    pub status: PlayerStatus,
    /// Currently reachable.
    pub connected: bool,
    /// Number of cards held (always visible).
    pub hand_size: usize,
    /// Actual cards; `None` for everyone but the recipient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hand: Option<Vec<Card>>,
    /// Hand score; `None` for everyone but the recipient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<HandScore>,
}

/// A personalized view of the whole table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Lifecycle phase.
    pub phase: GamePhase,
    /// Current round, 1-based.
    pub round_number: u32,
    /// Seat index whose turn it is.
    pub current_index: usize,
    /// Identity of the player whose turn it is.
    pub current_player: Option<PlayerId>,
    /// Draw-or-discard position within the turn.
    pub turn_phase: TurnPhase,
    /// Visible top of the discard pile.
    pub top_discard: Option<Card>,
    /// Cards left in the draw pile.
    pub deck_size: usize,
    /// Whether a knock has armed the final round.
    pub final_round: bool,
    /// Who knocked, if anyone.
    pub knocker: Option<PlayerId>,
    /// All seats, in seating order, redacted for the recipient.
    pub players: Vec<PlayerView>,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error payload sent to a single client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Machine-readable code.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Out of turn, wrong phase, double draw, discard before draw, or
    /// knock after knock.
    InvalidAction,
    /// Discard index outside the hand.
    IndexOutOfRange,
    /// No live room under that code.
    RoomNotFound,
    /// Room already has six members.
    RoomFull,
    /// Game already started; the room is closed to new seats.
    GameAlreadyStarted,
    /// Fewer than two members at start time.
    NotEnoughPlayers,
    /// Only the host may start the game.
    NotHost,
    /// The connection is not bound to any room.
    NotInRoom,
    /// Unparseable or out-of-place message.
    InvalidMessage,
}

// =============================================================================
// CODEC
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::card::{Rank, Suit};

    #[test]
    fn test_client_message_roundtrip() {
        let messages = vec![
            ClientMessage::CreateRoom {
                player_name: "ada".into(),
            },
            ClientMessage::JoinRoom {
                room_code: "XK4T9Q".into(),
                player_name: "grace".into(),
            },
            ClientMessage::LeaveRoom,
            ClientMessage::StartGame,
            ClientMessage::DrawFromDeck,
            ClientMessage::DrawFromDiscard,
            ClientMessage::DiscardCard { index: 2 },
            ClientMessage::Knock,
            ClientMessage::Ping { timestamp: 42 },
        ];

        for msg in messages {
            let json = msg.to_json().unwrap();
            let _parsed = ClientMessage::from_json(&json).unwrap();
        }
    }

    #[test]
    fn test_tagged_layout() {
        let json = ClientMessage::DiscardCard { index: 1 }.to_json().unwrap();
        assert!(json.contains("\"type\":\"discard_card\""));
        assert!(json.contains("\"index\":1"));
    }

    #[test]
    fn test_error_codes_snake_case() {
        let msg = ServerMessage::Error(ServerError {
            code: ErrorCode::GameAlreadyStarted,
            message: "Game already started".into(),
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains("game_already_started"));
    }

    #[test]
    fn test_join_failure_omits_empty_fields() {
        let msg = ServerMessage::JoinResult(JoinResult::failure(ErrorCode::RoomNotFound));
        let json = msg.to_json().unwrap();
        assert!(json.contains("room_not_found"));
        assert!(!json.contains("room_code"));
        assert!(!json.contains("snapshot"));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let me = PlayerId::generate();
        let snapshot = GameSnapshot {
            phase: GamePhase::Playing,
            round_number: 3,
            current_index: 1,
            current_player: Some(me),
            turn_phase: TurnPhase::AwaitingDiscard,
            top_discard: Some(Card::new(Suit::Hearts, Rank::Queen)),
            deck_size: 30,
            final_round: true,
            knocker: Some(me),
            players: vec![PlayerView {
                player_id: me,
                name: "ada".into(),
                lives: 2,
                status: PlayerStatus::Active,
                connected: true,
                hand_size: 3,
                hand: Some(vec![Card::new(Suit::Spades, Rank::Ace)]),
                score: Some(HandScore::from_points(11)),
            }],
        };

        let msg = ServerMessage::StateUpdate {
            snapshot,
            action: ActionKind::Knock,
            actor: me,
        };
        let json = msg.to_json().unwrap();
        let parsed = ServerMessage::from_json(&json).unwrap();

        if let ServerMessage::StateUpdate { snapshot, .. } = parsed {
            assert_eq!(snapshot.round_number, 3);
            assert!(snapshot.final_round);
            assert_eq!(snapshot.players[0].hand_size, 3);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_redacted_view_omits_hand() {
        let view = PlayerView {
            player_id: PlayerId::generate(),
            name: "grace".into(),
            lives: 3,
            status: PlayerStatus::Active,
            connected: true,
            hand_size: 3,
            hand: None,
            score: None,
        };
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("\"hand\""));
        assert!(!json.contains("\"score\""));
        assert!(json.contains("\"hand_size\":3"));
    }
}
