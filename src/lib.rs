//! # Knock 31 Game Server
//!
//! Authoritative coordination server for the card game 31 (Schwimmen):
//! rooms, turn-ordered play, knocking, lives, and reconnection over
//! WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    KNOCK 31 SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Rules engine (no I/O)                     │
//! │  ├── card.rs     - Cards, deck, hands, scoring               │
//! │  ├── state.rs    - Player identity, lives, phases            │
//! │  ├── engine.rs   - Turn machine, rounds, knock, elimination  │
//! │  └── events.rs   - Round summaries and game outcomes         │
//! │                                                              │
//! │  network/        - Transport and coordination                │
//! │  ├── protocol.rs - Tagged-JSON message types                 │
//! │  ├── room.rs     - Rooms, host flag, redacted snapshots      │
//! │  ├── session.rs  - Connection bindings, disconnect grace     │
//! │  └── server.rs   - WebSocket accept loop and dispatch        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `game/` layer never touches the network: it takes player
//! actions, returns `Result`s and turn events, and leaves broadcasting
//! to `network/`. Everything a client sees goes through a per-recipient
//! redacted snapshot, so no hidden hand ever crosses the wire.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::card::{Card, Deck, Hand, HandScore, Rank, Suit};
pub use game::engine::{Game, GameError};
pub use game::events::{GameOutcome, RoundSummary, TurnEvent};
pub use game::state::{GamePhase, PlayerId, PlayerStatus, TurnPhase};
pub use network::server::{GameServer, GameServerError, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum seats in a room
pub const MAX_PLAYERS: usize = 6;

/// Minimum players needed to start a game
pub const MIN_PLAYERS: usize = 2;
