//! Network Layer
//!
//! WebSocket server for room-based multiplayer communication.
//! This layer owns connections and rooms - all game rules run through `game/`.

pub mod protocol;
pub mod room;
pub mod server;
pub mod session;

pub use protocol::{
    ClientMessage, ServerMessage, ActionKind, ErrorCode, GameSnapshot, JoinResult, MemberInfo,
    PlayerView, ServerError,
};
pub use room::{Room, RoomError, RoomRegistry};
pub use server::{GameServer, GameServerError, ServerConfig};
pub use session::{ConnId, SessionManager};
