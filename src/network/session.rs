//! Connection / Session Management
//!
//! Binds each live transport connection to exactly one (room, player)
//! pair and owns the disconnect lifecycle: lobby disconnects remove
//! the player immediately, in-game disconnects hold the seat behind a
//! cancellable grace timer, and host loss triggers migration before
//! normal action flow resumes.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::game::state::{GamePhase, PlayerId};
use crate::network::protocol::{LeaveReason, ServerMessage};
use crate::network::room::{Room, RoomRegistry};

/// Transport connection identity.
pub type ConnId = SocketAddr;

/// What a connection is bound to.
#[derive(Debug, Clone)]
pub struct SessionBinding {
    /// Room the connection belongs to.
    pub room_code: String,
    /// Seat it speaks for.
    pub player_id: PlayerId,
}

/// Connection-to-seat bindings plus the disconnect machinery.
pub struct SessionManager {
    registry: Arc<RoomRegistry>,
    bindings: RwLock<BTreeMap<ConnId, SessionBinding>>,
    grace: Duration,
}

impl SessionManager {
    /// Create a manager over the given registry.
    pub fn new(registry: Arc<RoomRegistry>, grace: Duration) -> Self {
        Self {
            registry,
            bindings: RwLock::new(BTreeMap::new()),
            grace,
        }
    }

    /// The registry this manager serves.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Bind a connection to a seat. A connection speaks for at most
    /// one seat; rebinding replaces the old binding.
    pub async fn bind(&self, conn: ConnId, room_code: String, player_id: PlayerId) {
        self.bindings
            .write()
            .await
            .insert(conn, SessionBinding { room_code, player_id });
    }

    /// Drop a connection's binding, returning what it was bound to.
    pub async fn unbind(&self, conn: ConnId) -> Option<SessionBinding> {
        self.bindings.write().await.remove(&conn)
    }

    /// Resolve a connection to its seat.
    pub async fn resolve(&self, conn: ConnId) -> Option<SessionBinding> {
        self.bindings.read().await.get(&conn).cloned()
    }

    /// Number of bound connections.
    pub async fn binding_count(&self) -> usize {
        self.bindings.read().await.len()
    }

    /// A member leaves on purpose: removed from room and game at once,
    /// host flag handed on, room torn down when emptied.
    pub async fn handle_leave(self: &Arc<Self>, conn: ConnId) {
        let Some(binding) = self.unbind(conn).await else {
            return;
        };
        let Some(room) = self.registry.get(&binding.room_code).await else {
            return;
        };

        let mut room = room.write().await;
        let (new_host, event) = room.remove_member(binding.player_id);

        if room.is_empty() {
            drop(room);
            self.registry.remove(&binding.room_code).await;
            return;
        }

        room.broadcast(ServerMessage::PlayerLeft {
            player_id: binding.player_id,
            members: room.members(),
            new_host,
            reason: LeaveReason::Left,
        })
        .await;
        if let Some(event) = event {
            room.broadcast_turn_event(&event).await;
        }
    }

    /// Transport dropped. In the lobby (or after game over) this is a
    /// plain leave; mid-game the seat is held, the host flag migrates
    /// immediately if needed, and a grace timer is armed.
    pub async fn handle_disconnect(self: &Arc<Self>, conn: ConnId) {
        let Some(binding) = self.resolve(conn).await else {
            return;
        };
        let in_game = match self.registry.get(&binding.room_code).await {
            Some(room) => room.read().await.game.phase() == GamePhase::Playing,
            None => {
                self.unbind(conn).await;
                return;
            }
        };

        if !in_game {
            self.handle_leave(conn).await;
            return;
        }

        self.unbind(conn).await;
        let Some(room) = self.registry.get(&binding.room_code).await else {
            return;
        };

        let mut room = room.write().await;
        let was_host = room.is_host(binding.player_id);
        let Some(epoch) = room.mark_disconnected(binding.player_id) else {
            return;
        };
        let name = room
            .seats()
            .iter()
            .find(|s| s.player_id == binding.player_id)
            .map(|s| s.name.clone())
            .unwrap_or_default();

        info!(
            room = %binding.room_code,
            player = %binding.player_id,
            "disconnected mid-game, seat held"
        );

        // Host migration runs now, not when the timer fires.
        if was_host {
            if let Some((new_host_id, new_host_name)) = room.migrate_host() {
                room.broadcast(ServerMessage::HostMigrated {
                    new_host_id,
                    new_host_name,
                    disconnected_player: name.clone(),
                })
                .await;
            }
        }

        room.broadcast(ServerMessage::PlayerDisconnected {
            player_id: binding.player_id,
            player_name: name,
            was_host,
        })
        .await;
        drop(room);

        self.arm_grace_timer(binding.room_code, binding.player_id, epoch);
    }

    /// Deferred removal: if the player is still disconnected with the
    /// same epoch when the timer fires, they are removed for good.
    /// A reconnection bumps the epoch under the room lock, so a timer
    /// racing a reconnection loses cleanly and does nothing.
    fn arm_grace_timer(self: &Arc<Self>, room_code: String, player_id: PlayerId, epoch: u64) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(manager.grace).await;

            let Some(room) = manager.registry.get(&room_code).await else {
                return;
            };
            let mut room = room.write().await;
            if !room.disconnect_epoch_is(player_id, epoch) {
                debug!(room = %room_code, player = %player_id, "grace timer stale, ignoring");
                return;
            }

            info!(room = %room_code, player = %player_id, "grace period expired, removing");
            let (new_host, event) = room.remove_member(player_id);

            if room.is_empty() {
                drop(room);
                manager.registry.remove(&room_code).await;
                return;
            }

            room.broadcast(ServerMessage::PlayerLeft {
                player_id,
                members: room.members(),
                new_host,
                reason: LeaveReason::Timeout,
            })
            .await;
            if let Some(event) = event {
                room.broadcast_turn_event(&event).await;
            }
        });
    }

    /// Rebind a returning player inside an already-locked room: the
    /// connection mapping is refreshed and, if the host flag was
    /// stranded on a disconnected member, it moves now.
    pub async fn complete_reconnect(
        &self,
        conn: ConnId,
        room: &mut Room,
        room_code: String,
        player_id: PlayerId,
    ) {
        self.bind(conn, room_code, player_id).await;
        if let Some((new_host_id, new_host_name)) = room.migrate_host() {
            room.broadcast(ServerMessage::HostMigrated {
                new_host_id,
                new_host_name,
                disconnected_player: String::new(),
            })
            .await;
        }
    }
}
