//! WebSocket Game Server
//!
//! Async WebSocket server for room-based multiplayer. Accepts
//! connections, decodes tagged-JSON messages, and routes them to the
//! room registry and session manager.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::engine::GameError;
use crate::game::events::TurnEvent;
use crate::game::state::GamePhase;
use crate::network::protocol::{
    ActionKind, ClientMessage, ErrorCode, JoinResult, ServerError, ServerMessage,
};
use crate::network::room::RoomRegistry;
use crate::network::session::{ConnId, SessionManager};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// How long a mid-game seat is held for a dropped connection.
    pub disconnect_grace: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            max_connections: 1000,
            disconnect_grace: Duration::from_secs(300),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// All live rooms.
    registry: Arc<RoomRegistry>,
    /// Connection-to-seat bindings and disconnect handling.
    sessions: Arc<SessionManager>,
    /// Live connection count, for the accept-time limit check.
    connections: Arc<AtomicUsize>,
    /// Address actually bound, filled in once `run` is listening.
    local_addr: RwLock<Option<SocketAddr>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let registry = Arc::new(RoomRegistry::new());
        let sessions = Arc::new(SessionManager::new(
            registry.clone(),
            config.disconnect_grace,
        ));

        Self {
            config,
            registry,
            sessions,
            connections: Arc::new(AtomicUsize::new(0)),
            local_addr: RwLock::new(None),
            shutdown_tx,
        }
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        let bound = listener.local_addr()?;
        *self.local_addr.write().await = Some(bound);
        info!("Game server listening on {}", bound);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connections.load(Ordering::Relaxed) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.connections.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let sessions = self.sessions.clone();
        let connections = self.connections.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    connections.fetch_sub(1, Ordering::Relaxed);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ServerError {
                                            code: ErrorCode::InvalidMessage,
                                            message: "Invalid message format".to_string(),
                                        })).await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(addr, client_msg, &sessions, &msg_tx)
                                    .await;
                            }
                            Some(Ok(Message::Ping(_))) => {
                                let _ = msg_tx.send(ServerMessage::Pong {
                                    timestamp: 0,
                                    server_time: now_millis(),
                                }).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup. Dropping the local sender and detaching the
            // seat closes the channel, so the sender task can flush
            // anything still queued (the shutdown notice included)
            // before the socket goes away.
            drop(msg_tx);
            sessions.handle_disconnect(addr).await;
            let _ = tokio::time::timeout(Duration::from_secs(5), sender_task).await;
            connections.fetch_sub(1, Ordering::Relaxed);

            info!("Client {} cleaned up", addr);
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        conn: ConnId,
        msg: ClientMessage,
        sessions: &Arc<SessionManager>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::CreateRoom { player_name } => {
                Self::handle_create_room(conn, player_name, sessions, sender).await;
            }
            ClientMessage::JoinRoom {
                room_code,
                player_name,
            } => {
                Self::handle_join_room(conn, room_code, player_name, sessions, sender).await;
            }
            ClientMessage::LeaveRoom => {
                sessions.handle_leave(conn).await;
            }
            ClientMessage::StartGame => {
                Self::handle_start_game(conn, sessions, sender).await;
            }
            ClientMessage::DrawFromDeck => {
                Self::handle_action(conn, ActionKind::DrawFromDeck, None, sessions, sender).await;
            }
            ClientMessage::DrawFromDiscard => {
                Self::handle_action(conn, ActionKind::DrawFromDiscard, None, sessions, sender)
                    .await;
            }
            ClientMessage::DiscardCard { index } => {
                Self::handle_action(conn, ActionKind::DiscardCard, Some(index), sessions, sender)
                    .await;
            }
            ClientMessage::Knock => {
                Self::handle_action(conn, ActionKind::Knock, None, sessions, sender).await;
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender
                    .send(ServerMessage::Pong {
                        timestamp,
                        server_time: now_millis(),
                    })
                    .await;
            }
        }
    }

    /// Handle room creation.
    async fn handle_create_room(
        conn: ConnId,
        player_name: String,
        sessions: &Arc<SessionManager>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let player_name = player_name.trim().to_string();
        if player_name.is_empty() {
            let _ = sender
                .send(ServerMessage::Error(ServerError {
                    code: ErrorCode::InvalidMessage,
                    message: "Player name must not be empty".to_string(),
                }))
                .await;
            return;
        }
        if sessions.resolve(conn).await.is_some() {
            let _ = sender
                .send(ServerMessage::Error(ServerError {
                    code: ErrorCode::InvalidAction,
                    message: "Already in a room".to_string(),
                }))
                .await;
            return;
        }

        let (code, host_id, room) = sessions
            .registry()
            .create_room(player_name, sender.clone())
            .await;
        sessions.bind(conn, code.clone(), host_id).await;

        let members = room.read().await.members();
        let _ = sender
            .send(ServerMessage::RoomCreated {
                room_code: code,
                player_id: host_id,
                members,
            })
            .await;
    }

    /// Handle a join request, which doubles as the reconnection path:
    /// a name matching a disconnected member resumes that seat.
    async fn handle_join_room(
        conn: ConnId,
        room_code: String,
        player_name: String,
        sessions: &Arc<SessionManager>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let room_code = room_code.trim().to_ascii_uppercase();
        let player_name = player_name.trim().to_string();
        if player_name.is_empty() {
            let _ = sender
                .send(ServerMessage::JoinResult(JoinResult::failure(
                    ErrorCode::InvalidMessage,
                )))
                .await;
            return;
        }
        if sessions.resolve(conn).await.is_some() {
            let _ = sender
                .send(ServerMessage::JoinResult(JoinResult::failure(
                    ErrorCode::InvalidAction,
                )))
                .await;
            return;
        }

        let Some(room) = sessions.registry().get(&room_code).await else {
            let _ = sender
                .send(ServerMessage::JoinResult(JoinResult::failure(
                    ErrorCode::RoomNotFound,
                )))
                .await;
            return;
        };

        let mut room = room.write().await;

        // Reconnection: a held seat under the same display name.
        if let Some(player_id) = room.find_disconnected(&player_name) {
            if room.reconnect(player_id, sender.clone()) {
                sessions
                    .complete_reconnect(conn, &mut room, room_code.clone(), player_id)
                    .await;
                info!(room = %room_code, player = %player_id, "player reconnected");

                let snapshot = (room.game.phase() == GamePhase::Playing)
                    .then(|| room.snapshot_for(player_id));
                let _ = sender
                    .send(ServerMessage::JoinResult(JoinResult {
                        success: true,
                        room_code: Some(room_code),
                        player_id: Some(player_id),
                        is_host: room.is_host(player_id),
                        members: Some(room.members()),
                        reconnected: true,
                        snapshot,
                        error: None,
                    }))
                    .await;

                room.broadcast(ServerMessage::PlayerReconnected {
                    player_id,
                    player_name,
                    members: room.members(),
                })
                .await;
                return;
            }
        }

        // Fresh join.
        match room.add_member(player_name.clone(), sender.clone()) {
            Ok(player_id) => {
                sessions.bind(conn, room_code.clone(), player_id).await;
                info!(room = %room_code, player = %player_id, "player joined");

                let _ = sender
                    .send(ServerMessage::JoinResult(JoinResult {
                        success: true,
                        room_code: Some(room_code),
                        player_id: Some(player_id),
                        is_host: false,
                        members: Some(room.members()),
                        reconnected: false,
                        snapshot: None,
                        error: None,
                    }))
                    .await;

                room.broadcast(ServerMessage::PlayerJoined {
                    player_id,
                    player_name,
                    members: room.members(),
                    can_start: room.member_count() >= crate::MIN_PLAYERS,
                })
                .await;
            }
            Err(e) => {
                let _ = sender
                    .send(ServerMessage::JoinResult(JoinResult::failure(e.into())))
                    .await;
            }
        }
    }

    /// Handle the host starting the game.
    async fn handle_start_game(
        conn: ConnId,
        sessions: &Arc<SessionManager>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some(binding) = sessions.resolve(conn).await else {
            Self::send_rejection(sender, ActionKind::StartGame, ErrorCode::NotInRoom).await;
            return;
        };
        let Some(room) = sessions.registry().get(&binding.room_code).await else {
            Self::send_rejection(sender, ActionKind::StartGame, ErrorCode::RoomNotFound).await;
            return;
        };

        let mut room = room.write().await;
        if !room.is_host(binding.player_id) {
            Self::send_rejection(sender, ActionKind::StartGame, ErrorCode::NotHost).await;
            return;
        }
        if let Err(e) = room.game.start() {
            Self::send_rejection(sender, ActionKind::StartGame, e.into()).await;
            return;
        }

        info!(room = %binding.room_code, "game started");
        let _ = sender
            .send(ServerMessage::ActionResult {
                action: ActionKind::StartGame,
                success: true,
                error: None,
            })
            .await;
        room.broadcast_snapshots(|snapshot| ServerMessage::GameStarted { snapshot })
            .await;
    }

    /// Handle an in-game action (draw, discard, knock).
    async fn handle_action(
        conn: ConnId,
        action: ActionKind,
        index: Option<usize>,
        sessions: &Arc<SessionManager>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some(binding) = sessions.resolve(conn).await else {
            Self::send_rejection(sender, action, ErrorCode::NotInRoom).await;
            return;
        };
        let Some(room) = sessions.registry().get(&binding.room_code).await else {
            Self::send_rejection(sender, action, ErrorCode::RoomNotFound).await;
            return;
        };

        let mut room = room.write().await;
        let actor = binding.player_id;

        let result: Result<TurnEvent, GameError> = match action {
            ActionKind::DrawFromDeck => {
                room.game.draw_from_deck(actor).map(|_| TurnEvent::Continued)
            }
            ActionKind::DrawFromDiscard => room
                .game
                .draw_from_discard(actor)
                .map(|_| TurnEvent::Continued),
            ActionKind::DiscardCard => {
                room.game.discard(actor, index.unwrap_or(usize::MAX))
            }
            ActionKind::Knock => room.game.knock(actor),
            ActionKind::StartGame => return,
        };

        match result {
            Ok(event) => {
                let _ = sender
                    .send(ServerMessage::ActionResult {
                        action,
                        success: true,
                        error: None,
                    })
                    .await;
                room.broadcast_snapshots(|snapshot| ServerMessage::StateUpdate {
                    snapshot,
                    action,
                    actor,
                })
                .await;
                room.broadcast_turn_event(&event).await;
            }
            Err(e) => {
                debug!(room = %binding.room_code, player = %actor, error = %e, "action rejected");
                Self::send_rejection(sender, action, e.into()).await;
            }
        }
    }

    /// Send a failed acknowledgement back to the acting connection.
    async fn send_rejection(
        sender: &mpsc::Sender<ServerMessage>,
        action: ActionKind,
        error: ErrorCode,
    ) {
        let _ = sender
            .send(ServerMessage::ActionResult {
                action,
                success: false,
                error: Some(error),
            })
            .await;
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Address the listener is bound to, once `run` is listening.
    /// Useful when binding to port 0.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().await
    }

    /// Get active connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Get active room count.
    pub async fn room_count(&self) -> usize {
        self.registry.room_count().await
    }
}

/// Server wall clock in milliseconds since the epoch.
fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> ConnId {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn test_server() -> GameServer {
        GameServer::new(ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        })
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.disconnect_grace, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = test_server();
        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = test_server();
        server.shutdown();
        // Should not panic
    }

    #[tokio::test]
    async fn test_shutdown_broadcast_reaches_client() {
        let server = Arc::new(test_server());
        let runner = {
            let server = server.clone();
            tokio::spawn(async move { server.run().await })
        };

        let bound = loop {
            if let Some(addr) = server.local_addr().await {
                break addr;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", bound))
            .await
            .expect("client connects");

        server.shutdown();

        // The client hears about the shutdown before the socket closes.
        let notified = loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    if matches!(
                        ServerMessage::from_json(&text),
                        Ok(ServerMessage::Shutdown { .. })
                    ) {
                        break true;
                    }
                }
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => break false,
            }
        };
        assert!(notified, "client never received the shutdown notice");

        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_create_room_dispatch() {
        let server = test_server();
        let (tx, mut rx) = mpsc::channel(16);

        GameServer::handle_client_message(
            addr(1),
            ClientMessage::CreateRoom {
                player_name: "ada".into(),
            },
            &server.sessions,
            &tx,
        )
        .await;

        assert_eq!(server.room_count().await, 1);
        match rx.recv().await.unwrap() {
            ServerMessage::RoomCreated { members, .. } => {
                assert_eq!(members.len(), 1);
                assert!(members[0].is_host);
            }
            other => panic!("expected RoomCreated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_join_unknown_room_rejected() {
        let server = test_server();
        let (tx, mut rx) = mpsc::channel(16);

        GameServer::handle_client_message(
            addr(1),
            ClientMessage::JoinRoom {
                room_code: "NOSUCH".into(),
                player_name: "grace".into(),
            },
            &server.sessions,
            &tx,
        )
        .await;

        match rx.recv().await.unwrap() {
            ServerMessage::JoinResult(result) => {
                assert!(!result.success);
                assert_eq!(result.error, Some(ErrorCode::RoomNotFound));
            }
            other => panic!("expected JoinResult, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_join_and_start_flow() {
        let server = test_server();
        let (tx1, mut rx1) = mpsc::channel(16);
        let (tx2, mut rx2) = mpsc::channel(16);

        GameServer::handle_client_message(
            addr(1),
            ClientMessage::CreateRoom {
                player_name: "ada".into(),
            },
            &server.sessions,
            &tx1,
        )
        .await;
        let code = match rx1.recv().await.unwrap() {
            ServerMessage::RoomCreated { room_code, .. } => room_code,
            other => panic!("expected RoomCreated, got {:?}", other),
        };

        // Codes are matched case-insensitively.
        GameServer::handle_client_message(
            addr(2),
            ClientMessage::JoinRoom {
                room_code: code.to_ascii_lowercase(),
                player_name: "grace".into(),
            },
            &server.sessions,
            &tx2,
        )
        .await;
        match rx2.recv().await.unwrap() {
            ServerMessage::JoinResult(result) => {
                assert!(result.success);
                assert!(!result.is_host);
            }
            other => panic!("expected JoinResult, got {:?}", other),
        }

        // Only the host may start.
        GameServer::handle_client_message(addr(2), ClientMessage::StartGame, &server.sessions, &tx2)
            .await;
        loop {
            match rx2.recv().await.unwrap() {
                ServerMessage::ActionResult { action, success, error } => {
                    assert_eq!(action, ActionKind::StartGame);
                    assert!(!success);
                    assert_eq!(error, Some(ErrorCode::NotHost));
                    break;
                }
                // Skip the PlayerJoined broadcast.
                ServerMessage::PlayerJoined { .. } => continue,
                other => panic!("expected ActionResult, got {:?}", other),
            }
        }

        GameServer::handle_client_message(addr(1), ClientMessage::StartGame, &server.sessions, &tx1)
            .await;
        loop {
            match rx1.recv().await.unwrap() {
                ServerMessage::GameStarted { snapshot } => {
                    assert_eq!(snapshot.phase, GamePhase::Playing);
                    assert_eq!(snapshot.players.len(), 2);
                    break;
                }
                ServerMessage::PlayerJoined { .. } | ServerMessage::ActionResult { .. } => continue,
                other => panic!("expected GameStarted, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_action_without_room_rejected() {
        let server = test_server();
        let (tx, mut rx) = mpsc::channel(16);

        GameServer::handle_client_message(addr(9), ClientMessage::Knock, &server.sessions, &tx)
            .await;

        match rx.recv().await.unwrap() {
            ServerMessage::ActionResult { success, error, .. } => {
                assert!(!success);
                assert_eq!(error, Some(ErrorCode::NotInRoom));
            }
            other => panic!("expected ActionResult, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let server = test_server();
        let (tx, mut rx) = mpsc::channel(16);

        GameServer::handle_client_message(
            addr(1),
            ClientMessage::Ping { timestamp: 777 },
            &server.sessions,
            &tx,
        )
        .await;

        match rx.recv().await.unwrap() {
            ServerMessage::Pong { timestamp, .. } => assert_eq!(timestamp, 777),
            other => panic!("expected Pong, got {:?}", other),
        }
    }
}
