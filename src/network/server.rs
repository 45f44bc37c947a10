//! WebSocket Referee Server
//!
//! Async WebSocket server exposing the referee to wallet clients.
//! Handles authentication, request routing and pushing match updates to
//! every connection watching a match.

use std::collections::{BTreeMap, BTreeSet};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::{interval, timeout};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{env_lookup, parse_var, ConfigError};
use crate::core::address::PlayerAddress;
use crate::core::match_id::MatchId;
use crate::game::referee::Referee;
use crate::network::auth::{authenticate, AuthConfig};
use crate::network::protocol::{
    AuthRequest, AuthResult, ClientMessage, ErrorCode, ServerError, ServerMessage,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Idle connections are dropped after this long without a message.
    pub idle_timeout: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: parse_var(&lookup, "REFEREE_BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            max_connections: parse_var(&lookup, "REFEREE_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            ..defaults
        })
    }
}

/// Bound on handshake and final flush for a single connection.
const SOCKET_GRACE: Duration = Duration::from_secs(5);

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum RefereeServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// Connected client state.
struct ConnectedClient {
    /// Address bound by `auth`.
    address: Option<PlayerAddress>,
    /// Last activity.
    last_activity: Instant,
    /// Message sender (for direct messaging to client).
    sender: mpsc::Sender<ServerMessage>,
    /// Fired (or dropped) to make the connection task close the socket.
    evict: oneshot::Sender<()>,
}

/// State shared by every connection task.
struct ServerState {
    config: ServerConfig,
    auth: AuthConfig,
    referee: Arc<Referee>,
    /// Connected clients.
    clients: RwLock<BTreeMap<SocketAddr, ConnectedClient>>,
    /// Connections watching each match.
    watchers: RwLock<BTreeMap<MatchId, BTreeSet<SocketAddr>>>,
}

/// The referee server.
pub struct RefereeServer {
    state: Arc<ServerState>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl RefereeServer {
    /// Create a new server around a referee.
    pub fn new(config: ServerConfig, auth: AuthConfig, referee: Arc<Referee>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            state: Arc::new(ServerState {
                config,
                auth,
                referee,
                clients: RwLock::new(BTreeMap::new()),
                watchers: RwLock::new(BTreeMap::new()),
            }),
            shutdown_tx,
        }
    }

    /// Run the server until `shutdown` is called.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), RefereeServerError> {
        let listener = TcpListener::bind(&self.state.config.bind_addr).await?;
        info!("Referee listening on {}", self.state.config.bind_addr);

        let cleanup_state = self.state.clone();
        let cleanup_handle = tokio::spawn(async move {
            cleanup_state.run_cleanup_loop().await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.state.clients.read().await.len();
                            if clients_count >= self.state.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                tokio::spawn(reject_overloaded(stream, addr));
                                continue;
                            }

                            info!("New connection from {}", addr);
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

        cleanup_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let state = self.state.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match timeout(SOCKET_GRACE, accept_async(stream)).await {
                Ok(Ok(ws)) => ws,
                Ok(Err(e)) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
                Err(_) => {
                    warn!("WebSocket handshake timed out for {}", addr);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            let mut evicted = state.register_client(addr, msg_tx.clone()).await;

            // Spawn message sender task
            let mut sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
                let _ = ws_sender.send(Message::Close(None)).await;
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                state.touch(addr).await;
                                match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => state.handle_client_message(addr, client_msg).await,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ServerError::new(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        ))).await;
                                    }
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                let _ = msg_tx.send(ServerMessage::Error(ServerError::new(
                                    ErrorCode::InvalidInput,
                                    "Binary frames are not supported",
                                ))).await;
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
                    _ = &mut evicted => {
                        debug!("Client {} evicted", addr);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Dropping every sender lets the writer flush, then send Close
            state.remove_client(&addr).await;
            drop(msg_tx);
            if timeout(SOCKET_GRACE, &mut sender_task).await.is_err() {
                sender_task.abort();
            }
            info!("Client {} cleaned up", addr);
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.state.clients.read().await.len()
    }

    /// Get number of matches with at least one watcher.
    pub async fn watched_match_count(&self) -> usize {
        self.state.watchers.read().await.len()
    }
}

/// Complete the handshake only to tell the client it was turned away.
async fn reject_overloaded(stream: TcpStream, addr: SocketAddr) {
    let mut ws = match timeout(SOCKET_GRACE, accept_async(stream)).await {
        Ok(Ok(ws)) => ws,
        _ => {
            debug!("Dropped overloaded connection {} before handshake", addr);
            return;
        }
    };

    let error = ServerMessage::Error(ServerError::new(
        ErrorCode::ServerOverloaded,
        "Connection limit reached",
    ));
    if let Ok(text) = error.to_json() {
        let _ = timeout(SOCKET_GRACE, ws.send(Message::Text(text))).await;
    }
    let _ = timeout(SOCKET_GRACE, ws.close(None)).await;
}

impl ServerState {
    /// Track a connection. The returned receiver resolves when the
    /// connection is evicted.
    async fn register_client(
        &self,
        addr: SocketAddr,
        sender: mpsc::Sender<ServerMessage>,
    ) -> oneshot::Receiver<()> {
        let (evict, evicted) = oneshot::channel();
        let mut clients = self.clients.write().await;
        clients.insert(addr, ConnectedClient {
            address: None,
            last_activity: Instant::now(),
            sender,
            evict,
        });
        evicted
    }

    async fn remove_client(&self, addr: &SocketAddr) -> Option<ConnectedClient> {
        let removed = self.clients.write().await.remove(addr);

        let mut watchers = self.watchers.write().await;
        for set in watchers.values_mut() {
            set.remove(addr);
        }
        watchers.retain(|_, set| !set.is_empty());
        removed
    }

    /// Tell an idle connection why, then make its task close the socket.
    async fn evict(&self, addr: &SocketAddr) {
        if let Some(client) = self.remove_client(addr).await {
            let _ = client
                .sender
                .send(ServerMessage::Shutdown { reason: "Idle timeout".to_string() })
                .await;
            let _ = client.evict.send(());
            info!("Evicted idle client {}", addr);
        }
    }

    /// Evict every connection idle at `now`. Returns the evicted addresses.
    async fn evict_idle(&self, now: Instant) -> Vec<SocketAddr> {
        let to_remove: Vec<SocketAddr> = {
            let clients = self.clients.read().await;
            clients
                .iter()
                .filter(|(_, c)| {
                    now.saturating_duration_since(c.last_activity) > self.config.idle_timeout
                })
                .map(|(addr, _)| *addr)
                .collect()
        };

        for addr in &to_remove {
            self.evict(addr).await;
        }
        to_remove
    }

    async fn touch(&self, addr: SocketAddr) {
        if let Some(client) = self.clients.write().await.get_mut(&addr) {
            client.last_activity = Instant::now();
        }
    }

    /// Send a message to one connection.
    async fn send(&self, addr: SocketAddr, message: ServerMessage) {
        let sender = self.clients.read().await.get(&addr).map(|c| c.sender.clone());
        if let Some(sender) = sender {
            let _ = sender.send(message).await;
        }
    }

    async fn send_error(&self, addr: SocketAddr, error: ServerError) {
        self.send(addr, ServerMessage::Error(error)).await;
    }

    /// Subscribe a connection to updates for a match.
    async fn watch(&self, match_id: MatchId, addr: SocketAddr) {
        self.watchers
            .write()
            .await
            .entry(match_id)
            .or_default()
            .insert(addr);
    }

    /// Send a message to every connection watching a match.
    async fn broadcast(&self, match_id: &MatchId, message: ServerMessage) {
        let targets: Vec<SocketAddr> = match self.watchers.read().await.get(match_id) {
            Some(set) => set.iter().copied().collect(),
            None => return,
        };

        let senders: Vec<mpsc::Sender<ServerMessage>> = {
            let clients = self.clients.read().await;
            targets
                .iter()
                .filter_map(|addr| clients.get(addr).map(|c| c.sender.clone()))
                .collect()
        };

        for sender in senders {
            let _ = sender.send(message.clone()).await;
        }
    }

    /// Address bound to this connection, or an error sent back.
    async fn require_address(&self, addr: SocketAddr) -> Option<PlayerAddress> {
        let address = self.clients.read().await.get(&addr).and_then(|c| c.address);
        if address.is_none() {
            self.send_error(addr, ServerError::new(
                ErrorCode::NotAuthenticated,
                "Must authenticate first",
            ))
            .await;
        }
        address
    }

    /// Handle a client message.
    async fn handle_client_message(&self, addr: SocketAddr, msg: ClientMessage) {
        match msg {
            ClientMessage::Auth(auth) => self.handle_auth(addr, auth).await,
            ClientMessage::Ping { timestamp } => {
                let server_time = chrono::Utc::now().timestamp_millis().max(0) as u64;
                self.send(addr, ServerMessage::Pong { timestamp, server_time }).await;
            }
            ClientMessage::CreateMatch => {
                let Some(address) = self.require_address(addr).await else { return };
                match self.referee.create_match(address).await {
                    Ok(view) => {
                        self.watch(view.match_id, addr).await;
                        self.send(addr, ServerMessage::MatchUpdate(view)).await;
                    }
                    Err(e) => self.send_error(addr, ServerError::from(&e)).await,
                }
            }
            ClientMessage::JoinMatch { match_id } => {
                let Some(address) = self.require_address(addr).await else { return };
                match self.referee.join_match(&match_id, address).await {
                    Ok(view) => {
                        self.watch(match_id, addr).await;
                        self.broadcast(&match_id, ServerMessage::MatchUpdate(view)).await;
                    }
                    Err(e) => self.send_error(addr, ServerError::from(&e)).await,
                }
            }
            ClientMessage::Move { match_id, cell } => {
                let Some(address) = self.require_address(addr).await else { return };
                match self.referee.apply_move(&match_id, address, cell).await {
                    Ok(outcome) => {
                        if outcome.settlement_pending() {
                            warn!("Match {} won but settlement is pending", match_id);
                        }
                        self.watch(match_id, addr).await;
                        self.broadcast(&match_id, ServerMessage::MoveResult(outcome)).await;
                    }
                    Err(e) => {
                        debug!("Move rejected for {} in {}: {}", address.short(), match_id, e);
                        self.send_error(addr, ServerError::from(&e)).await;
                    }
                }
            }
            ClientMessage::GetMatch { match_id } => {
                let Some(_) = self.require_address(addr).await else { return };
                match self.referee.get_match(&match_id).await {
                    Ok(view) => {
                        self.watch(match_id, addr).await;
                        self.send(addr, ServerMessage::MatchUpdate(view)).await;
                    }
                    Err(e) => self.send_error(addr, ServerError::from(&e)).await,
                }
            }
            ClientMessage::RetrySettlement { match_id } => {
                let Some(_) = self.require_address(addr).await else { return };
                match self.referee.retry_settlement(&match_id).await {
                    Ok(attestation) => {
                        self.send(addr, ServerMessage::Attestation(attestation)).await;
                        if let Ok(view) = self.referee.get_match(&match_id).await {
                            self.broadcast(&match_id, ServerMessage::MatchUpdate(view)).await;
                        }
                    }
                    Err(e) => self.send_error(addr, ServerError::from(&e)).await,
                }
            }
        }
    }

    /// Handle authentication.
    async fn handle_auth(&self, addr: SocketAddr, auth: AuthRequest) {
        let referee = self.referee.signer_address();
        let chain_id = self.referee.config().chain_id;

        match authenticate(&auth, &self.auth) {
            Ok(address) => {
                if let Some(client) = self.clients.write().await.get_mut(&addr) {
                    client.address = Some(address);
                }
                debug!("Client {} authenticated as {}", addr, address.short());

                self.send(addr, ServerMessage::AuthResult(AuthResult {
                    success: true,
                    address: Some(address),
                    error: None,
                    server_version: self.config.version.clone(),
                    chain_id,
                    referee,
                }))
                .await;
            }
            Err(e) => {
                debug!("Client {} failed auth: {}", addr, e);
                self.send(addr, ServerMessage::AuthResult(AuthResult {
                    success: false,
                    address: None,
                    error: Some(e.to_string()),
                    server_version: self.config.version.clone(),
                    chain_id,
                    referee,
                }))
                .await;
                self.send_error(addr, ServerError::new(e.code(), e.to_string())).await;
            }
        }
    }

    /// Drop connections idle past the configured timeout.
    async fn run_cleanup_loop(&self) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;
            self.evict_idle(Instant::now()).await;
        }
    }
}
