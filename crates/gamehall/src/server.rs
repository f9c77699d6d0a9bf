//! `GamehallServer` builder and server loop.
//!
//! This is the entry point for running a Gamehall server. It ties the
//! layers together: transport → session → lobby → rooms.
//!
//! # Shutdown order
//!
//! 1. stop accepting connections
//! 2. cancel every open room, so players receive a `Cancelled` result
//! 3. close every session

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use gamehall_protocol::JsonCodec;
use gamehall_room::{GameLogic, GameRegistry, RoomManager};
use gamehall_session::{Authenticator, SessionManager};
use gamehall_transport::{Transport, WebSocketTransport};

use crate::{GamehallError, Lobby, ServerConfig};

/// Builder for configuring and starting a Gamehall server.
///
/// # Example
///
/// ```rust,ignore
/// use gamehall::prelude::*;
///
/// let server = GamehallServer::builder()
///     .bind("0.0.0.0:8080")
///     .game("tic-tac-toe", TicTacToe)
///     .build(SharedSecret::new("hunter2"))
///     .await?;
/// server.run().await
/// ```
pub struct GamehallServerBuilder {
    config: ServerConfig,
    games: GameRegistry,
}

impl GamehallServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            games: GameRegistry::new(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Registers a game module under `game_type`.
    pub fn game<G: GameLogic>(mut self, game_type: &str, logic: G) -> Self {
        self.games.register(game_type, logic);
        self
    }

    /// Binds the WebSocket listener and builds the server.
    ///
    /// # Errors
    /// Fails if the listener cannot be bound. Nothing else at startup is
    /// fatal.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<GamehallServer<WebSocketTransport, A>, GamehallError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let local_addr = transport.local_addr()?;
        let mut server = self.build_with_transport(transport, auth);
        server.local_addr = Some(local_addr);
        Ok(server)
    }

    /// Builds the server over an already bound transport.
    pub fn build_with_transport<T: Transport, A: Authenticator>(
        self,
        transport: T,
        auth: A,
    ) -> GamehallServer<T, A> {
        if let Some(dir) = self.config.plugin_dir() {
            tracing::info!(plugin_dir = %dir.display(), "using plugin directory");
        }
        if self.config.admin_secret.is_empty() {
            tracing::warn!("no admin secret configured, administrator access disabled");
        }
        if self.games.is_empty() {
            tracing::warn!("no game types registered");
        }

        let config = Arc::new(self.config);
        let rooms = Arc::new(RoomManager::with_channel_size(
            self.games,
            config.room_channel_size,
        ));
        let sessions = Arc::new(SessionManager::new());
        let lobby = Arc::new(Lobby::new(
            auth,
            Arc::clone(&rooms),
            Arc::clone(&sessions),
        ));

        GamehallServer {
            transport,
            config,
            rooms,
            sessions,
            lobby,
            local_addr: None,
        }
    }
}

impl Default for GamehallServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Gamehall server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct GamehallServer<T, A> {
    transport: T,
    config: Arc<ServerConfig>,
    rooms: Arc<RoomManager>,
    sessions: Arc<SessionManager>,
    lobby: Arc<Lobby<A>>,
    local_addr: Option<SocketAddr>,
}

impl GamehallServer<WebSocketTransport, ()> {
    pub fn builder() -> GamehallServerBuilder {
        GamehallServerBuilder::new()
    }
}

impl<T: Transport, A: Authenticator> GamehallServer<T, A> {
    /// The address the WebSocket listener is bound to. `None` for other
    /// transports.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Serves until `shutdown` completes, then shuts down in order.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), GamehallError>
    where
        F: Future<Output = ()> + Send,
    {
        let events = self.sessions.subscribe();
        let watcher = tokio::spawn(Lobby::<A>::watch_sessions(
            Arc::clone(&self.rooms),
            events,
        ));

        self.sessions
            .start(self.transport, Arc::new(JsonCodec), Arc::clone(&self.lobby));
        tracing::info!(
            addr = ?self.local_addr,
            games = ?self.rooms.games(),
            "gamehall server running"
        );

        shutdown.await;

        tracing::info!("gamehall server shutting down");
        self.sessions.stop_accepting().await;
        self.rooms.shutdown().await;
        self.sessions.close_all().await;
        watcher.abort();
        tracing::info!("gamehall server stopped");
        Ok(())
    }

    /// Serves until Ctrl-C.
    pub async fn run(self) -> Result<(), GamehallError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}
