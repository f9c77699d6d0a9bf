//! One connected client: identity, roles, outbound queue, and the receive
//! path that feeds the request handler.
//!
//! A session is split across two tasks:
//!
//! ```text
//!   connection.recv() ──→ reader ──→ RequestHandler::on_request
//!                                          │
//!   rooms / lobby ──→ Session::send ──→ outbound queue ──→ writer ──→ connection.send()
//! ```
//!
//! The reader handles one request at a time. The writer drains an
//! unbounded queue, so a room broadcasting to a slow client never waits on
//! it.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use gamehall_protocol::{Codec, Request, Response, RoomId};
use gamehall_transport::{Connection, ConnectionId};
use tokio::sync::{Notify, mpsc};

use crate::role::{self, Role};
use crate::{Authenticator, SessionError};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Identifies a session for its lifetime. Displayed as `S-<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// DisconnectReason
// ---------------------------------------------------------------------------

/// How a session ended. The first recorded reason wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed the connection.
    Remote,
    /// The server closed it (shutdown, or an explicit close).
    Local,
    /// The session broke the protocol and was dropped.
    Protocol(String),
    /// The connection failed.
    Transport(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote => f.write_str("closed by peer"),
            Self::Local => f.write_str("closed by server"),
            Self::Protocol(msg) => write!(f, "protocol violation: {msg}"),
            Self::Transport(msg) => write!(f, "transport failure: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// PacketCallback
// ---------------------------------------------------------------------------

/// A decoded request plus its acknowledgment flag.
///
/// The handler must call [`set_processed`](Self::set_processed) for every
/// request it accepts; returning without doing so drops the connection.
#[derive(Debug)]
pub struct PacketCallback {
    request: Request,
    processed: bool,
}

impl PacketCallback {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            processed: false,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn set_processed(&mut self) {
        self.processed = true;
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn into_request(self) -> Request {
        self.request
    }
}

/// Receives every decoded request of every session.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handles one request.
    ///
    /// # Errors
    /// Any error is fatal to the session: it is reported to the client,
    /// echoing the request, and the connection is closed.
    fn on_request(
        &self,
        session: &Arc<Session>,
        callback: &mut PacketCallback,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub(crate) enum Outbound {
    Response(Response),
    Close,
}

/// The server's record of one connection.
pub struct Session {
    id: SessionId,
    connection_id: ConnectionId,
    roles: Mutex<Vec<Role>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    closing: Notify,
    reason: OnceLock<DisconnectReason>,
    notified: OnceLock<()>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("connection_id", &self.connection_id)
            .field("roles", &self.roles())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(
        connection_id: ConnectionId,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            id: SessionId::next(),
            connection_id,
            roles: Mutex::new(Vec::new()),
            outbound: tx,
            closing: Notify::new(),
            reason: OnceLock::new(),
            notified: OnceLock::new(),
        };
        (session, rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    // -- Roles ------------------------------------------------------------

    fn lock_roles(&self) -> MutexGuard<'_, Vec<Role>> {
        self.roles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current roles.
    pub fn roles(&self) -> Vec<Role> {
        self.lock_roles().clone()
    }

    /// Adds a role. Returns `false` if the session already held it.
    pub fn add_role(&self, role: Role) -> bool {
        let mut roles = self.lock_roles();
        if roles.contains(&role) {
            return false;
        }
        roles.push(role);
        true
    }

    /// Removes the player and observer roles tied to `room_id` and
    /// returns how many were removed.
    pub fn drop_room_roles(&self, room_id: RoomId) -> usize {
        let mut roles = self.lock_roles();
        let before = roles.len();
        roles.retain(|role| !role::concerns(role, room_id));
        before - roles.len()
    }

    pub fn is_administrator(&self) -> bool {
        role::is_administrator(&self.lock_roles())
    }

    /// Checks `secret` and grants the administrator role.
    ///
    /// Authenticating twice is harmless: the second success only logs.
    ///
    /// # Errors
    /// [`SessionError::AuthenticationFailed`] if the secret is wrong.
    pub async fn authenticate<A: Authenticator>(
        &self,
        auth: &A,
        secret: &str,
    ) -> Result<(), SessionError> {
        if let Err(e) = auth.authenticate(secret).await {
            tracing::info!(session_id = %self.id, "authentication failed");
            return Err(e);
        }
        if self.add_role(Role::Administrator) {
            tracing::info!(session_id = %self.id, "session authenticated as administrator");
        } else {
            tracing::warn!(session_id = %self.id, "session is already authenticated");
        }
        Ok(())
    }

    // -- Outbound ---------------------------------------------------------

    /// Queues a response. Silently dropped once the session has ended.
    pub fn send(&self, response: Response) {
        if self.outbound.send(Outbound::Response(response)).is_err() {
            tracing::trace!(session_id = %self.id, "dropping response for closed session");
        }
    }

    // -- Lifecycle --------------------------------------------------------

    /// Asks the session to end. Responses queued before this call are
    /// still delivered.
    pub fn close(&self) {
        self.close_with(DisconnectReason::Local);
    }

    pub(crate) fn close_with(&self, reason: DisconnectReason) {
        let _ = self.reason.set(reason);
        self.closing.notify_one();
    }

    /// Why the session ended, once it has.
    pub fn disconnect_reason(&self) -> Option<&DisconnectReason> {
        self.reason.get()
    }

    pub fn is_closed(&self) -> bool {
        self.reason.get().is_some()
    }

    /// Claims the right to announce the disconnect. Returns `true` exactly
    /// once per session.
    pub(crate) fn claim_disconnect_notification(&self) -> bool {
        self.notified.set(()).is_ok()
    }

    pub(crate) fn stop_writer(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Reads, decodes, and dispatches requests until the session ends.
pub(crate) async fn read_loop<C, K, H>(
    session: Arc<Session>,
    conn: Arc<C>,
    codec: Arc<K>,
    handler: Arc<H>,
) -> DisconnectReason
where
    C: Connection,
    K: Codec,
    H: RequestHandler,
{
    loop {
        let received = tokio::select! {
            biased;
            _ = session.closing.notified() => return DisconnectReason::Local,
            received = conn.recv() => received,
        };

        let data = match received {
            Ok(Some(data)) => data,
            Ok(None) => return DisconnectReason::Remote,
            Err(e) => return DisconnectReason::Transport(e.to_string()),
        };

        let request: Request = match codec.decode(&data) {
            Ok(request) => request,
            Err(e) => {
                let err = SessionError::UnknownRequest(e);
                tracing::debug!(session_id = %session.id, error = %err, "undecodable request");
                session.send(Response::Error {
                    message: err.to_string(),
                    request: None,
                });
                return DisconnectReason::Protocol(err.to_string());
            }
        };

        tracing::trace!(session_id = %session.id, ?request, "request received");
        let mut callback = PacketCallback::new(request);
        let outcome = handler.on_request(&session, &mut callback).await;
        let err = match outcome {
            Ok(()) if callback.is_processed() => continue,
            Ok(()) => SessionError::UnprocessedRequest,
            Err(e) => e,
        };

        tracing::warn!(session_id = %session.id, error = %err, "dropping session");
        session.send(Response::Error {
            message: err.to_string(),
            request: Some(callback.into_request()),
        });
        return DisconnectReason::Protocol(err.to_string());
    }
}

/// Encodes and writes queued responses, then closes the connection.
pub(crate) async fn write_loop<C, K>(
    session: Arc<Session>,
    conn: Arc<C>,
    codec: Arc<K>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) where
    C: Connection,
    K: Codec,
{
    while let Some(msg) = outbound.recv().await {
        let response = match msg {
            Outbound::Response(response) => response,
            Outbound::Close => break,
        };
        let bytes = match codec.encode(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(session_id = %session.id, error = %e, "failed to encode response");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(session_id = %session.id, error = %e, "send failed");
            session.close_with(DisconnectReason::Transport(e.to_string()));
            break;
        }
    }
    if let Err(e) = conn.close().await {
        tracing::trace!(session_id = %session.id, error = %e, "close after end of session");
    }
}
