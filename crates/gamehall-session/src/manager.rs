//! The session manager: accepts connections and tracks live sessions.
//!
//! # Event ordering
//!
//! Listeners get [`SessionEvent`]s through their own FIFO channel. A
//! session's `Connected` event is queued before its reader task is even
//! spawned, and `Disconnected` is queued by that same task after it ends,
//! so no listener can see a session disconnect before it connected.
//!
//! # Lifecycle
//!
//! ```text
//! start(transport) ──→ accept loop ──→ adopt(conn) ──→ Connected
//!                                          │
//!                             reader + writer tasks run
//!                                          │
//!                                          ▼
//!                          removed from index ──→ Disconnected (once)
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gamehall_protocol::Codec;
use gamehall_transport::{Connection, Transport, TransportError};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use crate::session::{read_loop, write_loop};
use crate::{DisconnectReason, RequestHandler, Session, SessionId};

/// A change in the set of live sessions.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected(Arc<Session>),
    Disconnected {
        session: Arc<Session>,
        reason: DisconnectReason,
    },
}

/// Owns every live session and the accept loop that creates them.
///
/// Always used behind an `Arc`: spawned tasks keep the manager alive until
/// they finish.
#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
    /// Per-session driver tasks, awaited by [`close_all`](Self::close_all).
    tasks: Mutex<Vec<JoinHandle<()>>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    stop_signal: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. Events that happen before this call are not
    /// replayed.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.listeners).push(tx);
        rx
    }

    fn publish(&self, event: SessionEvent) {
        lock(&self.listeners).retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Starts accepting connections from `transport`.
    ///
    /// The transport is already bound, so this cannot fail. The loop runs
    /// until [`stop_accepting`](Self::stop_accepting) is called or the
    /// transport shuts down.
    pub fn start<T, K, H>(
        self: &Arc<Self>,
        mut transport: T,
        codec: Arc<K>,
        handler: Arc<H>,
    ) where
        T: Transport,
        K: Codec,
        H: RequestHandler,
    {
        let manager = Arc::clone(self);
        let task = tokio::spawn(async move {
            tracing::info!("session manager accepting connections");
            loop {
                tokio::select! {
                    biased;
                    _ = manager.stop_signal.notified() => break,
                    accepted = transport.accept() => match accepted {
                        Ok(conn) => {
                            manager.adopt(conn, Arc::clone(&codec), Arc::clone(&handler));
                        }
                        Err(TransportError::Shutdown) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                        }
                    },
                }
            }
            if let Err(e) = transport.shutdown().await {
                tracing::warn!(error = %e, "transport shutdown failed");
            }
            tracing::info!("session manager stopped accepting");
        });
        *lock(&self.accept_task) = Some(task);
    }

    /// Wraps an established connection in a new session and starts
    /// serving it.
    pub fn adopt<C, K, H>(
        self: &Arc<Self>,
        conn: C,
        codec: Arc<K>,
        handler: Arc<H>,
    ) -> Arc<Session>
    where
        C: Connection,
        K: Codec,
        H: RequestHandler,
    {
        let (session, outbound) = Session::new(conn.id());
        let session = Arc::new(session);
        let conn = Arc::new(conn);

        lock(&self.sessions).insert(session.id(), Arc::clone(&session));
        tracing::info!(
            session_id = %session.id(),
            connection_id = %session.connection_id(),
            peer = %conn.peer(),
            "session connected"
        );
        self.publish(SessionEvent::Connected(Arc::clone(&session)));

        let writer = tokio::spawn(write_loop(
            Arc::clone(&session),
            Arc::clone(&conn),
            Arc::clone(&codec),
            outbound,
        ));

        let manager = Arc::clone(self);
        let driven = Arc::clone(&session);
        let task = tokio::spawn(async move {
            let reason =
                read_loop(Arc::clone(&driven), conn, codec, handler).await;
            driven.close_with(reason);
            driven.stop_writer();
            if let Err(e) = writer.await {
                tracing::error!(session_id = %driven.id(), error = %e, "writer task panicked");
            }
            manager.finish(&driven);
        });

        let mut tasks = lock(&self.tasks);
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);

        session
    }

    /// Removes a finished session and announces it, exactly once.
    fn finish(&self, session: &Arc<Session>) {
        lock(&self.sessions).remove(&session.id());
        if !session.claim_disconnect_notification() {
            return;
        }
        let reason = session
            .disconnect_reason()
            .cloned()
            .unwrap_or(DisconnectReason::Local);
        tracing::info!(session_id = %session.id(), %reason, "session disconnected");
        self.publish(SessionEvent::Disconnected {
            session: Arc::clone(session),
            reason,
        });
    }

    /// Stops the accept loop and waits for it to exit. Live sessions are
    /// untouched.
    pub async fn stop_accepting(&self) {
        self.stop_signal.notify_one();
        let task = lock(&self.accept_task).take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Closes every live session and waits until each has announced its
    /// disconnect.
    pub async fn close_all(&self) {
        for session in self.sessions() {
            session.close();
        }
        let tasks: Vec<_> = lock(&self.tasks).drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Stops accepting, then closes every session.
    pub async fn close(&self) {
        self.stop_accepting().await;
        self.close_all().await;
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        lock(&self.sessions).get(&id).cloned()
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        lock(&self.sessions).values().cloned().collect()
    }

    /// Live sessions holding the administrator role.
    pub fn administrators(&self) -> Vec<Arc<Session>> {
        lock(&self.sessions)
            .values()
            .filter(|s| s.is_administrator())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.sessions).is_empty()
    }
}
