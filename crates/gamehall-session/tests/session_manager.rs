//! Integration tests for sessions and the session manager, driven over the
//! in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use gamehall_protocol::{Codec, JsonCodec, Request, Response, RoomId};
use gamehall_session::{
    DisconnectReason, PacketCallback, RequestHandler, Session, SessionError,
    SessionEvent, SessionManager, SharedSecret,
};
use gamehall_transport::{
    Connection, MemoryConnection, MemoryConnector, MemoryTransport,
    TransportError,
};
use tokio::sync::mpsc;

// =========================================================================
// Mock handler
// =========================================================================

/// Authenticates against "secret", fails `Cancel`, forgets to acknowledge
/// `FreeReservation`, and answers everything else with `Observing`.
struct TestHandler {
    auth: SharedSecret,
}

impl RequestHandler for TestHandler {
    async fn on_request(
        &self,
        session: &Arc<Session>,
        callback: &mut PacketCallback,
    ) -> Result<(), SessionError> {
        match callback.request().clone() {
            Request::Authenticate { secret } => {
                match session.authenticate(&self.auth, &secret).await {
                    Ok(()) => session.send(Response::Authenticated),
                    Err(e) => session.send(Response::Error {
                        message: e.to_string(),
                        request: Some(callback.request().clone()),
                    }),
                }
            }
            Request::Cancel { .. } => {
                return Err(SessionError::Unauthorized("cancel".into()));
            }
            Request::FreeReservation { .. } => return Ok(()),
            _ => session.send(Response::Observing { room_id: RoomId(0) }),
        }
        callback.set_processed();
        Ok(())
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn start() -> (
    Arc<SessionManager>,
    MemoryConnector,
    mpsc::UnboundedReceiver<SessionEvent>,
) {
    let manager = Arc::new(SessionManager::new());
    let events = manager.subscribe();
    let (transport, connector) = MemoryTransport::new();
    manager.start(
        transport,
        Arc::new(JsonCodec),
        Arc::new(TestHandler {
            auth: SharedSecret::new("secret"),
        }),
    );
    (manager, connector, events)
}

async fn send(client: &MemoryConnection, request: &Request) {
    let bytes = JsonCodec.encode(request).unwrap();
    client.send(&bytes).await.unwrap();
}

async fn recv(client: &MemoryConnection) -> Option<Response> {
    let frame = tokio::time::timeout(Duration::from_secs(1), client.recv())
        .await
        .expect("timed out waiting for a frame")
        .unwrap();
    frame.map(|bytes| JsonCodec.decode(&bytes).unwrap())
}

async fn next_event(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("manager dropped")
}

fn join_request() -> Request {
    Request::JoinRoom {
        game_type: "counter".into(),
    }
}

// =========================================================================
// Connect / disconnect events
// =========================================================================

#[tokio::test]
async fn test_adopt_publishes_connected_before_disconnected() {
    let (manager, connector, mut events) = start();
    let client = connector.connect().unwrap();

    let connected = match next_event(&mut events).await {
        SessionEvent::Connected(s) => s,
        other => panic!("expected Connected, got {other:?}"),
    };
    assert_eq!(manager.len(), 1);

    client.close().await.unwrap();

    match next_event(&mut events).await {
        SessionEvent::Disconnected { session, reason } => {
            assert_eq!(session.id(), connected.id());
            assert_eq!(reason, DisconnectReason::Remote);
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }
    assert!(manager.is_empty());
}

#[tokio::test]
async fn test_request_roundtrip_keeps_session_open() {
    let (_manager, connector, _events) = start();
    let client = connector.connect().unwrap();

    send(&client, &join_request()).await;
    assert_eq!(
        recv(&client).await,
        Some(Response::Observing { room_id: RoomId(0) })
    );

    send(&client, &join_request()).await;
    assert_eq!(
        recv(&client).await,
        Some(Response::Observing { room_id: RoomId(0) })
    );
}

// =========================================================================
// Fatal protocol conditions
// =========================================================================

#[tokio::test]
async fn test_handler_error_sends_error_echo_and_closes() {
    let (_manager, connector, mut events) = start();
    let client = connector.connect().unwrap();
    next_event(&mut events).await;

    let request = Request::Cancel { room_id: RoomId(3) };
    send(&client, &request).await;

    match recv(&client).await {
        Some(Response::Error { message, request: echoed }) => {
            assert!(message.contains("unauthorized"));
            assert_eq!(echoed, Some(request));
        }
        other => panic!("expected Error, got {other:?}"),
    }
    assert_eq!(recv(&client).await, None, "connection should be closed");

    match next_event(&mut events).await {
        SessionEvent::Disconnected { reason, .. } => {
            assert!(matches!(reason, DisconnectReason::Protocol(_)));
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unprocessed_request_is_fatal() {
    let (_manager, connector, _events) = start();
    let client = connector.connect().unwrap();

    send(&client, &Request::FreeReservation { token: "t".into() }).await;

    match recv(&client).await {
        Some(Response::Error { message, .. }) => {
            assert_eq!(message, SessionError::UnprocessedRequest.to_string());
        }
        other => panic!("expected Error, got {other:?}"),
    }
    assert_eq!(recv(&client).await, None);
}

#[tokio::test]
async fn test_undecodable_frame_is_fatal() {
    let (_manager, connector, _events) = start();
    let client = connector.connect().unwrap();

    client.send(br#"{"type":"FlyToMoon"}"#).await.unwrap();

    match recv(&client).await {
        Some(Response::Error { message, request }) => {
            assert!(message.starts_with("unknown request"));
            assert_eq!(request, None);
        }
        other => panic!("expected Error, got {other:?}"),
    }
    assert_eq!(recv(&client).await, None);
}

// =========================================================================
// Authentication
// =========================================================================

#[tokio::test]
async fn test_authentication_failure_keeps_connection_open() {
    let (manager, connector, mut events) = start();
    let client = connector.connect().unwrap();
    let session = match next_event(&mut events).await {
        SessionEvent::Connected(s) => s,
        other => panic!("expected Connected, got {other:?}"),
    };

    send(&client, &Request::Authenticate { secret: "wrong".into() }).await;
    assert!(matches!(
        recv(&client).await,
        Some(Response::Error { .. })
    ));
    assert!(manager.administrators().is_empty());

    send(&client, &Request::Authenticate { secret: "secret".into() }).await;
    assert_eq!(recv(&client).await, Some(Response::Authenticated));
    assert!(session.is_administrator());
    assert_eq!(manager.administrators().len(), 1);
}

// =========================================================================
// Shutdown
// =========================================================================

#[tokio::test]
async fn test_close_disconnects_every_session_exactly_once() {
    let (manager, connector, mut events) = start();
    let a = connector.connect().unwrap();
    let b = connector.connect().unwrap();
    next_event(&mut events).await;
    next_event(&mut events).await;

    manager.close().await;

    assert_eq!(recv(&a).await, None);
    assert_eq!(recv(&b).await, None);
    let mut disconnected = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::Disconnected { reason, .. } => {
                assert_eq!(reason, DisconnectReason::Local);
                disconnected += 1;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(disconnected, 2);
    assert!(manager.is_empty());
}

#[tokio::test]
async fn test_stop_accepting_refuses_new_connections() {
    let (manager, connector, _events) = start();

    manager.stop_accepting().await;

    assert!(matches!(connector.connect(), Err(TransportError::Shutdown)));
}

#[tokio::test]
async fn test_session_close_flushes_queued_responses() {
    let (_manager, connector, mut events) = start();
    let client = connector.connect().unwrap();
    let session = match next_event(&mut events).await {
        SessionEvent::Connected(s) => s,
        other => panic!("expected Connected, got {other:?}"),
    };

    session.send(Response::Left { room_id: RoomId(1) });
    session.close();

    assert_eq!(recv(&client).await, Some(Response::Left { room_id: RoomId(1) }));
    assert_eq!(recv(&client).await, None);
}
