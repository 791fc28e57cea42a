//! Connection handler loop
//!
//! One loop per WebSocket: reads request frames, spawns a session for each,
//! and tears everything down when the socket goes away.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::protocol::{ClientRequest, Envelope, ProtocolError};
use super::registry::ConnectionHandle;
use super::session::{self, SessionOutcome};
use crate::state::AppState;

/// WebSocket 处理器 - `GET /ws/query/{client_id}`
pub async fn ws_query_handler(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<i64>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, client_id))
}

/// 处理 WebSocket 连接
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, client_id: i64) {
    let (mut sink, mut frames) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(state.limits.outbound_buffer);

    // 发送任务: sole owner of the sink, so frames never tear
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let connection = ConnectionHandle::new(client_id, tx);
    let connection_id = connection.id;
    state.registry.register(connection.clone());
    info!(%connection_id, client_id, "WebSocket connected");

    let permits = Arc::new(Semaphore::new(state.limits.max_sessions));
    let shutdown = CancellationToken::new();
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            frame = frames.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => Ok(text),
                    Some(Ok(Message::Binary(_))) => Err(ProtocolError::Binary),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(%connection_id, error = %e, "WebSocket read failed");
                        break;
                    }
                };

                match text.and_then(|t| ClientRequest::parse(&t)) {
                    Ok(request) => spawn_session(
                        &mut sessions,
                        &state,
                        &connection,
                        &permits,
                        &shutdown,
                        request,
                    ),
                    Err(e) => {
                        warn!(%connection_id, error = %e, "skipping malformed frame");
                        if connection.send_envelope(&Envelope::error(None, e.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
            }
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!(%connection_id, error = %e, "session task panicked");
                    }
                }
            }
            _ = connection.closed() => {
                debug!(%connection_id, "writer stopped");
                break;
            }
        }
    }

    shutdown.cancel();
    let in_flight = sessions.len();
    sessions.shutdown().await;
    state.registry.unregister(&connection_id);

    drop(connection);
    let _ = writer.await;

    info!(%connection_id, client_id, in_flight, "WebSocket disconnected");
}

fn spawn_session(
    sessions: &mut JoinSet<()>,
    state: &Arc<AppState>,
    connection: &ConnectionHandle,
    permits: &Arc<Semaphore>,
    shutdown: &CancellationToken,
    request: ClientRequest,
) {
    let (request_id, chat) = request.into_parts();
    let state = Arc::clone(state);
    let connection = connection.clone();
    let permits = Arc::clone(permits);
    let shutdown = shutdown.clone();

    debug!(connection_id = %connection.id, %request_id, "request accepted");

    sessions.spawn(async move {
        let driven = async {
            // 排队等待会话许可
            let _permit = permits.acquire_owned().await.ok()?;
            Some(session::run(&connection, state.provider.as_ref(), &request_id, chat).await)
        };

        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(connection_id = %connection.id, %request_id, "session cancelled");
            }
            outcome = driven => match outcome {
                Some(SessionOutcome::Completed) | None => {}
                Some(outcome) => {
                    debug!(connection_id = %connection.id, %request_id, ?outcome, "session ended early");
                }
            },
        }
    });
}
