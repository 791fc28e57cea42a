//! Streaming session driver
//!
//! Pumps one engine stream onto one connection, event by event.

use canopy_core::chat::ChatRequest;
use canopy_llm::{LLMError, LLMProvider};
use futures::StreamExt;
use tracing::{debug, warn};

use super::protocol::Envelope;
use super::registry::{ConnectionError, ConnectionHandle};

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The engine finished and every event was written
    Completed,
    /// The connection went away; nothing more was written
    Disconnected,
    /// The engine failed; one error event was attempted
    UpstreamFailed,
}

/// Drive `request` through `engine`, writing each event to `connection`
///
/// Events are forwarded in the order the engine produces them, one frame per
/// event, with nothing appended after the last one.
pub async fn run(
    connection: &ConnectionHandle,
    engine: &dyn LLMProvider,
    request_id: &str,
    request: ChatRequest,
) -> SessionOutcome {
    debug!(
        connection_id = %connection.id,
        request_id,
        model = %request.model,
        provider = engine.provider_id(),
        "session started"
    );

    let mut stream = match engine.chat_stream(request).await {
        Ok(stream) => stream,
        Err(e) => return upstream_failed(connection, request_id, e).await,
    };

    let mut forwarded = 0usize;
    while let Some(item) = stream.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) => return upstream_failed(connection, request_id, e).await,
        };

        match connection.send_envelope(&Envelope::new(request_id, chunk)).await {
            Ok(()) => forwarded += 1,
            Err(ConnectionError::Closed) => {
                debug!(
                    connection_id = %connection.id,
                    request_id,
                    forwarded,
                    "connection closed mid-stream, stopping session"
                );
                return SessionOutcome::Disconnected;
            }
            Err(e) => {
                warn!(request_id, error = %e, "dropping event that failed to encode");
            }
        }
    }

    debug!(connection_id = %connection.id, request_id, forwarded, "session completed");
    SessionOutcome::Completed
}

async fn upstream_failed(
    connection: &ConnectionHandle,
    request_id: &str,
    error: LLMError,
) -> SessionOutcome {
    warn!(connection_id = %connection.id, request_id, error = %error, "engine stream failed");

    let envelope = Envelope::error(Some(request_id.to_string()), error.to_string());
    if connection.send_envelope(&envelope).await.is_err() {
        debug!(request_id, "could not deliver error event, connection closed");
    }
    SessionOutcome::UpstreamFailed
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use canopy_core::chat::ChatChunk;
    use canopy_llm::LLMStream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    enum Script {
        Chunks(Vec<Result<ChatChunk, LLMError>>),
        RefuseToOpen,
        Endless(Arc<AtomicUsize>),
    }

    struct ScriptedEngine(std::sync::Mutex<Option<Script>>);

    impl ScriptedEngine {
        fn new(script: Script) -> Self {
            Self(std::sync::Mutex::new(Some(script)))
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedEngine {
        fn provider_id(&self) -> &str {
            "scripted"
        }

        async fn chat_stream(&self, _request: ChatRequest) -> canopy_llm::Result<LLMStream> {
            let script = self.0.lock().unwrap().take().expect("engine used twice");
            match script {
                Script::Chunks(items) => Ok(Box::pin(futures::stream::iter(items))),
                Script::RefuseToOpen => Err(LLMError::Network("connection refused".to_string())),
                Script::Endless(pulled) => Ok(Box::pin(futures::stream::repeat_with(move || {
                    pulled.fetch_add(1, Ordering::SeqCst);
                    Ok(ChatChunk::content("tick"))
                }))),
            }
        }
    }

    fn connection(capacity: usize) -> (ConnectionHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ConnectionHandle::new(1, tx), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_forwards_every_event_in_order() {
        let engine = ScriptedEngine::new(Script::Chunks(vec![
            Ok(ChatChunk::content("a")),
            Ok(ChatChunk::content("b")),
            Ok(ChatChunk::content("c")),
        ]));
        let (conn, mut rx) = connection(16);

        let outcome = run(&conn, &engine, "r1", ChatRequest::new("m1")).await;

        assert_eq!(outcome, SessionOutcome::Completed);
        assert_eq!(
            drain(&mut rx),
            vec![
                Envelope::new("r1", ChatChunk::content("a")),
                Envelope::new("r1", ChatChunk::content("b")),
                Envelope::new("r1", ChatChunk::content("c")),
            ]
        );
    }

    #[tokio::test]
    async fn test_open_failure_sends_one_error() {
        let engine = ScriptedEngine::new(Script::RefuseToOpen);
        let (conn, mut rx) = connection(16);

        let outcome = run(&conn, &engine, "r1", ChatRequest::new("m1")).await;

        assert_eq!(outcome, SessionOutcome::UpstreamFailed);
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].request_id.as_deref(), Some("r1"));
        assert!(frames[0].event.is_error());
    }

    #[tokio::test]
    async fn test_mid_stream_failure_stops_after_error() {
        let engine = ScriptedEngine::new(Script::Chunks(vec![
            Ok(ChatChunk::content("a")),
            Err(LLMError::Stream("reset".to_string())),
            Ok(ChatChunk::content("never")),
        ]));
        let (conn, mut rx) = connection(16);

        let outcome = run(&conn, &engine, "r1", ChatRequest::new("m1")).await;

        assert_eq!(outcome, SessionOutcome::UpstreamFailed);
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event, ChatChunk::content("a"));
        assert!(frames[1].event.is_error());
    }

    #[tokio::test]
    async fn test_closed_connection_stops_pulling() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let engine = ScriptedEngine::new(Script::Endless(pulled.clone()));
        let (conn, rx) = connection(4);
        drop(rx);

        let outcome = run(&conn, &engine, "r1", ChatRequest::new("m1")).await;

        assert_eq!(outcome, SessionOutcome::Disconnected);
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_stream_writes_nothing() {
        let engine = ScriptedEngine::new(Script::Chunks(vec![]));
        let (conn, mut rx) = connection(4);

        let outcome = run(&conn, &engine, "r1", ChatRequest::new("m1")).await;

        assert_eq!(outcome, SessionOutcome::Completed);
        assert!(drain(&mut rx).is_empty());
    }
}
