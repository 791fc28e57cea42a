#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use canopy_config::{Config, ConfigManager};
use canopy_core::chat::{ChatChunk, ChatRequest};
use canopy_llm::{LLMError, LLMProvider, LLMStream};
use canopy_server::{AppState, ConnectionLimits, ConnectionRegistry, Envelope, ImageStore};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

pub const WAIT: Duration = Duration::from_secs(5);

enum Script {
    Words(Vec<String>),
    Counting(usize),
    Endless,
    RefuseToOpen,
}

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Engine that replays a script and records what it was asked
pub struct ScriptedEngine {
    script: Script,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<ChatRequest>>,
    pub finished: Arc<AtomicUsize>,
    pub dropped: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            delay: Duration::ZERO,
            gate: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            finished: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// One content event per word
    pub fn words(words: &[&str]) -> Self {
        Self::with_script(Script::Words(words.iter().map(|w| w.to_string()).collect()))
    }

    /// `n` content events `"<model>:<i>"`
    pub fn counting(n: usize) -> Self {
        Self::with_script(Script::Counting(n))
    }

    /// Content events forever, one per `delay`
    pub fn endless(delay: Duration) -> Self {
        Self::with_script(Script::Endless).with_delay(delay)
    }

    /// Fails before producing a stream
    pub fn refusing() -> Self {
        Self::with_script(Script::RefuseToOpen)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every stream waits for one `release` before its first event
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self, streams: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(streams);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMProvider for ScriptedEngine {
    fn provider_id(&self) -> &str {
        "scripted"
    }

    async fn chat_stream(&self, request: ChatRequest) -> canopy_llm::Result<LLMStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let (items, endless) = match &self.script {
            Script::Words(words) => (words.clone(), false),
            Script::Counting(n) => (
                (0..*n).map(|i| format!("{}:{}", request.model, i)).collect(),
                false,
            ),
            Script::Endless => (Vec::new(), true),
            Script::RefuseToOpen => {
                return Err(LLMError::Network("engine unavailable".to_string()))
            }
        };

        let delay = self.delay;
        let gate = self.gate.clone();
        let finished = self.finished.clone();
        let guard = DropCounter(self.dropped.clone());

        let stream = async_stream::stream! {
            let _guard = guard;
            if let Some(gate) = gate {
                match gate.acquire_owned().await {
                    Ok(permit) => permit.forget(),
                    Err(_) => return,
                }
            }
            if endless {
                loop {
                    tokio::time::sleep(delay).await;
                    yield Ok(ChatChunk::content("tick"));
                }
            } else {
                for text in items {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    yield Ok(ChatChunk::content(text));
                }
                finished.fetch_add(1, Ordering::SeqCst);
            }
        };
        Ok(Box::pin(stream))
    }
}

/// The full app on an ephemeral port
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Arc<ConnectionRegistry>,
    pub images: Arc<ImageStore>,
    shutdown: CancellationToken,
}

impl TestServer {
    pub async fn start(engine: Arc<dyn LLMProvider>) -> Self {
        Self::start_with(engine, Config::default(), ConnectionLimits::default()).await
    }

    pub async fn start_with(
        engine: Arc<dyn LLMProvider>,
        config: Config,
        limits: ConnectionLimits,
    ) -> Self {
        let images = Arc::new(ImageStore::temporary().unwrap());
        let manager = ConfigManager::new(config, images.dir().join("config.json"));
        let state = AppState::new(manager, engine, images.clone(), limits);
        let registry = state.registry.clone();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        tokio::spawn(async move {
            canopy_server::serve(listener, state, token).await.unwrap();
        });

        Self {
            addr,
            registry,
            images,
            shutdown,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn connect(&self, client_id: i64) -> WsClient {
        let url = format!("ws://{}/ws/query/{}", self.addr, client_id);
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        WsClient { ws }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Thin WebSocket client for driving the relay
pub struct WsClient {
    pub ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn send_json(&mut self, value: serde_json::Value) {
        self.send_text(value.to_string()).await;
    }

    pub async fn send_text(&mut self, text: impl Into<String>) {
        self.ws.send(Message::Text(text.into())).await.unwrap();
    }

    /// Next text frame as an envelope, failing after `WAIT`
    pub async fn next_envelope(&mut self) -> Envelope {
        tokio::time::timeout(WAIT, self.next_text())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
    }

    /// Next text frame, or `None` if nothing arrives within `window`
    pub async fn try_next_envelope(&mut self, window: Duration) -> Option<Envelope> {
        tokio::time::timeout(window, self.next_text())
            .await
            .ok()
            .flatten()
    }

    async fn next_text(&mut self) -> Option<Envelope> {
        while let Some(frame) = self.ws.next().await {
            match frame.ok()? {
                Message::Text(text) => return Some(serde_json::from_str(&text).unwrap()),
                Message::Close(_) => return None,
                _ => continue,
            }
        }
        None
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Chat request frame in the wire format clients send
pub fn chat_frame(model: &str, request_id: Option<&str>) -> serde_json::Value {
    let mut frame = serde_json::json!({
        "model": model,
        "messages": [{"role": "user", "content": "hi"}],
        "language": "en",
    });
    if let Some(id) = request_id {
        frame["request_id"] = serde_json::Value::String(id.to_string());
    }
    frame
}

/// Poll `check` until it holds or `WAIT` passes
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub fn text_of(envelope: &Envelope) -> &str {
    match &envelope.event {
        ChatChunk::Content { text } => text,
        other => panic!("expected content, got {:?}", other),
    }
}
