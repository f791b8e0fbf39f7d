//! Shared test utilities
#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};

use jarvis_relay::voice::{AudioSource, CaptureOutcome, CommandListener, Speaker, Transcriber};
use jarvis_relay::{DeviceCatalog, Error, HomeHub, LanguageModel, Result, ServiceCall};

/// Ordered log shared by fakes so tests can check cross-component ordering
pub type EventLog = Arc<Mutex<Vec<String>>>;

#[must_use]
pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[must_use]
pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Catalog used across the assistant tests
#[must_use]
pub fn test_catalog() -> DeviceCatalog {
    [
        ("kitchen light", "switch.kitchen_light"),
        ("living room tv", "media_player.living_room_tv"),
    ]
    .into_iter()
    .collect()
}

/// Speaker that records what it was asked to say
pub struct RecordingSpeaker {
    log: EventLog,
}

impl RecordingSpeaker {
    pub fn new(log: &EventLog) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::clone(log),
        })
    }
}

#[async_trait]
impl Speaker for RecordingSpeaker {
    async fn speak(&self, text: &str) {
        self.log.lock().unwrap().push(format!("say: {text}"));
    }
}

/// Hub that records service calls and fails for chosen entities
pub struct FakeHub {
    log: EventLog,
    healthy: AtomicBool,
    failing: Vec<String>,
    health_checks: AtomicUsize,
    calls: Mutex<Vec<ServiceCall>>,
}

impl FakeHub {
    pub fn new(log: &EventLog, healthy: bool) -> Arc<Self> {
        Self::failing_for(log, healthy, &[])
    }

    pub fn failing_for(log: &EventLog, healthy: bool, failing: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::clone(log),
            healthy: AtomicBool::new(healthy),
            failing: failing.iter().map(ToString::to_string).collect(),
            health_checks: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HomeHub for FakeHub {
    async fn is_healthy(&self) -> bool {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        self.healthy.load(Ordering::SeqCst)
    }

    async fn call_service(&self, call: &ServiceCall) -> Result<()> {
        self.log.lock().unwrap().push(format!(
            "call: {}/{} {}",
            call.domain,
            call.service,
            call.body()
        ));
        self.calls.lock().unwrap().push(call.clone());

        if self.failing.contains(&call.entity_id) {
            return Err(Error::Hub(format!("{} is unavailable", call.entity_id)));
        }
        Ok(())
    }
}

/// Language model that returns a fixed reply and records prompts
pub struct ScriptedModel {
    reply: std::result::Result<String, String>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedModel {
    pub fn replying(reply: &str) -> (Box<Self>, Arc<Mutex<Vec<String>>>) {
        Self::build(Ok(reply.to_string()))
    }

    pub fn failing(message: &str) -> (Box<Self>, Arc<Mutex<Vec<String>>>) {
        Self::build(Err(message.to_string()))
    }

    fn build(
        reply: std::result::Result<String, String>,
    ) -> (Box<Self>, Arc<Mutex<Vec<String>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let model = Box::new(Self {
            reply,
            prompts: Arc::clone(&prompts),
        });
        (model, prompts)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().map_err(Error::Llm)
    }
}

/// Listener that hands out queued outcomes
pub struct ScriptedListener {
    outcomes: VecDeque<CaptureOutcome>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedListener {
    pub fn new(outcomes: Vec<CaptureOutcome>) -> (Box<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let listener = Box::new(Self {
            outcomes: outcomes.into(),
            calls: Arc::clone(&calls),
        });
        (listener, calls)
    }
}

#[async_trait(?Send)]
impl CommandListener for ScriptedListener {
    async fn listen(&mut self, _mic: &mut dyn AudioSource) -> CaptureOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .pop_front()
            .unwrap_or(CaptureOutcome::NoSpeech)
    }
}

/// Transcriber that hands out queued replies and counts calls
pub struct ScriptedTranscriber {
    replies: Mutex<VecDeque<Result<String>>>,
    calls: AtomicUsize,
    last_wav: Mutex<Vec<u8>>,
}

impl ScriptedTranscriber {
    pub fn new(replies: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            last_wav: Mutex::new(Vec::new()),
        })
    }

    pub fn saying(text: &str) -> Arc<Self> {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_wav(&self) -> Vec<u8> {
        self.last_wav.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_wav.lock().unwrap() = wav.to_vec();
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Stt("no scripted reply".to_string())))
    }
}

/// Microphone that delivers one queued chunk per drain while started
#[derive(Default)]
pub struct ScriptedMic {
    pub chunks: VecDeque<Vec<f32>>,
    pub started: bool,
    pub starts: usize,
    pub stops: usize,
    pub fail_start: bool,
    pub fault: Option<String>,
}

impl ScriptedMic {
    pub fn with_chunks(chunks: Vec<Vec<f32>>) -> Self {
        Self {
            chunks: chunks.into(),
            ..Self::default()
        }
    }
}

impl AudioSource for ScriptedMic {
    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(Error::Audio("device busy".to_string()));
        }
        self.started = true;
        self.starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.started = false;
        self.stops += 1;
    }

    fn take_buffer(&mut self) -> Vec<f32> {
        if !self.started {
            return Vec::new();
        }
        self.chunks.pop_front().unwrap_or_default()
    }

    fn take_fault(&mut self) -> Option<String> {
        self.fault.take()
    }

    fn sample_rate(&self) -> u32 {
        16000
    }
}

/// Sine tone at 16kHz
#[must_use]
pub fn tone(duration_secs: f32, amplitude: f32) -> Vec<f32> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let n = (16000.0 * duration_secs) as usize;
    (0..n)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f32 / 16000.0;
            amplitude * (2.0 * std::f32::consts::PI * 300.0 * t).sin()
        })
        .collect()
}

/// Silence at 16kHz
#[must_use]
pub fn silence(duration_secs: f32) -> Vec<f32> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let n = (16000.0 * duration_secs) as usize;
    vec![0.0; n]
}

/// A request seen by [`FakeServer`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

#[derive(Clone)]
struct ServerState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    status: StatusCode,
    reply: String,
    delay: Duration,
}

/// Local HTTP server that records every request and answers with a fixed reply
pub struct FakeServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl FakeServer {
    pub async fn start(status: StatusCode, reply: &str) -> Self {
        Self::start_delayed(status, reply, Duration::ZERO).await
    }

    pub async fn start_delayed(status: StatusCode, reply: &str, delay: Duration) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = ServerState {
            requests: Arc::clone(&requests),
            status,
            reply: reply.to_string(),
            delay,
        };

        let app = Router::new().fallback(record).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn record(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    state.requests.lock().unwrap().push(RecordedRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(ToString::to_string),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    (state.status, state.reply.clone())
}

/// An address nothing is listening on
pub async fn closed_address() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
