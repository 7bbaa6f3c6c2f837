//! End-to-end tests: coordinator, host manager and the in-process host.
//!
//! These drive a caller port through the full path down to a scripted
//! capability provider and check what the caller observes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use parking_lot::Mutex;

use sidekick_config::Config;
use sidekick_core::{Coordinator, QuoteDelivery};
use sidekick_protocols::{
    port_pair, ActionOptions, AiAction, Availability, CallerEvent, CallerMessage,
    CapabilityError, CapabilityProvider, ChatRequest, ContentSource, ErrorCode, HostController,
    LanguageSession, PageContext, Port, QuoteSource, SessionHandle, SessionOptions, SourceError,
    StreamOutput, StreamValue, SummaryOptions, TabDirectory, TabInfo,
};
use sidekick_runtime::{LocalHostController, MemorySettingsStore};

// ============================================================================
// Test Helpers
// ============================================================================

const REPLY: &str = "First point. Second point.";

/// How sessions answer `prompt_streaming`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Fragments,
    Text,
    Body,
    Empty,
    Broken,
    Hang,
}

/// Provider whose sessions always answer [`REPLY`] in a configurable shape.
struct ScenarioProvider {
    shape: Mutex<Shape>,
    log: Arc<Mutex<Vec<String>>>,
    sessions: Mutex<usize>,
}

impl ScenarioProvider {
    fn new(shape: Shape) -> Arc<Self> {
        Arc::new(Self {
            shape: Mutex::new(shape),
            log: Arc::new(Mutex::new(Vec::new())),
            sessions: Mutex::new(0),
        })
    }

    fn set_shape(&self, shape: Shape) {
        *self.shape.lock() = shape;
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

struct ScenarioSession {
    id: String,
    shape: Shape,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl LanguageSession for ScenarioSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn prompt(&self, _text: &str) -> Result<String, CapabilityError> {
        Ok(REPLY.to_string())
    }

    async fn prompt_streaming(&self, _text: &str) -> Result<StreamOutput, CapabilityError> {
        match self.shape {
            Shape::Fragments => {
                let words: Vec<Result<StreamValue, CapabilityError>> = REPLY
                    .split_inclusive(' ')
                    .map(|word| Ok(StreamValue::Delta(word.to_string())))
                    .collect();
                Ok(StreamOutput::Fragments(Box::pin(stream::iter(words))))
            }
            Shape::Text => Ok(StreamOutput::Text(REPLY.to_string())),
            Shape::Body => {
                let pieces: Vec<Result<Bytes, CapabilityError>> = REPLY
                    .as_bytes()
                    .chunks(3)
                    .map(|piece| Ok(Bytes::copy_from_slice(piece)))
                    .collect();
                Ok(StreamOutput::Body(Box::pin(stream::iter(pieces))))
            }
            Shape::Empty => Ok(StreamOutput::Empty),
            Shape::Broken => Err(CapabilityError::Stream("stream reset".to_string())),
            Shape::Hang => futures::future::pending().await,
        }
    }

    fn release(&self) {
        self.log.lock().push(format!("release:{}", self.id));
    }
}

#[async_trait]
impl CapabilityProvider for ScenarioProvider {
    async fn model_availability(&self) -> Result<Availability, CapabilityError> {
        Ok(Availability::Available)
    }

    async fn create_session(
        &self,
        _options: SessionOptions,
    ) -> Result<SessionHandle, CapabilityError> {
        let id = {
            let mut sessions = self.sessions.lock();
            *sessions += 1;
            format!("s{}", *sessions)
        };
        self.log.lock().push(format!("create:{}", id));
        Ok(Arc::new(ScenarioSession {
            id,
            shape: *self.shape.lock(),
            log: self.log.clone(),
        }))
    }

    async fn detect_language(&self, text: &str) -> Result<Option<String>, CapabilityError> {
        Ok(Some(if text.starts_with("[zh]") { "zh" } else { "en" }.to_string()))
    }

    async fn translator_availability(
        &self,
        _source: &str,
        _target: &str,
    ) -> Result<Availability, CapabilityError> {
        Ok(Availability::Available)
    }

    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, CapabilityError> {
        self.log.lock().push(format!("translate:{}->{}", source, target));
        Ok(format!("[{}] {}", target, text))
    }

    async fn summarizer_availability(&self) -> Result<Availability, CapabilityError> {
        Ok(Availability::Available)
    }

    async fn summarize(
        &self,
        text: &str,
        _options: &SummaryOptions,
    ) -> Result<String, CapabilityError> {
        Ok(format!("Summary of {} chars", text.chars().count()))
    }
}

struct NoPages;

#[async_trait]
impl ContentSource for NoPages {
    async fn fetch_context(&self, source_id: i64) -> Result<PageContext, SourceError> {
        Err(SourceError::SourceUnavailable(source_id))
    }
}

#[async_trait]
impl TabDirectory for NoPages {
    async fn list_tabs(&self, _window_id: Option<i64>) -> Result<Vec<TabInfo>, SourceError> {
        Ok(Vec::new())
    }
}

struct Harness {
    coordinator: Coordinator,
    host: Arc<LocalHostController>,
    provider: Arc<ScenarioProvider>,
}

fn harness(shape: Shape) -> Harness {
    harness_with_delay(shape, Duration::ZERO)
}

fn harness_with_delay(shape: Shape, startup_delay: Duration) -> Harness {
    let mut config = Config::default();
    config.stream.chunk_delay_ms = 0;

    let provider = ScenarioProvider::new(shape);
    let settings = Arc::new(MemorySettingsStore::new(HashMap::new()));
    let host = Arc::new(
        LocalHostController::from_config(provider.clone(), settings, &config)
            .with_startup_delay(startup_delay),
    );
    let pages = Arc::new(NoPages);
    let coordinator = Coordinator::from_config(host.clone(), pages.clone(), pages, &config);

    Harness {
        coordinator,
        host,
        provider,
    }
}

type Ui = Port<CallerEvent, CallerMessage>;

async fn connect(coordinator: &Coordinator) -> Ui {
    let (mut ui, port) = port_pair::<CallerMessage, CallerEvent>("sidebar");
    coordinator.connect_caller(port);
    assert_eq!(next(&mut ui).await, CallerEvent::Ready);
    ui
}

async fn next(ui: &mut Ui) -> CallerEvent {
    tokio::time::timeout(Duration::from_secs(5), ui.recv())
        .await
        .expect("timed out waiting for caller event")
        .expect("caller port closed")
}

async fn assert_silent(ui: &mut Ui) {
    let extra = tokio::time::timeout(Duration::from_millis(50), ui.recv()).await;
    assert!(extra.is_err(), "unexpected event: {:?}", extra);
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

fn ask(ui: &Ui, request_id: &str, payload: ChatRequest) {
    ui.send(CallerMessage::SendMessage {
        request_id: request_id.to_string(),
        payload,
    })
    .unwrap();
}

/// Collect one request's chunks and its terminal event.
async fn collect(ui: &mut Ui) -> (Vec<String>, CallerEvent) {
    let mut chunks = Vec::new();
    loop {
        match next(ui).await {
            CallerEvent::Chunk { chunk, .. } => chunks.push(chunk),
            event if event.is_terminal() => return (chunks, event),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}

fn final_text(event: &CallerEvent) -> &str {
    match event {
        CallerEvent::Done { final_text, .. } => final_text,
        other => panic!("expected done, got {:?}", other),
    }
}

// ============================================================================
// Chat Streaming
// ============================================================================

#[tokio::test]
async fn test_summarize_request_streams_then_completes() {
    let h = harness(Shape::Fragments);
    let mut ui = connect(&h.coordinator).await;

    ask(&ui, "r1", ChatRequest::new("Summarize this"));
    let (chunks, done) = collect(&mut ui).await;

    assert!(chunks.len() > 1);
    assert_eq!(chunks.concat(), REPLY);
    assert_eq!(final_text(&done), REPLY);
    assert_eq!(done.request_id(), Some("r1"));
    assert_silent(&mut ui).await;
    assert_eq!(h.coordinator.active_streams(), 0);
}

#[tokio::test]
async fn test_every_output_shape_yields_the_same_answer() {
    for shape in [
        Shape::Fragments,
        Shape::Text,
        Shape::Body,
        Shape::Empty,
        Shape::Broken,
    ] {
        let h = harness(shape);
        let mut ui = connect(&h.coordinator).await;

        ask(&ui, "r1", ChatRequest::new("Summarize this"));
        let (chunks, done) = collect(&mut ui).await;

        assert!(!chunks.is_empty(), "{:?} produced no chunks", shape);
        assert_eq!(chunks.concat(), REPLY, "{:?}", shape);
        assert_eq!(final_text(&done), REPLY, "{:?}", shape);
    }
}

#[tokio::test]
async fn test_non_english_reply_is_translated_before_delivery() {
    let h = harness(Shape::Fragments);
    let mut ui = connect(&h.coordinator).await;

    let mut request = ChatRequest::new("Summarize this");
    request.response_language = Some("zh-CN".to_string());
    ask(&ui, "r1", request);
    let (chunks, done) = collect(&mut ui).await;

    let expected = format!("[zh] {}", REPLY);
    assert_eq!(final_text(&done), expected);
    assert!(chunks.iter().all(|chunk| !chunk.starts_with("First")));
    assert!(h.provider.log().contains(&"translate:en->zh".to_string()));
}

#[tokio::test]
async fn test_concurrent_first_requests_share_one_host() {
    let h = harness_with_delay(Shape::Text, Duration::from_millis(100));
    let mut ui = connect(&h.coordinator).await;

    for i in 0..5 {
        ask(&ui, &format!("r{}", i), ChatRequest::new("hello"));
    }

    let mut finished = Vec::new();
    while finished.len() < 5 {
        let event = next(&mut ui).await;
        if event.is_terminal() {
            assert!(matches!(event, CallerEvent::Done { .. }), "{:?}", event);
            finished.push(event.request_id().map(str::to_string));
        }
    }

    assert_eq!(h.host.creates(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_expired_session_is_released_before_replacement() {
    let h = harness(Shape::Text);
    let mut ui = connect(&h.coordinator).await;

    ask(&ui, "r1", ChatRequest::new("first"));
    collect(&mut ui).await;

    tokio::time::advance(Duration::from_secs(121)).await;
    ask(&ui, "r2", ChatRequest::new("second"));
    collect(&mut ui).await;

    assert_eq!(h.host.creates(), 1);
    assert_eq!(h.provider.log(), vec!["create:s1", "release:s1", "create:s2"]);
}

// ============================================================================
// Cancellation and Disconnects
// ============================================================================

#[tokio::test]
async fn test_cancel_is_idempotent_and_session_stays_usable() {
    let h = harness(Shape::Hang);
    let mut ui = connect(&h.coordinator).await;

    ask(&ui, "r1", ChatRequest::new("never finishes"));
    wait_until(|| h.coordinator.is_active("r1")).await;

    for _ in 0..2 {
        ui.send(CallerMessage::CancelRequest {
            request_id: "r1".to_string(),
            reason: None,
        })
        .unwrap();
    }
    wait_until(|| !h.coordinator.is_active("r1")).await;
    assert_silent(&mut ui).await;

    h.provider.set_shape(Shape::Text);
    h.host.executor().cache().invalidate();
    ask(&ui, "r2", ChatRequest::new("again"));
    let (_, done) = collect(&mut ui).await;
    assert_eq!(done.request_id(), Some("r2"));
    assert_eq!(final_text(&done), REPLY);
}

#[tokio::test]
async fn test_cancel_during_host_startup_never_runs_the_turn() {
    let h = harness_with_delay(Shape::Text, Duration::from_millis(300));
    let mut ui = connect(&h.coordinator).await;

    ask(&ui, "r1", ChatRequest::new("hello"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    ui.send(CallerMessage::CancelRequest {
        request_id: "r1".to_string(),
        reason: None,
    })
    .unwrap();

    let extra = tokio::time::timeout(Duration::from_millis(500), ui.recv()).await;
    assert!(extra.is_err(), "cancelled request emitted {:?}", extra);

    ask(&ui, "r2", ChatRequest::new("hello again"));
    let (_, done) = collect(&mut ui).await;
    assert_eq!(done.request_id(), Some("r2"));
    assert_eq!(h.provider.log(), vec!["create:s1"]);
    assert_eq!(h.coordinator.active_streams(), 0);
}

#[tokio::test]
async fn test_host_teardown_reports_one_disconnect() {
    let h = harness(Shape::Hang);
    let mut ui = connect(&h.coordinator).await;

    ask(&ui, "r1", ChatRequest::new("never finishes"));
    wait_until(|| h.coordinator.is_active("r1")).await;

    h.host.close_host().await.unwrap();

    assert_eq!(
        next(&mut ui).await,
        CallerEvent::error("r1", ErrorCode::StreamDisconnected, "Stream disconnected")
    );
    assert_silent(&mut ui).await;
    assert_eq!(h.coordinator.active_streams(), 0);
}

#[tokio::test]
async fn test_caller_disconnect_leaves_other_callers_alone() {
    let h = harness(Shape::Hang);
    let first = connect(&h.coordinator).await;
    let mut second = connect(&h.coordinator).await;

    ask(&first, "mine", ChatRequest::new("one"));
    wait_until(|| h.coordinator.is_active("mine")).await;
    ask(&second, "theirs", ChatRequest::new("two"));
    // The host serializes turns; the second stream is registered but queued.
    wait_until(|| h.coordinator.is_active("theirs")).await;

    drop(first);
    wait_until(|| !h.coordinator.is_active("mine")).await;

    assert!(h.coordinator.is_active("theirs"));
    assert_silent(&mut second).await;
}

// ============================================================================
// Quotes and Actions
// ============================================================================

#[tokio::test]
async fn test_queued_quote_is_delivered_once() {
    let h = harness(Shape::Text);
    let source = QuoteSource {
        url: "https://paper.test".to_string(),
        title: "Paper".to_string(),
    };

    assert_eq!(
        h.coordinator.send_quote("Results hold at scale.", source),
        QuoteDelivery::Queued
    );

    let mut first = connect(&h.coordinator).await;
    assert!(matches!(next(&mut first).await, CallerEvent::Quote(q) if q.text == "Results hold at scale."));

    drop(first);
    wait_until(|| h.coordinator.connected_callers() == 0).await;

    let mut second = connect(&h.coordinator).await;
    assert_silent(&mut second).await;
}

#[tokio::test]
async fn test_delegated_summary_runs_in_host() {
    let h = harness(Shape::Text);

    let result = h
        .coordinator
        .delegate_action(AiAction::Summarize, "Some long article.", ActionOptions::default())
        .await;

    assert!(result.success, "{:?}", result);
    assert_eq!(result.result.as_deref(), Some("Summary of 18 chars"));
    assert_eq!(h.host.creates(), 1);
}
