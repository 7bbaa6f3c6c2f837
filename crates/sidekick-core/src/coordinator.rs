//! The coordinator: routes caller requests to the host.
//!
//! Each connected caller gets its own task reading [`CallerMessage`]s. A chat
//! request resolves its mentions, ensures the host, opens a dedicated worker
//! port and relays `chunk*` + one terminal event back to the caller that
//! issued it. Streams are tracked in [`ActiveStreams`] so cancellation and
//! disconnects clean up exactly the streams they own.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use sidekick_config::{ChatConfig, Config};
use sidekick_protocols::{
    ActionOptions, ActionResult, AiAction, CallerEvent, CallerMessage, ChatRequest, ContentSource,
    ErrorCode, HostChatPayload, HostController, HostRequest, HostResponse, Port, PortId,
    PortReceiver, PortSender, QuoteSource, RequestId, TabDirectory, WorkerCommand, WorkerEvent,
};

use crate::context::{collect_mention_contexts, mentionable_tabs};
use crate::error::ChatError;
use crate::host_manager::HostManager;
use crate::quotes::{new_quote, PendingQuotes};
use crate::streams::{ActiveStream, ActiveStreams, StartTicket};

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;

/// Coordinator end of a caller port.
pub type CallerPort = Port<CallerMessage, CallerEvent>;

/// Name of the per-request worker port.
pub const WORKER_PORT_NAME: &str = "ai-chat-stream";

/// Outcome of [`Coordinator::send_quote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteDelivery {
    /// Blank text; nothing was sent or queued.
    Ignored,
    /// Broadcast reached this many callers.
    Delivered(usize),
    /// No caller accepted it; it waits for the next connection.
    Queued,
}

struct CoordinatorInner {
    hosts: HostManager,
    content: Arc<dyn ContentSource>,
    tabs: Arc<dyn TabDirectory>,
    chat: ChatConfig,
    /// Bound on one delegated action round trip to the host.
    action_timeout: Duration,
    streams: ActiveStreams,
    callers: DashMap<PortId, PortSender<CallerEvent>>,
    quotes: PendingQuotes,
}

/// Long-lived router. Cheap to clone.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Coordinator {
    pub fn new(
        hosts: HostManager,
        content: Arc<dyn ContentSource>,
        tabs: Arc<dyn TabDirectory>,
        chat: ChatConfig,
        action_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                hosts,
                content,
                tabs,
                chat,
                action_timeout,
                streams: ActiveStreams::new(),
                callers: DashMap::new(),
                quotes: PendingQuotes::new(),
            }),
        }
    }

    pub fn from_config(
        controller: Arc<dyn HostController>,
        content: Arc<dyn ContentSource>,
        tabs: Arc<dyn TabDirectory>,
        config: &Config,
    ) -> Self {
        Self::new(
            HostManager::from_config(controller, &config.host),
            content,
            tabs,
            config.chat.clone(),
            config.session.prompt_timeout(),
        )
    }

    pub fn host_manager(&self) -> &HostManager {
        &self.inner.hosts
    }

    pub fn active_streams(&self) -> usize {
        self.inner.streams.len()
    }

    pub fn is_active(&self, request_id: &str) -> bool {
        self.inner.streams.contains(request_id)
    }

    pub fn connected_callers(&self) -> usize {
        self.inner.callers.len()
    }

    pub fn pending_quotes(&self) -> usize {
        self.inner.quotes.len()
    }

    /// Serve `port` on a new task.
    pub fn connect_caller(&self, port: CallerPort) -> JoinHandle<()> {
        tokio::spawn(self.clone().serve_caller(port))
    }

    /// Serve one caller until its port closes.
    ///
    /// Sends `ready`, flushes pending quotes, then dispatches messages. On
    /// disconnect only the streams this caller issued are cancelled.
    pub async fn serve_caller(self, port: CallerPort) {
        let (sender, mut receiver) = port.split();
        let caller_id = sender.id();
        info!(caller = %caller_id, port = sender.name(), "Caller connected");

        if sender.send(CallerEvent::Ready).is_err() {
            debug!(caller = %caller_id, "Caller closed before ready");
        }
        self.attach_caller(&sender);

        while let Some(message) = receiver.recv().await {
            match message {
                CallerMessage::SendMessage {
                    request_id,
                    payload,
                } => {
                    let ticket = self.inner.streams.begin(request_id, caller_id);
                    let this = self.clone();
                    let caller = sender.clone();
                    tokio::spawn(async move {
                        this.handle_chat_request(caller, ticket, payload).await;
                    });
                }
                CallerMessage::CancelRequest { request_id, reason } => {
                    self.cancel_request(
                        &request_id,
                        reason.as_deref().unwrap_or("Cancelled by caller"),
                    );
                }
                CallerMessage::ListTabs {
                    request_id,
                    window_id,
                } => {
                    let this = self.clone();
                    let caller = sender.clone();
                    tokio::spawn(async move {
                        this.list_tabs(&caller, request_id, window_id).await;
                    });
                }
            }
        }

        self.inner.callers.remove(&caller_id);
        let owned = self.inner.streams.owned_by(caller_id);
        for request_id in &owned {
            self.cancel_request(request_id, "Caller disconnected");
        }
        info!(caller = %caller_id, cancelled = owned.len(), "Caller disconnected");
    }

    /// Run one chat request to its terminal event.
    ///
    /// A request cancelled before it reaches the host ends without emitting
    /// anything.
    async fn handle_chat_request(
        &self,
        caller: PortSender<CallerEvent>,
        ticket: StartTicket,
        payload: ChatRequest,
    ) {
        let request_id = ticket.request_id().to_string();
        let outcome = self.start_chat(&caller, &ticket, payload).await;
        self.inner.streams.end_start(&ticket);

        match outcome {
            Ok(Some((worker_id, events))) => {
                self.relay_worker_events(&request_id, worker_id, events).await
            }
            Ok(None) => {
                debug!(request_id = %request_id, "Chat request cancelled before reaching the host");
            }
            Err(_) if ticket.is_cancelled() => {
                debug!(request_id = %request_id, "Chat request cancelled while failing");
            }
            Err(e) => {
                warn!(request_id = %request_id, code = %e.code(), "Chat request failed: {}", e);
                if caller
                    .send(CallerEvent::error(&request_id, e.code(), e.to_string()))
                    .is_err()
                {
                    debug!(request_id = %request_id, "Caller gone, error dropped");
                }
            }
        }
    }

    /// Returns `Ok(None)` when the ticket was cancelled on the way.
    async fn start_chat(
        &self,
        caller: &PortSender<CallerEvent>,
        ticket: &StartTicket,
        payload: ChatRequest,
    ) -> Result<Option<(PortId, PortReceiver<WorkerEvent>)>, ChatError> {
        let request_id = ticket.request_id();
        if payload.message.trim().is_empty() {
            return Err(ChatError::InvalidRequest(
                "Message text is required".to_string(),
            ));
        }

        let cancelled = ticket.token();
        let contexts = tokio::select! {
            biased;
            _ = cancelled.cancelled() => return Ok(None),
            contexts = collect_mention_contexts(
                self.inner.content.as_ref(),
                &payload.mentions,
                self.inner.chat.max_context_chars,
            ) => contexts?,
        };

        tokio::select! {
            biased;
            _ = cancelled.cancelled() => return Ok(None),
            ready = self.inner.hosts.ensure_host() => ready?,
        }

        let port = tokio::select! {
            biased;
            _ = cancelled.cancelled() => return Ok(None),
            port = self.inner.hosts.controller().connect(WORKER_PORT_NAME) => port?,
        };
        let (worker, events) = port.split();
        let worker_id = worker.id();

        let stream = ActiveStream {
            caller: caller.clone(),
            worker: worker.clone(),
        };
        match self.inner.streams.activate(ticket, stream) {
            Ok(Some(previous)) => {
                warn!(request_id = %request_id, "Request id reused, closing previous stream");
                previous.worker.disconnect();
            }
            Ok(None) => {}
            Err(_) => {
                worker.disconnect();
                return Ok(None);
            }
        }

        let system_prompt = payload
            .system_prompt
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or_else(|| self.inner.chat.default_system_prompt.clone());
        let start = WorkerCommand::Start {
            request_id: request_id.to_string(),
            payload: HostChatPayload {
                message: payload.message,
                history: payload.history,
                contexts,
                quotes: payload.quotes,
                response_language: payload.response_language,
                system_prompt,
                force_download: payload.force_download,
            },
        };

        if let Err(e) = worker.send(start) {
            worker.disconnect();
            return match self.inner.streams.remove_for_worker(request_id, worker_id) {
                Some(_) => Err(e.into()),
                // Cancelled or replaced right after activation.
                None => Ok(None),
            };
        }

        debug!(request_id = %request_id, worker = %worker_id, "Chat stream registered");
        Ok(Some((worker_id, events)))
    }

    async fn relay_worker_events(
        &self,
        request_id: &str,
        worker_id: PortId,
        mut events: PortReceiver<WorkerEvent>,
    ) {
        while let Some(event) = events.recv().await {
            let Some(caller) = self.inner.streams.caller_for(request_id, worker_id) else {
                debug!(request_id = %request_id, "Stream no longer active, discarding worker output");
                return;
            };

            match event {
                WorkerEvent::Chunk { chunk, .. } => {
                    let chunk = CallerEvent::Chunk {
                        request_id: request_id.to_string(),
                        chunk,
                    };
                    if caller.send(chunk).is_err() {
                        self.cancel_request(request_id, "Caller disconnected");
                        return;
                    }
                }
                WorkerEvent::Done { final_text, .. } => {
                    let done = CallerEvent::Done {
                        request_id: request_id.to_string(),
                        final_text,
                    };
                    self.finish(request_id, worker_id, done);
                    return;
                }
                WorkerEvent::Error { code, error, .. } => {
                    self.finish(request_id, worker_id, CallerEvent::error(request_id, code, error));
                    return;
                }
            }
        }

        if self.inner.streams.caller_for(request_id, worker_id).is_some() {
            warn!(request_id = %request_id, "Worker port closed without a terminal event");
        }
        self.finish(
            request_id,
            worker_id,
            CallerEvent::error(request_id, ErrorCode::StreamDisconnected, "Stream disconnected"),
        );
    }

    /// Deliver `terminal` if this worker still owns the stream, then close it.
    fn finish(&self, request_id: &str, worker_id: PortId, terminal: CallerEvent) {
        let Some(stream) = self.inner.streams.remove_for_worker(request_id, worker_id) else {
            return;
        };
        if stream.caller.send(terminal).is_err() {
            debug!(request_id = %request_id, "Caller gone before terminal event");
        }
        stream.worker.disconnect();
    }

    /// Stop a stream, whether it is still starting or already relaying.
    /// Unknown or finished request ids are ignored.
    ///
    /// Returns whether a request was cancelled.
    pub fn cancel_request(&self, request_id: &str, reason: &str) -> bool {
        // Starting entry first: activation inserts the stream before
        // dropping it, so one of the two lookups always sees the request.
        let was_starting = self.inner.streams.abort_start(request_id);
        let Some(stream) = self.inner.streams.remove(request_id) else {
            if was_starting {
                info!(request_id = %request_id, reason = %reason, "Chat request cancelled before start");
            } else {
                debug!(request_id = %request_id, "Cancel for inactive request ignored");
            }
            return was_starting;
        };

        let cancel = WorkerCommand::Cancel {
            request_id: request_id.to_string(),
            reason: reason.to_string(),
        };
        if let Err(e) = stream.worker.send(cancel) {
            debug!(request_id = %request_id, "Could not notify worker of cancel: {}", e);
        }
        stream.worker.disconnect();
        info!(request_id = %request_id, reason = %reason, "Chat stream cancelled");
        true
    }

    /// Answer a `listTabs` request with the mentionable tabs.
    pub async fn list_tabs(
        &self,
        caller: &PortSender<CallerEvent>,
        request_id: RequestId,
        window_id: Option<i64>,
    ) {
        let response = match self.inner.tabs.list_tabs(window_id).await {
            Ok(tabs) => CallerEvent::ListTabsResponse {
                request_id,
                tabs: Some(mentionable_tabs(tabs)),
                error: None,
            },
            Err(e) => {
                warn!(request_id = %request_id, "Failed to list tabs: {}", e);
                CallerEvent::ListTabsResponse {
                    request_id,
                    tabs: None,
                    error: Some(e.to_string()),
                }
            }
        };
        if caller.send(response).is_err() {
            debug!("Caller gone before tab list");
        }
    }

    /// Broadcast quoted text to every connected caller, queueing it when
    /// nobody accepts it.
    pub fn send_quote(&self, text: &str, source: QuoteSource) -> QuoteDelivery {
        let Some(quote) = new_quote(text, source) else {
            debug!("Ignoring empty quote");
            return QuoteDelivery::Ignored;
        };

        let delivered = self.inner.quotes.offer(quote, |quote| {
            let recipients: Vec<PortSender<CallerEvent>> = self
                .inner
                .callers
                .iter()
                .map(|entry| entry.value().clone())
                .collect();
            recipients
                .iter()
                .filter(|caller| caller.send(CallerEvent::Quote(quote.clone())).is_ok())
                .count()
        });

        if delivered > 0 {
            debug!(delivered, "Quote broadcast");
            QuoteDelivery::Delivered(delivered)
        } else {
            QuoteDelivery::Queued
        }
    }

    /// Deliver the quote backlog to `caller`, then make it a broadcast
    /// recipient, so queued quotes always arrive before newer ones.
    fn attach_caller(&self, caller: &PortSender<CallerEvent>) {
        let delivered = self.inner.quotes.attach(
            |quote| caller.send(CallerEvent::Quote(quote.clone())).is_ok(),
            || {
                self.inner.callers.insert(caller.id(), caller.clone());
            },
        );
        if delivered > 0 {
            info!(delivered, "Delivered pending quotes");
        }
    }

    /// Run a one-shot action in the host.
    pub async fn delegate_action(
        &self,
        kind: AiAction,
        text: &str,
        options: ActionOptions,
    ) -> ActionResult {
        if let Err(e) = self.inner.hosts.ensure_host().await {
            warn!(action = ?kind, "Host unavailable for action: {}", e);
            return ActionResult::failed(e.code(), e.to_string());
        }

        let request = HostRequest::Run {
            kind,
            text: text.to_string(),
            options,
        };
        let response = timeout(
            self.inner.action_timeout,
            self.inner.hosts.controller().request(request),
        )
        .await;
        match response {
            Ok(Ok(HostResponse::ActionResult(result))) => result,
            Ok(Ok(other)) => ActionResult::failed(
                ErrorCode::InternalError,
                format!("Unexpected host response: {:?}", other),
            ),
            Ok(Err(e)) => ActionResult::failed(e.code(), e.to_string()),
            Err(_) => {
                warn!(action = ?kind, "Host did not answer the action in time");
                ActionResult::failed(
                    ErrorCode::PromptTimeout,
                    format!(
                        "Action timed out after {} ms",
                        self.inner.action_timeout.as_millis()
                    ),
                )
            }
        }
    }

    /// Cancel every active stream and close the host.
    pub async fn shutdown(&self) {
        let request_ids = self.inner.streams.request_ids();
        for request_id in &request_ids {
            self.cancel_request(request_id, "Coordinator shutting down");
        }
        if let Err(e) = self.inner.hosts.controller().close_host().await {
            warn!("Failed to close host on shutdown: {}", e);
        }
        self.inner.hosts.invalidate();
        info!(cancelled = request_ids.len(), "Coordinator stopped");
    }
}
