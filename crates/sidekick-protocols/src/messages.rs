//! Messages carried over caller, worker and host channels.
//!
//! - **Caller port** (UI surface ⇄ coordinator): [`CallerMessage`] in,
//!   [`CallerEvent`] out.
//! - **Worker port** (coordinator ⇄ host, one per chat request):
//!   [`WorkerCommand`] in, [`WorkerEvent`] out.
//! - **Host request/response** (coordinator → host, one-shot):
//!   [`HostRequest`] / [`HostResponse`].

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::types::{ChatRequest, HostChatPayload, QuotePayload, TabInfo};

/// Caller correlation identifier for one outstanding request.
pub type RequestId = String;

/// UI surface → coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CallerMessage {
    SendMessage {
        request_id: RequestId,
        #[serde(default)]
        payload: ChatRequest,
    },
    CancelRequest {
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ListTabs {
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window_id: Option<i64>,
    },
}

/// Coordinator → UI surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CallerEvent {
    Ready,
    Chunk {
        request_id: RequestId,
        chunk: String,
    },
    Done {
        request_id: RequestId,
        final_text: String,
    },
    Error {
        request_id: RequestId,
        code: ErrorCode,
        error: String,
    },
    ListTabsResponse {
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tabs: Option<Vec<TabInfo>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Quote(QuotePayload),
}

impl CallerEvent {
    pub fn error(request_id: impl Into<String>, code: ErrorCode, error: impl Into<String>) -> Self {
        CallerEvent::Error {
            request_id: request_id.into(),
            code,
            error: error.into(),
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            CallerEvent::Chunk { request_id, .. }
            | CallerEvent::Done { request_id, .. }
            | CallerEvent::Error { request_id, .. }
            | CallerEvent::ListTabsResponse { request_id, .. } => Some(request_id),
            CallerEvent::Ready | CallerEvent::Quote(_) => None,
        }
    }

    /// `done` and `error` end a request; nothing may follow them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallerEvent::Done { .. } | CallerEvent::Error { .. })
    }
}

/// Coordinator → host, over a per-request worker port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkerCommand {
    Start {
        request_id: RequestId,
        payload: HostChatPayload,
    },
    Cancel {
        request_id: RequestId,
        reason: String,
    },
}

/// Host → coordinator, over a per-request worker port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkerEvent {
    Chunk {
        request_id: RequestId,
        chunk: String,
    },
    Done {
        request_id: RequestId,
        final_text: String,
    },
    Error {
        request_id: RequestId,
        code: ErrorCode,
        error: String,
    },
}

impl WorkerEvent {
    pub fn request_id(&self) -> &str {
        match self {
            WorkerEvent::Chunk { request_id, .. }
            | WorkerEvent::Done { request_id, .. }
            | WorkerEvent::Error { request_id, .. } => request_id,
        }
    }
}

/// One-shot AI action that can be delegated to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AiAction {
    Translate,
    Summarize,
    Rewrite,
    #[serde(rename = "askAI")]
    AskAi,
    Enhance,
    InPlaceTranslate,
}

/// Per-call options for a one-shot action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_language: Option<String>,
    #[serde(default)]
    pub force_download: bool,
}

/// Coordinator → host request/response call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all_fields = "camelCase")]
pub enum HostRequest {
    #[serde(rename = "__healthCheck")]
    HealthCheck { test_id: String },
    #[serde(rename = "run")]
    Run {
        kind: AiAction,
        text: String,
        #[serde(default)]
        options: ActionOptions,
    },
}

/// Outcome of a one-shot action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl ActionResult {
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            error: None,
            code: None,
        }
    }

    pub fn failed(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            code: Some(code),
        }
    }
}

/// Host → coordinator reply to a [`HostRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostResponse {
    Pong { test_id: String },
    ActionResult(ActionResult),
}
