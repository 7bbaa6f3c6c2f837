//! Per-request event emitter on the host side of a worker port.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sidekick_protocols::{ErrorCode, PortSender, WorkerEvent};

use crate::error::RelayError;

/// Posts `chunk`/`done`/`error` events for one request id.
///
/// A failed post means the coordinator end is gone, which surfaces as
/// [`RelayError::ChannelClosed`].
#[derive(Debug, Clone)]
pub struct EventEmitter {
    request_id: String,
    sender: PortSender<WorkerEvent>,
    chunks_sent: Arc<AtomicUsize>,
}

impl EventEmitter {
    pub fn new(request_id: impl Into<String>, sender: PortSender<WorkerEvent>) -> Self {
        Self {
            request_id: request_id.into(),
            sender,
            chunks_sent: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn chunk(&self, chunk: impl Into<String>) -> Result<(), RelayError> {
        self.sender.send(WorkerEvent::Chunk {
            request_id: self.request_id.clone(),
            chunk: chunk.into(),
        })?;
        self.chunks_sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn done(&self, final_text: impl Into<String>) -> Result<(), RelayError> {
        self.sender.send(WorkerEvent::Done {
            request_id: self.request_id.clone(),
            final_text: final_text.into(),
        })?;
        Ok(())
    }

    pub fn error(&self, code: ErrorCode, error: impl Into<String>) -> Result<(), RelayError> {
        self.sender.send(WorkerEvent::Error {
            request_id: self.request_id.clone(),
            code,
            error: error.into(),
        })?;
        Ok(())
    }

    /// Number of chunks delivered so far for this request.
    pub fn chunks_sent(&self) -> usize {
        self.chunks_sent.load(Ordering::SeqCst)
    }
}
