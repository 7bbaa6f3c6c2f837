//! Pending quote queue.
//!
//! Quotes that found no connected recipient wait here until one connects.
//! Entries never expire.

use std::collections::VecDeque;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use sidekick_protocols::{QuotePayload, QuoteSource};

/// Build a quote payload, or `None` when the text is blank.
pub fn new_quote(text: &str, source: QuoteSource) -> Option<QuotePayload> {
    if text.trim().is_empty() {
        return None;
    }
    Some(QuotePayload {
        quote_id: format!("quote_{}", uuid::Uuid::new_v4()),
        text: text.to_string(),
        source,
        created_at: Utc::now(),
    })
}

#[derive(Default)]
pub struct PendingQuotes {
    queue: Mutex<VecDeque<QuotePayload>>,
}

impl PendingQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer every queued quote to `deliver` in FIFO order, keeping only those
    /// it rejected, then run `register` before the queue is released.
    /// Returns how many were delivered. A concurrent [`offer`](Self::offer) therefore sees
    /// the recipient only after the backlog reached it.
    pub fn attach<F, R>(&self, mut deliver: F, register: R) -> usize
    where
        F: FnMut(&QuotePayload) -> bool,
        R: FnOnce(),
    {
        let mut queue = self.queue.lock();
        let mut delivered = 0;
        let mut kept = VecDeque::with_capacity(queue.len());
        for quote in queue.drain(..) {
            if deliver(&quote) {
                delivered += 1;
            } else {
                kept.push_back(quote);
            }
        }
        *queue = kept;
        register();
        delivered
    }

    /// Hand `quote` to `broadcast`, which returns how many recipients took
    /// it. Queues the quote when that count is zero.
    pub fn offer<B>(&self, quote: QuotePayload, broadcast: B) -> usize
    where
        B: FnOnce(&QuotePayload) -> usize,
    {
        let mut queue = self.queue.lock();
        let delivered = broadcast(&quote);
        if delivered == 0 {
            debug!(quote_id = %quote.quote_id, "Queueing quote until a recipient connects");
            queue.push_back(quote);
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
