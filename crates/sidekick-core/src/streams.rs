//! Active chat streams, keyed by caller request id.
//!
//! A request is *starting* from the moment its caller sends it until a worker
//! port is attached, and *active* afterwards. Cancelling a starting request
//! fires its token; the start path observes it at every await and ends
//! without emitting anything.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use sidekick_protocols::{CallerEvent, PortId, PortSender, RequestId, WorkerCommand};

/// Bookkeeping for one in-flight chat request.
#[derive(Clone)]
pub struct ActiveStream {
    pub caller: PortSender<CallerEvent>,
    pub worker: PortSender<WorkerCommand>,
}

impl ActiveStream {
    pub fn caller_id(&self) -> PortId {
        self.caller.id()
    }

    pub fn worker_id(&self) -> PortId {
        self.worker.id()
    }
}

struct Starting {
    caller: PortId,
    generation: u64,
    token: CancellationToken,
}

/// Claim on a request that has not reached the host yet.
#[derive(Debug, Clone)]
pub struct StartTicket {
    request_id: RequestId,
    generation: u64,
    token: CancellationToken,
}

impl StartTicket {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Table of starting and active streams.
///
/// Removal is the single point that decides who delivers a request's
/// terminal event: whoever removes the entry owns it.
#[derive(Default)]
pub struct ActiveStreams {
    streams: DashMap<RequestId, ActiveStream>,
    starting: DashMap<RequestId, Starting>,
    generation: AtomicU64,
}

impl ActiveStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `caller` issued `request_id`. A starting request with
    /// the same id is superseded and its token fired.
    pub fn begin(&self, request_id: RequestId, caller: PortId) -> StartTicket {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = self.starting.insert(
            request_id.clone(),
            Starting {
                caller,
                generation,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        StartTicket {
            request_id,
            generation,
            token,
        }
    }

    /// Promote a starting request to active.
    ///
    /// Fails, handing `stream` back, when the ticket was cancelled or
    /// superseded. On success returns the active stream it replaced, if any.
    pub fn activate(
        &self,
        ticket: &StartTicket,
        stream: ActiveStream,
    ) -> Result<Option<ActiveStream>, ActiveStream> {
        match self.starting.entry(ticket.request_id.clone()) {
            Entry::Occupied(entry) if entry.get().generation == ticket.generation => {
                // Insert before releasing the starting entry so a concurrent
                // cancel always finds the request in one of the two tables.
                let replaced = self.streams.insert(ticket.request_id.clone(), stream);
                entry.remove();
                Ok(replaced)
            }
            _ => Err(stream),
        }
    }

    /// Drop the ticket's starting entry if it is still there.
    pub fn end_start(&self, ticket: &StartTicket) {
        self.starting
            .remove_if(&ticket.request_id, |_, starting| {
                starting.generation == ticket.generation
            });
    }

    /// Cancel a request that is still starting. Returns whether one was.
    pub fn abort_start(&self, request_id: &str) -> bool {
        match self.starting.remove(request_id) {
            Some((_, starting)) => {
                starting.token.cancel();
                true
            }
            None => false,
        }
    }


    /// Caller sender for `request_id`, if that request still belongs to
    /// `worker`.
    pub fn caller_for(&self, request_id: &str, worker: PortId) -> Option<PortSender<CallerEvent>> {
        self.streams
            .get(request_id)
            .filter(|entry| entry.worker_id() == worker)
            .map(|entry| entry.caller.clone())
    }

    pub fn remove(&self, request_id: &str) -> Option<ActiveStream> {
        self.streams.remove(request_id).map(|(_, stream)| stream)
    }

    /// Remove `request_id` only if it is still served by `worker`.
    pub fn remove_for_worker(&self, request_id: &str, worker: PortId) -> Option<ActiveStream> {
        self.streams
            .remove_if(request_id, |_, stream| stream.worker_id() == worker)
            .map(|(_, stream)| stream)
    }

    /// Starting and active request ids issued through `caller`.
    pub fn owned_by(&self, caller: PortId) -> Vec<RequestId> {
        let mut owned: Vec<RequestId> = self
            .starting
            .iter()
            .filter(|entry| entry.caller == caller)
            .map(|entry| entry.key().clone())
            .collect();
        owned.extend(
            self.streams
                .iter()
                .filter(|entry| entry.caller_id() == caller)
                .map(|entry| entry.key().clone()),
        );
        owned.sort();
        owned.dedup();
        owned
    }

    /// Every starting and active request id.
    pub fn request_ids(&self) -> Vec<RequestId> {
        let mut ids: Vec<RequestId> = self
            .starting
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.extend(self.streams.iter().map(|entry| entry.key().clone()));
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.streams.contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidekick_protocols::{port_pair, CallerMessage, WorkerEvent};

    fn register(
        streams: &ActiveStreams,
        request_id: &str,
        stream: ActiveStream,
    ) -> Option<ActiveStream> {
        let ticket = streams.begin(request_id.to_string(), stream.caller_id());
        streams.activate(&ticket, stream).ok().flatten()
    }

    fn stream() -> ActiveStream {
        let (_ui, caller) = port_pair::<CallerMessage, CallerEvent>("sidebar");
        let (worker, _host) = port_pair::<WorkerCommand, WorkerEvent>("ai-chat-stream");
        ActiveStream {
            caller: caller.sender,
            worker: worker.sender,
        }
    }

    #[test]
    fn test_register_and_remove() {
        let streams = ActiveStreams::new();
        assert!(register(&streams, "r1", stream()).is_none());
        assert!(streams.contains("r1"));

        assert!(streams.remove("r1").is_some());
        assert!(streams.remove("r1").is_none());
        assert!(streams.is_empty());
    }

    #[test]
    fn test_remove_for_worker_ignores_replaced_stream() {
        let streams = ActiveStreams::new();
        let first = stream();
        let first_worker = first.worker_id();
        register(&streams, "r1", first);
        let replaced = register(&streams, "r1", stream());
        assert!(replaced.is_some());

        assert!(streams.caller_for("r1", first_worker).is_none());
        assert!(streams.remove_for_worker("r1", first_worker).is_none());
        assert_eq!(streams.len(), 1);
    }

    #[test]
    fn test_owned_by_filters_by_caller() {
        let streams = ActiveStreams::new();
        let mine = stream();
        let caller = mine.caller_id();
        register(&streams, "a", mine.clone());
        let shared_caller = ActiveStream {
            caller: mine.caller.clone(),
            worker: stream().worker,
        };
        register(&streams, "b", shared_caller);
        register(&streams, "c", stream());

        let mut owned = streams.owned_by(caller);
        owned.sort();
        assert_eq!(owned, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_abort_start_prevents_activation() {
        let streams = ActiveStreams::new();
        let s = stream();
        let ticket = streams.begin("r1".to_string(), s.caller_id());
        assert_eq!(streams.owned_by(s.caller_id()), vec!["r1".to_string()]);

        assert!(streams.abort_start("r1"));
        assert!(ticket.is_cancelled());
        assert!(streams.activate(&ticket, s).is_err());
        assert!(streams.is_empty());
        assert!(streams.request_ids().is_empty());
        assert!(!streams.abort_start("r1"));
    }

    #[test]
    fn test_activate_moves_request_to_active() {
        let streams = ActiveStreams::new();
        let s = stream();
        let ticket = streams.begin("r1".to_string(), s.caller_id());

        assert!(matches!(streams.activate(&ticket, s), Ok(None)));
        assert!(streams.contains("r1"));
        assert!(!streams.abort_start("r1"));
        assert!(!ticket.is_cancelled());
    }

    #[test]
    fn test_reissued_request_supersedes_starting_one() {
        let streams = ActiveStreams::new();
        let s = stream();
        let first = streams.begin("r1".to_string(), s.caller_id());
        let second = streams.begin("r1".to_string(), s.caller_id());

        assert!(first.is_cancelled());
        streams.end_start(&first);
        assert_eq!(streams.request_ids(), vec!["r1".to_string()]);
        assert!(streams.activate(&first, s.clone()).is_err());
        assert!(streams.activate(&second, s).is_ok());
        assert_eq!(streams.request_ids(), vec!["r1".to_string()]);
    }
}
