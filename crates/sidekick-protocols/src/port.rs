//! Duplex ports.
//!
//! A port is a persistent bidirectional connection between two execution
//! contexts (caller ⇄ coordinator, coordinator ⇄ host). Each end owns a
//! [`PortSender`] for outgoing messages and a [`PortReceiver`] for incoming
//! ones. Both ends share one disconnect signal: once either side disconnects
//! (or drops its receiver) every later send fails and both receivers drain
//! whatever was already queued before yielding `None`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ChannelError;

#[cfg(test)]
#[path = "port_tests.rs"]
mod tests;

/// Identity of one end of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortId(Uuid);

impl PortId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PortId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sending half of a port end. Cheap to clone.
pub struct PortSender<T> {
    id: PortId,
    name: Arc<str>,
    tx: mpsc::UnboundedSender<T>,
    closed: CancellationToken,
}

impl<T> Clone for PortSender<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            tx: self.tx.clone(),
            closed: self.closed.clone(),
        }
    }
}

impl<T> fmt::Debug for PortSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortSender")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl<T> PortSender<T> {
    /// Identity of the port end this sender belongs to.
    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Post a message to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Disconnected`] if the port was disconnected by
    /// either side or the peer stopped receiving.
    pub fn send(&self, message: T) -> Result<(), ChannelError> {
        if self.closed.is_cancelled() {
            return Err(ChannelError::Disconnected);
        }
        self.tx.send(message).map_err(|_| ChannelError::Disconnected)
    }

    /// Tear the connection down for both sides. Idempotent.
    pub fn disconnect(&self) {
        self.closed.cancel();
    }

    pub fn is_connected(&self) -> bool {
        !self.closed.is_cancelled() && !self.tx.is_closed()
    }

    /// Resolves once the port has been disconnected by either side.
    pub async fn closed(&self) {
        tokio::select! {
            _ = self.closed.cancelled() => {}
            _ = self.tx.closed() => {}
        }
    }
}

/// Receiving half of a port end.
pub struct PortReceiver<T> {
    id: PortId,
    rx: mpsc::UnboundedReceiver<T>,
    closed: CancellationToken,
}

impl<T> PortReceiver<T> {
    pub fn id(&self) -> PortId {
        self.id
    }

    /// Receive the next message, or `None` once the port is disconnected and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        if self.closed.is_cancelled() {
            return self.rx.try_recv().ok();
        }
        tokio::select! {
            biased;
            message = self.rx.recv() => message,
            _ = self.closed.cancelled() => self.rx.try_recv().ok(),
        }
    }
}

impl<T> Drop for PortReceiver<T> {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

/// One end of a duplex port: receives `In`, sends `Out`.
pub struct Port<In, Out> {
    pub sender: PortSender<Out>,
    pub receiver: PortReceiver<In>,
}

impl<In, Out> Port<In, Out> {
    pub fn id(&self) -> PortId {
        self.sender.id
    }

    pub fn send(&self, message: Out) -> Result<(), ChannelError> {
        self.sender.send(message)
    }

    pub async fn recv(&mut self) -> Option<In> {
        self.receiver.recv().await
    }

    pub fn disconnect(&self) {
        self.sender.disconnect();
    }

    pub fn split(self) -> (PortSender<Out>, PortReceiver<In>) {
        (self.sender, self.receiver)
    }
}

/// Create a connected pair of port ends.
///
/// The first end sends `A` and receives `B`; the second end sends `B` and
/// receives `A`.
pub fn port_pair<A, B>(name: &str) -> (Port<B, A>, Port<A, B>) {
    let closed = CancellationToken::new();
    let name: Arc<str> = Arc::from(name);
    let (a_tx, a_rx) = mpsc::unbounded_channel::<A>();
    let (b_tx, b_rx) = mpsc::unbounded_channel::<B>();
    let left_id = PortId::new();
    let right_id = PortId::new();

    let left = Port {
        sender: PortSender {
            id: left_id,
            name: name.clone(),
            tx: a_tx,
            closed: closed.clone(),
        },
        receiver: PortReceiver {
            id: left_id,
            rx: b_rx,
            closed: closed.clone(),
        },
    };
    let right = Port {
        sender: PortSender {
            id: right_id,
            name,
            tx: b_tx,
            closed: closed.clone(),
        },
        receiver: PortReceiver {
            id: right_id,
            rx: a_rx,
            closed,
        },
    };
    (left, right)
}
