//! Hidden DOM host protocol.
//!
//! The coordinator cannot run capability calls itself; it drives a hidden,
//! DOM-enabled host through this interface. Local state about the host is
//! never authoritative: [`HostController::has_host`] is the probe.

use async_trait::async_trait;

use crate::error::HostError;
use crate::messages::{HostRequest, HostResponse, WorkerCommand, WorkerEvent};
use crate::port::Port;

/// Coordinator end of a per-request worker port.
pub type WorkerPort = Port<WorkerEvent, WorkerCommand>;

/// Host end of a per-request worker port.
pub type HostPort = Port<WorkerCommand, WorkerEvent>;

#[async_trait]
pub trait HostController: Send + Sync {
    /// Probe whether a host currently exists.
    async fn has_host(&self) -> Result<bool, HostError>;

    /// Create the host. Fails if one already exists.
    async fn create_host(&self) -> Result<(), HostError>;

    /// Close the host if it exists.
    async fn close_host(&self) -> Result<(), HostError>;

    /// One-shot request/response call into the host.
    async fn request(&self, request: HostRequest) -> Result<HostResponse, HostError>;

    /// Open a dedicated duplex port to the host.
    async fn connect(&self, name: &str) -> Result<WorkerPort, HostError>;
}
