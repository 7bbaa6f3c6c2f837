//! # Sidekick Protocols
//!
//! Protocol definitions shared by the coordinator and the DOM host.
//! Contains only interface definitions - no implementations.
//!
//! ## Core Pieces
//!
//! - [`Port`] - In-process duplex channel with shared disconnect semantics
//! - [`CallerMessage`] / [`CallerEvent`] - UI surface ⇄ coordinator messages
//! - [`WorkerCommand`] / [`WorkerEvent`] - coordinator ⇄ host streaming messages
//! - [`HostController`] - Lifecycle and messaging surface of the hidden host
//! - [`CapabilityProvider`] - On-device AI capabilities
//! - [`ContentSource`], [`TabDirectory`], [`SettingsStore`] - Browser collaborators

pub mod capability;
pub mod content;
pub mod error;
pub mod host;
pub mod messages;
pub mod port;
pub mod types;

pub use capability::{
    ByteStream, CapabilityProvider, FragmentStream, LanguageSession, SessionHandle, StreamOutput,
    StreamValue,
};
pub use content::{ContentSource, SettingsStore, TabDirectory};
pub use error::{CapabilityError, ChannelError, ErrorCode, HostError, SourceError};
pub use host::{HostController, HostPort, WorkerPort};
pub use messages::{
    ActionOptions, ActionResult, AiAction, CallerEvent, CallerMessage, HostRequest, HostResponse,
    RequestId, WorkerCommand, WorkerEvent,
};
pub use port::{port_pair, Port, PortId, PortReceiver, PortSender};
pub use types::*;
