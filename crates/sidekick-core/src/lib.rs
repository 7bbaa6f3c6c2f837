//! # Sidekick Core
//!
//! Coordinator side of the assistant: owns the host lifecycle and routes
//! caller requests to it.
//!
//! ## Components
//!
//! - [`Coordinator`] - Per-caller message loop, chat stream relay, tab
//!   listing, quote broadcast and action delegation
//! - [`HostManager`] - Single-flight creation, health checking and expiry of
//!   the host
//! - [`ActiveStreams`] - Request id to caller/worker bookkeeping
//! - [`PendingQuotes`] - Quotes waiting for a recipient

pub mod context;
pub mod coordinator;
pub mod error;
pub mod host_manager;
pub mod quotes;
pub mod streams;

pub use context::{collect_mention_contexts, is_mentionable, mentionable_tabs, truncate_context};
pub use coordinator::{CallerPort, Coordinator, QuoteDelivery, WORKER_PORT_NAME};
pub use error::ChatError;
pub use host_manager::HostManager;
pub use quotes::{new_quote, PendingQuotes};
pub use streams::{ActiveStream, ActiveStreams, StartTicket};
