//! Error types for the Sidekick protocol layer.

mod capability;
mod channel;
mod code;
mod host;
mod source;

pub use capability::*;
pub use channel::*;
pub use code::*;
pub use host::*;
pub use source::*;
