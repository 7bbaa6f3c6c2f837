//! # Sidekick Runtime
//!
//! Everything that runs inside the hidden DOM host: the single cached
//! conversational session, the streaming relay that turns capability output
//! into `chunk*` + terminal events, synthetic chunking, prompt assembly,
//! one-shot AI actions and an in-process [`LocalHostController`].

pub mod actions;
pub mod chunking;
pub mod echo;
pub mod emitter;
pub mod error;
pub mod executor;
pub mod language;
pub mod local_host;
pub mod prompt;
pub mod session_cache;
pub mod settings;
pub mod streaming;
mod templates;

#[cfg(test)]
mod test_support;

pub use actions::ActionRunner;
pub use chunking::{split_text_for_streaming, SyntheticChunker};
pub use echo::EchoProvider;
pub use emitter::EventEmitter;
pub use error::RelayError;
pub use executor::ChatExecutor;
pub use language::{
    ensure_result_language, is_chinese_language_code, language_instruction,
    normalize_language_code, resolve_output_language,
};
pub use local_host::LocalHostController;
pub use prompt::{build_chat_prompt, build_quote_section};
pub use session_cache::{create_language_session, SessionCache};
pub use settings::MemorySettingsStore;
pub use streaming::{RelayOptions, StreamRelay};
