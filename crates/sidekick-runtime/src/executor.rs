//! Host-side chat handler.
//!
//! Owns the worker-port protocol: a `start` command launches one chat turn,
//! `cancel` (or the coordinator disconnecting) aborts it and closes the port.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sidekick_config::Config;
use sidekick_protocols::{
    CapabilityProvider, HostChatPayload, HostPort, SessionHandle, SettingsStore, WorkerCommand,
};

use crate::emitter::EventEmitter;
use crate::error::RelayError;
use crate::language::{language_instruction, normalize_language_code};
use crate::prompt::build_chat_prompt;
use crate::session_cache::SessionCache;
use crate::streaming::{RelayOptions, StreamRelay};

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;

/// Language decisions for one chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TurnLanguage {
    desired: Option<String>,
    needs_translation: bool,
    hint: String,
}

impl TurnLanguage {
    fn resolve(desired: Option<String>) -> Self {
        let needs_translation = normalize_language_code(desired.as_deref())
            .is_some_and(|target| target != "en");
        let hint = if needs_translation {
            language_instruction(Some("en"))
        } else {
            language_instruction(desired.as_deref())
        };
        Self {
            desired,
            needs_translation,
            hint,
        }
    }
}

pub struct ChatExecutor {
    cache: Arc<SessionCache>,
    relay: StreamRelay,
    settings: Arc<dyn SettingsStore>,
}

impl ChatExecutor {
    pub fn new(
        cache: Arc<SessionCache>,
        relay: StreamRelay,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            cache,
            relay,
            settings,
        }
    }

    pub fn from_config(
        provider: Arc<dyn CapabilityProvider>,
        settings: Arc<dyn SettingsStore>,
        config: &Config,
    ) -> Self {
        Self::new(
            Arc::new(SessionCache::from_config(provider.clone(), &config.session)),
            StreamRelay::from_config(provider, &config.session, &config.stream),
            settings,
        )
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    /// Serve one worker port until it closes, is cancelled, or `shutdown`
    /// fires. In-flight turns are aborted when the handler exits.
    pub async fn handle_port(self: Arc<Self>, port: HostPort, shutdown: CancellationToken) {
        let (sender, mut receiver) = port.split();
        let cancel = shutdown.child_token();

        loop {
            let command = tokio::select! {
                command = receiver.recv() => command,
                _ = cancel.cancelled() => {
                    debug!(port = sender.name(), "Host shutting down, closing worker port");
                    None
                }
            };
            let Some(command) = command else {
                break;
            };

            match command {
                WorkerCommand::Start {
                    request_id,
                    payload,
                } => {
                    info!(request_id = %request_id, "Chat stream started");
                    let executor = self.clone();
                    let emitter = EventEmitter::new(request_id, sender.clone());
                    let token = cancel.child_token();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = token.cancelled() => {
                                debug!(request_id = emitter.request_id(), "Chat turn aborted");
                            }
                            result = executor.execute(payload, &emitter) => {
                                report_failure(&emitter, result);
                            }
                        }
                    });
                }
                WorkerCommand::Cancel { request_id, reason } => {
                    info!(request_id = %request_id, reason = %reason, "Chat stream cancelled");
                    break;
                }
            }
        }

        debug!(port = sender.name(), "Worker port closed");
        cancel.cancel();
        sender.disconnect();
    }

    /// Run one chat turn, emitting `chunk*` and `done` through `emitter`.
    ///
    /// A failure before any chunk was delivered is retried once on a fresh
    /// session through the single-shot path. The returned error has not
    /// been reported to the coordinator yet.
    pub async fn execute(
        &self,
        payload: HostChatPayload,
        emitter: &EventEmitter,
    ) -> Result<String, RelayError> {
        let desired = match payload.response_language.as_deref().map(str::trim) {
            Some(language) if !language.is_empty() => Some(language.to_string()),
            _ => self.settings.get_string("responseLanguage").await,
        };
        let language = TurnLanguage::resolve(desired);
        let prompt = build_chat_prompt(&payload, &language.hint);
        let options = RelayOptions {
            needs_translation: language.needs_translation,
            desired_language: language.desired.clone(),
            skip_streaming: false,
        };

        let _turn = self.cache.begin_turn().await;
        let session = self
            .cache
            .get_or_create(
                &payload.system_prompt,
                language.desired.as_deref(),
                payload.force_download,
            )
            .await?;

        let error = match self
            .relay
            .stream_result(&session, &prompt, emitter, &options)
            .await
        {
            Ok(text) => {
                debug!(request_id = emitter.request_id(), chars = text.chars().count(), "Chat turn complete");
                return Ok(text);
            }
            Err(RelayError::ChannelClosed) => return Err(RelayError::ChannelClosed),
            Err(RelayError::Capability(e)) => e,
        };

        self.cache.invalidate_handle(&session);
        if emitter.chunks_sent() > 0 {
            return Err(error.into());
        }

        warn!(
            request_id = emitter.request_id(),
            "Chat turn failed, retrying on a fresh session: {}", error
        );
        self.retry(&payload, &language, &prompt, emitter).await
    }

    async fn retry(
        &self,
        payload: &HostChatPayload,
        language: &TurnLanguage,
        prompt: &str,
        emitter: &EventEmitter,
    ) -> Result<String, RelayError> {
        let session: SessionHandle = self
            .cache
            .get_or_create(&payload.system_prompt, language.desired.as_deref(), true)
            .await?;
        let options = RelayOptions {
            needs_translation: language.needs_translation,
            desired_language: language.desired.clone(),
            skip_streaming: true,
        };

        let result = self
            .relay
            .stream_result(&session, prompt, emitter, &options)
            .await;
        if matches!(result, Err(RelayError::Capability(_))) {
            self.cache.invalidate_handle(&session);
        }
        result
    }
}

/// Post the terminal error for a failed turn, if anyone is still listening.
fn report_failure(emitter: &EventEmitter, result: Result<String, RelayError>) {
    match result {
        Ok(_) => {}
        Err(RelayError::ChannelClosed) => {
            debug!(request_id = emitter.request_id(), "Coordinator went away mid-turn");
        }
        Err(e) => {
            warn!(request_id = emitter.request_id(), "Chat turn failed: {}", e);
            if emitter.error(e.code(), e.to_string()).is_err() {
                debug!(request_id = emitter.request_id(), "Could not report failure, port closed");
            }
        }
    }
}
