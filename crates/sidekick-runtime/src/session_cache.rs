//! Conversational session cache.
//!
//! Holds at most one live [`SessionHandle`]. A session is reused while it is
//! younger than the configured max age and was created for the same system
//! prompt; anything else releases it and creates a replacement. Sessions are
//! never mutated in place.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use sidekick_config::SessionConfig;
use sidekick_protocols::{
    Availability, CapabilityError, CapabilityProvider, SessionHandle, SessionOptions,
};

use crate::language::resolve_output_language;

/// Create a conversational session, honouring download gating.
///
/// - `unavailable` fails with [`CapabilityError::ModelUnavailable`].
/// - `downloadable`/`downloading` without `force_download` fails with
///   [`CapabilityError::UserActivationRequired`].
/// - A creation that downloads is bounded by `download_timeout`.
pub async fn create_language_session(
    provider: &dyn CapabilityProvider,
    system_prompt: &str,
    desired_language: Option<&str>,
    force_download: bool,
    download_timeout: Duration,
) -> Result<SessionHandle, CapabilityError> {
    let availability = provider.model_availability().await?;
    if availability == Availability::Unavailable {
        return Err(CapabilityError::ModelUnavailable(
            "Language model is not available on this device".to_string(),
        ));
    }

    let needs_download = availability.needs_download();
    if needs_download && !force_download {
        return Err(CapabilityError::UserActivationRequired);
    }

    let download = force_download || needs_download;
    let options = SessionOptions {
        system_prompt: system_prompt.to_string(),
        output_language: resolve_output_language(desired_language).to_string(),
        download,
    };

    if download {
        timeout(download_timeout, provider.create_session(options))
            .await
            .map_err(|_| CapabilityError::DownloadTimeout(download_timeout.as_secs()))?
    } else {
        provider.create_session(options).await
    }
}

struct CachedSession {
    handle: SessionHandle,
    created_at: Instant,
    system_prompt: String,
}

/// Single-slot cache for the chat session.
pub struct SessionCache {
    provider: Arc<dyn CapabilityProvider>,
    max_age: Duration,
    download_timeout: Duration,
    slot: Mutex<Option<CachedSession>>,
    /// Serializes get-or-create so two requests never race to replace the slot.
    creation: tokio::sync::Mutex<()>,
    /// Held by a chat request for as long as it consumes the session.
    turn: tokio::sync::Mutex<()>,
}

impl SessionCache {
    pub fn new(
        provider: Arc<dyn CapabilityProvider>,
        max_age: Duration,
        download_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            max_age,
            download_timeout,
            slot: Mutex::new(None),
            creation: tokio::sync::Mutex::new(()),
            turn: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_config(provider: Arc<dyn CapabilityProvider>, config: &SessionConfig) -> Self {
        Self::new(provider, config.max_age(), config.download_timeout())
    }

    /// Wait for exclusive use of the cached session.
    pub async fn begin_turn(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.turn.lock().await
    }

    /// Return the cached session if still valid, otherwise release it and
    /// create a new one.
    ///
    /// `force` skips reuse and enables a resource download. A creation that
    /// fails with [`CapabilityError::UserActivationRequired`] is retried once
    /// with `force` set, unless it already was.
    pub async fn get_or_create(
        &self,
        system_prompt: &str,
        desired_language: Option<&str>,
        force: bool,
    ) -> Result<SessionHandle, CapabilityError> {
        let _creation = self.creation.lock().await;

        if !force {
            if let Some(handle) = self.valid_session(system_prompt) {
                debug!(session_id = handle.id(), "Reusing cached chat session");
                return Ok(handle);
            }
        }

        self.invalidate();
        info!(force, "Creating new chat session");

        let handle = match self.create(system_prompt, desired_language, force).await {
            Ok(handle) => handle,
            Err(CapabilityError::UserActivationRequired) if !force => {
                warn!("User activation required, retrying with forced download");
                self.create(system_prompt, desired_language, true).await?
            }
            Err(e) => return Err(e),
        };

        *self.slot.lock() = Some(CachedSession {
            handle: handle.clone(),
            created_at: Instant::now(),
            system_prompt: system_prompt.to_string(),
        });

        Ok(handle)
    }

    /// Release and forget the cached session, if any.
    pub fn invalidate(&self) {
        let cached = self.slot.lock().take();
        if let Some(cached) = cached {
            info!(
                session_id = cached.handle.id(),
                age_secs = cached.created_at.elapsed().as_secs(),
                "Releasing cached chat session"
            );
            cached.handle.release();
        }
    }

    /// Invalidate only if `handle` is the session currently cached.
    ///
    /// Returns whether the cache was cleared.
    pub fn invalidate_handle(&self, handle: &SessionHandle) -> bool {
        let cached = {
            let mut slot = self.slot.lock();
            match slot.as_ref() {
                Some(cached) if Arc::ptr_eq(&cached.handle, handle) => slot.take(),
                _ => None,
            }
        };
        match cached {
            Some(cached) => {
                warn!(session_id = cached.handle.id(), "Invalidating failed chat session");
                cached.handle.release();
                true
            }
            None => false,
        }
    }

    /// Id of the cached session, if any.
    pub fn cached_id(&self) -> Option<String> {
        self.slot
            .lock()
            .as_ref()
            .map(|cached| cached.handle.id().to_string())
    }

    fn valid_session(&self, system_prompt: &str) -> Option<SessionHandle> {
        let slot = self.slot.lock();
        let cached = slot.as_ref()?;
        let age = cached.created_at.elapsed();
        if age >= self.max_age {
            debug!(
                age_secs = age.as_secs(),
                max_age_secs = self.max_age.as_secs(),
                "Cached session expired"
            );
            return None;
        }
        if cached.system_prompt != system_prompt {
            debug!("System prompt changed, cached session superseded");
            return None;
        }
        Some(cached.handle.clone())
    }

    async fn create(
        &self,
        system_prompt: &str,
        desired_language: Option<&str>,
        force: bool,
    ) -> Result<SessionHandle, CapabilityError> {
        create_language_session(
            self.provider.as_ref(),
            system_prompt,
            desired_language,
            force,
            self.download_timeout,
        )
        .await
    }
}

impl Drop for SessionCache {
    fn drop(&mut self) {
        if let Some(cached) = self.slot.get_mut().take() {
            cached.handle.release();
        }
    }
}

#[cfg(test)]
#[path = "session_cache_tests.rs"]
mod tests;
