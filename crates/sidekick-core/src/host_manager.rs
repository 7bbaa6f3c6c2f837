//! Hidden host lifecycle.
//!
//! [`HostManager::ensure_host`] makes sure exactly one healthy host exists.
//! Concurrent callers share a single in-flight ensure cycle, so a burst of
//! requests never issues more than one creation. A host older than the
//! configured max age, or one this process never recorded creating, is closed
//! and recreated; every fresh host must answer a tagged health check before
//! it is considered ready.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use sidekick_config::HostConfig;
use sidekick_protocols::{HostController, HostError, HostRequest, HostResponse};

#[cfg(test)]
#[path = "host_manager_tests.rs"]
mod tests;

type EnsureFuture = Shared<BoxFuture<'static, Result<(), HostError>>>;

#[derive(Default)]
struct HostState {
    created_at: Option<Instant>,
    in_flight: Option<EnsureFuture>,
}

struct HostManagerInner {
    controller: Arc<dyn HostController>,
    max_age: Duration,
    create_timeout: Duration,
    health_check_timeout: Duration,
    state: Mutex<HostState>,
}

/// Owns the hidden host on behalf of the coordinator. Cheap to clone.
#[derive(Clone)]
pub struct HostManager {
    inner: Arc<HostManagerInner>,
}

impl HostManager {
    pub fn new(
        controller: Arc<dyn HostController>,
        max_age: Duration,
        create_timeout: Duration,
        health_check_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(HostManagerInner {
                controller,
                max_age,
                create_timeout,
                health_check_timeout,
                state: Mutex::new(HostState::default()),
            }),
        }
    }

    pub fn from_config(controller: Arc<dyn HostController>, config: &HostConfig) -> Self {
        Self::new(
            controller,
            config.max_age(),
            config.create_timeout(),
            config.health_check_timeout(),
        )
    }

    pub fn controller(&self) -> &Arc<dyn HostController> {
        &self.inner.controller
    }

    /// Resolve once a healthy host is ready.
    ///
    /// Joins the cycle already in flight, if any.
    pub async fn ensure_host(&self) -> Result<(), HostError> {
        let cycle = {
            let mut state = self.inner.state.lock();
            match &state.in_flight {
                Some(cycle) => {
                    debug!("Joining in-flight host ensure");
                    cycle.clone()
                }
                None => {
                    let inner = self.inner.clone();
                    let cycle = async move {
                        let result = inner.run_cycle().await;
                        inner.state.lock().in_flight = None;
                        result
                    }
                    .boxed()
                    .shared();
                    state.in_flight = Some(cycle.clone());
                    cycle
                }
            }
        };
        cycle.await
    }

    /// Forget the recorded creation so the next ensure recreates the host.
    pub fn invalidate(&self) {
        self.inner.state.lock().created_at = None;
    }

    /// Age of the host this manager last created, if it is still recorded.
    pub fn host_age(&self) -> Option<Duration> {
        self.inner
            .state
            .lock()
            .created_at
            .map(|created_at| created_at.elapsed())
    }
}

impl HostManagerInner {
    fn is_stale(&self) -> bool {
        match self.state.lock().created_at {
            Some(created_at) => created_at.elapsed() > self.max_age,
            None => true,
        }
    }

    async fn run_cycle(&self) -> Result<(), HostError> {
        if self.is_stale() {
            if let Some(age) = self.state.lock().created_at.map(|t| t.elapsed()) {
                info!(age_secs = age.as_secs(), "Host expired, recreating");
            } else {
                debug!("No host recorded by this process, recreating");
            }
            if let Err(e) = self.controller.close_host().await {
                warn!("Failed to close existing host: {}", e);
            }
            self.state.lock().created_at = None;
        } else {
            match self.controller.has_host().await {
                Ok(true) => return Ok(()),
                Ok(false) => debug!("Recorded host is gone, recreating"),
                Err(e) => warn!("Host probe failed, recreating: {}", e),
            }
        }

        self.create().await?;
        self.state.lock().created_at = Some(Instant::now());

        if let Err(e) = self.health_check().await {
            self.state.lock().created_at = None;
            return Err(e);
        }

        info!("Host ready");
        Ok(())
    }

    async fn create(&self) -> Result<(), HostError> {
        let outcome = timeout(self.create_timeout, self.controller.create_host()).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(HostError::CreationTimeout(
                self.create_timeout.as_millis() as u64,
            )),
        };
        if let Err(e) = &result {
            warn!("Host creation failed: {}", e);
            self.state.lock().created_at = None;
        }
        result
    }

    async fn health_check(&self) -> Result<(), HostError> {
        let test_id = format!("health-check-{}", uuid::Uuid::new_v4());
        let request = HostRequest::HealthCheck {
            test_id: test_id.clone(),
        };

        let response = timeout(self.health_check_timeout, self.controller.request(request))
            .await
            .map_err(|_| {
                HostError::HealthCheckFailed(format!(
                    "no pong within {} ms",
                    self.health_check_timeout.as_millis()
                ))
            })?
            .map_err(|e| HostError::HealthCheckFailed(e.to_string()))?;

        match response {
            HostResponse::Pong { test_id: echoed } if echoed == test_id => {
                debug!(test_id = %test_id, "Health check passed");
                Ok(())
            }
            HostResponse::Pong { test_id: echoed } => {
                warn!(expected = %test_id, received = %echoed, "Health check pong mismatch");
                Err(HostError::HealthCheckFailed("pong mismatch".to_string()))
            }
            other => Err(HostError::HealthCheckFailed(format!(
                "unexpected response: {:?}",
                other
            ))),
        }
    }
}
