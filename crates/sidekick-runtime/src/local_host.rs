//! In-process [`HostController`].
//!
//! Stands in for the hidden DOM document: "creating" the host starts a
//! shutdown scope for its worker ports, closing it tears every port down and
//! drops the cached session.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use sidekick_config::Config;
use sidekick_protocols::{
    port_pair, CapabilityProvider, HostController, HostError, HostRequest, HostResponse,
    SettingsStore, WorkerCommand, WorkerEvent, WorkerPort,
};

use crate::actions::ActionRunner;
use crate::executor::ChatExecutor;

struct HostInstance {
    shutdown: CancellationToken,
}

/// Host controller that runs the chat executor and actions in this process.
pub struct LocalHostController {
    executor: Arc<ChatExecutor>,
    actions: ActionRunner,
    startup_delay: Duration,
    instance: Mutex<Option<HostInstance>>,
    creates: AtomicUsize,
    closes: AtomicUsize,
}

impl LocalHostController {
    pub fn new(executor: Arc<ChatExecutor>, actions: ActionRunner) -> Self {
        Self {
            executor,
            actions,
            startup_delay: Duration::ZERO,
            instance: Mutex::new(None),
            creates: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn from_config(
        provider: Arc<dyn CapabilityProvider>,
        settings: Arc<dyn SettingsStore>,
        config: &Config,
    ) -> Self {
        let executor = ChatExecutor::from_config(provider.clone(), settings.clone(), config);
        let actions = ActionRunner::new(provider, settings, &config.session);
        Self::new(Arc::new(executor), actions)
    }

    /// Simulated document load time applied to every `create_host`.
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    pub fn executor(&self) -> &Arc<ChatExecutor> {
        &self.executor
    }

    /// Number of successful `create_host` calls.
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of `close_host` calls that closed a running host.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn shutdown_token(&self) -> Result<CancellationToken, HostError> {
        self.instance
            .lock()
            .as_ref()
            .map(|instance| instance.shutdown.clone())
            .ok_or(HostError::NotRunning)
    }
}

#[async_trait]
impl HostController for LocalHostController {
    async fn has_host(&self) -> Result<bool, HostError> {
        Ok(self.instance.lock().is_some())
    }

    async fn create_host(&self) -> Result<(), HostError> {
        if self.instance.lock().is_some() {
            return Err(HostError::CreationFailed(
                "Only a single host document may exist".to_string(),
            ));
        }

        if !self.startup_delay.is_zero() {
            tokio::time::sleep(self.startup_delay).await;
        }

        let mut instance = self.instance.lock();
        if instance.is_some() {
            return Err(HostError::CreationFailed(
                "Only a single host document may exist".to_string(),
            ));
        }
        *instance = Some(HostInstance {
            shutdown: CancellationToken::new(),
        });
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        info!(creates = n, "Local host created");
        Ok(())
    }

    async fn close_host(&self) -> Result<(), HostError> {
        let instance = self.instance.lock().take();
        if let Some(instance) = instance {
            instance.shutdown.cancel();
            self.executor.cache().invalidate();
            self.closes.fetch_add(1, Ordering::SeqCst);
            info!("Local host closed");
        }
        Ok(())
    }

    async fn request(&self, request: HostRequest) -> Result<HostResponse, HostError> {
        self.shutdown_token()?;
        match request {
            HostRequest::HealthCheck { test_id } => {
                debug!(test_id = %test_id, "Health check");
                Ok(HostResponse::Pong { test_id })
            }
            HostRequest::Run {
                kind,
                text,
                options,
            } => Ok(HostResponse::ActionResult(
                self.actions.run(kind, &text, &options).await,
            )),
        }
    }

    async fn connect(&self, name: &str) -> Result<WorkerPort, HostError> {
        let shutdown = self.shutdown_token()?;
        let (coordinator, host) = port_pair::<WorkerCommand, WorkerEvent>(name);
        tokio::spawn(self.executor.clone().handle_port(host, shutdown));
        debug!(port = name, "Worker port connected");
        Ok(coordinator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettingsStore;
    use crate::test_support::{MockProvider, SessionMode};
    use sidekick_protocols::{AiAction, ActionOptions, HostChatPayload};

    fn controller(provider: Arc<MockProvider>) -> LocalHostController {
        LocalHostController::from_config(
            provider,
            Arc::new(MemorySettingsStore::default()),
            &Config::default(),
        )
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let host = controller(MockProvider::arc(SessionMode::Text, "ok"));
        assert!(!host.has_host().await.unwrap());

        host.create_host().await.unwrap();
        assert!(host.has_host().await.unwrap());
        assert!(matches!(
            host.create_host().await,
            Err(HostError::CreationFailed(_))
        ));

        host.close_host().await.unwrap();
        host.close_host().await.unwrap();
        assert!(!host.has_host().await.unwrap());
        assert_eq!(host.creates(), 1);
        assert_eq!(host.closes(), 1);
    }

    #[tokio::test]
    async fn test_requests_need_running_host() {
        let host = controller(MockProvider::arc(SessionMode::Text, "ok"));
        let request = HostRequest::HealthCheck {
            test_id: "health-check-1".to_string(),
        };
        assert_eq!(
            host.request(request.clone()).await,
            Err(HostError::NotRunning)
        );
        assert!(matches!(
            host.connect("ai-chat-stream").await,
            Err(HostError::NotRunning)
        ));

        host.create_host().await.unwrap();
        assert_eq!(
            host.request(request).await.unwrap(),
            HostResponse::Pong {
                test_id: "health-check-1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_run_action() {
        let host = controller(MockProvider::arc(SessionMode::Text, "Cleaner."));
        host.create_host().await.unwrap();

        let response = host
            .request(HostRequest::Run {
                kind: AiAction::Rewrite,
                text: "messy".to_string(),
                options: ActionOptions::default(),
            })
            .await
            .unwrap();

        match response {
            HostResponse::ActionResult(result) => {
                assert!(result.success);
                assert_eq!(result.result.as_deref(), Some("Cleaner."));
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_disconnects_ports_and_drops_session() {
        let provider = MockProvider::arc(SessionMode::Hang, "unused");
        let host = controller(provider.clone());
        host.create_host().await.unwrap();

        let mut port = host.connect("ai-chat-stream").await.unwrap();
        port.send(WorkerCommand::Start {
            request_id: "r1".to_string(),
            payload: HostChatPayload {
                message: "hi".to_string(),
                system_prompt: "s".to_string(),
                ..HostChatPayload::default()
            },
        })
        .unwrap();

        // Wait until the turn holds a session.
        while provider.creates() == 0 {
            tokio::task::yield_now().await;
        }
        host.close_host().await.unwrap();

        assert_eq!(port.recv().await, None);
        assert!(host.executor().cache().cached_id().is_none());
        assert!(provider.log().contains(&"release:session-1".to_string()));
    }
}
