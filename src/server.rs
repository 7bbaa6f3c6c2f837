//! Stdio harness: a JSON-lines caller channel in front of the coordinator.
//!
//! Each stdin line is either a caller message (`sendMessage`,
//! `cancelRequest`, `listTabs`) or a harness control line (`sendQuote`,
//! `runAction`). Caller events and control replies are written to stdout,
//! one JSON object per line. Logs go to stderr.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dashmap::DashSet;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use sidekick_config::{Config, LoggingConfig};
use sidekick_core::Coordinator;
use sidekick_protocols::{
    port_pair, ActionOptions, AiAction, CallerEvent, CallerMessage, QuoteSource, RequestId,
};
use sidekick_runtime::{EchoProvider, LocalHostController, MemorySettingsStore};

use crate::adapters::DetachedBrowser;

/// Initialize tracing with a stderr console layer and an optional daily file.
///
/// `RUST_LOG` overrides the configured level. The returned guard must be
/// held until exit so buffered file output is flushed.
pub(crate) fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let (file_layer, guard) = match &logging.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("sidekick")
                .filename_suffix("log")
                .max_log_files(30)
                .build(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = if logging.json {
                fmt::layer().json().with_writer(writer).boxed()
            } else {
                fmt::layer().with_writer(writer).with_ansi(false).boxed()
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

/// Harness-only commands that have no caller-port equivalent.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum ControlMessage {
    SendQuote {
        text: String,
        #[serde(default)]
        source: QuoteSource,
    },
    RunAction {
        request_id: RequestId,
        kind: AiAction,
        text: String,
        #[serde(default)]
        options: ActionOptions,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InboundLine {
    Caller(CallerMessage),
    Control(ControlMessage),
}

/// Serve stdin/stdout until stdin closes and outstanding requests finish, or
/// until interrupted.
pub(crate) async fn run_stdio(config: Config, word_delay: Duration) -> anyhow::Result<()> {
    info!("Starting Sidekick v{}", env!("CARGO_PKG_VERSION"));

    let provider = Arc::new(EchoProvider::new(word_delay));
    let settings = Arc::new(MemorySettingsStore::new(config.settings_with_defaults()));
    let host = Arc::new(LocalHostController::from_config(provider, settings, &config));
    let browser = Arc::new(DetachedBrowser);
    let coordinator = Coordinator::from_config(host, browser.clone(), browser, &config);

    let (ui, port) = port_pair::<CallerMessage, CallerEvent>("stdio");
    coordinator.connect_caller(port);
    let (ui_sender, mut ui_events) = ui.split();

    let pending: Arc<DashSet<RequestId>> = Arc::new(DashSet::new());
    let (out, out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_lines(out_rx));

    let forward = {
        let out = out.clone();
        let pending = pending.clone();
        tokio::spawn(async move {
            while let Some(event) = ui_events.recv().await {
                if event.is_terminal() {
                    if let Some(request_id) = event.request_id() {
                        pending.remove(request_id);
                    }
                }
                match serde_json::to_string(&event) {
                    Ok(line) => {
                        if out.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to encode caller event: {}", e),
                }
            }
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut interrupted = false;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("reading stdin")?,
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                None
            }
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<InboundLine>(line) {
            Ok(InboundLine::Caller(message)) => {
                match &message {
                    CallerMessage::SendMessage { request_id, .. } => {
                        pending.insert(request_id.clone());
                    }
                    CallerMessage::CancelRequest { request_id, .. } => {
                        pending.remove(request_id);
                    }
                    CallerMessage::ListTabs { .. } => {}
                }
                if ui_sender.send(message).is_err() {
                    warn!("Coordinator closed the caller port");
                    break;
                }
            }
            Ok(InboundLine::Control(control)) => {
                handle_control(&coordinator, control, &out, &pending);
            }
            Err(e) => {
                warn!("Ignoring malformed line: {}", e);
                let reply = json!({ "type": "protocolError", "error": e.to_string() });
                let _ = out.send(reply.to_string());
            }
        }
    }

    if interrupted {
        info!("Interrupted, shutting down");
    } else {
        debug!(pending = pending.len(), "Input closed, waiting for outstanding requests");
        let drained = async {
            while !pending.is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::select! {
            _ = drained => {}
            _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
        }
    }

    coordinator.shutdown().await;
    ui_sender.disconnect();
    let _ = forward.await;
    drop(out);
    writer.await?.context("writing stdout")?;
    Ok(())
}

fn handle_control(
    coordinator: &Coordinator,
    control: ControlMessage,
    out: &mpsc::UnboundedSender<String>,
    pending: &Arc<DashSet<RequestId>>,
) {
    match control {
        ControlMessage::SendQuote { text, source } => {
            let delivery = coordinator.send_quote(&text, source);
            debug!(?delivery, "Quote handled");
        }
        ControlMessage::RunAction {
            request_id,
            kind,
            text,
            options,
        } => {
            pending.insert(request_id.clone());
            let coordinator = coordinator.clone();
            let out = out.clone();
            let pending = pending.clone();
            tokio::spawn(async move {
                let result = coordinator.delegate_action(kind, &text, options).await;
                let reply = json!({
                    "type": "actionResult",
                    "requestId": request_id,
                    "result": result,
                });
                let _ = out.send(reply.to_string());
                pending.remove(&request_id);
            });
        }
    }
}

async fn write_lines(mut lines: mpsc::UnboundedReceiver<String>) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.recv().await {
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}
