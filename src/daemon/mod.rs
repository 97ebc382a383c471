//! Daemon mode for storycast - owns the broadcast controller and IPC server.

pub mod handler;

use crate::app;
use crate::config::Config;
use crate::error::{Result, StorycastError};
use crate::ipc::server::IpcServer;
use crate::pipeline::PipelineController;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;

/// Daemon state: the controller plus a shutdown request flag.
pub struct DaemonState {
    pub controller: PipelineController,
    shutdown: Notify,
}

impl DaemonState {
    pub fn new(controller: PipelineController) -> Self {
        Self {
            controller,
            shutdown: Notify::new(),
        }
    }

    /// Ask the daemon to exit. Remembered if nobody is waiting yet.
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Resolves once a shutdown has been requested over IPC.
    pub async fn shutdown_requested(&self) {
        self.shutdown.notified().await;
    }
}

/// Run the daemon: build the controller, start IPC server, wait for shutdown.
///
/// # Returns
/// Ok(()) on graceful shutdown, error otherwise
pub async fn run_daemon(
    config: Config,
    socket_path: Option<PathBuf>,
    simulate: bool,
    quiet: bool,
) -> Result<()> {
    config.validate()?;

    let client = app::build_client(&config, simulate)?;
    let backend = app::build_backend(&config);
    tracing::info!(
        client = client.name(),
        backend = backend.name(),
        "daemon starting"
    );
    let state = Arc::new(DaemonState::new(app::build_controller(
        &config, client, backend,
    )));

    let socket_path = socket_path.unwrap_or_else(IpcServer::default_socket_path);
    let server = Arc::new(IpcServer::new(socket_path));

    if !quiet {
        eprintln!(
            "IPC server listening at: {}",
            server.socket_path().display()
        );
        eprintln!("Daemon ready.");
    }

    let handler = handler::DaemonCommandHandler::new(Arc::clone(&state));
    let server_clone = Arc::clone(&server);
    let server_handle = tokio::spawn(async move { server_clone.start(handler).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            if !quiet {
                eprintln!("\nReceived SIGINT, shutting down...");
            }
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                tracing::error!(error = %e, "signal handler setup failed");
            }
            if !quiet {
                eprintln!("\nReceived SIGTERM, shutting down...");
            }
        }
        () = state.shutdown_requested() => {
            if !quiet {
                eprintln!("Shutdown requested, shutting down...");
            }
        }
    }

    if let Some(task) = state.controller.stop()
        && let Err(e) = task.await
    {
        tracing::warn!(error = %e, "broadcast task ended abnormally");
    }

    server.stop()?;

    match server_handle.await {
        Ok(Err(e)) => tracing::error!(error = %e, "IPC server failed"),
        Err(e) => tracing::error!(error = %e, "IPC server task failed"),
        Ok(Ok(())) => {}
    }

    if !quiet {
        eprintln!("Daemon stopped.");
    }

    Ok(())
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| StorycastError::Other(format!("Failed to register SIGTERM handler: {e}")))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioTimeline, MockBackend};
    use crate::defaults;
    use crate::generation::MockGenerationClient;
    use crate::pipeline::PacingPolicy;
    use std::time::Duration;

    fn state() -> DaemonState {
        let timeline = AudioTimeline::new(Arc::new(MockBackend::new()), defaults::SAMPLE_RATE);
        DaemonState::new(PipelineController::new(
            Arc::new(MockGenerationClient::new()),
            timeline,
            PacingPolicy::default(),
        ))
    }

    #[tokio::test]
    async fn test_daemon_state_starts_idle() {
        let state = state();
        assert!(!state.controller.is_live());
    }

    #[tokio::test]
    async fn test_shutdown_request_before_wait_is_kept() {
        let state = state();
        state.request_shutdown();
        tokio::time::timeout(Duration::from_secs(1), state.shutdown_requested())
            .await
            .expect("shutdown request should be remembered");
    }

    #[tokio::test]
    async fn test_run_daemon_rejects_invalid_config() {
        let mut config = Config::default();
        config.pacing.cool_down_secs = 0;
        let result = run_daemon(config, None, true, true).await;
        assert!(matches!(
            result,
            Err(StorycastError::ConfigInvalidValue { .. })
        ));
    }
}
