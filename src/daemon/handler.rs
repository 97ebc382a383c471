//! Command handler implementation for the daemon.

use crate::daemon::DaemonState;
use crate::ipc::protocol::{Command, Response};
use crate::ipc::server::CommandHandler;
use crate::pipeline::BroadcastView;
use std::sync::Arc;
use tokio::sync::watch;

/// Command handler for daemon IPC commands.
pub struct DaemonCommandHandler {
    state: Arc<DaemonState>,
}

impl DaemonCommandHandler {
    pub fn new(state: Arc<DaemonState>) -> Self {
        Self { state }
    }

    fn start_broadcast(&self, topic: &str) -> Response {
        match self.state.controller.start(topic) {
            Ok(true) => Response::ok(format!("Broadcasting \"{}\"", topic.trim())),
            Ok(false) => {
                let live = self.state.controller.view().topic.unwrap_or_default();
                Response::ok(format!("Already broadcasting \"{live}\""))
            }
            Err(e) => Response::error(format!("Failed to start broadcast: {e}")),
        }
    }

    fn stop_broadcast(&self) -> Response {
        match self.state.controller.stop() {
            Some(_) => Response::ok("Broadcast stopped"),
            None => Response::error("Nothing is live"),
        }
    }
}

#[async_trait::async_trait]
impl CommandHandler for DaemonCommandHandler {
    async fn handle(&self, command: Command) -> Response {
        match command {
            Command::Start { topic } => self.start_broadcast(&topic),
            Command::Stop => self.stop_broadcast(),
            Command::Status => Response::Status {
                view: self.state.controller.view(),
                version: crate::version_string(),
            },
            Command::Follow => Response::error("follow is only available as a stream"),
            Command::Shutdown => {
                self.state.request_shutdown();
                Response::ok("Shutting down")
            }
        }
    }

    fn follow(&self) -> Option<watch::Receiver<BroadcastView>> {
        Some(self.state.controller.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioTimeline, MockBackend};
    use crate::defaults;
    use crate::generation::MockGenerationClient;
    use crate::pipeline::{PacingPolicy, PipelineController, Status};

    fn handler() -> (DaemonCommandHandler, Arc<DaemonState>) {
        let timeline =
            AudioTimeline::new(Arc::new(MockBackend::new()), defaults::SAMPLE_RATE);
        let controller = PipelineController::new(
            Arc::new(MockGenerationClient::new()),
            timeline,
            PacingPolicy::default(),
        );
        let state = Arc::new(DaemonState::new(controller));
        (DaemonCommandHandler::new(Arc::clone(&state)), state)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_then_status() {
        let (handler, _state) = handler();

        let response = handler
            .handle(Command::Start {
                topic: "The Fall of Rome".to_string(),
            })
            .await;
        assert_eq!(response, Response::ok("Broadcasting \"The Fall of Rome\""));

        match handler.handle(Command::Status).await {
            Response::Status { view, version } => {
                assert!(view.is_live);
                assert_eq!(view.topic.as_deref(), Some("The Fall of Rome"));
                assert_eq!(version, crate::version_string());
            }
            other => panic!("Expected Status response, got: {other:?}"),
        }

        handler.handle(Command::Stop).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_reports_live_topic() {
        let (handler, _state) = handler();
        handler
            .handle(Command::Start {
                topic: "Rome".to_string(),
            })
            .await;

        let response = handler
            .handle(Command::Start {
                topic: "Carthage".to_string(),
            })
            .await;
        assert_eq!(response, Response::ok("Already broadcasting \"Rome\""));

        handler.handle(Command::Stop).await;
    }

    #[tokio::test]
    async fn test_blank_topic_is_error() {
        let (handler, _state) = handler();
        let response = handler
            .handle(Command::Start {
                topic: " ".to_string(),
            })
            .await;
        assert!(matches!(response, Response::Error { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts() {
        let (handler, state) = handler();
        handler
            .handle(Command::Start {
                topic: "Rome".to_string(),
            })
            .await;

        assert_eq!(
            handler.handle(Command::Stop).await,
            Response::ok("Broadcast stopped")
        );
        assert_eq!(state.controller.status(), Status::Interrupted);
        assert_eq!(
            handler.handle(Command::Stop).await,
            Response::error("Nothing is live")
        );
    }

    #[tokio::test]
    async fn test_shutdown_notifies_daemon() {
        let (handler, state) = handler();
        let response = handler.handle(Command::Shutdown).await;
        assert_eq!(response, Response::ok("Shutting down"));
        state.shutdown_requested().await;
    }

    #[tokio::test]
    async fn test_follow_yields_receiver() {
        let (handler, _state) = handler();
        let updates = handler.follow().unwrap();
        assert_eq!(updates.borrow().status, Status::Ready);
    }
}
