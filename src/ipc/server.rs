//! Async Unix socket IPC server for daemon control.

use crate::error::{Result, StorycastError};
use crate::ipc::protocol::{Command, Response};
use crate::pipeline::BroadcastView;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

/// How often the accept loop rechecks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Handler trait for processing IPC commands.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle a command and return a response.
    async fn handle(&self, command: Command) -> Response;

    /// View updates streamed to `follow` clients; `None` if unsupported.
    fn follow(&self) -> Option<watch::Receiver<BroadcastView>> {
        None
    }
}

/// IPC server for handling daemon control commands via Unix socket.
pub struct IpcServer {
    socket_path: PathBuf,
    shutdown: AtomicBool,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Get the default socket path based on XDG_RUNTIME_DIR or fallback.
    pub fn default_socket_path() -> PathBuf {
        if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
            PathBuf::from(xdg_runtime).join("storycast.sock")
        } else {
            // SAFETY: getuid has no preconditions and cannot fail
            let uid = unsafe { libc::getuid() };
            PathBuf::from(format!("/tmp/storycast-{uid}.sock"))
        }
    }

    /// Bind the socket and serve connections until [`stop`](Self::stop).
    pub async fn start<H>(&self, handler: H) -> Result<()>
    where
        H: CommandHandler + 'static,
    {
        // A stale socket from a crashed daemon blocks bind
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| StorycastError::IpcSocket {
                message: format!("Failed to remove existing socket: {e}"),
            })?;
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| StorycastError::IpcSocket {
                message: format!("Failed to bind to socket: {e}"),
            })?;
        tracing::debug!(path = %self.socket_path.display(), "IPC server listening");

        let handler = Arc::new(handler);

        while !self.shutdown.load(Ordering::SeqCst) {
            match tokio::time::timeout(ACCEPT_POLL, listener.accept()).await {
                Ok(Ok((stream, _))) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, handler).await {
                            tracing::warn!(error = %e, "error handling IPC client");
                        }
                    });
                }
                Ok(Err(e)) => {
                    return Err(StorycastError::IpcConnection {
                        message: format!("Failed to accept connection: {e}"),
                    });
                }
                Err(_) => continue,
            }
        }

        Ok(())
    }

    /// Stop accepting connections and remove the socket file.
    pub fn stop(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| StorycastError::IpcSocket {
                message: format!("Failed to remove socket file: {e}"),
            })?;
        }

        Ok(())
    }
}

/// Write one response as a JSON line.
async fn write_response<W>(writer: &mut W, response: &Response) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = response.to_json().map_err(|e| StorycastError::IpcProtocol {
        message: format!("Failed to serialize response: {e}"),
    })?;
    line.push('\n');

    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| StorycastError::IpcConnection {
            message: format!("Failed to write to client: {e}"),
        })?;
    writer
        .flush()
        .await
        .map_err(|e| StorycastError::IpcConnection {
            message: format!("Failed to flush writer: {e}"),
        })
}

/// Handle a client connection: one command per line until EOF.
///
/// A malformed line gets an error response and the connection stays open.
/// `follow` hands the rest of the connection to the view stream.
async fn handle_client<H>(stream: UnixStream, handler: Arc<H>) -> Result<()>
where
    H: CommandHandler,
{
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| StorycastError::IpcConnection {
                message: format!("Failed to read from client: {e}"),
            })?;
        if read == 0 {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }

        let command = match Command::from_json(line.trim()) {
            Ok(command) => command,
            Err(e) => {
                let response = Response::error(format!("Invalid command: {e}"));
                write_response(&mut writer, &response).await?;
                continue;
            }
        };
        tracing::debug!(?command, "IPC command received");

        if command == Command::Follow
            && let Some(updates) = handler.follow()
        {
            return stream_views(&mut writer, updates).await;
        }

        let response = handler.handle(command).await;
        write_response(&mut writer, &response).await?;
    }
}

/// Send the current view, then one line per change, until either side goes away.
async fn stream_views<W>(
    writer: &mut W,
    mut updates: watch::Receiver<BroadcastView>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let view = updates.borrow_and_update().clone();
        if let Err(e) = write_response(writer, &Response::View { view }).await {
            tracing::debug!(error = %e, "follow client disconnected");
            return Ok(());
        }
        if updates.changed().await.is_err() {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Status;
    use tempfile::TempDir;

    struct MockCommandHandler {
        views: Arc<watch::Sender<BroadcastView>>,
    }

    impl MockCommandHandler {
        fn new() -> Self {
            let (views, _) = watch::channel(BroadcastView::default());
            Self {
                views: Arc::new(views),
            }
        }
    }

    #[async_trait::async_trait]
    impl CommandHandler for MockCommandHandler {
        async fn handle(&self, command: Command) -> Response {
            match command {
                Command::Start { topic } => Response::ok(format!("Broadcasting {topic}")),
                Command::Stop => Response::error("Nothing is live"),
                Command::Status => Response::Status {
                    view: BroadcastView::default(),
                    version: "test".to_string(),
                },
                Command::Follow | Command::Shutdown => Response::ok("ok"),
            }
        }

        fn follow(&self) -> Option<watch::Receiver<BroadcastView>> {
            Some(self.views.subscribe())
        }
    }

    async fn spawn_server(
        dir: &TempDir,
        handler: MockCommandHandler,
    ) -> (Arc<IpcServer>, PathBuf) {
        let socket_path = dir.path().join("test.sock");
        let server = Arc::new(IpcServer::new(socket_path.clone()));
        let running = Arc::clone(&server);
        tokio::spawn(async move { running.start(handler).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        (server, socket_path)
    }

    async fn roundtrip(socket_path: &Path, request: &str) -> String {
        let stream = UnixStream::connect(socket_path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(request.as_bytes()).await.unwrap();
        writer.write_all(b"\n").await.unwrap();
        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).await.unwrap();
        line
    }

    #[test]
    fn test_default_socket_path_returns_valid_path() {
        let path = IpcServer::default_socket_path();
        let path_str = path.to_string_lossy();
        if let Ok(xdg_dir) = std::env::var("XDG_RUNTIME_DIR") {
            assert_eq!(path, PathBuf::from(xdg_dir).join("storycast.sock"));
        } else {
            let uid = unsafe { libc::getuid() };
            assert_eq!(path_str, format!("/tmp/storycast-{uid}.sock"));
        }
    }

    #[tokio::test]
    async fn test_server_answers_start() {
        let dir = TempDir::new().unwrap();
        let (server, socket_path) = spawn_server(&dir, MockCommandHandler::new()).await;

        let line = roundtrip(&socket_path, r#"{"type":"start","topic":"Rome"}"#).await;
        let response = Response::from_json(line.trim()).unwrap();
        assert_eq!(response, Response::ok("Broadcasting Rome"));

        server.stop().unwrap();
    }

    #[tokio::test]
    async fn test_invalid_command_gets_error_response() {
        let dir = TempDir::new().unwrap();
        let (server, socket_path) = spawn_server(&dir, MockCommandHandler::new()).await;

        let line = roundtrip(&socket_path, "garbage").await;
        match Response::from_json(line.trim()).unwrap() {
            Response::Error { message } => assert!(message.starts_with("Invalid command")),
            other => panic!("Expected Error response, got: {other:?}"),
        }

        server.stop().unwrap();
    }

    #[tokio::test]
    async fn test_connection_survives_invalid_command() {
        let dir = TempDir::new().unwrap();
        let (server, socket_path) = spawn_server(&dir, MockCommandHandler::new()).await;

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer.write_all(b"not json\n").await.unwrap();
        let first = Response::from_json(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert!(matches!(first, Response::Error { .. }));

        writer.write_all(b"{\"type\":\"status\"}\n").await.unwrap();
        let second = Response::from_json(&lines.next_line().await.unwrap().unwrap()).unwrap();
        match second {
            Response::Status { version, .. } => assert_eq!(version, "test"),
            other => panic!("Expected Status response, got: {other:?}"),
        }

        server.stop().unwrap();
    }

    #[tokio::test]
    async fn test_follow_streams_updates() {
        let dir = TempDir::new().unwrap();
        let handler = MockCommandHandler::new();
        let views = Arc::clone(&handler.views);
        let (server, socket_path) = spawn_server(&dir, handler).await;

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"{\"type\":\"follow\"}\n").await.unwrap();
        let mut lines = BufReader::new(reader).lines();

        let first = Response::from_json(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert!(matches!(first, Response::View { ref view } if view.status == Status::Ready));

        views.send_modify(|view| view.status = Status::InProgress);
        let second = Response::from_json(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert!(matches!(second, Response::View { ref view } if view.status == Status::InProgress));

        server.stop().unwrap();
    }

    #[tokio::test]
    async fn test_stop_removes_socket_file() {
        let dir = TempDir::new().unwrap();
        let (server, socket_path) = spawn_server(&dir, MockCommandHandler::new()).await;
        assert!(socket_path.exists());

        server.stop().unwrap();
        assert!(!socket_path.exists());
    }
}
