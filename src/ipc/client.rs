//! IPC client for sending commands to the daemon.

use crate::error::{Result, StorycastError};
use crate::ipc::protocol::{Command, Response};
use crate::pipeline::BroadcastView;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::net::unix::OwnedReadHalf;

type ResponseLines = Lines<BufReader<OwnedReadHalf>>;

/// Connect and send one command line, returning the response line reader.
async fn connect(socket_path: &Path, command: &Command) -> Result<ResponseLines> {
    let stream =
        UnixStream::connect(socket_path)
            .await
            .map_err(|e| StorycastError::IpcConnection {
                message: format!("Failed to connect to daemon: {e}"),
            })?;

    let (reader, mut writer) = stream.into_split();

    let mut command_json = command.to_json().map_err(|e| StorycastError::IpcProtocol {
        message: format!("Failed to serialize command: {e}"),
    })?;
    command_json.push('\n');

    writer
        .write_all(command_json.as_bytes())
        .await
        .map_err(|e| StorycastError::IpcConnection {
            message: format!("Failed to write command: {e}"),
        })?;
    writer
        .flush()
        .await
        .map_err(|e| StorycastError::IpcConnection {
            message: format!("Failed to flush writer: {e}"),
        })?;

    Ok(BufReader::new(reader).lines())
}

/// Read the next response line; `None` when the daemon closed the connection.
async fn next_response(lines: &mut ResponseLines) -> Result<Option<Response>> {
    let line = lines
        .next_line()
        .await
        .map_err(|e| StorycastError::IpcConnection {
            message: format!("Failed to read response: {e}"),
        })?;

    line.map(|line| {
        Response::from_json(line.trim()).map_err(|e| StorycastError::IpcProtocol {
            message: format!("Failed to deserialize response: {e}"),
        })
    })
    .transpose()
}

/// Send a command to the daemon via Unix socket.
///
/// # Errors
/// Returns `StorycastError::IpcConnection` if connection fails
/// Returns `StorycastError::IpcProtocol` if serialization/deserialization fails
pub async fn send_command(socket_path: &Path, command: Command) -> Result<Response> {
    let mut lines = connect(socket_path, &command).await?;
    next_response(&mut lines)
        .await?
        .ok_or_else(|| StorycastError::IpcConnection {
            message: "Daemon closed the connection without responding".to_string(),
        })
}

/// Subscribe to view updates, calling `on_view` for each until the daemon
/// goes away or `on_view` returns `false`.
pub async fn follow<F>(socket_path: &Path, mut on_view: F) -> Result<()>
where
    F: FnMut(&BroadcastView) -> bool,
{
    let mut lines = connect(socket_path, &Command::Follow).await?;
    while let Some(response) = next_response(&mut lines).await? {
        match response {
            Response::View { view } => {
                if !on_view(&view) {
                    break;
                }
            }
            Response::Error { message } => return Err(StorycastError::IpcProtocol { message }),
            other => {
                return Err(StorycastError::IpcProtocol {
                    message: format!("Unexpected response to follow: {other:?}"),
                });
            }
        }
    }
    Ok(())
}
