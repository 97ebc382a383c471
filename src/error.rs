//! Error types for storycast.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorycastError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Generation service errors
    #[error("Generation failed during {stage}: {message}")]
    Generation { stage: String, message: String },

    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    // Playback errors
    #[error("Audio decode failed: {message}")]
    Decode { message: String },

    #[error("Audio scheduling failed: {message}")]
    Scheduling { message: String },

    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl StorycastError {
    /// Shorthand for a generation failure in the given stage.
    pub fn generation(stage: &str, message: impl Into<String>) -> Self {
        Self::Generation {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    /// Errors the broadcast loop recovers from by pausing and retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Generation { .. }
                | Self::Synthesis { .. }
                | Self::Decode { .. }
                | Self::Scheduling { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StorycastError>;
