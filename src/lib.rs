//! storycast - Endless narrated audio broadcasts
//!
//! Plans a topic into chapters, researches and writes each one, synthesizes
//! speech and schedules it for gapless playback, pivoting to a new topic
//! whenever the current plan runs out.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod daemon;
pub mod defaults;
pub mod error;
pub mod generation;
pub mod ipc;
pub mod logging;
pub mod output;
pub mod pipeline;

// Composition root - needs everything
pub mod app;

// Core traits (generation → schedule → playback)
pub use audio::{AudioTimeline, PlaybackBackend};
pub use generation::GenerationClient;

// Controller
pub use pipeline::{BroadcastView, PipelineController, Stage, Status};

// Error handling
pub use error::{Result, StorycastError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
