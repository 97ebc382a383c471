//! Command-line interface for storycast
//!
//! Provides argument parsing using clap derive macros.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Endless narrated audio broadcasts
#[derive(Parser, Debug)]
#[command(name = "storycast", version, about = "Endless narrated audio broadcasts")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: progress, -vv: full diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to Unix socket (default: $XDG_RUNTIME_DIR/storycast.sock)
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,
}

/// Parse a duration string into seconds.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`) and compound (`1m30s`).
fn parse_duration_secs(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(secs);
    }
    humantime::parse_duration(s)
        .map(|d| d.as_secs())
        .map_err(|e| e.to_string())
}

/// Options shared by commands that run a broadcast in this process.
#[derive(Args, Debug, Clone, Default)]
pub struct BroadcastArgs {
    /// Use a scripted generation client (no API key or network needed)
    #[arg(long)]
    pub simulate: bool,

    /// Audio output device name
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Pause once the buffer is full (default: 20s). Examples: 45s, 1m
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_secs)]
    pub cool_down: Option<u64>,

    /// Pause after a failed step (default: 3s)
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_secs)]
    pub retry_delay: Option<u64>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Broadcast a topic in the foreground until Ctrl+C
    Play {
        /// Topic to narrate (e.g., "The Fall of Rome")
        topic: String,

        #[command(flatten)]
        broadcast: BroadcastArgs,

        /// Keep time without opening an audio device
        #[arg(long)]
        silent: bool,

        /// Print each narration script to stdout
        #[arg(long)]
        scripts: bool,
    },

    /// Start the daemon (foreground process for systemd)
    Daemon {
        #[command(flatten)]
        broadcast: BroadcastArgs,
    },

    /// Start broadcasting a topic via IPC
    Start {
        /// Topic to narrate
        topic: String,
    },

    /// Stop the live broadcast via IPC
    Stop,

    /// Get broadcast status via IPC
    Status,

    /// Follow broadcast status changes via IPC
    Follow,

    /// Shut the daemon down via IPC
    Shutdown,

    /// List available audio output devices
    Devices,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration inspection actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the configuration file path
    Path,
    /// Show the effective configuration (file + environment), API key masked
    Show,
}
