//! Shared view rendering for terminal output.
//! Used by `storycast play`, `storycast follow` and `storycast status`.

use crate::pipeline::{BroadcastView, Status};
use std::io::{self, Write};

const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Width of the buffer bar in characters.
const BAR_WIDTH: usize = 20;

/// Clear the current terminal line (replaces the buffer bar)
pub fn clear_line() {
    eprint!("\r\x1b[2K");
}

/// Bar showing buffered seconds against the high-water mark.
///
/// Colored red while below `low_water`, green once at or above it.
pub fn format_buffer_bar(health: f64, low_water: f64, high_water: f64) -> String {
    let fraction = if high_water > 0.0 {
        (health / high_water).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled = (fraction * BAR_WIDTH as f64).round() as usize;
    let color = if health < low_water { RED } else { GREEN };
    format!(
        "{color}[{}{}]{RESET} {health:>5.1}s",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled)
    )
}

/// One-line summary of a view, as shown by `storycast status`.
pub fn describe_view(view: &BroadcastView) -> String {
    if !view.is_live {
        return view.status.to_string();
    }
    let topic = view.topic.as_deref().unwrap_or("(unknown topic)");
    let title = view
        .current_segment
        .as_ref()
        .map(|segment| format!(" | now: {}", segment.display_title))
        .unwrap_or_default();
    format!(
        "LIVE {topic} | {} | buffered {:.1}s{title}",
        view.status, view.buffer_health
    )
}

/// Something worth printing about a view change.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewChange {
    Status(Status),
    Segment { title: String, script: String },
}

/// Prints only what changed between successive views.
#[derive(Debug, Default)]
pub struct ViewRenderer {
    last_status: Option<Status>,
    last_title: Option<String>,
    show_scripts: bool,
}

impl ViewRenderer {
    pub fn new(show_scripts: bool) -> Self {
        Self {
            show_scripts,
            ..Default::default()
        }
    }

    /// Diff `view` against the last one seen.
    pub fn changes(&mut self, view: &BroadcastView) -> Vec<ViewChange> {
        let mut changes = Vec::new();

        if self.last_status.as_ref() != Some(&view.status) {
            self.last_status = Some(view.status.clone());
            changes.push(ViewChange::Status(view.status.clone()));
        }

        match &view.current_segment {
            Some(segment) if self.last_title.as_deref() != Some(segment.display_title.as_str()) => {
                self.last_title = Some(segment.display_title.clone());
                changes.push(ViewChange::Segment {
                    title: segment.display_title.clone(),
                    script: segment.script.clone(),
                });
            }
            Some(_) => {}
            None => self.last_title = None,
        }

        changes
    }

    /// Print changes to stderr, with scripts on stdout.
    pub fn render(&mut self, view: &BroadcastView, low_water: f64, high_water: f64) {
        for change in self.changes(view) {
            clear_line();
            match change {
                ViewChange::Status(status) => {
                    let color = match status {
                        Status::Retrying => YELLOW,
                        Status::Interrupted => RED,
                        _ => DIM,
                    };
                    eprintln!("{color}{status}{RESET}");
                }
                ViewChange::Segment { title, script } => {
                    eprintln!("{BOLD}{title}{RESET}");
                    if self.show_scripts {
                        println!("{script}");
                        io::stdout().flush().ok();
                    }
                }
            }
        }

        if view.is_live {
            eprint!(
                "\r\x1b[2K{}",
                format_buffer_bar(view.buffer_health, low_water, high_water)
            );
            io::stderr().flush().ok();
        }
    }
}
