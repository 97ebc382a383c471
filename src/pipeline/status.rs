//! Listener-facing status and the observable broadcast view.

use super::pacing::PacingPolicy;
use crate::generation::Segment;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Human-readable status shown to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Status {
    Ready,
    Planning { topic: String },
    Researching { chapter: String },
    Writing,
    Synthesizing,
    InProgress,
    Retrying,
    Interrupted,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ready => write!(f, "Ready to broadcast"),
            Status::Planning { topic } => write!(f, "Planning the story of {topic}..."),
            Status::Researching { chapter } => write!(f, "Researching {chapter}..."),
            Status::Writing => write!(f, "Writing the narration..."),
            Status::Synthesizing => write!(f, "Recording the narration..."),
            Status::InProgress => write!(f, "Story in progress"),
            Status::Retrying => write!(f, "Reconnecting..."),
            Status::Interrupted => write!(f, "Broadcast interrupted"),
        }
    }
}

/// Broadcast loop stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Planning,
    Selecting,
    Researching,
    Writing,
    Synthesizing,
    Scheduling,
    Pacing,
    ErrorRecovery,
    Stopped,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Planning => "planning",
            Stage::Selecting => "selecting",
            Stage::Researching => "researching",
            Stage::Writing => "writing",
            Stage::Synthesizing => "synthesizing",
            Stage::Scheduling => "scheduling",
            Stage::Pacing => "pacing",
            Stage::ErrorRecovery => "error recovery",
            Stage::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Snapshot of everything an observer can see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastView {
    pub is_live: bool,
    pub status: Status,
    pub stage: Stage,
    /// Topic currently being narrated, while live.
    pub topic: Option<String>,
    /// Most recently written segment; cleared on stop.
    pub current_segment: Option<Segment>,
    /// Seconds of audio scheduled ahead of the playback clock.
    pub buffer_health: f64,
}

impl Default for BroadcastView {
    fn default() -> Self {
        Self {
            is_live: false,
            status: Status::Ready,
            stage: Stage::Idle,
            topic: None,
            current_segment: None,
            buffer_health: 0.0,
        }
    }
}

/// Decides which stage statuses reach the listener.
///
/// Per-stage detail is only worth showing while the buffer is thin; with
/// plenty of audio queued the listener keeps seeing "in progress".
#[derive(Debug, Clone)]
pub struct StatusReporter {
    policy: PacingPolicy,
}

impl StatusReporter {
    pub fn new(policy: PacingPolicy) -> Self {
        Self { policy }
    }

    /// Status to publish on entering a research, write or synthesis stage.
    pub fn stage_status(&self, status: Status, buffer_health: f64) -> Option<Status> {
        self.policy.is_urgent(buffer_health).then_some(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(
            Status::Planning {
                topic: "The Fall of Rome".into()
            }
            .to_string(),
            "Planning the story of The Fall of Rome..."
        );
        assert_eq!(Status::Interrupted.to_string(), "Broadcast interrupted");
    }

    #[test]
    fn test_status_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Status::Researching {
            chapter: "Omens".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"researching","chapter":"Omens"}"#);

        let parsed: Status = serde_json::from_str(r#"{"kind":"in_progress"}"#).unwrap();
        assert_eq!(parsed, Status::InProgress);
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Stage::ErrorRecovery).unwrap(),
            r#""error_recovery""#
        );
    }

    #[test]
    fn test_default_view_is_idle() {
        let view = BroadcastView::default();
        assert!(!view.is_live);
        assert_eq!(view.status, Status::Ready);
        assert_eq!(view.stage, Stage::Idle);
        assert!(view.current_segment.is_none());
    }

    #[test]
    fn test_stage_status_shown_only_when_urgent() {
        let reporter = StatusReporter::new(PacingPolicy::default());
        assert_eq!(
            reporter.stage_status(Status::Writing, 0.0),
            Some(Status::Writing)
        );
        assert_eq!(
            reporter.stage_status(Status::Writing, 4.99),
            Some(Status::Writing)
        );
        assert_eq!(reporter.stage_status(Status::Writing, 5.0), None);
        assert_eq!(reporter.stage_status(Status::Synthesizing, 42.0), None);
    }
}
