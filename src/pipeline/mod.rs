//! Endless broadcast pipeline.
//!
//! The controller owns a single production loop that keeps the audio
//! timeline ahead of the listener, paced by buffer health.

pub mod controller;
pub mod pacing;
pub mod state;
pub mod status;
pub mod stop;

pub use controller::{PipelineController, SharedTimeline};
pub use pacing::PacingPolicy;
pub use state::{PipelineState, Selection};
pub use status::{BroadcastView, Stage, Status, StatusReporter};
pub use stop::{StopListener, StopSignal};
