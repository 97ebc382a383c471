//! Gapless playback schedule over an output device.
//!
//! The timeline keeps a cursor: the earliest device time at which the next
//! chunk may start. Each enqueued chunk starts at `max(cursor, now)` and moves
//! the cursor forward by exactly its duration, so chunks enqueued in order
//! never overlap and, while the buffer stays ahead of the clock, never leave
//! silence between them.

use crate::audio::device::{ChunkId, PlaybackBackend, PlaybackDevice};
use crate::audio::pcm::decode_pcm16;
use crate::defaults;
use crate::error::{Result, StorycastError};
use crossbeam_channel::{Receiver, unbounded};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Placement of one chunk on the device clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub id: ChunkId,
    pub start_at: f64,
    pub duration: f64,
}

impl ScheduledChunk {
    pub fn end(&self) -> f64 {
        self.start_at + self.duration
    }
}

/// Open device plus the schedule built on it. Dropped as a unit on stop.
struct Output {
    device: Box<dyn PlaybackDevice>,
    completions: Receiver<ChunkId>,
    cursor: f64,
    active: BTreeSet<ChunkId>,
}

impl Output {
    /// Deregister chunks the device reported as finished.
    fn reap(&mut self) {
        for id in self.completions.try_iter() {
            self.active.remove(&id);
        }
    }
}

pub struct AudioTimeline {
    backend: Arc<dyn PlaybackBackend>,
    sample_rate: u32,
    lead_in: Duration,
    output: Option<Output>,
    next_id: ChunkId,
}

impl AudioTimeline {
    pub fn new(backend: Arc<dyn PlaybackBackend>, sample_rate: u32) -> Self {
        Self {
            backend,
            sample_rate,
            lead_in: Duration::from_millis(defaults::LEAD_IN_MS),
            output: None,
            next_id: 0,
        }
    }

    pub fn with_lead_in(mut self, lead_in: Duration) -> Self {
        self.lead_in = lead_in;
        self
    }

    /// Open the output device and place the cursor just ahead of its clock.
    ///
    /// Calling `init` on a running timeline keeps the existing schedule.
    pub fn init(&mut self) -> Result<()> {
        if self.output.is_some() {
            return Ok(());
        }

        let (tx, rx) = unbounded();
        let device = self.backend.open(self.sample_rate, tx)?;
        let cursor = device.now() + self.lead_in.as_secs_f64();
        tracing::debug!(backend = self.backend.name(), cursor, "audio timeline started");

        self.output = Some(Output {
            device,
            completions: rx,
            cursor,
            active: BTreeSet::new(),
        });
        Ok(())
    }

    /// True between `init` and `stop`.
    pub fn is_running(&self) -> bool {
        self.output.is_some()
    }

    /// Decode a PCM16 payload and schedule it right after the previous chunk.
    ///
    /// # Errors
    /// - `StorycastError::Decode` if the payload is not valid PCM16
    /// - `StorycastError::Scheduling` if the timeline is not running or the
    ///   device rejects the chunk
    ///
    /// On error the cursor is left where it was.
    pub fn try_enqueue(&mut self, bytes: &[u8]) -> Result<ScheduledChunk> {
        let output = self.output.as_mut().ok_or_else(|| StorycastError::Scheduling {
            message: "timeline is not running".to_string(),
        })?;

        let audio = decode_pcm16(bytes, self.sample_rate)?;

        let now = output.device.now();
        output.reap();
        let start_at = output.cursor.max(now);
        let id = self.next_id;

        output.device.schedule(id, &audio, start_at)?;

        self.next_id += 1;
        let chunk = ScheduledChunk {
            id,
            start_at,
            duration: audio.duration_secs(),
        };
        output.cursor = chunk.end();
        output.active.insert(id);

        tracing::debug!(
            chunk = id,
            start_at,
            duration = chunk.duration,
            cursor = output.cursor,
            "audio chunk scheduled"
        );
        Ok(chunk)
    }

    /// Like [`try_enqueue`](Self::try_enqueue), but a bad chunk is logged and
    /// dropped instead of returned as an error.
    pub fn enqueue(&mut self, bytes: &[u8]) -> Option<ScheduledChunk> {
        match self.try_enqueue(bytes) {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                tracing::warn!(error = %e, bytes = bytes.len(), "dropping audio chunk");
                None
            }
        }
    }

    /// Seconds of scheduled audio still ahead of the device clock.
    ///
    /// Returns 0 when the timeline is not running or playback has caught up
    /// with the cursor.
    pub fn buffer_health(&self) -> f64 {
        match &self.output {
            Some(output) => (output.cursor - output.device.now()).max(0.0),
            None => 0.0,
        }
    }

    /// Current cursor, if running.
    pub fn cursor(&self) -> Option<f64> {
        self.output.as_ref().map(|o| o.cursor)
    }

    /// Number of chunks scheduled or playing.
    pub fn active_chunks(&mut self) -> usize {
        match self.output.as_mut() {
            Some(output) => {
                output.device.now();
                output.reap();
                output.active.len()
            }
            None => 0,
        }
    }

    /// Halt all audio at once, discard the schedule and close the device.
    ///
    /// A later `init` starts from a clean state.
    pub fn stop(&mut self) {
        if let Some(mut output) = self.output.take() {
            output.device.halt();
            tracing::debug!(discarded = output.active.len(), "audio timeline stopped");
        }
    }
}
