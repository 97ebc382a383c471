use crate::audio::pcm::DecodedAudio;
use crate::error::{Result, StorycastError};
use crossbeam_channel::Sender;
use std::sync::{Arc, Mutex};

/// Identifier the timeline assigns to each scheduled chunk.
pub type ChunkId = u64;

/// An open output device with its own real-time clock.
///
/// This trait allows swapping implementations (real sound card vs mock).
pub trait PlaybackDevice: Send {
    /// Current device time in seconds since the device was opened.
    fn now(&self) -> f64;

    /// Schedule decoded audio to begin at absolute device time `start_at`.
    ///
    /// When the chunk finishes playing on its own, the device sends `id` on
    /// the completion channel it was opened with.
    fn schedule(&mut self, id: ChunkId, audio: &DecodedAudio, start_at: f64) -> Result<()>;

    /// Silence every scheduled or playing chunk immediately.
    fn halt(&mut self);
}

/// Opens output devices for the timeline.
pub trait PlaybackBackend: Send + Sync {
    /// Open a device for mono audio at `sample_rate`.
    fn open(
        &self,
        sample_rate: u32,
        completions: Sender<ChunkId>,
    ) -> Result<Box<dyn PlaybackDevice>>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// One `schedule` call observed by [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledRecord {
    pub id: ChunkId,
    pub start_at: f64,
    pub duration: f64,
}

#[derive(Debug, Default)]
struct MockState {
    opened: usize,
    halted: usize,
    schedule_calls: usize,
    scheduled: Vec<ScheduledRecord>,
    fail_open: bool,
    fail_schedule_calls: Vec<usize>,
}

/// Mock backend for testing.
///
/// Devices it opens use `tokio::time` as their clock, so tests running with a
/// paused runtime control playback progress. Clones share state, so a test
/// can keep a handle after giving one to the timeline.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail when opening a device
    pub fn with_open_failure(self) -> Self {
        self.with_state(|s| s.fail_open = true);
        self
    }

    /// Configure the mock to reject the `n`th schedule call (0-based)
    pub fn with_schedule_failure_on(self, n: usize) -> Self {
        self.with_state(|s| s.fail_schedule_calls.push(n));
        self
    }

    /// Every successful schedule call, in order.
    pub fn scheduled(&self) -> Vec<ScheduledRecord> {
        self.with_state(|s| s.scheduled.clone())
    }

    /// Number of devices opened.
    pub fn opened(&self) -> usize {
        self.with_state(|s| s.opened)
    }

    /// Number of halt calls across all devices.
    pub fn halted(&self) -> usize {
        self.with_state(|s| s.halted)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl PlaybackBackend for MockBackend {
    fn open(
        &self,
        _sample_rate: u32,
        completions: Sender<ChunkId>,
    ) -> Result<Box<dyn PlaybackDevice>> {
        let fail = self.with_state(|s| {
            if !s.fail_open {
                s.opened += 1;
            }
            s.fail_open
        });
        if fail {
            return Err(StorycastError::AudioDeviceNotFound {
                device: "mock".to_string(),
            });
        }
        Ok(Box::new(MockDevice {
            backend: self.clone(),
            opened_at: tokio::time::Instant::now(),
            completions,
            playing: Mutex::new(Vec::new()),
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockDevice {
    backend: MockBackend,
    opened_at: tokio::time::Instant,
    completions: Sender<ChunkId>,
    /// (id, end time) of chunks not yet reported complete
    playing: Mutex<Vec<(ChunkId, f64)>>,
}

impl PlaybackDevice for MockDevice {
    fn now(&self) -> f64 {
        let now = self.opened_at.elapsed().as_secs_f64();
        if let Ok(mut playing) = self.playing.lock() {
            playing.retain(|&(id, end)| {
                if end <= now {
                    // Receiver gone means the timeline was torn down
                    let _ = self.completions.send(id);
                    false
                } else {
                    true
                }
            });
        }
        now
    }

    fn schedule(&mut self, id: ChunkId, audio: &DecodedAudio, start_at: f64) -> Result<()> {
        let rejected = self.backend.with_state(|s| {
            let call = s.schedule_calls;
            s.schedule_calls += 1;
            s.fail_schedule_calls.contains(&call)
        });
        if rejected {
            return Err(StorycastError::Scheduling {
                message: "mock device rejected chunk".to_string(),
            });
        }

        let duration = audio.duration_secs();
        self.backend.with_state(|s| {
            s.scheduled.push(ScheduledRecord {
                id,
                start_at,
                duration,
            })
        });
        if let Ok(mut playing) = self.playing.lock() {
            playing.push((id, start_at + duration));
        }
        Ok(())
    }

    fn halt(&mut self) {
        self.backend.with_state(|s| s.halted += 1);
        if let Ok(mut playing) = self.playing.lock() {
            playing.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::decode_pcm16;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    #[test]
    fn test_mock_open_failure() {
        let backend = MockBackend::new().with_open_failure();
        let (tx, _rx) = unbounded();
        assert!(backend.open(24000, tx).is_err());
        assert_eq!(backend.opened(), 0);
    }

    #[test]
    fn test_mock_records_schedule_calls() {
        let backend = MockBackend::new();
        let (tx, _rx) = unbounded();
        let mut device = backend.open(24000, tx).unwrap();
        let audio = decode_pcm16(&vec![0u8; 48000], 24000).unwrap();

        device.schedule(7, &audio, 0.5).unwrap();

        assert_eq!(backend.opened(), 1);
        assert_eq!(
            backend.scheduled(),
            vec![ScheduledRecord {
                id: 7,
                start_at: 0.5,
                duration: 1.0
            }]
        );
    }

    #[test]
    fn test_mock_schedule_failure_on_nth_call() {
        let backend = MockBackend::new().with_schedule_failure_on(1);
        let (tx, _rx) = unbounded();
        let mut device = backend.open(24000, tx).unwrap();
        let audio = decode_pcm16(&[0, 0], 24000).unwrap();

        assert!(device.schedule(0, &audio, 0.0).is_ok());
        assert!(matches!(
            device.schedule(1, &audio, 0.0),
            Err(StorycastError::Scheduling { .. })
        ));
        assert!(device.schedule(2, &audio, 0.0).is_ok());
        assert_eq!(backend.scheduled().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_reports_completion_after_playback() {
        let backend = MockBackend::new();
        let (tx, rx) = unbounded();
        let mut device = backend.open(24000, tx).unwrap();
        let audio = decode_pcm16(&vec![0u8; 48000], 24000).unwrap();
        device.schedule(3, &audio, 0.1).unwrap();

        device.now();
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_millis(1200)).await;
        device.now();
        assert_eq!(rx.try_recv().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_halt_drops_pending_completions() {
        let backend = MockBackend::new();
        let (tx, rx) = unbounded();
        let mut device = backend.open(24000, tx).unwrap();
        let audio = decode_pcm16(&vec![0u8; 480], 24000).unwrap();
        device.schedule(1, &audio, 0.0).unwrap();

        device.halt();
        tokio::time::advance(Duration::from_secs(1)).await;
        device.now();

        assert!(rx.try_recv().is_err());
        assert_eq!(backend.halted(), 1);
    }
}
