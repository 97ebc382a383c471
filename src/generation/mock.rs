//! Scripted generation client for tests and `play --simulate`.

use super::{GenerationClient, NarrativePlan, Segment};
use crate::defaults;
use crate::error::{Result, StorycastError};
use std::collections::{HashSet, VecDeque};
use std::f32::consts::TAU;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Which client operation a recorded call was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Plan,
    Research,
    Write,
    Synthesize,
}

impl CallKind {
    fn stage(self) -> &'static str {
        match self {
            CallKind::Plan => "plan",
            CallKind::Research => "research",
            CallKind::Write => "write",
            CallKind::Synthesize => "synthesize",
        }
    }
}

/// One call made against the mock, recorded when the call starts.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    /// Topic for plans, chapter title for research and write, script for synthesis.
    pub argument: String,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct MockState {
    plans: VecDeque<NarrativePlan>,
    calls: Vec<RecordedCall>,
}

/// Mock generation client
///
/// Plans are served from a queue; once it is empty a three-chapter plan is
/// derived from the requested topic. Failures are injected per operation by
/// zero-based call number.
#[derive(Debug)]
pub struct MockGenerationClient {
    state: Mutex<MockState>,
    failures: HashSet<(CallKind, usize)>,
    malformed_audio: HashSet<usize>,
    latency: Duration,
    audio_secs: f64,
    sample_rate: u32,
}

impl Default for MockGenerationClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerationClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            failures: HashSet::new(),
            malformed_audio: HashSet::new(),
            latency: Duration::ZERO,
            audio_secs: 1.0,
            sample_rate: defaults::SAMPLE_RATE,
        }
    }

    /// Queue a plan to be returned by the next unanswered `plan` call.
    pub fn with_plan(self, plan: NarrativePlan) -> Self {
        self.lock().plans.push_back(plan);
        self
    }

    /// Fail the `nth` call (zero-based) of the given kind.
    pub fn fail_on(mut self, kind: CallKind, nth: usize) -> Self {
        self.failures.insert((kind, nth));
        self
    }

    /// Return an odd-length payload from the `nth` synthesis call.
    pub fn with_malformed_audio_on(mut self, nth: usize) -> Self {
        self.malformed_audio.insert(nth);
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Duration of audio produced by each synthesis call.
    pub fn with_audio_secs(mut self, secs: f64) -> Self {
        self.audio_secs = secs;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Every call made so far, in start order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Calls of one kind, in start order.
    pub fn calls_of(&self, kind: CallKind) -> Vec<RecordedCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.kind == kind)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record the call and return its zero-based number within its kind.
    fn record(&self, kind: CallKind, argument: &str) -> usize {
        let mut state = self.lock();
        let nth = state.calls.iter().filter(|call| call.kind == kind).count();
        state.calls.push(RecordedCall {
            kind,
            argument: argument.to_string(),
            at: Instant::now(),
        });
        nth
    }

    /// Simulate service latency, then apply any injected failure.
    async fn respond(&self, kind: CallKind, nth: usize) -> Result<()> {
        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }
        if self.failures.contains(&(kind, nth)) {
            return Err(match kind {
                CallKind::Synthesize => StorycastError::Synthesis {
                    message: format!("mock failure on synthesize call {nth}"),
                },
                _ => StorycastError::generation(
                    kind.stage(),
                    format!("mock failure on {} call {nth}", kind.stage()),
                ),
            });
        }
        Ok(())
    }

    fn default_plan(topic: &str) -> NarrativePlan {
        NarrativePlan {
            main_topic: topic.to_string(),
            chapters: (1..=3).map(|n| format!("{topic}: part {n}")).collect(),
            next_pivot_topic: format!("{topic} revisited"),
        }
    }

    /// A quiet 220 Hz tone so simulated broadcasts are audible.
    fn tone(&self) -> Vec<u8> {
        let rate = self.sample_rate.max(1);
        let samples = (self.audio_secs.max(0.0) * rate as f64).round() as usize;
        let mut bytes = Vec::with_capacity(samples * defaults::BYTES_PER_SAMPLE);
        for i in 0..samples {
            let phase = TAU * 220.0 * i as f32 / rate as f32;
            let sample = (phase.sin() * 0.05 * i16::MAX as f32) as i16;
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }
}

#[async_trait::async_trait]
impl GenerationClient for MockGenerationClient {
    async fn plan(&self, topic: &str) -> Result<NarrativePlan> {
        let nth = self.record(CallKind::Plan, topic);
        self.respond(CallKind::Plan, nth).await?;
        let queued = self.lock().plans.pop_front();
        Ok(queued.unwrap_or_else(|| Self::default_plan(topic)))
    }

    async fn research(&self, chapter: &str, main_topic: &str) -> Result<String> {
        let nth = self.record(CallKind::Research, chapter);
        self.respond(CallKind::Research, nth).await?;
        Ok(format!("Notes on {chapter} within {main_topic}"))
    }

    async fn write(&self, chapter: &str, notes: &str, _context: &str) -> Result<Segment> {
        let nth = self.record(CallKind::Write, chapter);
        self.respond(CallKind::Write, nth).await?;
        Ok(Segment {
            script: format!("{chapter}. {notes}."),
            display_title: chapter.to_string(),
        })
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let nth = self.record(CallKind::Synthesize, text);
        self.respond(CallKind::Synthesize, nth).await?;
        if self.malformed_audio.contains(&nth) {
            return Ok(vec![0u8; 3]);
        }
        Ok(self.tone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
