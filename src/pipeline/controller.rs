//! Broadcast controller and the endless production loop it drives.
//!
//! One loop runs per live broadcast: plan a topic, then for each chapter
//! research, write, synthesize and schedule, pausing whenever enough audio is
//! queued. When the plan runs out the topic pivots and planning starts again.
//! Failures pause briefly and retry the same position; only `stop` ends it.

use super::pacing::PacingPolicy;
use super::state::{PipelineState, Selection};
use super::status::{BroadcastView, Stage, Status, StatusReporter};
use super::stop::{StopListener, StopSignal};
use crate::audio::AudioTimeline;
use crate::error::{Result, StorycastError};
use crate::generation::{GenerationClient, Segment};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Timeline shared between the controller and its loop.
pub type SharedTimeline = Arc<Mutex<AudioTimeline>>;

fn lock_timeline(timeline: &Mutex<AudioTimeline>) -> MutexGuard<'_, AudioTimeline> {
    match timeline.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A live broadcast: its stop signal and loop task.
struct Run {
    stop: StopSignal,
    task: JoinHandle<()>,
}

/// Starts and stops broadcasts and exposes what listeners can observe.
///
/// Must be used from within a tokio runtime.
pub struct PipelineController {
    client: Arc<dyn GenerationClient>,
    timeline: SharedTimeline,
    policy: PacingPolicy,
    view: Arc<watch::Sender<BroadcastView>>,
    run: Mutex<Option<Run>>,
}

impl PipelineController {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        timeline: AudioTimeline,
        policy: PacingPolicy,
    ) -> Self {
        let (view, _) = watch::channel(BroadcastView::default());
        Self {
            client,
            timeline: Arc::new(Mutex::new(timeline)),
            policy,
            view: Arc::new(view),
            run: Mutex::new(None),
        }
    }

    fn lock_run(&self) -> MutexGuard<'_, Option<Run>> {
        match self.run.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Start broadcasting `topic`.
    ///
    /// Returns `Ok(false)` without side effects if a broadcast is already live.
    ///
    /// # Errors
    ///
    /// Fails if the topic is blank or the audio output cannot be opened; the
    /// controller then stays idle.
    pub fn start(&self, topic: &str) -> Result<bool> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(StorycastError::Other("topic must not be empty".to_string()));
        }

        let mut run = self.lock_run();
        if run.as_ref().is_some_and(|r| !r.task.is_finished()) {
            tracing::debug!(topic, "broadcast already live, ignoring start");
            return Ok(false);
        }

        lock_timeline(&self.timeline).init()?;

        let (stop, listener) = StopSignal::new();
        self.view.send_replace(BroadcastView {
            is_live: true,
            status: Status::Planning {
                topic: topic.to_string(),
            },
            stage: Stage::Planning,
            topic: Some(topic.to_string()),
            current_segment: None,
            buffer_health: 0.0,
        });

        let broadcast = Broadcast {
            state: PipelineState::new(topic),
            client: Arc::clone(&self.client),
            timeline: Arc::clone(&self.timeline),
            reporter: StatusReporter::new(self.policy.clone()),
            policy: self.policy.clone(),
            view: Arc::clone(&self.view),
            stop: listener,
        };
        let task = tokio::spawn(broadcast.run());
        *run = Some(Run { stop, task });

        tracing::info!(topic, client = self.client.name(), "broadcast started");
        Ok(true)
    }

    /// Stop the live broadcast, silencing audio at once.
    ///
    /// Calls already in flight are abandoned and no further ones start. The
    /// view reads `Interrupted` and not live as soon as this returns. Returns
    /// the loop task so callers may wait for it to wind down; `None` if
    /// nothing was live.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let run = self.lock_run().take()?;
        run.stop.trigger();
        lock_timeline(&self.timeline).stop();

        self.view.send_modify(|view| {
            view.is_live = false;
            view.status = Status::Interrupted;
            view.stage = Stage::Stopped;
            view.current_segment = None;
            view.buffer_health = 0.0;
        });

        tracing::info!("broadcast stopped");
        Some(run.task)
    }

    /// Current snapshot of the observable state.
    pub fn view(&self) -> BroadcastView {
        let mut view = self.view.borrow().clone();
        if view.is_live {
            view.buffer_health = self.buffer_health();
        }
        view
    }

    /// Receiver notified on every published change.
    pub fn subscribe(&self) -> watch::Receiver<BroadcastView> {
        self.view.subscribe()
    }

    pub fn is_live(&self) -> bool {
        self.view.borrow().is_live
    }

    pub fn status(&self) -> Status {
        self.view.borrow().status.clone()
    }

    pub fn current_segment(&self) -> Option<Segment> {
        self.view.borrow().current_segment.clone()
    }

    /// Seconds of audio queued ahead of playback right now.
    pub fn buffer_health(&self) -> f64 {
        lock_timeline(&self.timeline).buffer_health()
    }
}

enum Flow {
    Continue,
    Stopped,
}

/// State owned by one run of the production loop.
struct Broadcast {
    state: PipelineState,
    client: Arc<dyn GenerationClient>,
    timeline: SharedTimeline,
    policy: PacingPolicy,
    reporter: StatusReporter,
    view: Arc<watch::Sender<BroadcastView>>,
    stop: StopListener,
}

impl Broadcast {
    async fn run(mut self) {
        loop {
            if self.stop.is_stopped() {
                break;
            }
            match self.cycle().await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stopped) => break,
                Err(e) => {
                    if self.stop.is_stopped() {
                        break;
                    }
                    tracing::warn!(
                        error = %e,
                        topic = self.state.topic(),
                        chapter = self.state.chapter_index(),
                        "broadcast step failed, retrying in {:?}",
                        self.policy.retry_delay
                    );
                    self.enter(Stage::ErrorRecovery, Some(Status::Retrying));
                    let delay = tokio::time::sleep(self.policy.retry_delay);
                    if self.stop.run(delay).await.is_none() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(topic = self.state.topic(), "broadcast loop exited");
    }

    /// One pass: plan if needed, then produce and schedule one chapter.
    async fn cycle(&mut self) -> Result<Flow> {
        if self.state.needs_plan() {
            let topic = self.state.topic().to_string();
            self.enter(
                Stage::Planning,
                Some(Status::Planning {
                    topic: topic.clone(),
                }),
            );
            let Some(plan) = self.suspend(self.client.plan(&topic)).await? else {
                return Ok(Flow::Stopped);
            };
            let plan = plan.validated()?;
            tracing::info!(
                %topic,
                chapters = plan.chapters.len(),
                pivot = %plan.next_pivot_topic,
                "story planned"
            );
            self.state.install_plan(plan);
        }

        self.enter(Stage::Selecting, None);
        let chapter = match self.state.select() {
            Some(Selection::Chapter { index, title }) => {
                tracing::debug!(index, chapter = %title, "chapter selected");
                title
            }
            Some(Selection::Pivot { from, to }) => {
                tracing::info!(%from, %to, "story complete, pivoting");
                let topic = to.clone();
                self.publish(move |view| view.topic = Some(topic));
                return Ok(Flow::Continue);
            }
            None => return Ok(Flow::Continue),
        };
        let main_topic = self.state.main_topic().to_string();

        self.enter_detailed(
            Stage::Researching,
            Status::Researching {
                chapter: chapter.clone(),
            },
        );
        let Some(notes) = self
            .suspend(self.client.research(&chapter, &main_topic))
            .await?
        else {
            return Ok(Flow::Stopped);
        };

        self.enter_detailed(Stage::Writing, Status::Writing);
        let context = self.state.writing_context();
        let Some(segment) = self
            .suspend(self.client.write(&chapter, &notes, &context))
            .await?
        else {
            return Ok(Flow::Stopped);
        };

        tracing::info!(%chapter, title = %segment.display_title, "segment written");
        let script = segment.script.clone();
        self.publish(move |view| view.current_segment = Some(segment));
        self.state.advance();

        self.enter_detailed(Stage::Synthesizing, Status::Synthesizing);
        let Some(audio) = self.suspend(self.client.synthesize(&script)).await? else {
            return Ok(Flow::Stopped);
        };

        self.enter(Stage::Scheduling, None);
        {
            let mut timeline = lock_timeline(&self.timeline);
            if self.stop.is_stopped() {
                return Ok(Flow::Stopped);
            }
            timeline.enqueue(&audio);
        }

        self.enter(Stage::Pacing, Some(Status::InProgress));
        let health = self.buffer_health();
        if let Some(pause) = self.policy.cool_down_for(health) {
            tracing::debug!(buffer_health = health, "buffer full, cooling down for {pause:?}");
            if self.stop.run(tokio::time::sleep(pause)).await.is_none() {
                return Ok(Flow::Stopped);
            }
        }
        Ok(Flow::Continue)
    }

    /// Await a client call unless a stop arrives first (`Ok(None)`).
    async fn suspend<T>(&self, call: impl Future<Output = Result<T>>) -> Result<Option<T>> {
        match self.stop.run(call).await {
            Some(result) => result.map(Some),
            None => Ok(None),
        }
    }

    fn buffer_health(&self) -> f64 {
        lock_timeline(&self.timeline).buffer_health()
    }

    /// Apply `update` to the view unless this run has been stopped.
    fn publish(&self, update: impl FnOnce(&mut BroadcastView)) {
        let health = self.buffer_health();
        let stop = &self.stop;
        self.view.send_if_modified(|view| {
            if stop.is_stopped() {
                return false;
            }
            update(view);
            view.buffer_health = health;
            true
        });
    }

    fn enter(&self, stage: Stage, status: Option<Status>) {
        tracing::trace!(%stage, "entering stage");
        self.publish(|view| {
            view.stage = stage;
            if let Some(status) = status {
                view.status = status;
            }
        });
    }

    /// Enter a stage whose status is shown only while the buffer is thin.
    fn enter_detailed(&self, stage: Stage, status: Status) {
        let status = self.reporter.stage_status(status, self.buffer_health());
        self.enter(stage, status);
    }
}
