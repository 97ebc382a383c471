//! Composition root: wires configuration into a broadcast controller.
//!
//! Also runs the foreground `play` command: start → render views → stop on Ctrl+C.

use crate::audio::{AudioTimeline, MockBackend, PlaybackBackend};
use crate::config::Config;
use crate::error::Result;
use crate::generation::{GenerationClient, MockGenerationClient, PromptTemplates};
use crate::output::ViewRenderer;
use crate::pipeline::{PacingPolicy, PipelineController};
use std::sync::Arc;
use std::time::Duration;

/// Latency of simulated generation calls, so status changes are visible.
const SIMULATED_LATENCY: Duration = Duration::from_millis(1500);

/// Audio length of each simulated chapter.
const SIMULATED_CHAPTER_SECS: f64 = 20.0;

/// Generation client for `config`, or a scripted one when simulating.
pub fn build_client(config: &Config, simulate: bool) -> Result<Arc<dyn GenerationClient>> {
    if simulate {
        let client = MockGenerationClient::new()
            .with_latency(SIMULATED_LATENCY)
            .with_audio_secs(SIMULATED_CHAPTER_SECS)
            .with_sample_rate(config.audio.sample_rate);
        return Ok(Arc::new(client));
    }

    let prompts = PromptTemplates::default().with_overrides(&config.prompts);
    build_remote_client(config, prompts)
}

#[cfg(feature = "gemini")]
fn build_remote_client(
    config: &Config,
    prompts: PromptTemplates,
) -> Result<Arc<dyn GenerationClient>> {
    let client = crate::generation::gemini::GeminiClient::from_config(&config.generation, prompts)?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "gemini"))]
fn build_remote_client(
    _config: &Config,
    _prompts: PromptTemplates,
) -> Result<Arc<dyn GenerationClient>> {
    Err(crate::error::StorycastError::Other(
        "built without the `gemini` feature; use --simulate".to_string(),
    ))
}

/// Playback backend for the configured output device.
///
/// Without the `cpal-audio` feature playback is silent and paced by the clock.
pub fn build_backend(config: &Config) -> Arc<dyn PlaybackBackend> {
    #[cfg(feature = "cpal-audio")]
    {
        Arc::new(crate::audio::cpal_output::CpalBackend::new(
            config.audio.device.as_deref(),
        ))
    }
    #[cfg(not(feature = "cpal-audio"))]
    {
        let _ = config;
        tracing::warn!("built without audio output; playback is silent");
        Arc::new(MockBackend::new())
    }
}

/// Assemble a controller from its parts.
pub fn build_controller(
    config: &Config,
    client: Arc<dyn GenerationClient>,
    backend: Arc<dyn PlaybackBackend>,
) -> PipelineController {
    let timeline = AudioTimeline::new(backend, config.audio.sample_rate)
        .with_lead_in(Duration::from_millis(config.pacing.lead_in_ms));
    PipelineController::new(client, timeline, PacingPolicy::from(&config.pacing))
}

/// Run the play command: broadcast `topic` in the foreground until Ctrl+C.
///
/// `silent` swaps the audio device for a clock-only backend.
pub async fn run_play_command(
    config: Config,
    topic: &str,
    simulate: bool,
    silent: bool,
    show_scripts: bool,
) -> Result<()> {
    config.validate()?;

    let client = build_client(&config, simulate)?;
    let backend: Arc<dyn PlaybackBackend> = if silent {
        Arc::new(MockBackend::new())
    } else {
        build_backend(&config)
    };
    let controller = build_controller(&config, client, backend);

    let mut views = controller.subscribe();
    controller.start(topic)?;

    let mut renderer = ViewRenderer::new(show_scripts);
    let (low, high) = (config.pacing.low_water_secs, config.pacing.high_water_secs);
    let mut refresh = tokio::time::interval(Duration::from_millis(500));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                renderer.render(&view, low, high);
            }
            _ = refresh.tick() => {
                renderer.render(&controller.view(), low, high);
            }
        }
    }

    if let Some(task) = controller.stop()
        && let Err(e) = task.await
    {
        tracing::warn!(error = %e, "broadcast task ended abnormally");
    }
    renderer.render(&controller.view(), low, high);
    Ok(())
}
