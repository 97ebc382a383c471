//! Real audio output using CPAL (Cross-Platform Audio Library).

use crate::audio::device::{ChunkId, PlaybackBackend, PlaybackDevice};
use crate::audio::pcm::DecodedAudio;
use crate::error::{Result, StorycastError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use std::sync::{Arc, Mutex};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// CPAL probing makes ALSA/JACK print harmless but confusing messages.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore fd 2. Safe as long as no
/// other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// List the names of available audio output devices.
///
/// # Errors
/// Returns `StorycastError::Scheduling` if device enumeration fails.
pub fn list_output_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| cpal::default_host().output_devices());
    let devices = devices.map_err(|e| StorycastError::Scheduling {
        message: format!("Failed to enumerate output devices: {}", e),
    })?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

fn find_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        match device_name {
            Some(name) => {
                let devices = host
                    .output_devices()
                    .map_err(|e| StorycastError::Scheduling {
                        message: format!("Failed to enumerate devices: {}", e),
                    })?;
                devices
                    .into_iter()
                    .find(|dev| dev.name().is_ok_and(|n| n == name))
                    .ok_or_else(|| StorycastError::AudioDeviceNotFound {
                        device: name.to_string(),
                    })
            }
            None => host
                .default_output_device()
                .ok_or_else(|| StorycastError::AudioDeviceNotFound {
                    device: "default".to_string(),
                }),
        }
    })
}

/// A chunk placed on the device frame clock.
struct Voice {
    id: ChunkId,
    samples: Arc<[f32]>,
    source_rate: u32,
    start_frame: u64,
    frames: u64,
}

/// Software mixer shared between the device callback and the timeline.
///
/// The device clock is the number of frames rendered so far.
struct Mixer {
    device_rate: u32,
    frames_rendered: u64,
    voices: Vec<Voice>,
    completions: Sender<ChunkId>,
}

impl Mixer {
    fn new(device_rate: u32, completions: Sender<ChunkId>) -> Self {
        Self {
            device_rate,
            frames_rendered: 0,
            voices: Vec::new(),
            completions,
        }
    }

    /// Fill one interleaved output buffer and report voices that ended in it.
    fn render(&mut self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        let channels = channels.max(1);
        let first = self.frames_rendered;
        let last = first + (out.len() / channels) as u64;

        for voice in &self.voices {
            let voice_end = voice.start_frame + voice.frames;
            if voice.start_frame >= last || voice_end <= first {
                continue;
            }
            for frame in voice.start_frame.max(first)..voice_end.min(last) {
                // Nearest-lower source sample for this device frame
                let offset = frame - voice.start_frame;
                let idx = (offset * voice.source_rate as u64 / self.device_rate as u64) as usize;
                let Some(&sample) = voice.samples.get(idx) else {
                    continue;
                };
                let base = (frame - first) as usize * channels;
                for slot in &mut out[base..base + channels] {
                    *slot = (*slot + sample).clamp(-1.0, 1.0);
                }
            }
        }

        self.frames_rendered = last;
        let completions = &self.completions;
        self.voices.retain(|voice| {
            if voice.start_frame + voice.frames <= last {
                // Receiver gone means the timeline already stopped
                let _ = completions.send(voice.id);
                false
            } else {
                true
            }
        });
    }

    fn now(&self) -> f64 {
        self.frames_rendered as f64 / self.device_rate as f64
    }

    fn add(&mut self, id: ChunkId, audio: &DecodedAudio, start_at: f64) {
        let ratio = self.device_rate as f64 / audio.sample_rate() as f64;
        self.voices.push(Voice {
            id,
            samples: Arc::clone(audio.samples()),
            source_rate: audio.sample_rate(),
            start_frame: (start_at * self.device_rate as f64).round() as u64,
            frames: (audio.sample_count() as f64 * ratio).ceil() as u64,
        });
    }
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched from the thread owning the timeline,
/// which is serialized by the timeline's lock.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Opens CPAL output streams.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    device_name: Option<String>,
}

impl CpalBackend {
    /// Use the named output device, or the system default when `None`.
    pub fn new(device_name: Option<&str>) -> Self {
        Self {
            device_name: device_name.map(str::to_string),
        }
    }
}

impl PlaybackBackend for CpalBackend {
    fn open(
        &self,
        sample_rate: u32,
        completions: Sender<ChunkId>,
    ) -> Result<Box<dyn PlaybackDevice>> {
        let device = find_device(self.device_name.as_deref())?;
        let (stream, mixer) = build_stream(&device, sample_rate, completions)?;
        stream.play().map_err(|e| StorycastError::Scheduling {
            message: format!("Failed to start output stream: {}", e),
        })?;
        Ok(Box::new(CpalDevice {
            mixer,
            stream: SendableStream(stream),
        }))
    }

    fn name(&self) -> &str {
        self.device_name.as_deref().unwrap_or("cpal")
    }
}

/// Build the output stream.
///
/// Tries in order:
/// 1. f32/mono at the speech sample rate, no conversion needed
/// 2. Device default config: native rate and channels, converted in the mixer
fn build_stream(
    device: &cpal::Device,
    sample_rate: u32,
    completions: Sender<ChunkId>,
) -> Result<(cpal::Stream, Arc<Mutex<Mixer>>)> {
    let err_callback = |err| {
        tracing::error!("Audio stream error: {}", err);
    };

    let preferred_config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let mixer = Arc::new(Mutex::new(Mixer::new(sample_rate, completions.clone())));
    let callback_mixer = Arc::clone(&mixer);
    if let Ok(stream) = device.build_output_stream(
        &preferred_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if let Ok(mut m) = callback_mixer.lock() {
                m.render(data, 1);
            }
        },
        err_callback,
        None,
    ) {
        return Ok((stream, mixer));
    }

    let default_config =
        device
            .default_output_config()
            .map_err(|e| StorycastError::Scheduling {
                message: format!("Failed to query default output config: {}", e),
            })?;
    let native_rate = default_config.sample_rate().0;
    let channels = default_config.channels() as usize;
    let stream_config: cpal::StreamConfig = default_config.clone().into();

    tracing::info!(
        channels,
        rate = native_rate,
        format = ?default_config.sample_format(),
        "using native output format, converting in software"
    );

    let mixer = Arc::new(Mutex::new(Mixer::new(native_rate, completions)));
    let callback_mixer = Arc::clone(&mixer);

    let stream = match default_config.sample_format() {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if let Ok(mut m) = callback_mixer.lock() {
                    m.render(data, channels);
                }
            },
            err_callback,
            None,
        ),
        cpal::SampleFormat::I16 => {
            let mut scratch: Vec<f32> = Vec::new();
            device.build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    if let Ok(mut m) = callback_mixer.lock() {
                        m.render(&mut scratch, channels);
                    }
                    for (out, &s) in data.iter_mut().zip(scratch.iter()) {
                        *out = (s * i16::MAX as f32) as i16;
                    }
                },
                err_callback,
                None,
            )
        }
        fmt => {
            return Err(StorycastError::Scheduling {
                message: format!(
                    "Unsupported native sample format: {:?}. Try another device.",
                    fmt
                ),
            });
        }
    }
    .map_err(|e| StorycastError::Scheduling {
        message: format!("Failed to build output stream: {}", e),
    })?;

    Ok((stream, mixer))
}

struct CpalDevice {
    mixer: Arc<Mutex<Mixer>>,
    stream: SendableStream,
}

impl PlaybackDevice for CpalDevice {
    fn now(&self) -> f64 {
        self.mixer.lock().map(|m| m.now()).unwrap_or(0.0)
    }

    fn schedule(&mut self, id: ChunkId, audio: &DecodedAudio, start_at: f64) -> Result<()> {
        let mut mixer = self.mixer.lock().map_err(|_| StorycastError::Scheduling {
            message: "audio mixer lock poisoned".to_string(),
        })?;
        mixer.add(id, audio, start_at);
        Ok(())
    }

    fn halt(&mut self) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.voices.clear();
        }
        if let Err(e) = self.stream.0.pause() {
            tracing::debug!("pausing output stream failed: {}", e);
        }
    }
}
