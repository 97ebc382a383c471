//! Default configuration constants for storycast.
//!
//! Shared by the config layer, the audio timeline and the broadcast loop so
//! the values stay consistent.

/// Sample rate of synthesized speech in Hz.
///
/// The generation service returns 16-bit mono PCM at 24kHz.
pub const SAMPLE_RATE: u32 = 24000;

/// Bytes per PCM16 sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Divisor normalizing a signed 16-bit sample into roughly [-1.0, 1.0].
pub const PCM16_SCALE: f32 = 32768.0;

/// Delay before the first chunk of a fresh timeline may start, in milliseconds.
///
/// Keeps the first schedule call from landing in the past.
pub const LEAD_IN_MS: u64 = 100;

/// Buffered audio below which per-stage status is shown, in seconds.
pub const LOW_WATER_SECS: f64 = 5.0;

/// Buffered audio at which production pauses, in seconds.
pub const HIGH_WATER_SECS: f64 = 60.0;

/// Pause applied once the high-water mark is exceeded, in seconds.
pub const COOL_DOWN_SECS: u64 = 20;

/// Pause after a failed generation or scheduling step, in seconds.
pub const RETRY_DELAY_SECS: u64 = 3;

/// Default generation service endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model for planning, research and writing.
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-flash-preview";

/// Default model for speech synthesis.
pub const DEFAULT_SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// Default prebuilt narrator voice.
pub const DEFAULT_VOICE: &str = "Kore";

/// Duration in seconds of `bytes` of PCM16 mono audio at `sample_rate`.
pub fn pcm16_duration_secs(bytes: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    (bytes / BYTES_PER_SAMPLE) as f64 / sample_rate as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_second_of_speech_is_48000_bytes() {
        assert_eq!(pcm16_duration_secs(48000, SAMPLE_RATE), 1.0);
    }

    #[test]
    fn zero_sample_rate_has_no_duration() {
        assert_eq!(pcm16_duration_secs(48000, 0), 0.0);
    }

    #[test]
    fn watermarks_are_ordered() {
        assert!(LOW_WATER_SECS < HIGH_WATER_SECS);
    }
}
