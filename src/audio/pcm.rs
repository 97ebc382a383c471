//! PCM16 decoding for synthesized speech.

use crate::defaults::{BYTES_PER_SAMPLE, PCM16_SCALE};
use crate::error::{Result, StorycastError};
use std::sync::Arc;

/// Decoded mono audio ready for the output device.
///
/// Immutable once decoded; samples are shared with the device mixer.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl DecodedAudio {
    pub fn samples(&self) -> &Arc<[f32]> {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Playback length in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode signed 16-bit little-endian mono PCM into normalized floats.
///
/// Each sample is divided by 32768, so the output lies in [-1.0, 1.0).
///
/// # Errors
/// Returns `StorycastError::Decode` for an empty payload, a payload with a
/// trailing half sample, or a zero sample rate.
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32) -> Result<DecodedAudio> {
    if sample_rate == 0 {
        return Err(StorycastError::Decode {
            message: "sample rate must be positive".to_string(),
        });
    }
    if bytes.is_empty() {
        return Err(StorycastError::Decode {
            message: "empty audio payload".to_string(),
        });
    }
    if bytes.len() % BYTES_PER_SAMPLE != 0 {
        return Err(StorycastError::Decode {
            message: format!("odd payload length {} for 16-bit samples", bytes.len()),
        });
    }

    let samples: Arc<[f32]> = bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM16_SCALE)
        .collect();

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::SAMPLE_RATE;

    fn encode(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_48000_bytes_is_one_second() {
        let audio = decode_pcm16(&vec![0u8; 48000], SAMPLE_RATE).unwrap();
        assert_eq!(audio.sample_count(), 24000);
        assert_eq!(audio.duration_secs(), 1.0);
    }

    #[test]
    fn test_normalization_bounds() {
        let audio = decode_pcm16(&encode(&[i16::MIN, 0, i16::MAX, 16384]), SAMPLE_RATE).unwrap();
        let s = audio.samples();
        assert_eq!(s[0], -1.0);
        assert_eq!(s[1], 0.0);
        assert!((s[2] - 0.99997).abs() < 1e-4);
        assert_eq!(s[3], 0.5);
    }

    #[test]
    fn test_little_endian_byte_order() {
        // 0x0100 little-endian = 256
        let audio = decode_pcm16(&[0x00, 0x01], SAMPLE_RATE).unwrap();
        assert_eq!(audio.samples()[0], 256.0 / 32768.0);
    }

    #[test]
    fn test_empty_payload_is_decode_error() {
        let err = decode_pcm16(&[], SAMPLE_RATE).unwrap_err();
        assert!(matches!(err, StorycastError::Decode { .. }));
    }

    #[test]
    fn test_odd_length_is_decode_error() {
        let err = decode_pcm16(&[1, 2, 3], SAMPLE_RATE).unwrap_err();
        assert!(err.to_string().contains("odd payload length 3"));
    }

    #[test]
    fn test_zero_sample_rate_is_decode_error() {
        assert!(decode_pcm16(&[0, 0], 0).is_err());
    }
}
