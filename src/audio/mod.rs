//! Audio output: PCM decoding, device backends and the gapless timeline.

#[cfg(feature = "cpal-audio")]
pub mod cpal_output;
pub mod device;
pub mod pcm;
pub mod timeline;

pub use device::{ChunkId, MockBackend, PlaybackBackend, PlaybackDevice};
pub use pcm::{DecodedAudio, decode_pcm16};
pub use timeline::{AudioTimeline, ScheduledChunk};
