//! Audio plumbing: PCM conversion, the playback ring and resampler, the
//! capture-side converter and the microphone clip.

pub mod convert;
pub mod mic;
pub mod pcm;
pub mod playback;
pub mod resample;
pub mod ring;

pub use mic::{LoopingClip, MicSource};
pub use playback::{PlaybackClock, PlaybackFeed, PlaybackOutput, playback_channel};
