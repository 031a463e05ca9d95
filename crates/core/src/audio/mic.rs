//! The continuously-recording microphone clip the capture pipeline reads from.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// A circular buffer of interleaved frames that a device keeps writing into.
pub trait MicSource: Send + Sync {
    /// The device's actual sample rate, read after capture started.
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> usize;
    /// Length of the circular clip, in frames.
    fn clip_frames(&self) -> usize;
    /// Frame index the device will write next.
    fn write_position(&self) -> usize;
    /// Copies `out.len() / channels` frames starting at `start`. The span
    /// must not cross the end of the clip.
    fn read(&self, start: usize, out: &mut [f32]);
}

/// Lock-free looping clip. Samples are stored as `f32` bits in atomics so the
/// device callback and the capture loop never contend on a lock.
pub struct LoopingClip {
    samples: Box<[AtomicU32]>,
    channels: usize,
    sample_rate: u32,
    write_pos: AtomicUsize,
}

impl LoopingClip {
    pub fn new(sample_rate: u32, channels: usize, seconds: u32) -> Self {
        let channels = channels.max(1);
        let frames = (sample_rate as usize * seconds.max(1) as usize).max(1);
        let samples = (0..frames * channels)
            .map(|_| AtomicU32::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            samples,
            channels,
            sample_rate,
            write_pos: AtomicUsize::new(0),
        }
    }

    /// Appends interleaved frames, wrapping at the end of the clip. Called
    /// from the device's input callback. A trailing partial frame is ignored.
    pub fn write(&self, interleaved: &[f32]) {
        let frames = self.clip_frames();
        let mut pos = self.write_pos.load(Ordering::Acquire);
        for frame in interleaved.chunks_exact(self.channels) {
            let base = pos * self.channels;
            for (offset, &sample) in frame.iter().enumerate() {
                self.samples[base + offset].store(sample.to_bits(), Ordering::Relaxed);
            }
            pos = (pos + 1) % frames;
        }
        self.write_pos.store(pos, Ordering::Release);
    }
}

impl MicSource for LoopingClip {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn clip_frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    fn write_position(&self) -> usize {
        self.write_pos.load(Ordering::Acquire)
    }

    fn read(&self, start: usize, out: &mut [f32]) {
        let base = start * self.channels;
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self
                .samples
                .get(base + i)
                .map(|s| f32::from_bits(s.load(Ordering::Relaxed)))
                .unwrap_or(0.0);
        }
    }
}

/// Frames recorded but not yet read: `(write - read) mod length`.
pub fn available_frames(write_pos: usize, read_pos: usize, clip_frames: usize) -> usize {
    if clip_frames == 0 {
        return 0;
    }
    (write_pos + clip_frames - read_pos % clip_frames) % clip_frames
}

/// Reads `frames` frames starting at `start`, issuing two reads when the span
/// crosses the end of the clip.
pub fn read_wrapping(source: &dyn MicSource, start: usize, frames: usize) -> Vec<f32> {
    let channels = source.channels();
    let clip = source.clip_frames();
    let mut out = vec![0.0; frames * channels];
    let first = frames.min(clip - start);
    source.read(start, &mut out[..first * channels]);
    if first < frames {
        source.read(0, &mut out[first * channels..]);
    }
    out
}
