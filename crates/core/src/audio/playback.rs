//! The receive side of the audio path: decoded service audio goes into the
//! ring through a [`PlaybackFeed`], and the platform's output callback pulls
//! it back out through a [`PlaybackOutput`].

use super::{
    resample::PlaybackResampler,
    ring::{RingMonitor, RingReader, RingWriter, sample_ring},
};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Creates the two ends of the playback path.
///
/// `capacity` is in source-rate samples.
pub fn playback_channel(
    capacity: usize,
    source_rate: u32,
    device_rate: u32,
) -> (PlaybackFeed, PlaybackOutput) {
    let (writer, reader) = sample_ring(capacity);
    let clock = PlaybackClock {
        monitor: writer.monitor(),
        item_start: Arc::new(AtomicU64::new(0)),
        source_rate,
    };
    (
        PlaybackFeed { writer, clock },
        PlaybackOutput {
            monitor: reader.monitor(),
            reader,
            resampler: PlaybackResampler::new(source_rate, device_rate),
            clears_seen: 0,
        },
    )
}

/// Writer end, owned by the event dispatcher.
pub struct PlaybackFeed {
    writer: RingWriter,
    clock: PlaybackClock,
}

impl PlaybackFeed {
    /// Queues decoded samples. Returns how many fit.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        self.writer.push(samples)
    }

    /// Marks the current write position as the start of a new output item.
    pub fn begin_item(&self) {
        self.clock
            .item_start
            .store(self.writer.monitor().written(), Ordering::Release);
    }

    /// Discards everything queued so far.
    pub fn flush(&self) {
        self.writer.monitor().request_clear();
    }

    /// Whether any samples are still waiting to be played.
    pub fn has_pending(&self) -> bool {
        let monitor = self.writer.monitor();
        monitor.drained() < monitor.written()
    }

    pub fn clock(&self) -> PlaybackClock {
        self.clock.clone()
    }

    pub fn monitor(&self) -> RingMonitor {
        self.writer.monitor()
    }
}

/// Seconds of the current output item that the output callback has pulled.
#[derive(Clone, Debug)]
pub struct PlaybackClock {
    monitor: RingMonitor,
    item_start: Arc<AtomicU64>,
    source_rate: u32,
}

impl PlaybackClock {
    pub fn played_seconds(&self) -> f64 {
        let start = self.item_start.load(Ordering::Acquire);
        let played = self.monitor.drained().saturating_sub(start);
        played as f64 / f64::from(self.source_rate.max(1))
    }
}

/// Reader end, driven by the platform's audio-output callback.
pub struct PlaybackOutput {
    reader: RingReader,
    monitor: RingMonitor,
    resampler: PlaybackResampler,
    clears_seen: u64,
}

impl PlaybackOutput {
    /// Fills an interleaved device buffer and returns the number of samples
    /// written. Every channel of a frame gets the same mono sample; missing
    /// data is silence. Never blocks and never allocates.
    pub fn fill(&mut self, out: &mut [f32], channels: usize) -> usize {
        let channels = channels.max(1);
        let clears = self.monitor.clears();
        if clears != self.clears_seen {
            self.clears_seen = clears;
            self.resampler.reset();
        }

        let reader = &mut self.reader;
        let mut written = 0;
        for frame in out.chunks_exact_mut(channels) {
            let sample = self.resampler.next_sample(|| reader.pop_one());
            frame.fill(sample);
            written += channels;
        }
        written
    }

    /// Samples waiting in the ring, at the source rate.
    pub fn queued(&self) -> usize {
        self.reader.occupied()
    }
}
