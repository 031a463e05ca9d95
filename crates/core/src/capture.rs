//! Microphone capture → PCM16 → `input_audio_buffer.append`.
//!
//! One pipeline runs per recording session in its own task. Each cycle reads
//! whatever the microphone clip has accumulated (up to one chunk), downmixes
//! it to mono, converts it to the wire rate, and sends it. The loop yields
//! cooperatively when there is nothing to read.

use crate::{
    audio::{
        MicSource,
        convert::StreamResampler,
        mic::{available_frames, read_wrapping},
        pcm,
    },
    dispatch::{Notification, Notifier},
    error::CaptureError,
};
use openai_realtime::{CommandSink, OutboundCommand};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Timing parameters for the capture loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub chunk_duration: Duration,
    pub warmup: Duration,
    pub poll_interval: Duration,
    pub target_sample_rate: u32,
}

/// Totals reported when a capture loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub chunks_sent: u64,
    pub frames_read: u64,
    pub send_failures: u64,
}

pub struct CapturePipeline {
    source: Arc<dyn MicSource>,
    sink: Arc<dyn CommandSink>,
    notifier: Option<Notifier>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    config: CaptureConfig,
    resampler: Option<StreamResampler>,
    read_pos: usize,
    chunk_frames: usize,
    warmup_frames: usize,
    stats: CaptureStats,
}

impl CapturePipeline {
    /// Builds a pipeline that starts reading from the clip's current write
    /// position. Chunk and warm-up sizes use the device's true rate.
    pub fn new(
        source: Arc<dyn MicSource>,
        sink: Arc<dyn CommandSink>,
        connected: Arc<AtomicBool>,
        cancel: CancellationToken,
        config: CaptureConfig,
    ) -> Result<Self, CaptureError> {
        let device_rate = source.sample_rate();
        let resampler = if device_rate != config.target_sample_rate {
            Some(StreamResampler::new(device_rate, config.target_sample_rate)?)
        } else {
            None
        };
        let frames_for = |d: Duration| ((f64::from(device_rate) * d.as_secs_f64()) as usize).max(1);
        // At most `clip_frames - 1` frames are ever readable.
        let warmup_frames = frames_for(config.warmup).min(source.clip_frames().saturating_sub(1));
        Ok(Self {
            read_pos: source.write_position(),
            chunk_frames: frames_for(config.chunk_duration),
            warmup_frames,
            source,
            sink,
            notifier: None,
            connected,
            cancel,
            config,
            resampler,
            stats: CaptureStats::default(),
        })
    }

    /// Reports send failures to the consumer as non-fatal errors.
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn chunk_frames(&self) -> usize {
        self.chunk_frames
    }

    /// Spawns the loop on the current runtime.
    pub fn spawn(self) -> CaptureHandle {
        let cancel = self.cancel.clone();
        let task = tokio::spawn(self.run());
        CaptureHandle { cancel, task }
    }

    /// Runs until cancelled or disconnected.
    pub async fn run(mut self) -> CaptureStats {
        info!(
            device_rate = self.source.sample_rate(),
            channels = self.source.channels(),
            chunk_frames = self.chunk_frames,
            "Capture started."
        );

        while self.available() < self.warmup_frames {
            if !self.pause().await {
                return self.finish();
            }
        }

        let mut ticker = tokio::time::interval(self.config.chunk_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            if self.stopped() {
                break;
            }
            let available = self.available();
            if available == 0 {
                if !self.pause().await {
                    break;
                }
                continue;
            }
            match self.send_cycle().await {
                Ok(_) => {}
                Err(e) if e.is_closed() => break,
                Err(_) => {}
            }
            // Backlog is drained immediately; otherwise wait for the cadence.
            if available <= self.chunk_frames {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
            }
        }
        self.finish()
    }

    /// Reads up to one chunk, encodes it, and sends it. Returns the number of
    /// frames consumed. The read cursor advances even if the send fails, so a
    /// failed chunk is dropped rather than resent late.
    pub async fn send_cycle(&mut self) -> Result<usize, openai_realtime::SendError> {
        let clip_frames = self.source.clip_frames();
        let frames = self.available().min(self.chunk_frames);
        if frames == 0 {
            return Ok(0);
        }

        let interleaved = read_wrapping(self.source.as_ref(), self.read_pos, frames);
        self.read_pos = (self.read_pos + frames) % clip_frames;
        self.stats.frames_read += frames as u64;

        let mono = pcm::downmix_to_mono(&interleaved, self.source.channels());
        let wire = match self.resampler.as_mut() {
            Some(resampler) => match resampler.process(&mono) {
                Ok(converted) => converted,
                Err(e) => {
                    warn!(error = %e, "Dropping capture chunk that failed to resample.");
                    return Ok(frames);
                }
            },
            None => mono,
        };
        if wire.is_empty() {
            return Ok(frames);
        }

        let audio = pcm::encode_base64(&wire);
        match self.sink.send(OutboundCommand::AppendAudio { audio }).await {
            Ok(()) => {
                self.stats.chunks_sent += 1;
                debug!(frames, samples = wire.len(), "Sent capture chunk.");
                Ok(frames)
            }
            Err(e) => {
                self.stats.send_failures += 1;
                warn!(error = %e, "Failed to send capture chunk.");
                if let Some(notifier) = &self.notifier {
                    if !e.is_closed() {
                        notifier.notify(Notification::Error {
                            code: None,
                            message: e.to_string(),
                        });
                    }
                }
                Err(e)
            }
        }
    }

    fn available(&self) -> usize {
        available_frames(
            self.source.write_position(),
            self.read_pos,
            self.source.clip_frames(),
        )
    }

    fn stopped(&self) -> bool {
        self.cancel.is_cancelled() || !self.connected.load(Ordering::Acquire)
    }

    /// Cooperative wait. Returns `false` if the loop should stop.
    async fn pause(&self) -> bool {
        if self.stopped() {
            return false;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.poll_interval) => !self.stopped(),
        }
    }

    fn finish(self) -> CaptureStats {
        info!(
            chunks = self.stats.chunks_sent,
            frames = self.stats.frames_read,
            failures = self.stats.send_failures,
            "Capture stopped."
        );
        self.stats
    }
}

/// Handle to a running capture loop.
pub struct CaptureHandle {
    cancel: CancellationToken,
    task: JoinHandle<CaptureStats>,
}

impl CaptureHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the loop after any in-flight send and returns its totals.
    pub async fn stop(self) -> CaptureStats {
        self.cancel.cancel();
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Capture task did not finish cleanly.");
                CaptureStats::default()
            }
        }
    }
}
