//! Platform audio via cpal: the microphone records into a looping clip, the
//! speaker callback pulls from the engine's playback output.

use anyhow::{Context, bail};
use cpal::{
    SampleFormat, Stream, SupportedStreamConfig,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use std::sync::Arc;
use tracing::{error, info};
use voxlane_core::{LoopingClip, PlaybackOutput};

fn on_stream_error(err: cpal::StreamError) {
    error!(error = %err, "Audio stream error.");
}

/// The default input device, recording continuously while this is alive.
pub struct Microphone {
    _stream: Stream,
    clip: Arc<LoopingClip>,
}

impl Microphone {
    pub fn open_default(clip_seconds: u32) -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .context("No default input device available")?;
        let supported = device
            .default_input_config()
            .context("Failed to get input device config")?;

        // The device may not honour a requested rate, so size everything from
        // what it reports.
        let sample_rate = supported.sample_rate().0;
        let channels = usize::from(supported.channels());
        let clip = Arc::new(LoopingClip::new(sample_rate, channels, clip_seconds));
        let writer = clip.clone();
        let config = supported.config();

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| writer.write(data),
                on_stream_error,
                None,
            )?,
            SampleFormat::I16 => {
                let mut scratch: Vec<f32> = Vec::with_capacity(8192);
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        scratch.clear();
                        scratch.extend(data.iter().map(|s| f32::from(*s) / 32768.0));
                        writer.write(&scratch);
                    },
                    on_stream_error,
                    None,
                )?
            }
            other => bail!("Unsupported input sample format: {:?}", other),
        };
        stream.play().context("Failed to start input stream")?;
        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate,
            channels,
            "Microphone started."
        );

        Ok(Self {
            _stream: stream,
            clip,
        })
    }

    pub fn clip(&self) -> Arc<LoopingClip> {
        self.clip.clone()
    }
}

/// The default output device, before its stream is started.
pub struct Speaker {
    device: cpal::Device,
    supported: SupportedStreamConfig,
}

impl Speaker {
    pub fn open_default() -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("No default output device available")?;
        let supported = device
            .default_output_config()
            .context("Failed to get output device config")?;
        Ok(Self { device, supported })
    }

    pub fn sample_rate(&self) -> u32 {
        self.supported.sample_rate().0
    }

    /// Starts the output stream. The callback only drains `output`.
    pub fn start(self, mut output: PlaybackOutput) -> anyhow::Result<Stream> {
        let channels = usize::from(self.supported.channels());
        let config = self.supported.config();

        let stream = match self.supported.sample_format() {
            SampleFormat::F32 => self.device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    output.fill(data, channels);
                },
                on_stream_error,
                None,
            )?,
            SampleFormat::I16 => {
                // Grows to the device's buffer size once, then is reused.
                let mut scratch: Vec<f32> = Vec::with_capacity(8192);
                self.device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        if scratch.len() < data.len() {
                            scratch.resize(data.len(), 0.0);
                        }
                        let frame = &mut scratch[..data.len()];
                        output.fill(frame, channels);
                        for (out, sample) in data.iter_mut().zip(frame.iter()) {
                            *out = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
                        }
                    },
                    on_stream_error,
                    None,
                )?
            }
            other => bail!("Unsupported output sample format: {:?}", other),
        };
        stream.play().context("Failed to start output stream")?;
        info!(
            device = %self.device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate = self.sample_rate(),
            channels,
            "Speaker started."
        );
        Ok(stream)
    }
}
