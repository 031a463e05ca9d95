//! Capture-side rate conversion from the microphone's true rate to the wire
//! rate. Runs in the capture context, where allocation is allowed, so it
//! uses a proper polynomial resampler rather than the playback hold.

use crate::error::CaptureError;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Input frames handed to the resampler per call.
const CHUNK_FRAMES: usize = 480;

/// Creates a mono resampler between two rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> Result<FastFixedIn<f32>, CaptureError> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Feeds arbitrary-length mono blocks through a fixed-chunk resampler,
/// carrying leftover input between calls so chunk boundaries do not click.
pub struct StreamResampler {
    inner: FastFixedIn<f32>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(in_rate: u32, out_rate: u32) -> Result<Self, CaptureError> {
        Ok(Self {
            inner: create_resampler(f64::from(in_rate), f64::from(out_rate), CHUNK_FRAMES)?,
            pending: Vec::with_capacity(CHUNK_FRAMES * 2),
        })
    }

    /// Converts as much of `input` (plus carried-over samples) as forms whole
    /// chunks. The remainder waits for the next call.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>, CaptureError> {
        self.pending.extend_from_slice(input);
        let mut output = Vec::new();
        loop {
            let needed = self.inner.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let block = self.inner.process(&[&self.pending[..needed]], None)?;
            if let Some(channel) = block.first() {
                output.extend_from_slice(channel);
            }
            self.pending.drain(..needed);
        }
        Ok(output)
    }
}
