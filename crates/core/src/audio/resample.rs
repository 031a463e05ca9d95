//! Sample-rate conversion for the playback path.
//!
//! Both strategies are zero-order-hold: they only ever repeat source samples,
//! which keeps the per-sample cost constant and allocation-free inside the
//! audio-output callback. Good enough for speech, not for general audio.

/// Converts a pulled stream of source-rate samples into destination-rate
/// samples.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackResampler {
    /// Destination is exactly twice the source rate: every source sample is
    /// emitted twice.
    Double { hold: f32, repeat_next: bool },
    /// Any other ratio: accumulate `step = src / dst` per output sample and
    /// pull a new source sample whenever the credit runs out.
    Hold { step: f64, credit: f64, hold: f32 },
}

impl PlaybackResampler {
    /// Picks the strategy for the given rates.
    pub fn new(src_rate: u32, dst_rate: u32) -> Self {
        if u64::from(dst_rate) == u64::from(src_rate) * 2 {
            Self::Double {
                hold: 0.0,
                repeat_next: false,
            }
        } else {
            Self::Hold {
                step: f64::from(src_rate) / f64::from(dst_rate.max(1)),
                credit: 0.0,
                hold: 0.0,
            }
        }
    }

    /// Produces one destination sample, calling `pull` for source samples as
    /// needed. A `None` from `pull` is treated as silence.
    #[inline]
    pub fn next_sample(&mut self, mut pull: impl FnMut() -> Option<f32>) -> f32 {
        match self {
            Self::Double { hold, repeat_next } => {
                if !*repeat_next {
                    *hold = pull().unwrap_or(0.0);
                }
                *repeat_next = !*repeat_next;
                *hold
            }
            Self::Hold { step, credit, hold } => {
                while *credit <= 0.0 {
                    *hold = pull().unwrap_or(0.0);
                    *credit += 1.0;
                }
                *credit -= *step;
                *hold
            }
        }
    }

    /// Forgets the held sample, so output after a flush starts from silence.
    pub fn reset(&mut self) {
        match self {
            Self::Double { hold, repeat_next } => {
                *hold = 0.0;
                *repeat_next = false;
            }
            Self::Hold { credit, hold, .. } => {
                *credit = 0.0;
                *hold = 0.0;
            }
        }
    }
}
