//! Conversions between PCM16 little-endian bytes, base64 text, and normalized
//! `f32` samples.

use crate::error::CodecError;
use base64::Engine;

/// Sample rate of the audio the service sends back.
pub const SERVICE_OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Full-scale value used for both directions, so that
/// `decode(encode(x))` stays within one quantization step of `x`.
const FULL_SCALE: f32 = i16::MAX as f32;

/// Converts normalized samples to PCM16 little-endian bytes.
///
/// Samples are clamped to `[-1, 1]`; NaN encodes as silence.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = if sample.is_nan() {
            0.0
        } else {
            sample.clamp(-1.0, 1.0)
        };
        let v = (clamped * FULL_SCALE).round() as i16;
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Converts PCM16 little-endian bytes to normalized samples.
///
/// A trailing odd byte is ignored.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| {
            let v = i16::from_le_bytes([chunk[0], chunk[1]]);
            (v as f32 / FULL_SCALE).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Encodes normalized samples as base64 PCM16, the wire format for input audio.
pub fn encode_base64(samples: &[f32]) -> String {
    base64::engine::general_purpose::STANDARD.encode(encode_pcm16(samples))
}

/// Decodes a base64 PCM16 fragment into normalized samples.
pub fn decode_base64(fragment: &str) -> Result<Vec<f32>, CodecError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(fragment)?;
    if bytes.len() % 2 != 0 {
        return Err(CodecError::OddByteCount(bytes.len()));
    }
    Ok(decode_pcm16(&bytes))
}

/// Averages interleaved frames down to mono. Accumulates in `f64`.
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| {
            let sum: f64 = frame.iter().map(|&s| f64::from(s)).sum();
            (sum / channels as f64) as f32
        })
        .collect()
}
