//! Error types for the realtime engine.

pub use openai_realtime::{ConnectError, SendError};

/// A single audio payload could not be decoded. Isolated to that message.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid base64 audio: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("PCM16 payload has an odd byte count ({0})")]
    OddByteCount(usize),
}

/// Failures inside the capture pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to build capture resampler: {0}")]
    ResamplerSetup(#[from] rubato::ResamplerConstructionError),
    #[error("capture resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
    #[error("capture is already running")]
    AlreadyRunning,
}

/// Errors surfaced by the session facade.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("session is closed")]
    Closed,
}
