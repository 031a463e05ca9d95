//! Realtime voice-assistant streaming engine.
//!
//! Microphone audio is captured, encoded and streamed to a speech-to-speech
//! service; the service's text and audio come back through the event
//! dispatcher, audio into a lock-free playback ring and everything else into
//! a mailbox the host drains on its own thread. The user can interrupt
//! (barge in) at any point.

pub mod audio;
pub mod barge_in;
pub mod capture;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod session;

pub use audio::{LoopingClip, MicSource, PlaybackClock, PlaybackOutput};
pub use barge_in::{BargeInOutcome, Truncation};
pub use capture::{CaptureConfig, CaptureStats};
pub use config::EngineConfig;
pub use dispatch::{MainThreadDispatcher, Notification, Notifier, notification_channel};
pub use error::{CaptureError, CodecError, SessionError};
pub use events::{EventDispatcher, SessionState};
pub use session::{InboundSource, RealtimeSession};
