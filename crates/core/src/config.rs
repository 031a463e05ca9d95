//! Construction-time configuration for a realtime session.

use crate::{audio::pcm::SERVICE_OUTPUT_SAMPLE_RATE, capture::CaptureConfig};
use openai_realtime::{
    AudioFormat, InputAudioTranscription, Modality, SessionConfig, TurnDetection,
};
use secrecy::SecretString;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "wss://api.openai.com/v1/realtime";
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";
pub const DEFAULT_VOICE: &str = "alloy";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Duration of audio batched into one `input_audio_buffer.append`.
pub const DEFAULT_CHUNK: Duration = Duration::from_millis(250);
/// Audio accumulated before the first capture cycle.
pub const DEFAULT_WARMUP: Duration = Duration::from_millis(150);
/// Cooperative wait when the microphone has nothing new.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Playback ring size, in seconds of service audio.
pub const DEFAULT_RING_SECONDS: u32 = 10;

/// Everything a session needs, supplied up front. Nothing is persisted.
#[derive(Debug)]
pub struct EngineConfig {
    pub endpoint: String,
    pub token: SecretString,
    pub model: String,
    pub voice: String,
    pub instructions: Option<String>,
    /// Commit and request a response when a user transcript completes.
    pub auto_response: bool,
    pub chunk_duration: Duration,
    /// Rate capture audio is converted to before it is sent. Service audio
    /// always arrives at [`SERVICE_OUTPUT_SAMPLE_RATE`].
    pub target_sample_rate: u32,
    pub transcription_model: Option<String>,
    pub turn_detection: Option<TurnDetection>,
    pub ring_seconds: u32,
    pub warmup: Duration,
    pub poll_interval: Duration,
}

impl EngineConfig {
    /// A configuration with the default endpoint, model and timings.
    pub fn new(token: SecretString) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token,
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            instructions: None,
            auto_response: false,
            chunk_duration: DEFAULT_CHUNK,
            target_sample_rate: SERVICE_OUTPUT_SAMPLE_RATE,
            transcription_model: Some(DEFAULT_TRANSCRIPTION_MODEL.to_string()),
            turn_detection: Some(TurnDetection::default()),
            ring_seconds: DEFAULT_RING_SECONDS,
            warmup: DEFAULT_WARMUP,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// The `session.update` payload sent right after connecting.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            input_audio_format: AudioFormat::Pcm16,
            output_audio_format: AudioFormat::Pcm16,
            turn_detection: self.turn_detection.clone(),
            input_audio_transcription: self
                .transcription_model
                .clone()
                .map(|model| InputAudioTranscription { model }),
            instructions: self.instructions.clone(),
            voice: self.voice.clone(),
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            chunk_duration: self.chunk_duration,
            warmup: self.warmup,
            poll_interval: self.poll_interval,
            target_sample_rate: self.target_sample_rate,
        }
    }

    /// Playback ring capacity in samples of service audio.
    pub fn ring_capacity(&self) -> usize {
        SERVICE_OUTPUT_SAMPLE_RATE as usize * self.ring_seconds.max(1) as usize
    }

    pub fn response_modalities(&self) -> Vec<Modality> {
        vec![Modality::Text, Modality::Audio]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new(SecretString::from("sk".to_string()));
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.target_sample_rate, 24_000);
        assert_eq!(config.chunk_duration, Duration::from_millis(250));
        assert_eq!(config.ring_capacity(), 240_000);
        assert!(!config.auto_response);
    }

    #[test]
    fn test_ring_capacity_ignores_capture_rate() {
        let mut config = EngineConfig::new(SecretString::from("sk".to_string()));
        config.target_sample_rate = 16_000;
        config.ring_seconds = 2;
        assert_eq!(config.ring_capacity(), 48_000);
        assert_eq!(config.capture_config().target_sample_rate, 16_000);
    }

    #[test]
    fn test_session_config_reflects_fields() {
        let mut config = EngineConfig::new(SecretString::from("sk".to_string()));
        config.voice = "verse".into();
        config.instructions = Some("Be brief.".into());
        config.transcription_model = None;

        let session = config.session_config();
        assert_eq!(session.voice, "verse");
        assert_eq!(session.instructions.as_deref(), Some("Be brief."));
        assert!(session.input_audio_transcription.is_none());
        assert_eq!(session.turn_detection, Some(TurnDetection::default()));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = EngineConfig::new(SecretString::from("sk-very-secret".to_string()));
        assert!(!format!("{:?}", config).contains("sk-very-secret"));
    }
}
