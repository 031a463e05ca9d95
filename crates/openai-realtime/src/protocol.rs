//! Wire types for the realtime speech-to-speech protocol.
//!
//! Only the subset needed for the session lifecycle and the audio path is
//! modelled. Outbound commands serialize to one JSON object each; inbound
//! messages are parsed into [`ServerEvent`], with unrecognised event types
//! mapped to [`ServerEvent::Unknown`].

use serde::{Deserialize, Serialize};

// --- Outbound ---

/// Audio sample format used on both directions of the wire.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// 16-bit signed little-endian PCM, mono.
    #[default]
    Pcm16,
}

/// Output modalities requested for a response.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
}

/// Server-side voice activity detection parameters.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self {
            kind: "server_vad".to_string(),
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

/// Model used to transcribe the user's input audio.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct InputAudioTranscription {
    pub model: String,
}

/// Session parameters sent with `session.update` right after connecting.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub input_audio_format: AudioFormat,
    pub output_audio_format: AudioFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub voice: String,
}

/// Parameters for `response.create`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ResponseConfig {
    pub modalities: Vec<Modality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// A command sent from the client to the service.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum OutboundCommand {
    #[serde(rename = "session.update")]
    UpdateSession { session: SessionConfig },
    /// Appends base64 PCM16 audio to the server's input buffer.
    #[serde(rename = "input_audio_buffer.append")]
    AppendAudio { audio: String },
    #[serde(rename = "input_audio_buffer.commit")]
    CommitAudioBuffer,
    #[serde(rename = "response.cancel")]
    CancelResponse,
    /// Tells the server how much of an assistant item the user actually heard.
    #[serde(rename = "conversation.item.truncate")]
    TruncateItem {
        item_id: String,
        content_index: u32,
        audio_end_ms: u32,
    },
    #[serde(rename = "response.create")]
    CreateResponse { response: ResponseConfig },
}

impl OutboundCommand {
    /// Builds a `response.create` command.
    pub fn create_response(instructions: Option<String>, modalities: Vec<Modality>) -> Self {
        Self::CreateResponse {
            response: ResponseConfig {
                modalities,
                instructions,
            },
        }
    }

    /// The wire `type` string, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpdateSession { .. } => "session.update",
            Self::AppendAudio { .. } => "input_audio_buffer.append",
            Self::CommitAudioBuffer => "input_audio_buffer.commit",
            Self::CancelResponse => "response.cancel",
            Self::TruncateItem { .. } => "conversation.item.truncate",
            Self::CreateResponse { .. } => "response.create",
        }
    }

    /// Serializes the command into a single JSON text message.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// --- Inbound ---

/// Errors produced when an inbound message does not have the expected shape.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event `{kind}` is missing field `{field}`")]
    MissingField { kind: String, field: &'static str },
}

/// A typed event received from the service.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    SessionReady,
    ResponseStarted,
    ResponseFinished,
    OutputItemAdded {
        item_id: String,
    },
    TextDelta {
        text: String,
    },
    TextDone {
        text: Option<String>,
    },
    /// Base64 PCM16 audio for one content part of an output item.
    AudioDelta {
        item_id: Option<String>,
        content_index: Option<u32>,
        audio: String,
    },
    AudioDone,
    SpeechStarted,
    UserTranscriptDelta {
        text: String,
    },
    UserTranscriptDone {
        text: String,
    },
    ServerError {
        code: Option<String>,
        message: String,
    },
    Unknown {
        kind: String,
    },
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    delta: Option<String>,
    text: Option<String>,
    transcript: Option<String>,
    item_id: Option<String>,
    content_index: Option<u32>,
    item: Option<RawItem>,
    error: Option<RawError>,
}

#[derive(Deserialize)]
struct RawItem {
    id: Option<String>,
}

#[derive(Deserialize)]
struct RawError {
    code: Option<String>,
    message: Option<String>,
}

impl ServerEvent {
    /// Parses one inbound JSON object.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let raw: RawEvent = serde_json::from_str(line)?;
        let missing = |field| ParseError::MissingField {
            kind: raw.kind.clone(),
            field,
        };

        let event = match raw.kind.as_str() {
            "session.created" | "session.updated" => Self::SessionReady,
            "response.created" => Self::ResponseStarted,
            "response.completed" | "response.done" => Self::ResponseFinished,
            "response.output_item.added" => Self::OutputItemAdded {
                item_id: raw
                    .item
                    .as_ref()
                    .and_then(|item| item.id.clone())
                    .ok_or_else(|| missing("item.id"))?,
            },
            "response.audio_transcript.delta"
            | "response.output_text.delta"
            | "response.text.delta" => Self::TextDelta {
                text: raw.delta.clone().ok_or_else(|| missing("delta"))?,
            },
            "response.audio_transcript.done"
            | "response.output_text.done"
            | "response.text.done" => Self::TextDone {
                text: raw.transcript.clone().or_else(|| raw.text.clone()),
            },
            "response.output_audio.delta" | "response.audio.delta" => Self::AudioDelta {
                item_id: raw.item_id.clone(),
                content_index: raw.content_index,
                audio: raw.delta.clone().ok_or_else(|| missing("delta"))?,
            },
            "response.output_audio.done" | "response.audio.done" => Self::AudioDone,
            "input_audio_buffer.speech_started" => Self::SpeechStarted,
            "conversation.item.input_audio_transcription.delta" => Self::UserTranscriptDelta {
                text: raw.delta.clone().ok_or_else(|| missing("delta"))?,
            },
            "conversation.item.input_audio_transcription.completed" => Self::UserTranscriptDone {
                text: raw
                    .transcript
                    .clone()
                    .or_else(|| raw.text.clone())
                    .ok_or_else(|| missing("transcript"))?,
            },
            "error" => {
                let error = raw.error.as_ref();
                Self::ServerError {
                    code: error.and_then(|e| e.code.clone()),
                    message: error
                        .and_then(|e| e.message.clone())
                        .unwrap_or_else(|| "unspecified server error".to_string()),
                }
            }
            _ => Self::Unknown {
                kind: raw.kind.clone(),
            },
        };
        Ok(event)
    }
}
