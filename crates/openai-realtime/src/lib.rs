//! Client side of the realtime speech-to-speech protocol.
//!
//! - `protocol`: outbound commands and inbound server events.
//! - `framing`: reassembly of fragmented messages and newline splitting.
//! - `transport`: the WebSocket connection and the serialized send lane.

pub mod error;
pub mod framing;
pub mod protocol;
pub mod transport;

pub use error::{CloseReason, ConnectError, SendError};
pub use protocol::{
    AudioFormat, InputAudioTranscription, Modality, OutboundCommand, ParseError, ResponseConfig,
    ServerEvent, SessionConfig, TurnDetection,
};
pub use transport::{CommandSink, Inbound, RealtimeReceiver, RealtimeSender, connect};

#[cfg(any(test, feature = "mock"))]
pub use transport::MockCommandSink;
