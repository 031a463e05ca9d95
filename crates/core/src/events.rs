//! Inbound event handling and the response state machine.
//!
//! The [`EventDispatcher`] is the single writer of [`SessionState`]. It runs
//! in the network context, processes events in arrival order, feeds decoded
//! audio straight into the playback ring, and reports everything else
//! through the [`Notifier`].

use crate::{
    audio::{PlaybackClock, PlaybackFeed, pcm},
    barge_in::{self, BargeInOutcome},
    dispatch::{Notification, Notifier},
};
use openai_realtime::{CommandSink, Modality, OutboundCommand, SendError, ServerEvent};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Per-connection state. Only the dispatcher mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// `session.created`/`session.updated` has been seen.
    pub ready: bool,
    pub response_in_flight: bool,
    pub active_item_id: Option<String>,
    /// Only meaningful while `active_item_id` is set.
    pub active_content_index: Option<u32>,
    /// Audio for this item is dropped on arrival.
    pub squelch_item_id: Option<String>,
}

/// Where the current response is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponsePhase {
    #[default]
    Idle,
    Created,
    /// Text and audio stream independently within one response.
    Streaming { text: bool, audio: bool },
}

/// Options that shape how the dispatcher reacts to the user's turn.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub auto_response: bool,
    pub modalities: Vec<Modality>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            auto_response: false,
            modalities: vec![Modality::Text, Modality::Audio],
        }
    }
}

pub struct EventDispatcher {
    state: SessionState,
    phase: ResponsePhase,
    assistant_text: String,
    user_text: String,
    options: DispatchOptions,
    sink: Arc<dyn CommandSink>,
    playback: PlaybackFeed,
    notifier: Notifier,
}

impl EventDispatcher {
    pub fn new(
        sink: Arc<dyn CommandSink>,
        playback: PlaybackFeed,
        notifier: Notifier,
        options: DispatchOptions,
    ) -> Self {
        Self {
            state: SessionState::default(),
            phase: ResponsePhase::Idle,
            assistant_text: String::new(),
            user_text: String::new(),
            options,
            sink,
            playback,
            notifier,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> ResponsePhase {
        self.phase
    }

    /// Accumulated assistant text for the current item.
    pub fn assistant_text(&self) -> &str {
        &self.assistant_text
    }

    pub fn playback_clock(&self) -> PlaybackClock {
        self.playback.clock()
    }

    /// Parses and handles one inbound JSON line. Malformed lines are logged
    /// and dropped.
    pub async fn handle_message(&mut self, line: &str) {
        match ServerEvent::parse(line) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => warn!(error = %e, "Dropping malformed inbound message."),
        }
    }

    pub async fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::SessionReady => {
                self.state.ready = true;
                self.notifier.notify(Notification::SessionReady);
            }
            ServerEvent::ResponseStarted => {
                self.state.response_in_flight = true;
                self.phase = ResponsePhase::Created;
                self.notifier.notify(Notification::ResponseStarted);
            }
            ServerEvent::ResponseFinished => {
                self.state.response_in_flight = false;
                self.phase = ResponsePhase::Idle;
                self.notifier.notify(Notification::ResponseFinished);
            }
            ServerEvent::OutputItemAdded { item_id } => {
                debug!(%item_id, "Output item started.");
                self.state.active_item_id = Some(item_id);
                self.state.active_content_index = None;
                self.state.squelch_item_id = None;
                self.assistant_text.clear();
                self.playback.begin_item();
            }
            ServerEvent::TextDelta { text } => {
                self.mark_streaming(true, false);
                self.assistant_text.push_str(&text);
                self.notifier.notify(Notification::AssistantText {
                    text: self.assistant_text.clone(),
                });
            }
            ServerEvent::TextDone { text } => {
                let mut full = std::mem::take(&mut self.assistant_text);
                if full.is_empty() {
                    full = text.unwrap_or_default();
                }
                self.notifier
                    .notify(Notification::AssistantTextDone { text: full });
            }
            ServerEvent::AudioDelta {
                item_id,
                content_index,
                audio,
            } => self.handle_audio_delta(item_id, content_index, &audio),
            ServerEvent::AudioDone => {
                trace!("Audio stream for item finished.");
            }
            ServerEvent::SpeechStarted => {
                self.notifier.notify(Notification::SpeechStarted);
            }
            ServerEvent::UserTranscriptDelta { text } => {
                self.user_text.push_str(&text);
                self.notifier.notify(Notification::UserTranscript {
                    text: self.user_text.clone(),
                });
            }
            ServerEvent::UserTranscriptDone { text } => {
                let accumulated = std::mem::take(&mut self.user_text);
                let full = if text.is_empty() { accumulated } else { text };
                self.notifier
                    .notify(Notification::UserTranscriptDone { text: full });
                if self.options.auto_response && !self.state.response_in_flight {
                    self.request_response().await;
                }
            }
            ServerEvent::ServerError { code, message } => {
                warn!(?code, %message, "Server reported an error.");
                self.notifier.notify(Notification::Error { code, message });
            }
            ServerEvent::Unknown { kind } => {
                trace!(%kind, "Ignoring unrecognised event.");
            }
        }
    }

    fn handle_audio_delta(
        &mut self,
        item_id: Option<String>,
        content_index: Option<u32>,
        audio: &str,
    ) {
        if item_id.is_some() && item_id == self.state.squelch_item_id {
            trace!(?item_id, "Dropping audio for interrupted item.");
            return;
        }
        if self.state.active_item_id.is_none() {
            self.state.active_item_id = item_id;
        }
        if content_index.is_some() {
            self.state.active_content_index = content_index;
        }

        let samples = match pcm::decode_base64(audio) {
            Ok(samples) => samples,
            Err(e) => {
                warn!(error = %e, "Skipping undecodable audio delta.");
                return;
            }
        };
        self.mark_streaming(false, true);
        self.playback.push(&samples);
        self.notifier.notify(Notification::AudioDelta { samples });
    }

    fn mark_streaming(&mut self, text: bool, audio: bool) {
        self.phase = match self.phase {
            ResponsePhase::Streaming {
                text: had_text,
                audio: had_audio,
            } => ResponsePhase::Streaming {
                text: had_text || text,
                audio: had_audio || audio,
            },
            _ => ResponsePhase::Streaming { text, audio },
        };
    }

    /// Commits the input buffer and asks for a response, in that order.
    async fn request_response(&mut self) {
        let commands = [
            OutboundCommand::CommitAudioBuffer,
            OutboundCommand::create_response(None, self.options.modalities.clone()),
        ];
        for command in commands {
            if let Err(e) = self.sink.send(command).await {
                self.report_send_failure(&e);
                return;
            }
        }
    }

    /// Interrupts the current response. See [`barge_in::execute`].
    ///
    /// `played_seconds` is how much of the active item the user heard; when
    /// `None`, the playback ring's own consumption is used.
    pub async fn barge_in(
        &mut self,
        played_seconds: Option<f64>,
    ) -> Result<BargeInOutcome, SendError> {
        let played = played_seconds.unwrap_or_else(|| self.playback.clock().played_seconds());
        let result = barge_in::execute(
            &mut self.state,
            self.sink.as_ref(),
            &mut self.playback,
            &self.notifier,
            played,
        )
        .await;
        // An interrupted item may never get its `done` event.
        self.assistant_text.clear();
        if let Err(e) = &result {
            self.report_send_failure(e);
        }
        result
    }

    fn report_send_failure(&self, error: &SendError) {
        warn!(error = %error, "Command failed to send.");
        self.notifier.notify(Notification::Error {
            code: None,
            message: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::playback_channel,
        dispatch::{MainThreadDispatcher, notification_channel},
    };
    use openai_realtime::MockCommandSink;

    fn dispatcher_with(sink: MockCommandSink) -> (EventDispatcher, MainThreadDispatcher) {
        let (feed, _output) = playback_channel(24_000, 24_000, 48_000);
        let (notifier, mailbox) = notification_channel();
        let dispatcher = EventDispatcher::new(
            Arc::new(sink),
            feed,
            notifier,
            DispatchOptions::default(),
        );
        (dispatcher, mailbox)
    }

    fn drain(mailbox: &mut MainThreadDispatcher) -> Vec<Notification> {
        let mut out = Vec::new();
        mailbox.drain(|n| out.push(n));
        out
    }

    #[tokio::test]
    async fn test_response_lifecycle_transitions() {
        let (mut dispatcher, mut mailbox) = dispatcher_with(MockCommandSink::new());
        assert_eq!(dispatcher.phase(), ResponsePhase::Idle);

        dispatcher.handle_event(ServerEvent::ResponseStarted).await;
        assert!(dispatcher.state().response_in_flight);
        assert_eq!(dispatcher.phase(), ResponsePhase::Created);

        dispatcher
            .handle_event(ServerEvent::TextDelta { text: "a".into() })
            .await;
        assert_eq!(
            dispatcher.phase(),
            ResponsePhase::Streaming {
                text: true,
                audio: false
            }
        );

        dispatcher.handle_event(ServerEvent::ResponseFinished).await;
        assert!(!dispatcher.state().response_in_flight);
        assert_eq!(dispatcher.phase(), ResponsePhase::Idle);

        assert_eq!(
            drain(&mut mailbox),
            vec![
                Notification::ResponseStarted,
                Notification::AssistantText { text: "a".into() },
                Notification::ResponseFinished,
            ]
        );
    }

    #[tokio::test]
    async fn test_output_item_resets_item_state() {
        let (mut dispatcher, _mailbox) = dispatcher_with(MockCommandSink::new());
        dispatcher.state.squelch_item_id = Some("old".into());
        dispatcher.state.active_content_index = Some(3);

        dispatcher
            .handle_message(r#"{"type":"response.output_item.added","item":{"id":"item9"}}"#)
            .await;
        assert_eq!(dispatcher.state().active_item_id.as_deref(), Some("item9"));
        assert_eq!(dispatcher.state().active_content_index, None);
        assert_eq!(dispatcher.state().squelch_item_id, None);
    }

    #[tokio::test]
    async fn test_text_done_without_deltas_uses_event_text() {
        let (mut dispatcher, mut mailbox) = dispatcher_with(MockCommandSink::new());
        dispatcher
            .handle_event(ServerEvent::TextDone {
                text: Some("whole".into()),
            })
            .await;
        assert_eq!(
            drain(&mut mailbox),
            vec![Notification::AssistantTextDone {
                text: "whole".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_server_error_keeps_lifecycle_state() {
        let (mut dispatcher, mut mailbox) = dispatcher_with(MockCommandSink::new());
        dispatcher.handle_event(ServerEvent::ResponseStarted).await;
        dispatcher
            .handle_message(r#"{"type":"error","error":{"code":"x","message":"boom"}}"#)
            .await;
        assert!(dispatcher.state().response_in_flight);
        assert_eq!(
            drain(&mut mailbox).last(),
            Some(&Notification::Error {
                code: Some("x".into()),
                message: "boom".into()
            })
        );
    }

    #[tokio::test]
    async fn test_malformed_and_undecodable_messages_are_isolated() {
        let (mut dispatcher, mut mailbox) = dispatcher_with(MockCommandSink::new());
        dispatcher.handle_message("{truncated").await;
        dispatcher
            .handle_message(r#"{"type":"response.audio.delta","item_id":"i","delta":"%%%"}"#)
            .await;
        dispatcher
            .handle_message(r#"{"type":"response.text.delta","delta":"ok"}"#)
            .await;
        assert_eq!(
            drain(&mut mailbox),
            vec![Notification::AssistantText { text: "ok".into() }]
        );
    }

    #[tokio::test]
    async fn test_unknown_events_are_ignored() {
        let (mut dispatcher, mut mailbox) = dispatcher_with(MockCommandSink::new());
        let before = dispatcher.state().clone();
        dispatcher
            .handle_message(r#"{"type":"rate_limits.updated","rate_limits":[]}"#)
            .await;
        assert_eq!(dispatcher.state(), &before);
        assert!(drain(&mut mailbox).is_empty());
    }

    #[tokio::test]
    async fn test_audio_delta_records_content_index() {
        let (mut dispatcher, mut mailbox) = dispatcher_with(MockCommandSink::new());
        dispatcher
            .handle_event(ServerEvent::OutputItemAdded {
                item_id: "item1".into(),
            })
            .await;
        dispatcher
            .handle_event(ServerEvent::AudioDelta {
                item_id: Some("item1".into()),
                content_index: Some(2),
                audio: pcm::encode_base64(&[0.25, -0.25]),
            })
            .await;
        assert_eq!(dispatcher.state().active_content_index, Some(2));
        match drain(&mut mailbox).as_slice() {
            [Notification::AudioDelta { samples }] => assert_eq!(samples.len(), 2),
            other => panic!("unexpected notifications: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_interrupted_text_does_not_leak_into_next_item() {
        let mut sink = MockCommandSink::new();
        sink.expect_send().returning(|_| Ok(()));
        let (mut dispatcher, mut mailbox) = dispatcher_with(sink);

        dispatcher.handle_event(ServerEvent::ResponseStarted).await;
        dispatcher
            .handle_event(ServerEvent::OutputItemAdded {
                item_id: "item1".into(),
            })
            .await;
        dispatcher
            .handle_event(ServerEvent::TextDelta { text: "Hel".into() })
            .await;
        dispatcher.barge_in(Some(0.1)).await.unwrap();
        assert_eq!(dispatcher.assistant_text(), "");

        dispatcher.handle_event(ServerEvent::ResponseFinished).await;
        dispatcher.handle_event(ServerEvent::ResponseStarted).await;
        dispatcher
            .handle_event(ServerEvent::OutputItemAdded {
                item_id: "item2".into(),
            })
            .await;
        dispatcher
            .handle_event(ServerEvent::TextDelta { text: "Bye".into() })
            .await;

        let last_text = drain(&mut mailbox)
            .into_iter()
            .filter(|n| matches!(n, Notification::AssistantText { .. }))
            .last();
        assert_eq!(
            last_text,
            Some(Notification::AssistantText { text: "Bye".into() })
        );
    }

    #[tokio::test]
    async fn test_new_item_starts_with_empty_text() {
        let (mut dispatcher, _mailbox) = dispatcher_with(MockCommandSink::new());
        dispatcher
            .handle_event(ServerEvent::TextDelta {
                text: "left over".into(),
            })
            .await;
        dispatcher
            .handle_event(ServerEvent::OutputItemAdded {
                item_id: "item2".into(),
            })
            .await;
        assert_eq!(dispatcher.assistant_text(), "");
    }

    #[tokio::test]
    async fn test_auto_response_failure_is_reported() {
        let mut sink = MockCommandSink::new();
        sink.expect_send()
            .times(1)
            .returning(|_| Err(SendError::NotConnected));
        let (feed, _output) = playback_channel(1_000, 24_000, 24_000);
        let (notifier, mut mailbox) = notification_channel();
        let mut dispatcher = EventDispatcher::new(
            Arc::new(sink),
            feed,
            notifier,
            DispatchOptions {
                auto_response: true,
                ..Default::default()
            },
        );

        dispatcher
            .handle_event(ServerEvent::UserTranscriptDone { text: "hi".into() })
            .await;
        let notifications = drain(&mut mailbox);
        assert_eq!(
            notifications[0],
            Notification::UserTranscriptDone { text: "hi".into() }
        );
        assert!(matches!(notifications[1], Notification::Error { .. }));
    }
}
