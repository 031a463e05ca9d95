//! Shared harness for the engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use openai_realtime::{CommandSink, Inbound, OutboundCommand, SendError};
use secrecy::SecretString;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::mpsc;
use voxlane_core::{
    EngineConfig, MainThreadDispatcher, Notification, PlaybackOutput, RealtimeSession,
    audio::pcm, notification_channel,
};

/// Records every command in the order the lane accepted it. Optionally
/// yields inside `send` so concurrent callers interleave.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<OutboundCommand>>,
    yield_inside: bool,
}

impl RecordingSink {
    pub fn interleaving() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            yield_inside: true,
        }
    }

    pub fn sent(&self) -> Vec<OutboundCommand> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent().iter().map(OutboundCommand::kind).collect()
    }

    /// Commands after the initial `session.update`.
    pub fn after_setup(&self) -> Vec<OutboundCommand> {
        self.sent()
            .into_iter()
            .filter(|c| !matches!(c, OutboundCommand::UpdateSession { .. }))
            .collect()
    }
}

#[async_trait]
impl CommandSink for RecordingSink {
    async fn send(&self, command: OutboundCommand) -> Result<(), SendError> {
        if self.yield_inside {
            tokio::task::yield_now().await;
        }
        self.sent.lock().unwrap().push(command);
        Ok(())
    }
}

pub struct Harness {
    pub session: RealtimeSession,
    pub output: PlaybackOutput,
    pub sink: Arc<RecordingSink>,
    pub inbound: mpsc::UnboundedSender<Inbound>,
    pub mailbox: MainThreadDispatcher,
}

impl Harness {
    pub async fn start(config: EngineConfig, sink: RecordingSink) -> Self {
        let sink = Arc::new(sink);
        let (inbound, rx) = mpsc::unbounded_channel();
        let (notifier, mailbox) = notification_channel();
        let (session, output) =
            RealtimeSession::with_transport(&config, sink.clone(), rx, 48_000, notifier)
                .await
                .unwrap();
        Self {
            session,
            output,
            sink,
            inbound,
            mailbox,
        }
    }

    pub async fn default() -> Self {
        Self::start(config(), RecordingSink::default()).await
    }

    pub fn push(&self, lines: &[String]) {
        self.inbound.send(Inbound::Events(lines.to_vec())).unwrap();
    }

    /// Waits for a notification matching `want`, collecting everything seen
    /// on the way (including the match).
    pub async fn collect_until(
        &mut self,
        want: impl Fn(&Notification) -> bool,
    ) -> Vec<Notification> {
        let mailbox = &mut self.mailbox;
        tokio::time::timeout(Duration::from_secs(5), async {
            let mut seen = Vec::new();
            loop {
                match mailbox.next().await {
                    Some(n) => {
                        let done = want(&n);
                        seen.push(n);
                        if done {
                            break seen;
                        }
                    }
                    None => panic!("mailbox closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for notification")
    }
}

pub fn config() -> EngineConfig {
    EngineConfig::new(SecretString::from("sk-test".to_string()))
}

pub fn created() -> String {
    r#"{"type":"response.created"}"#.to_string()
}

pub fn done() -> String {
    r#"{"type":"response.done"}"#.to_string()
}

pub fn item_added(id: &str) -> String {
    format!(r#"{{"type":"response.output_item.added","item":{{"id":"{}"}}}}"#, id)
}

pub fn audio_delta(item: &str, samples: &[f32]) -> String {
    format!(
        r#"{{"type":"response.audio.delta","item_id":"{}","content_index":0,"delta":"{}"}}"#,
        item,
        pcm::encode_base64(samples)
    )
}

pub fn text_delta(kind: &str, delta: &str) -> String {
    serde_json::json!({ "type": kind, "delta": delta }).to_string()
}

pub fn is_audio(n: &Notification) -> bool {
    matches!(n, Notification::AudioDelta { samples } if !samples.is_empty())
}
