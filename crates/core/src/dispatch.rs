//! Marshals notifications from the network and capture contexts onto the
//! consumer's control thread.
//!
//! Producers hold a [`Notifier`]; the consumer owns the single
//! [`MainThreadDispatcher`] and drains it once per tick. Delivery order is
//! enqueue order.

use tokio::sync::mpsc;

/// Everything the consumer can observe about a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Connected,
    ConnectFailed {
        message: String,
    },
    SessionReady,
    ResponseStarted,
    ResponseFinished,
    /// The full assistant text accumulated so far in the current item.
    AssistantText {
        text: String,
    },
    AssistantTextDone {
        text: String,
    },
    /// Decoded audio at the service rate. Empty after a barge-in flush.
    AudioDelta {
        samples: Vec<f32>,
    },
    /// Server VAD detected the user starting to speak.
    SpeechStarted,
    /// The full user transcript accumulated so far.
    UserTranscript {
        text: String,
    },
    UserTranscriptDone {
        text: String,
    },
    /// Non-fatal error reported by the server or by a failed command.
    Error {
        code: Option<String>,
        message: String,
    },
    /// Terminal. Nothing follows.
    Disconnected {
        reason: String,
    },
}

/// Creates a connected notifier/dispatcher pair.
pub fn notification_channel() -> (Notifier, MainThreadDispatcher) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Notifier { tx }, MainThreadDispatcher { rx })
}

/// Producer handle. Cheap to clone; never blocks.
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub fn notify(&self, notification: Notification) {
        // The consumer may have gone away during shutdown.
        let _ = self.tx.send(notification);
    }
}

/// Consumer side of the mailbox.
pub struct MainThreadDispatcher {
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl MainThreadDispatcher {
    /// Delivers every queued notification to `handler`, in order, and
    /// returns how many were delivered. Never waits.
    pub fn drain(&mut self, mut handler: impl FnMut(Notification)) -> usize {
        let mut delivered = 0;
        while let Ok(notification) = self.rx.try_recv() {
            handler(notification);
            delivered += 1;
        }
        delivered
    }

    /// Returns the next queued notification without waiting.
    pub fn try_next(&mut self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }

    /// Waits for the next notification. `None` once every notifier is gone.
    pub async fn next(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_enqueue_order() {
        let (notifier, mut dispatcher) = notification_channel();
        notifier.notify(Notification::ResponseStarted);
        notifier.notify(Notification::AssistantText { text: "Hi".into() });
        notifier.notify(Notification::ResponseFinished);

        let mut seen = Vec::new();
        assert_eq!(dispatcher.drain(|n| seen.push(n)), 3);
        assert_eq!(
            seen,
            vec![
                Notification::ResponseStarted,
                Notification::AssistantText { text: "Hi".into() },
                Notification::ResponseFinished,
            ]
        );
        assert_eq!(dispatcher.drain(|_| {}), 0);
    }

    #[test]
    fn test_interleaved_producers_keep_per_producer_order() {
        let (notifier, mut dispatcher) = notification_channel();
        let handles: Vec<_> = (0..4)
            .map(|producer| {
                let notifier = notifier.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        notifier.notify(Notification::Error {
                            code: Some(producer.to_string()),
                            message: i.to_string(),
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut last = [-1i32; 4];
        dispatcher.drain(|n| {
            if let Notification::Error { code, message } = n {
                let producer: usize = code.unwrap().parse().unwrap();
                let i: i32 = message.parse().unwrap();
                assert!(i > last[producer]);
                last[producer] = i;
            }
        });
        assert_eq!(last, [99; 4]);
    }

    #[test]
    fn test_notify_after_dispatcher_dropped_is_harmless() {
        let (notifier, dispatcher) = notification_channel();
        drop(dispatcher);
        notifier.notify(Notification::Connected);
    }
}
