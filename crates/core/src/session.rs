//! The session facade: one connection, its receive loop, an optional capture
//! loop, and the playback feed, wired together.
//!
//! The receive loop owns the [`EventDispatcher`]. Requests that must touch
//! session state (barge-in, snapshots) are sent to that loop over a control
//! channel, so inbound events and interruptions are applied by one writer in
//! one order.

use crate::{
    audio::{
        MicSource, PlaybackClock, PlaybackOutput, pcm::SERVICE_OUTPUT_SAMPLE_RATE,
        playback_channel,
    },
    barge_in::BargeInOutcome,
    capture::{CaptureConfig, CaptureHandle, CapturePipeline, CaptureStats},
    config::EngineConfig,
    dispatch::{Notification, Notifier},
    error::{CaptureError, ConnectError, SendError, SessionError},
    events::{DispatchOptions, EventDispatcher, SessionState},
};
use async_trait::async_trait;
use openai_realtime::{
    CloseReason, CommandSink, Inbound, Modality, OutboundCommand, RealtimeReceiver,
    RealtimeSender,
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::{
    sync::{Mutex, mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Where the receive loop gets its messages from.
#[async_trait]
pub trait InboundSource: Send + 'static {
    /// Must be cancel-safe: the loop drops this future whenever another
    /// branch wins.
    async fn recv(&mut self) -> Inbound;
}

#[async_trait]
impl InboundSource for RealtimeReceiver {
    async fn recv(&mut self) -> Inbound {
        RealtimeReceiver::recv(self).await
    }
}

/// An in-process source, for hosts that feed messages themselves.
#[async_trait]
impl InboundSource for mpsc::UnboundedReceiver<Inbound> {
    async fn recv(&mut self) -> Inbound {
        mpsc::UnboundedReceiver::recv(self)
            .await
            .unwrap_or(Inbound::Closed(CloseReason::StreamEnded))
    }
}

enum Control {
    BargeIn {
        played_seconds: Option<f64>,
        reply: oneshot::Sender<Result<BargeInOutcome, SendError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionState>,
    },
}

pub struct RealtimeSession {
    sink: Arc<dyn CommandSink>,
    sender: Option<Arc<RealtimeSender>>,
    control: mpsc::Sender<Control>,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
    clock: PlaybackClock,
    capture_config: CaptureConfig,
    modalities: Vec<Modality>,
    notifier: Notifier,
    task: Mutex<Option<JoinHandle<()>>>,
    capture: Mutex<Option<CaptureHandle>>,
}

impl RealtimeSession {
    /// Opens the socket, configures the session and starts the receive loop.
    ///
    /// Returns the session and the pull side of the playback path, which the
    /// host hands to its audio-output callback. Failure is reported once as
    /// [`Notification::ConnectFailed`] and no session is created.
    pub async fn connect(
        config: &EngineConfig,
        device_output_rate: u32,
        notifier: Notifier,
    ) -> Result<(Self, PlaybackOutput), SessionError> {
        let (sender, receiver) =
            match openai_realtime::connect(&config.endpoint, &config.model, &config.token).await {
                Ok(halves) => halves,
                Err(e) => {
                    warn!(error = %e, "Realtime connection failed.");
                    notifier.notify(Notification::ConnectFailed {
                        message: e.to_string(),
                    });
                    return Err(e.into());
                }
            };
        let sender = Arc::new(sender);
        let connected = sender.connection_flag();
        let sink: Arc<dyn CommandSink> = sender.clone();
        Self::establish(
            config,
            sink,
            Some(sender),
            connected,
            receiver,
            device_output_rate,
            notifier,
        )
        .await
    }

    /// Starts a session over an already-open transport.
    pub async fn with_transport<S: InboundSource>(
        config: &EngineConfig,
        sink: Arc<dyn CommandSink>,
        inbound: S,
        device_output_rate: u32,
        notifier: Notifier,
    ) -> Result<(Self, PlaybackOutput), SessionError> {
        let connected = Arc::new(AtomicBool::new(true));
        Self::establish(
            config,
            sink,
            None,
            connected,
            inbound,
            device_output_rate,
            notifier,
        )
        .await
    }

    async fn establish<S: InboundSource>(
        config: &EngineConfig,
        sink: Arc<dyn CommandSink>,
        sender: Option<Arc<RealtimeSender>>,
        connected: Arc<AtomicBool>,
        inbound: S,
        device_output_rate: u32,
        notifier: Notifier,
    ) -> Result<(Self, PlaybackOutput), SessionError> {
        let update = OutboundCommand::UpdateSession {
            session: config.session_config(),
        };
        if let Err(e) = sink.send(update).await {
            notifier.notify(Notification::ConnectFailed {
                message: e.to_string(),
            });
            if let Some(sender) = &sender {
                sender.close().await;
            }
            return Err(ConnectError::Configure(e).into());
        }
        notifier.notify(Notification::Connected);

        let (feed, output) = playback_channel(
            config.ring_capacity(),
            SERVICE_OUTPUT_SAMPLE_RATE,
            device_output_rate,
        );
        let clock = feed.clock();
        let options = DispatchOptions {
            auto_response: config.auto_response,
            modalities: config.response_modalities(),
        };
        let dispatcher = EventDispatcher::new(sink.clone(), feed, notifier.clone(), options);

        let cancel = CancellationToken::new();
        let (control_tx, control_rx) = mpsc::channel(16);
        let task = tokio::spawn(run_session(
            dispatcher,
            inbound,
            control_rx,
            cancel.clone(),
            connected.clone(),
            notifier.clone(),
            config.model.clone(),
        ));

        let session = Self {
            sink,
            sender,
            control: control_tx,
            cancel,
            connected,
            clock,
            capture_config: config.capture_config(),
            modalities: config.response_modalities(),
            notifier,
            task: Mutex::new(Some(task)),
            capture: Mutex::new(None),
        };
        Ok((session, output))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && !self.cancel.is_cancelled()
    }

    /// Seconds of the active item the output callback has pulled so far.
    pub fn played_seconds(&self) -> f64 {
        self.clock.played_seconds()
    }

    /// Sends one command. A failure is reported but leaves the session open.
    pub async fn send(&self, command: OutboundCommand) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SendError::NotConnected.into());
        }
        if let Err(e) = self.sink.send(command).await {
            if !e.is_closed() {
                self.notifier.notify(Notification::Error {
                    code: None,
                    message: e.to_string(),
                });
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Asks for a response steered by `prompt`.
    pub async fn send_text(&self, prompt: &str) -> Result<(), SessionError> {
        self.send(OutboundCommand::create_response(
            Some(prompt.to_string()),
            self.modalities.clone(),
        ))
        .await
    }

    /// Commits the buffered user audio and asks for a response to it.
    pub async fn commit(&self) -> Result<(), SessionError> {
        self.send(OutboundCommand::CommitAudioBuffer).await?;
        self.send(OutboundCommand::create_response(None, self.modalities.clone()))
            .await
    }

    /// Interrupts the assistant.
    ///
    /// `played_seconds` is how much of the active item the user actually
    /// heard. Pass `None` to use the playback ring's own consumption.
    pub async fn barge_in(
        &self,
        played_seconds: Option<f64>,
    ) -> Result<BargeInOutcome, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.control
            .send(Control::BargeIn {
                played_seconds,
                reply,
            })
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(rx.await.map_err(|_| SessionError::Closed)??)
    }

    /// A copy of the dispatcher's state, taken in event order.
    pub async fn state(&self) -> Result<SessionState, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.control
            .send(Control::Snapshot { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Starts streaming `source` to the server. Only one capture loop runs
    /// at a time.
    pub async fn start_capture(&self, source: Arc<dyn MicSource>) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::Closed);
        }
        let mut capture = self.capture.lock().await;
        if capture.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(CaptureError::AlreadyRunning.into());
        }
        let pipeline = CapturePipeline::new(
            source,
            self.sink.clone(),
            self.connected.clone(),
            self.cancel.child_token(),
            self.capture_config.clone(),
        )?
        .with_notifier(self.notifier.clone());
        *capture = Some(pipeline.spawn());
        Ok(())
    }

    /// Stops the capture loop, letting an in-flight send finish.
    pub async fn stop_capture(&self) -> Option<CaptureStats> {
        let handle = self.capture.lock().await.take()?;
        Some(handle.stop().await)
    }

    /// Closes the session and waits for its loops to exit.
    pub async fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        self.stop_capture().await;
        self.cancel.cancel();
        if let Some(sender) = &self.sender {
            sender.close().await;
        }
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Session task did not finish cleanly.");
            }
        }
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[instrument(name = "realtime_session", skip_all, fields(model = %model))]
async fn run_session<S: InboundSource>(
    mut dispatcher: EventDispatcher,
    mut inbound: S,
    mut control: mpsc::Receiver<Control>,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
    notifier: Notifier,
    model: String,
) {
    info!("Session loop started.");
    let reason = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break "disconnected by client".to_string(),
            Some(request) = control.recv() => match request {
                Control::BargeIn { played_seconds, reply } => {
                    let result = dispatcher.barge_in(played_seconds).await;
                    let _ = reply.send(result);
                }
                Control::Snapshot { reply } => {
                    let _ = reply.send(dispatcher.state().clone());
                }
            },
            step = inbound.recv() => match step {
                Inbound::Events(lines) => {
                    for line in &lines {
                        dispatcher.handle_message(line).await;
                    }
                }
                Inbound::Closed(reason) => break reason.to_string(),
            },
        }
    };

    connected.store(false, Ordering::Release);
    cancel.cancel();
    info!(%reason, "Session loop finished.");
    notifier.notify(Notification::Disconnected { reason });
}
