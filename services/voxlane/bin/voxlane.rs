//! Main Entrypoint for the Voxlane voice assistant
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and the command line.
//! 2. Opening the speaker, connecting the realtime session and starting
//!    playback.
//! 3. Streaming the microphone to the session.
//! 4. Running the control tick: draining notifications and reading console
//!    commands until the user quits or the connection closes.

use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voxlane::{
    audio::{Microphone, Speaker},
    config::Config,
    control::{Command, HELP, Reaction, react},
};
use voxlane_core::{RealtimeSession, notification_channel};

/// How often the control loop drains the notification mailbox.
const CONTROL_TICK: Duration = Duration::from_millis(20);

#[derive(Parser, Debug)]
#[command(version, about = "Talk to a realtime speech-to-speech assistant")]
struct Args {
    /// Assistant voice, overrides REALTIME_VOICE.
    #[arg(long)]
    voice: Option<String>,
    /// System instructions, overrides REALTIME_INSTRUCTIONS.
    #[arg(long)]
    instructions: Option<String>,
    /// Ask for a response as soon as the user's turn is transcribed.
    #[arg(long)]
    auto_response: bool,
    /// Do not open the microphone; use typed prompts only.
    #[arg(long)]
    no_mic: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if args.voice.is_some() {
        config.voice = args.voice;
    }
    if args.instructions.is_some() {
        config.instructions = args.instructions;
    }
    config.auto_response |= args.auto_response;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    let engine = config.engine_config();
    info!(
        model = %engine.model,
        voice = %engine.voice,
        auto_response = engine.auto_response,
        "Configuration loaded. Connecting..."
    );

    // --- 3. Connect and start playback ---
    let speaker = Speaker::open_default()?;
    let (notifier, mut mailbox) = notification_channel();
    let (session, output) = RealtimeSession::connect(&engine, speaker.sample_rate(), notifier)
        .await
        .context("Failed to connect to the realtime service")?;
    let _speaker_stream = speaker.start(output)?;

    // --- 4. Stream the microphone ---
    let _microphone = if args.no_mic {
        None
    } else {
        let microphone = Microphone::open_default(engine.ring_seconds)?;
        session
            .start_capture(microphone.clip())
            .await
            .context("Failed to start capture")?;
        Some(microphone)
    };

    // --- 5. Control loop ---
    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(CONTROL_TICK);
    let mut pending = Vec::new();
    let exit_reason = 'control: loop {
        tokio::select! {
            _ = tick.tick() => {
                mailbox.drain(|n| pending.push(n));
                for notification in pending.drain(..) {
                    match react(&notification) {
                        Reaction::None => {}
                        Reaction::Print(text) => println!("{}", text),
                        Reaction::Interrupt => {
                            if let Err(e) = session.barge_in(None).await {
                                warn!(error = %e, "Barge-in failed.");
                            }
                        }
                        Reaction::Exit(reason) => break 'control reason,
                    }
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break 'control "stdin closed".to_string(),
                    Err(e) => break 'control format!("stdin error: {}", e),
                };
                let Some(command) = Command::parse(&line) else {
                    continue;
                };
                let result = match command {
                    Command::Interrupt => session.barge_in(None).await.map(|outcome| {
                        info!(truncated = ?outcome.truncated, "Interrupted.");
                    }),
                    Command::Say(text) => session.send_text(&text).await,
                    Command::Commit => session.commit().await,
                    Command::Help => {
                        println!("{}", HELP);
                        Ok(())
                    }
                    Command::Unknown(text) => {
                        println!("unknown command: {}", text);
                        Ok(())
                    }
                    Command::Quit => break 'control "quit".to_string(),
                };
                if let Err(e) = result {
                    warn!(error = %e, "Command failed.");
                }
            }
            _ = tokio::signal::ctrl_c() => break 'control "interrupted".to_string(),
        }
    };

    info!(reason = %exit_reason, "Shutting down.");
    session.disconnect().await;
    Ok(())
}
