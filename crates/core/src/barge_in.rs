//! User interruption of an in-progress assistant response.

use crate::{
    audio::PlaybackFeed,
    dispatch::{Notification, Notifier},
    events::SessionState,
};
use openai_realtime::{CommandSink, OutboundCommand, SendError};
use tracing::{info, warn};

/// What a barge-in did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BargeInOutcome {
    /// The truncate command that was sent, if any.
    pub truncated: Option<Truncation>,
    /// The item whose remaining audio will be dropped on arrival.
    pub squelched: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    pub item_id: String,
    pub content_index: u32,
    pub audio_end_ms: u32,
}

/// Converts seconds of played audio into the `audio_end_ms` the server expects.
pub fn audio_end_ms(played_seconds: f64) -> u32 {
    if !played_seconds.is_finite() || played_seconds <= 0.0 {
        return 0;
    }
    (played_seconds * 1000.0).round().min(f64::from(u32::MAX)) as u32
}

/// Decides whether an interruption should truncate the active item.
///
/// Truncation applies while the item is still being generated or while its
/// audio is still queued locally; otherwise the user has heard all of it.
pub fn plan_truncation(
    state: &SessionState,
    playback_pending: bool,
    played_seconds: f64,
) -> Option<Truncation> {
    let item_id = state.active_item_id.as_ref()?;
    if !state.response_in_flight && !playback_pending {
        return None;
    }
    Some(Truncation {
        item_id: item_id.clone(),
        content_index: state.active_content_index.unwrap_or(0),
        audio_end_ms: audio_end_ms(played_seconds),
    })
}

/// Runs the interruption sequence, awaiting each send before the next:
/// cancel, truncate, squelch, then flush local playback.
///
/// The local steps run even when a send fails, so the user never keeps
/// hearing audio they interrupted. The first send error is returned.
pub async fn execute(
    state: &mut SessionState,
    sink: &dyn CommandSink,
    playback: &mut PlaybackFeed,
    notifier: &Notifier,
    played_seconds: f64,
) -> Result<BargeInOutcome, SendError> {
    let truncation = plan_truncation(state, playback.has_pending(), played_seconds);

    let mut result = sink.send(OutboundCommand::CancelResponse).await;
    if let Some(t) = truncation.as_ref().filter(|_| result.is_ok()) {
        result = sink
            .send(OutboundCommand::TruncateItem {
                item_id: t.item_id.clone(),
                content_index: t.content_index,
                audio_end_ms: t.audio_end_ms,
            })
            .await;
    }

    if let Some(item_id) = &state.active_item_id {
        state.squelch_item_id = Some(item_id.clone());
    }
    playback.flush();
    notifier.notify(Notification::AudioDelta {
        samples: Vec::new(),
    });

    match result {
        Ok(()) => {
            info!(
                item_id = ?state.squelch_item_id,
                audio_end_ms = truncation.as_ref().map(|t| t.audio_end_ms),
                "Barge-in complete."
            );
            Ok(BargeInOutcome {
                truncated: truncation,
                squelched: state.squelch_item_id.clone(),
            })
        }
        Err(e) => {
            warn!(error = %e, "Barge-in command failed; local playback was still flushed.");
            Err(e)
        }
    }
}
