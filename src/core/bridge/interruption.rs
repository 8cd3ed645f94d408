//! Interruption handling: the caller talks over the assistant.
//!
//! Speech-start detection fires eagerly, so an interruption only counts when
//! the assistant has been audible for longer than
//! [`INTERRUPTION_MIN_SPEAKING_MS`] and the previous interruption is more than
//! [`INTERRUPTION_DEBOUNCE_MS`] old. Both comparisons are strict.

use super::caller::{CallerLink, CallerOutbound};
use crate::core::realtime::{ClientEvent, ModelLink};

/// Minimum assistant playback, in stream-clock ms, before it can be interrupted.
pub const INTERRUPTION_MIN_SPEAKING_MS: i64 = 500;

/// Minimum gap, in stream-clock ms, between two handled interruptions.
pub const INTERRUPTION_DEBOUNCE_MS: i64 = 1000;

/// Timing inputs and verdict of one interruption check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptionTiming {
    pub speaking_ms: i64,
    pub since_last_ms: i64,
    pub interrupt: bool,
}

/// Evaluate the debounce rule for the given stream-clock timestamps.
pub fn evaluate(latest: u64, playback_start: u64, last_interruption: u64) -> InterruptionTiming {
    let speaking_ms = elapsed_ms(latest, playback_start);
    let since_last_ms = elapsed_ms(latest, last_interruption);
    InterruptionTiming {
        speaking_ms,
        since_last_ms,
        interrupt: speaking_ms > INTERRUPTION_MIN_SPEAKING_MS
            && since_last_ms > INTERRUPTION_DEBOUNCE_MS,
    }
}

/// Signed `later - earlier`, saturating at the `i64` bounds.
fn elapsed_ms(later: u64, earlier: u64) -> i64 {
    if later >= earlier {
        i64::try_from(later - earlier).unwrap_or(i64::MAX)
    } else {
        i64::try_from(earlier - later).map_or(i64::MIN, |d| -d)
    }
}

/// Commit buffered caller audio on the model and drop queued assistant audio
/// on the caller side.
///
/// Both sends are best-effort. A lost race with a closing connection is
/// logged and otherwise ignored.
pub async fn handle_interruption(model: &ModelLink, caller: &CallerLink, stream_sid: Option<&str>) {
    if let Err(e) = model.send(ClientEvent::InputAudioBufferCommit).await {
        tracing::debug!("Interruption commit not delivered: {}", e);
    }

    match stream_sid {
        Some(stream_sid) => {
            if let Err(e) = caller.send(CallerOutbound::clear(stream_sid)).await {
                tracing::debug!("Interruption clear not delivered: {}", e);
            }
        }
        None => tracing::debug!("No stream yet, skipping clear"),
    }

    tracing::info!("Interruption handled");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::ModelCommand;

    #[test]
    fn test_boundaries_do_not_fire() {
        // speaking exactly 500
        assert!(!evaluate(10_500, 10_000, 0).interrupt);
        // since last exactly 1000
        assert!(!evaluate(5_000, 1_000, 4_000).interrupt);
    }

    #[test]
    fn test_fires_just_past_both_thresholds() {
        let timing = evaluate(5_001, 4_500, 4_000);
        assert_eq!(timing.speaking_ms, 501);
        assert_eq!(timing.since_last_ms, 1_001);
        assert!(timing.interrupt);
    }

    #[test]
    fn test_playback_started_after_latest_is_negative() {
        let timing = evaluate(100, 400, 0);
        assert_eq!(timing.speaking_ms, -300);
        assert!(!timing.interrupt);
    }

    #[test]
    fn test_extreme_timestamps_saturate() {
        assert_eq!(elapsed_ms(u64::MAX, 0), i64::MAX);
        assert_eq!(elapsed_ms(0, u64::MAX), i64::MIN);

        let timing = evaluate(u64::MAX, u64::MAX - 600, 0);
        assert_eq!(timing.speaking_ms, 600);
        assert_eq!(timing.since_last_ms, i64::MAX);
        assert!(timing.interrupt);

        assert!(!evaluate(0, u64::MAX, 0).interrupt);
    }

    #[tokio::test]
    async fn test_handle_interruption_sends_commit_and_clear() {
        let (model, mut model_rx) = ModelLink::channel(4);
        let (caller, mut caller_rx) = CallerLink::channel(4);

        handle_interruption(&model, &caller, Some("MZ1")).await;

        match model_rx.recv().await {
            Some(ModelCommand::Event(ClientEvent::InputAudioBufferCommit)) => {}
            other => panic!("expected commit, got {other:?}"),
        }
        match caller_rx.recv().await {
            Some(CallerOutbound::Clear { stream_sid }) => assert_eq!(stream_sid, "MZ1"),
            other => panic!("expected clear, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handle_interruption_swallows_closed_transports() {
        let (model, model_rx) = ModelLink::channel(4);
        let (caller, caller_rx) = CallerLink::channel(4);
        drop(model_rx);
        drop(caller_rx);

        handle_interruption(&model, &caller, Some("MZ1")).await;
        assert!(!model.is_open());
    }
}
