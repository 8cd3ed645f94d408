//! Per-call state shared by the two relay loops.
//!
//! Writers per field:
//! - latest media timestamp: caller loop
//! - playback tracking (current item, playback start, last interruption): model loop
//! - identity: caller loop, on stream start
//! - mark queue: pushed by the model loop, popped by the caller loop
//! - transferred: set once by the tool dispatcher, read by both loops
//! - transfer in flight: tool dispatcher, between the redirect and its outcome
//!
//! Locks are never held across an await point.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use super::interruption::{InterruptionTiming, evaluate};

/// Identity of the call as established by the stream start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallIdentity {
    pub stream_sid: Option<String>,
    pub call_sid: Option<String>,
    /// Trusted number from the call origination, as received.
    pub caller_phone: Option<String>,
}

#[derive(Debug, Default)]
struct PlaybackState {
    current_item: Option<String>,
    playback_start: u64,
    last_interruption: u64,
}

#[derive(Debug, Default)]
pub struct CallState {
    latest_media_timestamp: AtomicU64,
    playback: Mutex<PlaybackState>,
    marks: Mutex<VecDeque<String>>,
    identity: RwLock<CallIdentity>,
    transferred: AtomicBool,
    transfer_in_flight: AtomicBool,
}

impl CallState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt a new stream and reset every per-stream counter.
    ///
    /// The transferred flag is terminal and survives the reset.
    pub fn attach_stream(&self, identity: CallIdentity) {
        self.latest_media_timestamp.store(0, Ordering::SeqCst);
        *self.playback.lock() = PlaybackState::default();
        self.marks.lock().clear();
        *self.identity.write() = identity;
    }

    pub fn identity(&self) -> CallIdentity {
        self.identity.read().clone()
    }

    pub fn stream_sid(&self) -> Option<String> {
        self.identity.read().stream_sid.clone()
    }

    pub fn call_sid(&self) -> Option<String> {
        self.identity.read().call_sid.clone()
    }

    pub fn caller_phone(&self) -> Option<String> {
        self.identity.read().caller_phone.clone()
    }

    pub fn set_latest_timestamp(&self, timestamp: u64) {
        self.latest_media_timestamp.store(timestamp, Ordering::SeqCst);
    }

    pub fn latest_timestamp(&self) -> u64 {
        self.latest_media_timestamp.load(Ordering::SeqCst)
    }

    /// Track `item_id` as the assistant item being played.
    ///
    /// A new item starts a new utterance whose playback start is the latest
    /// caller timestamp. Returns `true` when a new utterance began.
    pub fn track_playback(&self, item_id: &str) -> bool {
        let latest = self.latest_timestamp();
        let mut playback = self.playback.lock();
        if playback.current_item.as_deref() == Some(item_id) {
            return false;
        }
        playback.current_item = Some(item_id.to_string());
        playback.playback_start = latest;
        true
    }

    pub fn current_item(&self) -> Option<String> {
        self.playback.lock().current_item.clone()
    }

    pub fn playback_start(&self) -> u64 {
        self.playback.lock().playback_start
    }

    /// Run the interruption check against the latest caller timestamp.
    ///
    /// Returns `None` when no assistant utterance is tracked. When the check
    /// fires, the latest timestamp becomes the last interruption time.
    pub fn check_interruption(&self) -> Option<InterruptionTiming> {
        let latest = self.latest_timestamp();
        let mut playback = self.playback.lock();
        playback.current_item.as_ref()?;

        let timing = evaluate(latest, playback.playback_start, playback.last_interruption);
        if timing.interrupt {
            playback.last_interruption = latest;
        }
        Some(timing)
    }

    pub fn push_mark(&self, name: &str) {
        self.marks.lock().push_back(name.to_string());
    }

    /// Acknowledge the oldest pending mark.
    pub fn pop_mark(&self) -> Option<String> {
        self.marks.lock().pop_front()
    }

    pub fn pending_marks(&self) -> usize {
        self.marks.lock().len()
    }

    pub fn is_transferred(&self) -> bool {
        self.transferred.load(Ordering::SeqCst)
    }

    /// Set the terminal transferred flag. Returns `true` on the first call.
    pub fn mark_transferred(&self) -> bool {
        !self.transferred.swap(true, Ordering::SeqCst)
    }

    /// Whether a transfer redirect was issued and its outcome is still open.
    pub fn transfer_in_flight(&self) -> bool {
        self.transfer_in_flight.load(Ordering::SeqCst)
    }

    /// Claim the single transfer slot. Returns `false` when one is already open.
    pub fn begin_transfer(&self) -> bool {
        !self.transfer_in_flight.swap(true, Ordering::SeqCst)
    }

    pub fn end_transfer(&self) {
        self.transfer_in_flight.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> CallIdentity {
        CallIdentity {
            stream_sid: Some("MZ1".to_string()),
            call_sid: Some("CA1".to_string()),
            caller_phone: Some("+14155550001".to_string()),
        }
    }

    #[test]
    fn test_attach_resets_counters() {
        let state = CallState::new();
        state.set_latest_timestamp(9_000);
        state.track_playback("item_1");
        state.push_mark("part");

        state.attach_stream(identity());

        assert_eq!(state.latest_timestamp(), 0);
        assert_eq!(state.current_item(), None);
        assert_eq!(state.pending_marks(), 0);
        assert_eq!(state.stream_sid().as_deref(), Some("MZ1"));
        assert_eq!(state.caller_phone().as_deref(), Some("+14155550001"));
    }

    #[test]
    fn test_track_playback_records_start_for_new_items_only() {
        let state = CallState::new();
        state.set_latest_timestamp(1_000);
        assert!(state.track_playback("item_1"));
        assert_eq!(state.playback_start(), 1_000);

        state.set_latest_timestamp(1_200);
        assert!(!state.track_playback("item_1"));
        assert_eq!(state.playback_start(), 1_000);

        assert!(state.track_playback("item_2"));
        assert_eq!(state.playback_start(), 1_200);
    }

    #[test]
    fn test_interruption_requires_tracked_item() {
        let state = CallState::new();
        state.set_latest_timestamp(10_000);
        assert_eq!(state.check_interruption(), None);
    }

    #[test]
    fn test_interruption_debounce() {
        let state = CallState::new();
        state.set_latest_timestamp(1_000);
        state.track_playback("item_1");

        state.set_latest_timestamp(2_100);
        assert!(state.check_interruption().unwrap().interrupt);

        // 900ms after the last one
        state.set_latest_timestamp(3_000);
        assert!(!state.check_interruption().unwrap().interrupt);

        state.set_latest_timestamp(3_101);
        assert!(state.check_interruption().unwrap().interrupt);
    }

    #[test]
    fn test_marks_are_fifo() {
        let state = CallState::new();
        state.push_mark("a");
        state.push_mark("b");
        assert_eq!(state.pop_mark().as_deref(), Some("a"));
        assert_eq!(state.pop_mark().as_deref(), Some("b"));
        assert_eq!(state.pop_mark(), None);
    }

    #[test]
    fn test_single_transfer_slot() {
        let state = CallState::new();
        assert!(state.begin_transfer());
        assert!(!state.begin_transfer());
        assert!(state.transfer_in_flight());
        state.end_transfer();
        assert!(!state.transfer_in_flight());
        assert!(state.begin_transfer());
    }

    #[test]
    fn test_transferred_is_terminal() {
        let state = CallState::new();
        assert!(state.mark_transferred());
        assert!(!state.mark_transferred());
        state.attach_stream(identity());
        assert!(state.is_transferred());
    }
}
