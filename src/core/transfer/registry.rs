//! Process-wide transfer state keyed by telephony call identifier.
//!
//! The registry is written from two directions: the tool dispatcher (through
//! the call-control client) marks a call `pending` when it starts a transfer,
//! and the platform callbacks push the per-leg and final dial statuses. The
//! dispatcher then waits for a terminal status.
//!
//! Each record carries a [`watch`] channel so a waiter is woken as soon as a
//! callback lands instead of sleeping through a fixed polling interval. The
//! waiter still re-reads the record every [`TRANSFER_POLL_INTERVAL`] so a
//! record registered after the wait started is picked up.
//!
//! Records are never evicted. Call identifiers are not reused, so growth is
//! bounded by the number of calls handled over the process lifetime.

use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, sleep, sleep_until};

use super::status::TransferStatus;

/// Upper bound between two reads of a pending transfer's status.
pub const TRANSFER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default time a transfer is given to reach a terminal status.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(70);

/// Snapshot of a transfer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRecord {
    pub status: TransferStatus,
    pub destination: String,
}

struct Entry {
    status: watch::Sender<TransferStatus>,
    destination: String,
}

/// In-memory transfer registry shared by every call in the process.
#[derive(Default)]
pub struct TransferRegistry {
    entries: DashMap<String, Entry>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) a transfer in `pending` for `destination`.
    pub fn set_pending(&self, call_id: &str, destination: &str) {
        match self.entries.get_mut(call_id) {
            Some(mut entry) => {
                entry.destination = destination.to_string();
                entry.status.send_replace(TransferStatus::Pending);
            }
            None => {
                let (tx, _rx) = watch::channel(TransferStatus::Pending);
                self.entries.insert(
                    call_id.to_string(),
                    Entry {
                        status: tx,
                        destination: destination.to_string(),
                    },
                );
            }
        }
        tracing::info!(call_sid = %call_id, destination = %destination, "Transfer registered as pending");
    }

    /// Update the status of a known transfer.
    ///
    /// Returns `false` and changes nothing when the call is unknown; callbacks
    /// can race ahead of registration.
    pub fn set_status(&self, call_id: &str, status: TransferStatus) -> bool {
        match self.entries.get(call_id) {
            Some(entry) => {
                entry.status.send_replace(status);
                tracing::info!(call_sid = %call_id, status = %status, "Transfer status updated");
                true
            }
            None => {
                tracing::debug!(call_sid = %call_id, status = %status, "Status for unknown transfer ignored");
                false
            }
        }
    }

    pub fn get_status(&self, call_id: &str) -> Option<TransferStatus> {
        self.entries.get(call_id).map(|entry| *entry.status.borrow())
    }

    pub fn get(&self, call_id: &str) -> Option<TransferRecord> {
        self.entries.get(call_id).map(|entry| TransferRecord {
            status: *entry.status.borrow(),
            destination: entry.destination.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn subscribe(&self, call_id: &str) -> Option<watch::Receiver<TransferStatus>> {
        // The map guard must not live across an await point.
        self.entries.get(call_id).map(|entry| entry.status.subscribe())
    }

    /// Wait until the transfer for `call_id` reaches a terminal status.
    ///
    /// Returns the terminal status, or `None` if `timeout` elapses first.
    pub async fn wait_for_terminal(
        &self,
        call_id: &str,
        timeout: Duration,
    ) -> Option<TransferStatus> {
        let deadline = Instant::now() + timeout;
        let mut receiver: Option<watch::Receiver<TransferStatus>> = None;

        loop {
            if receiver.is_none() {
                receiver = self.subscribe(call_id);
            }

            if let Some(rx) = receiver.as_mut() {
                let status = *rx.borrow_and_update();
                if status.is_terminal() {
                    return Some(status);
                }
            }

            let woken = match receiver.as_mut() {
                Some(rx) => tokio::select! {
                    changed = rx.changed() => Some(changed.is_ok()),
                    _ = sleep(TRANSFER_POLL_INTERVAL) => Some(true),
                    _ = sleep_until(deadline) => None,
                },
                None => tokio::select! {
                    _ = sleep(TRANSFER_POLL_INTERVAL) => Some(true),
                    _ = sleep_until(deadline) => None,
                },
            };

            match woken {
                Some(true) => {}
                Some(false) => receiver = None,
                None => {
                    tracing::warn!(call_sid = %call_id, "Timed out waiting for transfer outcome");
                    return None;
                }
            }
        }
    }
}
