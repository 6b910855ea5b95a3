//! Response tracker: per-request quorum barrier over worker reports.
//!
//! Each in-flight request registers an entry holding the expected worker
//! count, the set of distinct workers seen so far, and a one-shot gate that
//! fires exactly once when the seen set reaches the expected count. The
//! single awaiter blocks on the gate or a deadline; reports arrive from
//! concurrently executing RPC handlers and only ever touch the entry map
//! under one lock.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

/// Result type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors that can occur during tracker operations.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("request {0} is already registered")]
    DuplicateRequest(String),

    #[error("request {0} is not registered")]
    UnknownRequest(String),
}

/// Which side of the race released the awaiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Every expected worker reported before the deadline.
    Complete,
    /// The deadline elapsed with the quorum unmet.
    TimedOut,
}

struct Entry {
    expected: usize,
    seen: HashSet<String>,
    /// Fires exactly once, when |seen| reaches expected.
    gate: Option<oneshot::Sender<()>>,
    /// Taken by the single awaiter.
    wait: Option<oneshot::Receiver<()>>,
}

/// Tracks which workers have reported for each in-flight request.
#[derive(Default)]
pub struct ResponseTracker {
    entries: Mutex<HashMap<String, Entry>>,
}

impl ResponseTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // Lock poisoning only matters if a holder panicked; the map is
        // still structurally sound, so recover the guard.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a fresh entry expecting `expected` distinct worker reports.
    pub fn register(&self, request_id: &str, expected: usize) -> Result<()> {
        let mut entries = self.entries();
        if entries.contains_key(request_id) {
            return Err(TrackerError::DuplicateRequest(request_id.to_string()));
        }

        let (tx, rx) = oneshot::channel();
        let gate = if expected == 0 {
            // Nothing to wait for; release the awaiter immediately.
            let _ = tx.send(());
            None
        } else {
            Some(tx)
        };

        entries.insert(
            request_id.to_string(),
            Entry {
                expected,
                seen: HashSet::new(),
                gate,
                wait: Some(rx),
            },
        );
        Ok(())
    }

    /// Record one worker's report for a request.
    ///
    /// Idempotent per worker: repeat reports from the same name never count
    /// twice. Reports for unregistered or already-cleaned-up requests are
    /// dropped silently; workers may be slow or duplicate and never retry.
    pub fn report(&self, request_id: &str, worker_name: &str) {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(request_id) else {
            debug!(request_id, worker = worker_name, "Report for unknown request dropped");
            return;
        };

        if entry.seen.insert(worker_name.to_string()) && entry.seen.len() >= entry.expected {
            if let Some(gate) = entry.gate.take() {
                let _ = gate.send(());
            }
        }
    }

    /// Block until the quorum gate fires or the deadline elapses.
    ///
    /// Only one awaiter exists per request; a second call for the same
    /// request fails with `UnknownRequest`.
    pub async fn wait(&self, request_id: &str, deadline: Duration) -> Result<WaitOutcome> {
        let rx = self
            .entries()
            .get_mut(request_id)
            .and_then(|entry| entry.wait.take())
            .ok_or_else(|| TrackerError::UnknownRequest(request_id.to_string()))?;

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(())) => Ok(WaitOutcome::Complete),
            // Sender dropped by cleanup; treat like an unmet quorum.
            Ok(Err(_)) => Ok(WaitOutcome::TimedOut),
            Err(_) => Ok(WaitOutcome::TimedOut),
        }
    }

    /// Remove a request's entry. Idempotent; later reports become no-ops.
    pub fn cleanup(&self, request_id: &str) {
        self.entries().remove(request_id);
    }

    /// Number of distinct workers seen for a request, if registered.
    pub fn seen_count(&self, request_id: &str) -> Option<usize> {
        self.entries().get(request_id).map(|entry| entry.seen.len())
    }
}
