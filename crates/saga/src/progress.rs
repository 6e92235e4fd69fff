//! Monotonic completion percentage and optional status projection of a run.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::order_fulfillment::ORDER_STATUS_KEY;

/// Point-in-time view of a run's progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub progress: u8,
    pub status: Option<String>,
}

/// A milestone as it was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Milestone {
    pub percent: u8,
    pub label: String,
    pub reached_at: DateTime<Utc>,
}

/// Holds the progress of one run.
///
/// Progress never decreases: an [`advance`](Self::advance) to a lower value is
/// ignored. When status projection is enabled, every advance also upserts the
/// `OrderStatus` search attribute.
#[derive(Debug)]
pub struct ProgressTracker {
    snapshot: watch::Sender<ProgressSnapshot>,
    history: Mutex<Vec<Milestone>>,
    search_attributes: Mutex<HashMap<String, String>>,
    project_status: bool,
}

impl ProgressTracker {
    pub fn new(project_status: bool) -> Self {
        Self {
            snapshot: watch::Sender::new(ProgressSnapshot::default()),
            history: Mutex::new(Vec::new()),
            search_attributes: Mutex::new(HashMap::new()),
            project_status,
        }
    }

    /// Moves progress to `percent` (clamped to 100) with the given label.
    ///
    /// Returns false if `percent` is below the current value.
    pub fn advance(&self, percent: u8, label: &str) -> bool {
        let percent = percent.min(100);
        let current = self.progress();
        if percent < current {
            tracing::warn!(current, requested = percent, "ignoring progress regression");
            return false;
        }

        let status = self.project_status.then(|| label.to_string());
        if let Some(status) = &status {
            lock(&self.search_attributes).insert(ORDER_STATUS_KEY.to_string(), status.clone());
        }
        lock(&self.history).push(Milestone {
            percent,
            label: label.to_string(),
            reached_at: Utc::now(),
        });
        self.snapshot.send_modify(|snapshot| {
            snapshot.progress = percent;
            if status.is_some() {
                snapshot.status = status;
            }
        });
        tracing::debug!(percent, label, "progress updated");
        true
    }

    pub fn progress(&self) -> u8 {
        self.snapshot.borrow().progress
    }

    /// The projected status label, if status projection is enabled.
    pub fn status(&self) -> Option<String> {
        self.snapshot.borrow().status.clone()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receives every subsequent snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.snapshot.subscribe()
    }

    /// Milestones reached so far, in order.
    pub fn history(&self) -> Vec<Milestone> {
        lock(&self.history).clone()
    }

    /// Returns a projected search attribute.
    pub fn search_attribute(&self, key: &str) -> Option<String> {
        lock(&self.search_attributes).get(key).cloned()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
