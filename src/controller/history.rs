//! Trial outcome history.
//!
//! Immutable: [`TrialHistory::record`] returns a new history with the trial
//! appended and leaves the original untouched.

use crate::core::StateId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Outcome of one armed-and-started sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub id: Uuid,
    /// When the sequence was started
    pub started_at: DateTime<Utc>,
    /// When polling for completion ended
    pub finished_at: DateTime<Utc>,
    /// The last state was not reached within the finish timeout
    pub timed_out: bool,
    /// State the FSM reported once polling ended
    pub final_state: StateId,
    /// Number of sequence states that were armed
    pub states: usize,
}

impl TrialRecord {
    /// Wall-clock time spent between start and the end of polling.
    pub fn elapsed(&self) -> Option<Duration> {
        self.finished_at
            .signed_duration_since(self.started_at)
            .to_std()
            .ok()
    }
}

/// Ordered history of trials.
///
/// # Example
///
/// ```rust
/// use chronoglitch::controller::{TrialHistory, TrialRecord};
/// use chronoglitch::core::StateId;
/// use chrono::Utc;
/// use uuid::Uuid;
///
/// let history = TrialHistory::new();
/// let record = TrialRecord {
///     id: Uuid::new_v4(),
///     started_at: Utc::now(),
///     finished_at: Utc::now(),
///     timed_out: true,
///     final_state: StateId::new(2),
///     states: 4,
/// };
///
/// let recorded = history.record(record);
/// assert_eq!(recorded.len(), 1);
/// assert_eq!(history.len(), 0); // Original unchanged
/// assert_eq!(recorded.timeouts(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialHistory {
    records: Vec<TrialRecord>,
}

impl TrialHistory {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Record a trial, returning a new history.
    pub fn record(&self, record: TrialRecord) -> Self {
        let mut records = self.records.clone();
        records.push(record);
        Self { records }
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&TrialRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Trials whose sequence did not finish in time.
    pub fn timeouts(&self) -> usize {
        self.records.iter().filter(|r| r.timed_out).count()
    }

    /// Total duration from the first start to the last finish.
    ///
    /// Returns `None` if there are no trials.
    pub fn duration(&self) -> Option<Duration> {
        if let (Some(first), Some(last)) = (self.records.first(), self.records.last()) {
            let duration = last.finished_at.signed_duration_since(first.started_at);
            duration.to_std().ok()
        } else {
            None
        }
    }
}
