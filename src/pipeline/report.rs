use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::glom::BatchReport;

/// Unique identifier for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Creates a new random run ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened during a run, batch by batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id of the run.
    pub run_id: RunId,
    /// When the run was created.
    pub started_at: DateTime<Utc>,

    /// Set once the compendium has been written.
    pub finished_at: Option<DateTime<Utc>>,

    /// One report per applied batch, in application order.
    pub batches: Vec<BatchReport>,

    /// Planned sources whose batch never arrived.
    pub absent: Vec<String>,
}

impl RunReport {
    /// Starts a new report.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: RunId::new(),
            started_at: Utc::now(),
            finished_at: None,
            batches: Vec::new(),
            absent: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, report: BatchReport) -> &BatchReport {
        self.batches.push(report);
        &self.batches[self.batches.len() - 1]
    }

    /// The report for `source`, if its batch was applied.
    #[must_use]
    pub fn batch(&self, source: &str) -> Option<&BatchReport> {
        self.batches.iter().find(|b| b.source == source)
    }

    /// Rejected merges across all batches.
    #[must_use]
    pub fn total_rejected(&self) -> usize {
        self.batches.iter().map(BatchReport::rejected_count).sum()
    }

    /// Malformed groups across all batches.
    #[must_use]
    pub fn total_malformed(&self) -> usize {
        self.batches.iter().map(|b| b.malformed.len()).sum()
    }

    /// Returns true once the run has produced its compendium.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
