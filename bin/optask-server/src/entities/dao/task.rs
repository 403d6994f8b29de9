use chrono::{DateTime, Utc};

use crate::runtime::TaskStatus;

/// A row in the `tasks` table.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: String,
    /// Problem description exactly as accepted, serialized to JSON.
    pub problem: String,
    pub engine: String,
    /// Serialized `SolveOutcome`; only present for completed tasks.
    pub result: Option<String>,
    /// Failure reason for failed tasks.
    pub error: Option<String>,
    pub canceled: bool,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// A freshly submitted, running task.
    pub fn new(id: impl Into<String>, problem: impl Into<String>, engine: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            problem: problem.into(),
            engine: engine.into(),
            result: None,
            error: None,
            canceled: false,
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        match (&self.finished_at, &self.result) {
            (None, _) => TaskStatus::Running,
            (Some(_), Some(_)) => TaskStatus::Completed,
            (Some(_), None) if self.canceled => TaskStatus::Canceled,
            (Some(_), None) => TaskStatus::Failed,
        }
    }

    /// Wall-clock time from submission to the terminal write.
    pub fn solve_duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.submitted_at).num_milliseconds())
    }
}
