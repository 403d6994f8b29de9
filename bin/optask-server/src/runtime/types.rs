use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle state of a task, derived from its stored record.
///
/// `Completed`, `Failed` and `Canceled` are terminal: no transition leaves
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Submitted and not yet finished.  A cancellation that has been
    /// requested but not yet observed by the runner is still `Running`.
    Running,
    /// The engine returned an outcome.
    Completed,
    /// The engine failed, or the task was interrupted by a restart.
    Failed,
    /// The runner observed a cancellation before the engine returned.
    Canceled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store-level answer to a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelAck {
    /// The flag is set; the runner will observe it within one polling interval.
    Requested,
    /// The task had already reached a terminal state; nothing changed.
    AlreadyFinished,
}

impl CancelAck {
    pub fn as_str(self) -> &'static str {
        match self {
            CancelAck::Requested => "cancel_requested",
            CancelAck::AlreadyFinished => "already_finished",
        }
    }
}

/// Errors surfaced by the task runtime to its synchronous callers.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid problem: {0}")]
    Validation(#[from] optask_solver::ValidationError),

    #[error("unknown solver engine: {0}")]
    UnknownEngine(String),

    #[error("task {0} not found")]
    NotFound(String),

    #[error("task store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("failed to encode task data: {0}")]
    Encode(#[from] serde_json::Error),
}
