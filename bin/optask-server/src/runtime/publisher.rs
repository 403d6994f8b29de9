use std::sync::Arc;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::Serialize;
use serde_json::Value;
use tokio::time::Interval;
use tracing::debug;

use super::{TaskStatus, Ticker};
use crate::entities::{SqliteStore, TaskRecord, TaskStore};

/// One step of a progress stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ProgressEvent {
    InProgress {
        task_id: String,
    },
    Completed {
        task_id: String,
        engine: String,
        result: Value,
        solve_duration_ms: Option<i64>,
    },
    Failed {
        task_id: String,
        error: Option<String>,
    },
    Canceled {
        task_id: String,
    },
    NotFound {
        task_id: String,
    },
    /// The task store could not be read.
    Unavailable {
        task_id: String,
        error: String,
    },
    /// Always the last item of a stream.
    End,
}

impl ProgressEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::InProgress { .. } => "in-progress",
            ProgressEvent::Completed { .. } => "completed",
            ProgressEvent::Failed { .. } => "failed",
            ProgressEvent::Canceled { .. } => "canceled",
            ProgressEvent::NotFound { .. } => "not-found",
            ProgressEvent::Unavailable { .. } => "unavailable",
            ProgressEvent::End => "end",
        }
    }

    /// Whether this event is followed only by [`ProgressEvent::End`].
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::InProgress { .. } | ProgressEvent::End)
    }

    fn from_record(record: TaskRecord) -> Self {
        let task_id = record.id.clone();
        match record.status() {
            TaskStatus::Running => ProgressEvent::InProgress { task_id },
            TaskStatus::Completed => {
                let solve_duration_ms = record.solve_duration_ms();
                let raw = record.result.unwrap_or_default();
                let result = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
                ProgressEvent::Completed {
                    task_id,
                    engine: record.engine,
                    result,
                    solve_duration_ms,
                }
            }
            TaskStatus::Failed => ProgressEvent::Failed {
                task_id,
                error: record.error,
            },
            TaskStatus::Canceled => ProgressEvent::Canceled { task_id },
        }
    }
}

/// Read-only view of task progress.
#[derive(Debug, Clone)]
pub struct ProgressPublisher {
    store: Arc<SqliteStore>,
    ticker: Ticker,
}

enum Phase {
    Polling(Interval),
    Ending,
    Done,
}

struct Cursor {
    store: Arc<SqliteStore>,
    task_id: String,
    phase: Phase,
}

impl ProgressPublisher {
    pub fn new(store: Arc<SqliteStore>, ticker: Ticker) -> Self {
        Self { store, ticker }
    }

    /// Stream the state of `task_id`, one event per tick, until it is terminal.
    ///
    /// The stream is lazy: nothing is read before the first poll, and
    /// dropping it stops the polling.
    pub fn subscribe(&self, task_id: String) -> BoxStream<'static, ProgressEvent> {
        let cursor = Cursor {
            store: Arc::clone(&self.store),
            task_id,
            phase: Phase::Polling(self.ticker.start()),
        };
        stream::unfold(cursor, |mut cursor| async move {
            match cursor.phase {
                Phase::Polling(ref mut ticker) => {
                    ticker.tick().await;
                    let event = match cursor.store.get_task(&cursor.task_id).await {
                        Ok(Some(record)) => ProgressEvent::from_record(record),
                        Ok(None) => ProgressEvent::NotFound {
                            task_id: cursor.task_id.clone(),
                        },
                        Err(e) => {
                            debug!(task_id = %cursor.task_id, error = %e, "progress poll failed");
                            ProgressEvent::Unavailable {
                                task_id: cursor.task_id.clone(),
                                error: e.to_string(),
                            }
                        }
                    };
                    if event.is_terminal() {
                        cursor.phase = Phase::Ending;
                    }
                    Some((event, cursor))
                }
                Phase::Ending => {
                    cursor.phase = Phase::Done;
                    Some((ProgressEvent::End, cursor))
                }
                Phase::Done => None,
            }
        })
        .boxed()
    }
}
