//! Task persistence.
//!
//! Every mutation is a single guarded `UPDATE` that touches only the fields
//! its caller owns, so the runner and cancellation requests can write the
//! same row concurrently without a read-modify-write cycle:
//!
//! * cancellation writes `canceled`, only while `finished_at IS NULL`;
//! * the runner writes `finished_at` (plus `result` or `error`), only while
//!   `finished_at IS NULL`, and writes `result` only while `canceled = 0`.

use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::entities::{SqliteStore, dao::TaskRecord};
use crate::runtime::CancelAck;

pub trait TaskStore: Send + Sync + 'static {
    fn insert_task(&self, record: TaskRecord) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_task(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<TaskRecord>, sqlx::Error>> + Send;

    /// Most recently submitted tasks first.
    fn list_tasks(
        &self,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<TaskRecord>, sqlx::Error>> + Send;

    /// Current value of the `canceled` flag; `None` if the task is unknown.
    fn cancel_flag(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<bool>, sqlx::Error>> + Send;

    /// Set `canceled` on a running task.  `None` if the task is unknown.
    fn request_cancel(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<CancelAck>, sqlx::Error>> + Send;

    /// Terminal write for a natural completion.
    ///
    /// Returns `false` without writing anything if the task is already
    /// finished or its cancellation flag is set.
    fn complete_task(
        &self,
        id: &str,
        result: &str,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    /// Terminal write without a result (failure or cancellation
    /// acknowledgment).  Returns `false` if the task was already finished.
    fn finish_task(
        &self,
        id: &str,
        error: Option<&str>,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    /// Finish every task left unfinished by a previous process.
    fn interrupt_unfinished_tasks(
        &self,
        reason: &str,
    ) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;
}

type TaskRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    bool,
    String,
    Option<String>,
);

const TASK_COLUMNS: &str = "id, problem, engine, result, error, canceled, submitted_at, finished_at";

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// A timestamp column that does not parse fails the whole row: `finished_at`
/// decides the derived status, so a guessed value would misreport the task.
fn parse_timestamp(raw: &str, field: &'static str) -> Result<DateTime<Utc>, sqlx::Error> {
    raw.parse().map_err(|e: chrono::ParseError| sqlx::Error::ColumnDecode {
        index: field.to_owned(),
        source: Box::new(e),
    })
}

fn from_row(row: TaskRow) -> Result<TaskRecord, sqlx::Error> {
    let (id, problem, engine, result, error, canceled, submitted_at, finished_at) = row;
    Ok(TaskRecord {
        submitted_at: parse_timestamp(&submitted_at, "submitted_at")?,
        finished_at: finished_at
            .map(|raw| parse_timestamp(&raw, "finished_at"))
            .transpose()?,
        id,
        problem,
        engine,
        result,
        error,
        canceled,
    })
}

impl TaskStore for SqliteStore {
    async fn insert_task(&self, record: TaskRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO tasks (id, problem, engine, result, error, canceled, submitted_at, finished_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&record.id)
        .bind(&record.problem)
        .bind(&record.engine)
        .bind(&record.result)
        .bind(&record.error)
        .bind(record.canceled)
        .bind(timestamp(record.submitted_at))
        .bind(record.finished_at.map(timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task(&self, id: &str) -> Result<Option<TaskRecord>, sqlx::Error> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(from_row).transpose()
    }

    async fn list_tasks(&self, limit: u32) -> Result<Vec<TaskRecord>, sqlx::Error> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY submitted_at DESC LIMIT ?1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(from_row).collect()
    }

    async fn cancel_flag(&self, id: &str) -> Result<Option<bool>, sqlx::Error> {
        let row: Option<(bool,)> = sqlx::query_as("SELECT canceled FROM tasks WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(canceled,)| canceled))
    }

    async fn request_cancel(&self, id: &str) -> Result<Option<CancelAck>, sqlx::Error> {
        let updated = sqlx::query(
            "UPDATE tasks SET canceled = 1 WHERE id = ?1 AND finished_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() > 0 {
            return Ok(Some(CancelAck::Requested));
        }

        // Either the task is unknown or it has already finished.
        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM tasks WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(exists.map(|_| CancelAck::AlreadyFinished))
    }

    async fn complete_task(&self, id: &str, result: &str) -> Result<bool, sqlx::Error> {
        let updated = sqlx::query(
            "UPDATE tasks SET result = ?1, finished_at = ?2 \
             WHERE id = ?3 AND finished_at IS NULL AND canceled = 0",
        )
        .bind(result)
        .bind(timestamp(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }

    async fn finish_task(&self, id: &str, error: Option<&str>) -> Result<bool, sqlx::Error> {
        let updated = sqlx::query(
            "UPDATE tasks SET error = ?1, finished_at = ?2 WHERE id = ?3 AND finished_at IS NULL",
        )
        .bind(error)
        .bind(timestamp(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }

    async fn interrupt_unfinished_tasks(&self, reason: &str) -> Result<u64, sqlx::Error> {
        let updated = sqlx::query(
            "UPDATE tasks SET error = ?1, finished_at = ?2 WHERE finished_at IS NULL",
        )
        .bind(reason)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected())
    }
}
