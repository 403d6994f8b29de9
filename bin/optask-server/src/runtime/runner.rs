//! Background execution of submitted tasks.
//!
//! A solve is a blocking call with no cancellation hook.  The runner moves it
//! onto a blocking thread and, while it is outstanding, polls the task store
//! for the `canceled` flag.  When the flag wins, the runner records the
//! cancellation and stops waiting: the engine call is abandoned, not killed,
//! and keeps its worker slot until it returns on its own.

use std::future::Future;
use std::sync::Arc;

use optask_solver::{EngineRegistry, Model, Problem, SolverEngine};
use tokio::sync::Semaphore;
use tokio::time::Interval;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::{RuntimeError, TaskStatus, Ticker};
use crate::entities::{SqliteStore, TaskRecord, TaskStore};

/// Accepts tasks and owns their lifecycle until the terminal write.
#[derive(Clone)]
pub struct TaskRunner {
    store: Arc<SqliteStore>,
    engines: Arc<EngineRegistry>,
    /// One permit per concurrently running solve; waiters queue FIFO.
    slots: Arc<Semaphore>,
    ticker: Ticker,
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("engines", &self.engines)
            .field("free_slots", &self.slots.available_permits())
            .field("poll_interval", &self.ticker.period())
            .finish()
    }
}

impl TaskRunner {
    pub fn new(
        store: Arc<SqliteStore>,
        engines: Arc<EngineRegistry>,
        worker_slots: usize,
        ticker: Ticker,
    ) -> Self {
        Self {
            store,
            engines,
            slots: Arc::new(Semaphore::new(worker_slots.max(1))),
            ticker,
        }
    }

    pub fn engines(&self) -> &EngineRegistry {
        &self.engines
    }

    /// Validate and persist a new task, then start it in the background.
    ///
    /// Returns the new task id as soon as the record is stored; it never
    /// waits for a worker slot or for the solve.  Nothing is stored when the
    /// engine is unknown or the problem is malformed.
    pub async fn submit(
        &self,
        problem: Problem,
        engine_choice: Option<&str>,
    ) -> Result<String, RuntimeError> {
        let (engine_name, engine) = self.engines.resolve(engine_choice).ok_or_else(|| {
            RuntimeError::UnknownEngine(
                engine_choice
                    .unwrap_or(self.engines.default_engine())
                    .to_owned(),
            )
        })?;
        let problem_json = serde_json::to_string(&problem)?;
        let model = Model::build(problem)?;

        let id = Uuid::new_v4().to_string();
        self.store
            .insert_task(TaskRecord::new(&id, problem_json, &engine_name))
            .await?;
        info!(task_id = %id, engine = %engine_name, "task accepted");

        let span = info_span!("task", task_id = %id, engine = %engine_name);
        tokio::spawn(self.clone().run(id.clone(), model, engine).instrument(span));
        Ok(id)
    }

    async fn run(self, id: String, model: Model, engine: Arc<dyn SolverEngine>) {
        match self.drive(&id, model, engine).await {
            Ok(status) => info!(%status, "task finished"),
            // Only a closed pool ends up here; the task stays running until
            // startup recovery finishes it.
            Err(e) => error!(error = %e, "task runner lost access to the task store"),
        }
    }

    async fn drive(
        &self,
        id: &str,
        model: Model,
        engine: Arc<dyn SolverEngine>,
    ) -> Result<TaskStatus, RuntimeError> {
        let mut ticker = self.ticker.start();

        // Queue for a worker slot.  A queued task can be canceled before it
        // ever reaches the engine; the first tick is immediate, so the flag is
        // always checked once before a slot is taken.
        let acquire = Arc::clone(&self.slots).acquire_owned();
        tokio::pin!(acquire);
        let slot = loop {
            tokio::select! {
                biased;
                _ = ticker.tick() => {
                    if self.cancel_requested(id).await {
                        debug!("canceled while queued");
                        return self.acknowledge_cancel(id, &mut ticker).await;
                    }
                }
                slot = &mut acquire => break slot,
            }
        };
        let Ok(slot) = slot else {
            return self.fail(id, "worker pool is shut down", &mut ticker).await;
        };

        debug!(free_slots = self.slots.available_permits(), "starting solve");
        let mut invocation = tokio::task::spawn_blocking(move || {
            // Held until the engine returns, even if the runner stops waiting.
            let _slot = slot;
            engine.solve(&model)
        });

        let joined = loop {
            tokio::select! {
                joined = &mut invocation => break joined,
                _ = ticker.tick() => {
                    if self.cancel_requested(id).await {
                        warn!("canceled during solve; abandoning the engine call");
                        return self.acknowledge_cancel(id, &mut ticker).await;
                    }
                }
            }
        };

        match joined {
            Ok(Ok(outcome)) => {
                let result = match serde_json::to_string(&outcome) {
                    Ok(result) => result,
                    Err(e) => {
                        let reason = format!("failed to encode result: {e}");
                        return self.fail(id, &reason, &mut ticker).await;
                    }
                };
                // Guarded by `canceled = 0`: a cancellation stored after the
                // last poll still wins over this result.
                let stored = self
                    .persist(&mut ticker, "complete", || self.store.complete_task(id, &result))
                    .await?;
                if stored {
                    info!(termination = %outcome.termination_kind, "solve completed");
                    Ok(TaskStatus::Completed)
                } else {
                    debug!("result discarded; cancellation arrived first");
                    self.acknowledge_cancel(id, &mut ticker).await
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "engine failed");
                self.fail(id, &e.to_string(), &mut ticker).await
            }
            Err(e) if e.is_panic() => {
                error!("engine panicked");
                self.fail(id, "solver engine panicked", &mut ticker).await
            }
            Err(e) => {
                let reason = format!("solve aborted: {e}");
                self.fail(id, &reason, &mut ticker).await
            }
        }
    }

    /// A read failure counts as "not canceled yet"; the next tick asks again.
    async fn cancel_requested(&self, id: &str) -> bool {
        match self.store.cancel_flag(id).await {
            Ok(flag) => flag.unwrap_or(false),
            Err(e) => {
                warn!(error = %e, "cancel check failed; retrying on next tick");
                false
            }
        }
    }

    async fn acknowledge_cancel(
        &self,
        id: &str,
        ticker: &mut Interval,
    ) -> Result<TaskStatus, RuntimeError> {
        self.persist(ticker, "cancel", || self.store.finish_task(id, None))
            .await?;
        Ok(TaskStatus::Canceled)
    }

    async fn fail(
        &self,
        id: &str,
        reason: &str,
        ticker: &mut Interval,
    ) -> Result<TaskStatus, RuntimeError> {
        self.persist(ticker, "fail", || self.store.finish_task(id, Some(reason)))
            .await?;
        Ok(TaskStatus::Failed)
    }

    /// Repeat a terminal write on the ticker until the store accepts it.
    ///
    /// Terminal writes are guarded by `finished_at IS NULL`, so a retry after
    /// an ambiguous failure can never overwrite an earlier terminal state.
    /// Gives up only once the pool is closed.
    async fn persist<T, F, Fut>(
        &self,
        ticker: &mut Interval,
        write: &'static str,
        mut attempt: F,
    ) -> Result<T, RuntimeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(sqlx::Error::PoolClosed) => return Err(sqlx::Error::PoolClosed.into()),
                Err(e) => {
                    warn!(write, error = %e, "terminal write failed; retrying on next tick");
                    ticker.tick().await;
                }
            }
        }
    }
}
