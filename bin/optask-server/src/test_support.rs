//! Fixtures shared by the unit tests of the runtime and the HTTP routes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use optask_solver::{
    Constraint, ConstraintSense, EngineError, EngineRegistry, MicrolpEngine, Model, Objective,
    ObjectiveSense, Problem, SolveOutcome, SolverEngine, VariableDomain,
};

use crate::config::Config;
use crate::entities::{SqliteStore, TaskRecord, TaskStore};
use crate::runtime::{ProgressPublisher, TaskRunner, Ticker};
use crate::state::AppState;

pub const POLL: Duration = Duration::from_millis(10);

/// Waits inside the engine until [`Gate::open`] is called.
pub const GATED: &str = "gated";
/// Waits like [`GATED`], then fails.
pub const GATED_FAIL: &str = "gated-fail";
/// Panics as soon as it is called.
pub const GATED_PANIC: &str = "gated-panic";

/// A latch that holds blocking engine calls until a test releases them.
#[derive(Clone, Default)]
pub struct Gate {
    open: Arc<(Mutex<bool>, Condvar)>,
    entered: Arc<AtomicUsize>,
    left: Arc<AtomicUsize>,
}

impl Gate {
    pub fn open(&self) {
        let (lock, cvar) = &*self.open;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub async fn wait_entered(&self, n: usize) {
        wait_until(|| self.entered() >= n).await;
    }

    pub async fn wait_left(&self, n: usize) {
        wait_until(|| self.left.load(Ordering::SeqCst) >= n).await;
    }

    fn pass(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let (lock, cvar) = &*self.open;
        // Bounded so a failing test cannot leave a blocking thread behind
        // that keeps the test runtime from shutting down.
        let guard = lock.lock().unwrap();
        let _ = cvar
            .wait_timeout_while(guard, Duration::from_secs(10), |open| !*open)
            .unwrap();
        self.left.fetch_add(1, Ordering::SeqCst);
    }
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

enum Behaviour {
    Solve,
    Fail,
    Panic,
}

struct GatedEngine {
    name: &'static str,
    gate: Gate,
    behaviour: Behaviour,
}

impl SolverEngine for GatedEngine {
    fn name(&self) -> &str {
        self.name
    }

    fn solve(&self, model: &Model) -> Result<SolveOutcome, EngineError> {
        match self.behaviour {
            Behaviour::Panic => panic!("engine exploded"),
            Behaviour::Fail => {
                self.gate.pass();
                Err(EngineError::Solver("license server unreachable".into()))
            }
            Behaviour::Solve => {
                self.gate.pass();
                MicrolpEngine.solve(model)
            }
        }
    }
}

/// Built-in engines plus the gated test engines, all sharing `gate`.
pub fn registry(gate: &Gate) -> EngineRegistry {
    let mut registry = EngineRegistry::with_builtin(MicrolpEngine::NAME);
    for (name, behaviour) in [
        (GATED, Behaviour::Solve),
        (GATED_FAIL, Behaviour::Fail),
        (GATED_PANIC, Behaviour::Panic),
    ] {
        registry.register(GatedEngine {
            name,
            gate: gate.clone(),
            behaviour,
        });
    }
    registry
}

pub async fn runtime(
    worker_slots: usize,
) -> (Arc<SqliteStore>, TaskRunner, ProgressPublisher, Gate) {
    let store = Arc::new(SqliteStore::connect_in_memory().await.expect("in-memory store"));
    let gate = Gate::default();
    let runner = runner_on(&store, &gate, worker_slots, POLL);
    let publisher = ProgressPublisher::new(Arc::clone(&store), Ticker::new(POLL));
    (store, runner, publisher, gate)
}

/// A runner over an existing store with its own polling period.
pub fn runner_on(
    store: &Arc<SqliteStore>,
    gate: &Gate,
    worker_slots: usize,
    period: Duration,
) -> TaskRunner {
    TaskRunner::new(
        Arc::clone(store),
        Arc::new(registry(gate)),
        worker_slots,
        Ticker::new(period),
    )
}

pub async fn app_state(worker_slots: usize) -> (Arc<AppState>, Gate) {
    let (store, runner, publisher, gate) = runtime(worker_slots).await;
    let mut config = Config::from_env();
    config.poll_interval = POLL;
    config.worker_slots = worker_slots;
    config.default_engine = MicrolpEngine::NAME.to_owned();
    let state = AppState {
        config: Arc::new(config),
        store,
        runner,
        publisher,
    };
    (Arc::new(state), gate)
}

/// Poll `id` until it leaves `running`.
pub async fn wait_terminal(store: &SqliteStore, id: &str) -> TaskRecord {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let record = store
                .get_task(id)
                .await
                .expect("store readable")
                .expect("task exists");
            if record.status().is_terminal() {
                return record;
            }
            tokio::time::sleep(POLL).await;
        }
    })
    .await
    .expect("task reached a terminal state")
}

/// maximize 3x + 2y  s.t.  x + y <= 4,  x, y >= 0  (optimum 12).
pub fn lp_problem() -> Problem {
    Problem {
        variable_domains: vec![VariableDomain::NonNegativeReals; 2],
        objective: Objective {
            coefficients: vec![3.0, 2.0],
            sense: ObjectiveSense::Maximize,
        },
        constraints: vec![Constraint {
            coefficients: vec![1.0, 1.0],
            sense: ConstraintSense::LessOrEqual,
            rhs: 4.0,
        }],
    }
}

/// x >= 5 and x <= 1.
pub fn infeasible_problem() -> Problem {
    Problem {
        variable_domains: vec![VariableDomain::NonNegativeReals],
        objective: Objective {
            coefficients: vec![1.0],
            sense: ObjectiveSense::Minimize,
        },
        constraints: vec![
            Constraint {
                coefficients: vec![1.0],
                sense: ConstraintSense::GreaterOrEqual,
                rhs: 5.0,
            },
            Constraint {
                coefficients: vec![1.0],
                sense: ConstraintSense::LessOrEqual,
                rhs: 1.0,
            },
        ],
    }
}
