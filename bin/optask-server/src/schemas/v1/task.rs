use optask_solver::{Constraint, Objective, Problem, VariableDomain};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::entities::TaskRecord;
use crate::runtime::{CancelAck, TaskStatus};

pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const MAX_LIST_LIMIT: u32 = 500;

/// A problem description plus an optional engine choice.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitTaskRequest {
    /// One domain per variable, e.g. `"NonNegativeReals"` or `"Binary"`.
    #[schema(value_type = Vec<String>)]
    pub variable_domains: Vec<VariableDomain>,
    /// `{"coefficients": [..], "sense": "maximize" | "minimize"}`.
    #[schema(value_type = Object)]
    pub objective: Objective,
    /// `{"coefficients": [..], "sense": "<=" | ">=" | "=", "rhs": ..}` rows.
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub constraints: Vec<Constraint>,
    /// Engine name; the server default is used when omitted.
    pub solver: Option<String>,
}

impl SubmitTaskRequest {
    pub fn into_parts(self) -> (Problem, Option<String>) {
        let problem = Problem {
            variable_domains: self.variable_domains,
            objective: self.objective,
            constraints: self.constraints,
        };
        (problem, self.solver)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitTaskResponse {
    pub task_id: String,
    /// Always `"accepted"`.
    pub status: String,
}

impl SubmitTaskResponse {
    pub fn accepted(task_id: String) -> Self {
        Self {
            task_id,
            status: "accepted".to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListQuery {
    /// Maximum number of tasks, newest first (default 50, at most 500).
    pub limit: Option<u32>,
}

impl ListQuery {
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskResponse {
    pub id: String,
    pub status: TaskStatus,
    pub engine: String,
    /// The problem exactly as accepted.
    #[schema(value_type = Object)]
    pub problem: Value,
    pub canceled: bool,
    pub error: Option<String>,
    pub submitted_at: String,
    pub finished_at: Option<String>,
    pub solve_duration_ms: Option<i64>,
}

impl TaskRecord {
    pub fn to_response(&self) -> TaskResponse {
        TaskResponse {
            id: self.id.clone(),
            status: self.status(),
            engine: self.engine.clone(),
            problem: serde_json::from_str(&self.problem)
                .unwrap_or_else(|_| Value::String(self.problem.clone())),
            canceled: self.canceled,
            error: self.error.clone(),
            submitted_at: self.submitted_at.to_rfc3339(),
            finished_at: self.finished_at.map(|t| t.to_rfc3339()),
            solve_duration_ms: self.solve_duration_ms(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CancelResponse {
    pub task_id: String,
    /// `"cancel_requested"` or `"already_finished"`.
    pub status: String,
}

impl CancelResponse {
    pub fn new(task_id: String, ack: CancelAck) -> Self {
        Self {
            task_id,
            status: ack.as_str().to_owned(),
        }
    }
}
