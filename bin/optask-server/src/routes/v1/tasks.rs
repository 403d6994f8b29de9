//! Task submission, inspection, cancellation and progress endpoints.
//!
//! Submission returns as soon as the task is stored; the solve runs in the
//! background and clients follow it by polling `GET /v1/tasks/{id}` or by
//! subscribing to `GET /v1/tasks/{id}/progress`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde_json::Value;
use utoipa::OpenApi;

use crate::entities::TaskStore;
use crate::error::ServerError;
use crate::runtime::{ProgressEvent, TaskStatus, cancel_task as request_cancel};
use crate::schemas::v1::task::{
    CancelResponse, ListQuery, SubmitTaskRequest, SubmitTaskResponse, TaskResponse,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(submit_task, list_tasks, get_task, get_task_result, cancel_task, task_progress),
    components(schemas(
        SubmitTaskRequest,
        SubmitTaskResponse,
        TaskResponse,
        CancelResponse,
        TaskStatus
    ))
)]
pub struct TasksApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", post(submit_task).get(list_tasks))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/result", get(get_task_result))
        .route("/tasks/{id}/cancel", post(cancel_task))
        .route("/tasks/{id}/progress", get(task_progress))
}

#[utoipa::path(
    post,
    path = "/v1/tasks",
    tag = "tasks",
    request_body = SubmitTaskRequest,
    responses(
        (status = 202, description = "Task accepted", body = SubmitTaskResponse),
        (status = 400, description = "Malformed problem or unknown engine"),
        (status = 413, description = "Request body too large"),
        (status = 500, description = "Task store error"),
    )
)]
pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitTaskResponse>), ServerError> {
    let Json(req) = payload?;
    let (problem, solver) = req.into_parts();
    let task_id = state.runner.submit(problem, solver.as_deref()).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitTaskResponse::accepted(task_id))))
}

#[utoipa::path(
    get,
    path = "/v1/tasks",
    tag = "tasks",
    params(ListQuery),
    responses(
        (status = 200, description = "Most recent tasks, newest first", body = [TaskResponse]),
        (status = 500, description = "Task store error"),
    )
)]
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<TaskResponse>>, ServerError> {
    let records = state.store.list_tasks(q.effective_limit()).await?;
    Ok(Json(records.iter().map(|r| r.to_response()).collect()))
}

#[utoipa::path(
    get,
    path = "/v1/tasks/{id}",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "ID of the task to retrieve")
    ),
    responses(
        (status = 200, description = "Task retrieved", body = TaskResponse),
        (status = 404, description = "Task not found"),
        (status = 500, description = "Task store error"),
    )
)]
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, ServerError> {
    let record = state
        .store
        .get_task(&id)
        .await?
        .ok_or_else(|| ServerError::task_not_found(&id))?;
    Ok(Json(record.to_response()))
}

#[utoipa::path(
    get,
    path = "/v1/tasks/{id}/result",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "ID of the task to retrieve the result for")
    ),
    responses(
        (status = 200, description = "Solve outcome", body = Value),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Task has not completed"),
        (status = 500, description = "Task store error"),
    )
)]
pub async fn get_task_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let record = state
        .store
        .get_task(&id)
        .await?
        .ok_or_else(|| ServerError::task_not_found(&id))?;

    match (record.status(), record.result) {
        (TaskStatus::Completed, Some(raw)) => {
            let result = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            Ok(Json(result))
        }
        (status, _) if !status.is_terminal() => Err(ServerError::Conflict(format!(
            "task {id} is still running"
        ))),
        (status, _) => Err(ServerError::Conflict(format!(
            "task {id} has no result (status: {status})"
        ))),
    }
}

#[utoipa::path(
    post,
    path = "/v1/tasks/{id}/cancel",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "ID of the task to cancel")
    ),
    responses(
        (status = 200, description = "Cancellation recorded, or task already finished", body = CancelResponse),
        (status = 404, description = "Task not found"),
        (status = 500, description = "Task store error"),
    )
)]
pub async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ServerError> {
    let ack = request_cancel(state.store.as_ref(), &id).await?;
    Ok(Json(CancelResponse::new(id, ack)))
}

#[utoipa::path(
    get,
    path = "/v1/tasks/{id}/progress",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "ID of the task to follow")
    ),
    responses(
        (status = 200, description = "Server-sent events: in-progress, then one of completed / failed / canceled / not-found / unavailable, then end", body = String, content_type = "text/event-stream"),
    )
)]
pub async fn task_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = state.publisher.subscribe(id).map(|event| to_sse(&event));
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn to_sse(event: &ProgressEvent) -> Result<Event, axum::Error> {
    match event {
        ProgressEvent::End => Ok(Event::default().event(event.kind()).data("[end]")),
        _ => Event::default().event(event.kind()).json_data(event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, header};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::test_support::{self, GATED};

    async fn send(app: Router, req: Request<Body>) -> Response {
        app.oneshot(req).await.expect("infallible router")
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn lp_body(solver: Option<&str>) -> Value {
        let mut body = serde_json::to_value(test_support::lp_problem()).unwrap();
        if let Some(solver) = solver {
            body["solver"] = Value::from(solver);
        }
        body
    }

    #[tokio::test]
    async fn submit_then_fetch_result() {
        let (state, _) = test_support::app_state(1).await;
        let app = crate::routes::build(Arc::clone(&state));

        let response = send(app.clone(), post_json("/v1/tasks", lp_body(None))).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "accepted");
        let id = body["task_id"].as_str().unwrap().to_owned();

        test_support::wait_terminal(&state.store, &id).await;

        let detail = body_json(send(app.clone(), get(&format!("/v1/tasks/{id}"))).await).await;
        assert_eq!(detail["status"], "completed");
        assert_eq!(detail["engine"], "microlp");
        assert_eq!(detail["problem"]["objective"]["sense"], "maximize");
        assert!(detail["solve_duration_ms"].is_i64());

        let response = send(app, get(&format!("/v1/tasks/{id}/result"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let result = body_json(response).await;
        assert_eq!(result["terminationKind"], "optimal");
        let objective = result["objectiveValue"].as_f64().unwrap();
        assert!((objective - 12.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn invalid_problem_is_rejected_with_400() {
        let (state, _) = test_support::app_state(1).await;
        let app = crate::routes::build(Arc::clone(&state));
        let mut body = lp_body(None);
        body["objective"]["coefficients"] = serde_json::json!([1.0]);

        let response = send(app, post_json("/v1/tasks", body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.store.list_tasks(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unparseable_body_is_rejected_with_400() {
        let (state, _) = test_support::app_state(1).await;
        let app = crate::routes::build(state);
        let body = serde_json::json!({
            "variable_domains": ["Complex"],
            "objective": {"coefficients": [1.0], "sense": "maximize"}
        });
        let response = send(app, post_json("/v1/tasks", body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_engine_is_rejected_with_400() {
        let (state, _) = test_support::app_state(1).await;
        let app = crate::routes::build(state);
        let response = send(app, post_json("/v1/tasks", lp_body(Some("glpk")))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("glpk"));
    }

    #[tokio::test]
    async fn oversized_submission_is_rejected_with_413() {
        let (state, _) = test_support::app_state(1).await;
        let app = crate::routes::build(Arc::clone(&state));
        let mut body = lp_body(None);
        body["pad"] = Value::from("x".repeat(3 * 1024 * 1024));

        let response = send(app, post_json("/v1/tasks", body)).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(response.headers().contains_key("x-trace-id"));
        assert!(state.store.list_tasks(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn interrupted_upload_is_rejected_with_400() {
        let (state, _) = test_support::app_state(1).await;
        let app = crate::routes::build(Arc::clone(&state));
        let chunks: Vec<Result<axum::body::Bytes, std::io::Error>> = vec![
            Ok(axum::body::Bytes::from_static(b"{\"variable_domains\":")),
            Err(std::io::Error::other("connection reset")),
        ];
        let req = Request::post("/v1/tasks")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from_stream(futures::stream::iter(chunks)))
            .unwrap();

        let response = send(app, req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().to_lowercase().contains("body"));
        assert!(state.store.list_tasks(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_task_is_404() {
        let (state, _) = test_support::app_state(1).await;
        let app = crate::routes::build(state);
        for req in [
            get("/v1/tasks/missing"),
            get("/v1/tasks/missing/result"),
            Request::post("/v1/tasks/missing/cancel").body(Body::empty()).unwrap(),
        ] {
            let response = send(app.clone(), req).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn result_of_running_task_is_409() {
        let (state, gate) = test_support::app_state(1).await;
        let app = crate::routes::build(Arc::clone(&state));
        let body = body_json(send(app.clone(), post_json("/v1/tasks", lp_body(Some(GATED)))).await).await;
        let id = body["task_id"].as_str().unwrap();

        let response = send(app, get(&format!("/v1/tasks/{id}/result"))).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        gate.open();
    }

    #[tokio::test]
    async fn cancel_running_then_finished_task() {
        let (state, gate) = test_support::app_state(1).await;
        let app = crate::routes::build(Arc::clone(&state));
        let body = body_json(send(app.clone(), post_json("/v1/tasks", lp_body(Some(GATED)))).await).await;
        let id = body["task_id"].as_str().unwrap().to_owned();
        let cancel = || {
            Request::post(format!("/v1/tasks/{id}/cancel"))
                .body(Body::empty())
                .unwrap()
        };

        let first = body_json(send(app.clone(), cancel()).await).await;
        assert_eq!(first["status"], "cancel_requested");
        assert_eq!(first["task_id"], id.as_str());

        let record = test_support::wait_terminal(&state.store, &id).await;
        assert_eq!(record.status(), TaskStatus::Canceled);

        let second = body_json(send(app, cancel()).await).await;
        assert_eq!(second["status"], "already_finished");
        gate.open();
    }

    #[tokio::test]
    async fn list_is_newest_first_and_limited() {
        let (state, _) = test_support::app_state(2).await;
        let app = crate::routes::build(Arc::clone(&state));
        let mut ids = Vec::new();
        for _ in 0..3 {
            let body = body_json(send(app.clone(), post_json("/v1/tasks", lp_body(None))).await).await;
            ids.push(body["task_id"].as_str().unwrap().to_owned());
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let listed = body_json(send(app, get("/v1/tasks?limit=2")).await).await;
        let listed: Vec<&str> = listed
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["id"].as_str().unwrap())
            .collect();
        assert_eq!(listed, vec![ids[2].as_str(), ids[1].as_str()]);
    }

    #[tokio::test]
    async fn progress_of_unknown_task_is_not_found_then_end() {
        let (state, _) = test_support::app_state(1).await;
        let app = crate::routes::build(state);
        let response = send(app, get("/v1/tasks/missing/progress")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("event: not-found"), "{text}");
        assert!(text.contains("event: end\ndata: [end]"), "{text}");
        assert!(!text.contains("in-progress"), "{text}");
    }

    #[tokio::test]
    async fn progress_of_completed_task_carries_result() {
        let (state, _) = test_support::app_state(1).await;
        let app = crate::routes::build(Arc::clone(&state));
        let body = body_json(send(app.clone(), post_json("/v1/tasks", lp_body(None))).await).await;
        let id = body["task_id"].as_str().unwrap().to_owned();
        test_support::wait_terminal(&state.store, &id).await;

        let response = send(app, get(&format!("/v1/tasks/{id}/progress"))).await;
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(text.matches("event: completed").count(), 1, "{text}");
        assert!(text.contains("\"terminationKind\":\"optimal\""), "{text}");
        assert!(text.trim_end().ends_with("data: [end]"), "{text}");
    }
}
