//! Request handlers for the coordination API.
//!
//! Thin adapters over the workflow manager and repository: decode,
//! delegate, map errors. The poll handler swallows internal errors into a
//! null task so buggy clients cannot distinguish failures from an empty
//! queue.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use cortex_core::{
    error::CoordError,
    models::{AuditReport, TaskResult, TaskStatus, TaskStep},
    repository::CoordRepository,
};

use crate::error::ApiError;
use crate::views::{
    HealthResponse, SubmitTaskRequest, TaskGraphResponse, WorkerStatusResponse, WorkerTaskView,
    WorkflowStatusResponse,
};
use crate::AppState;

/// `POST /v1/tasks` - plan a user request into a persisted workflow.
///
/// Planning failure is absorbed by the fallback workflow, so a 201 with a
/// valid graph is returned even when the LLM is down.
pub async fn submit_task<R: CoordRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(request): Json<SubmitTaskRequest>,
) -> Result<(StatusCode, Json<TaskGraphResponse>), ApiError> {
    let mut metadata = match request.metadata {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    if let Some(workflow_name) = request.workflow_name {
        metadata.insert(
            "workflow_name".to_string(),
            serde_json::Value::String(workflow_name),
        );
    }
    if let Some(project_id) = request.project_id {
        metadata.insert(
            "project_id".to_string(),
            serde_json::Value::String(project_id),
        );
    }
    if request.fast_mode {
        metadata.insert("fast_mode".to_string(), serde_json::Value::Bool(true));
    }

    let workflow_id = state
        .manager
        .plan_and_save(&request.user_request, serde_json::Value::Object(metadata))
        .await?;

    let graph = state
        .manager
        .repository()
        .get_task_graph(&workflow_id)
        .await?
        .ok_or_else(|| {
            CoordError::Internal("Failed to retrieve saved task graph".to_string())
        })?;

    Ok((
        StatusCode::CREATED,
        Json(TaskGraphResponse {
            workflow_id: graph.workflow_id.clone(),
            workflow_name: graph.workflow_name.clone(),
            created_at: graph.created_at.unwrap_or_else(Utc::now),
            total_tasks: graph.tasks.len(),
            tasks: graph.tasks,
        }),
    ))
}

/// `GET /v1/tasks/ready` - atomic task claiming for polling workers.
///
/// Query: `agent_id` plus repeated `agent_capabilities` values (the
/// `agent_capabilities[]` spelling and comma-separated lists are also
/// accepted). Always answers 200; internal errors become null.
pub async fn get_ready_task<R: CoordRepository>(
    State(state): State<Arc<AppState<R>>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Json<Option<TaskStep>> {
    let mut agent_id = None;
    let mut capabilities: Vec<String> = Vec::new();

    for (key, value) in params {
        match key.as_str() {
            "agent_id" => agent_id = Some(value),
            "agent_capabilities" | "agent_capabilities[]" => capabilities.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(String::from),
            ),
            _ => {}
        }
    }

    let Some(agent_id) = agent_id else {
        return Json(None);
    };
    if capabilities.is_empty() {
        return Json(None);
    }

    let preferred = state.cache.ready_hint(&capabilities).await;

    let claimed = match state
        .manager
        .repository()
        .get_and_claim_ready_task(&capabilities, &agent_id, preferred.as_deref())
        .await
    {
        Ok(claimed) => claimed,
        Err(error) => {
            tracing::error!(agent_id = %agent_id, %error, "Poll failed");
            None
        }
    };

    if claimed.is_some() {
        state.cache.invalidate(&capabilities).await;
    }

    Json(claimed)
}

/// `POST /v1/results` - persist a worker's result, propagate readiness,
/// and audit the workflow once it completes.
pub async fn report_result<R: CoordRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(result): Json<TaskResult>,
) -> Result<StatusCode, ApiError> {
    let repository = state.manager.repository();

    let saved = repository.save_task_result(&result).await?;
    if !saved {
        return Err(CoordError::task_not_found(&result.task_id).into());
    }

    let newly_ready = repository
        .check_and_dispatch_ready_tasks(&result.workflow_id)
        .await?;

    if newly_ready > 0 && state.cache.is_enabled() {
        if let Some(graph) = repository.get_task_graph(&result.workflow_id).await? {
            for task in graph
                .tasks
                .iter()
                .filter(|task| task.status == TaskStatus::Ready)
            {
                state
                    .cache
                    .put_ready_hint(&task.assigned_agent, &task.step_id)
                    .await;
            }
        }
    }

    if repository.is_workflow_complete(&result.workflow_id).await? {
        let report = state.manager.trigger_audit(&result.workflow_id).await?;
        tracing::info!(
            workflow_id = %result.workflow_id,
            audit_passed = report.is_successful,
            "Workflow completed and audited"
        );
    }

    tracing::info!(
        task_id = %result.task_id,
        newly_ready,
        "Processed task result"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /v1/workflows/{id}/status`
pub async fn get_workflow_status<R: CoordRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(workflow_id): Path<String>,
) -> Result<Json<WorkflowStatusResponse>, ApiError> {
    let progress = state
        .manager
        .repository()
        .get_workflow_progress(&workflow_id)
        .await?
        .ok_or_else(|| CoordError::workflow_not_found(&workflow_id))?;

    Ok(Json(progress.into()))
}

/// `GET /v1/workflows/{id}/result` - synthesized final output.
///
/// Null until the workflow completes; 404 when complete but without
/// results to synthesize.
pub async fn get_workflow_result<R: CoordRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(workflow_id): Path<String>,
) -> Result<Json<Option<String>>, ApiError> {
    let repository = state.manager.repository();

    if !repository.is_workflow_complete(&workflow_id).await? {
        return Ok(Json(None));
    }

    let results = repository.get_workflow_results(&workflow_id).await?;
    if results.is_empty() {
        return Err(
            CoordError::NotFound(format!("No results found for workflow: {workflow_id}")).into(),
        );
    }

    let final_output = state
        .manager
        .synthesize_results(&workflow_id, &results)
        .await?;
    Ok(Json(Some(final_output)))
}

/// `GET /v1/workflows/{id}/audit` - all audit reports, oldest first.
pub async fn get_audit_reports<R: CoordRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(workflow_id): Path<String>,
) -> Result<Json<Vec<AuditReport>>, ApiError> {
    let reports = state
        .manager
        .repository()
        .get_audit_reports(&workflow_id)
        .await?;
    Ok(Json(reports))
}

/// `POST /v1/workflows/{id}/reset` - reset for rework with the given
/// suggestions.
pub async fn reset_workflow<R: CoordRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(workflow_id): Path<String>,
    Json(rework_suggestions): Json<Vec<String>>,
) -> Result<StatusCode, ApiError> {
    let reset = state
        .manager
        .repository()
        .reset_tasks_for_rework(&workflow_id, &rework_suggestions)
        .await?;

    if !reset {
        return Err(CoordError::workflow_not_found(&workflow_id).into());
    }

    tracing::info!(workflow_id = %workflow_id, "Workflow reset for rework");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /v1/workers/status` - claimed task per worker.
pub async fn get_worker_status<R: CoordRepository>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<Json<WorkerStatusResponse>, ApiError> {
    let tasks = state.manager.repository().list_in_progress_tasks().await?;

    let mut worker_tasks = HashMap::new();
    for task in tasks {
        if let Some(client_id) = &task.client_id {
            worker_tasks.insert(
                client_id.clone(),
                WorkerTaskView {
                    task_id: task.step_id.clone(),
                    task_name: task.task_name.clone(),
                    task_description: task.task_description.clone(),
                    workflow_id: task.workflow_id.clone(),
                    started_at: task.started_at,
                },
            );
        }
    }

    Ok(Json(WorkerStatusResponse {
        total_active: worker_tasks.len(),
        worker_tasks,
        timestamp: Utc::now(),
    }))
}

/// `GET /v1/health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
