//! Request and response DTOs for the coordination API.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use cortex_core::models::{TaskStep, WorkflowProgress};
use serde::{Deserialize, Serialize};

/// Body of `POST /v1/tasks`
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitTaskRequest {
    /// Original user request for planning
    pub user_request: String,
    /// Optional human-readable workflow name
    #[serde(default)]
    pub workflow_name: Option<String>,
    /// Optional project to associate the workflow with
    #[serde(default)]
    pub project_id: Option<String>,
    /// Forwarded opaquely to workers via metadata
    #[serde(default)]
    pub fast_mode: bool,
    /// Additional request context, opaque to the core
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Response of `POST /v1/tasks`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGraphResponse {
    pub workflow_id: String,
    pub workflow_name: String,
    pub tasks: Vec<TaskStep>,
    pub created_at: DateTime<Utc>,
    pub total_tasks: usize,
}

/// Response of `GET /v1/workflows/{id}/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStatusResponse {
    pub workflow_id: String,
    pub workflow_name: String,
    pub status: String,
    pub total_tasks: i64,
    pub pending_tasks: i64,
    pub ready_tasks: i64,
    pub in_progress_tasks: i64,
    pub completed_tasks: i64,
    pub is_complete: bool,
}

impl From<WorkflowProgress> for WorkflowStatusResponse {
    fn from(progress: WorkflowProgress) -> Self {
        Self {
            workflow_id: progress.workflow_id,
            workflow_name: progress.workflow_name,
            status: progress.status.to_string(),
            total_tasks: progress.total_tasks,
            pending_tasks: progress.pending_tasks,
            ready_tasks: progress.ready_tasks,
            in_progress_tasks: progress.in_progress_tasks,
            completed_tasks: progress.completed_tasks,
            is_complete: progress.is_complete,
        }
    }
}

/// One claimed task in the worker-status view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerTaskView {
    pub task_id: String,
    pub task_name: String,
    pub task_description: String,
    pub workflow_id: String,
    pub started_at: Option<DateTime<Utc>>,
}

/// Response of `GET /v1/workers/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatusResponse {
    pub worker_tasks: HashMap<String, WorkerTaskView>,
    pub total_active: usize,
    pub timestamp: DateTime<Utc>,
}

/// Response of `GET /v1/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            service: "coordination-server".to_string(),
        }
    }
}

/// Standardized error body used across all endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }
}
