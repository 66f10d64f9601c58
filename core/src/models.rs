use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution status of a single task within a workflow.
///
/// Tasks move through a one-way pipeline. `Pending` tasks wait for their
/// dependencies, `Ready` tasks can be claimed by a polling worker, and a
/// claimed task is `InProgress` until its result is reported. A rework reset
/// moves `Completed` tasks back to `Pending` (or `Ready` for tasks without
/// dependencies); nothing else ever demotes a task.
///
/// ```text
/// PENDING ──deps satisfied──► READY ──claimed──► IN_PROGRESS ──result──► COMPLETED
///                                                                          │
///                              ◄──────────── rework reset ────────────────┘
/// ```
///
/// `Failed` exists in the schema for future explicit failure reporting; no
/// current code path assigns it.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting on one or more dependencies
    Pending,
    /// All dependencies completed; claimable by a worker
    Ready,
    /// Claimed by a worker and executing
    InProgress,
    /// Result reported and persisted
    Completed,
    /// Reserved; never assigned by the current control flow
    Failed,
}

impl TaskStatus {
    /// Database / wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Ready => "READY",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }

    /// Parse the database representation. Unknown strings are rejected at
    /// the persistence boundary rather than coerced.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TaskStatus::Pending),
            "READY" => Some(TaskStatus::Ready),
            "IN_PROGRESS" => Some(TaskStatus::InProgress),
            "COMPLETED" => Some(TaskStatus::Completed),
            "FAILED" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate status of a workflow or a project.
///
/// A workflow is `Completed` only when every task in it is completed; a
/// project is `Completed` only when every workflow in it is. `Failed` is
/// reserved and never assigned automatically.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    InProgress,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::InProgress => "IN_PROGRESS",
            WorkflowStatus::Completed => "COMPLETED",
            WorkflowStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN_PROGRESS" => Some(WorkflowStatus::InProgress),
            "COMPLETED" => Some(WorkflowStatus::Completed),
            "FAILED" => Some(WorkflowStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File access mode declared by a task or requested from the file
/// coordinator.
///
/// Compatibility matrix (rows: existing lock, columns: requested):
///
/// |             | read | write | exclusive |
/// |-------------|------|-------|-----------|
/// | read        | ok   | no    | no        |
/// | write       | no   | no    | no        |
/// | exclusive   | no   | no    | no        |
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Read,
    Write,
    Exclusive,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Read => "read",
            AccessType::Write => "write",
            AccessType::Exclusive => "exclusive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(AccessType::Read),
            "write" => Some(AccessType::Write),
            "exclusive" => Some(AccessType::Exclusive),
            _ => None,
        }
    }

    /// Two holders on the same path are compatible only when both are reads.
    pub fn is_compatible_with(&self, other: AccessType) -> bool {
        matches!((self, other), (AccessType::Read, AccessType::Read))
    }
}

impl std::fmt::Display for AccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single iteration of a worker's reasoning-acting loop.
///
/// Opaque to the coordination core: stored and replayed verbatim into audit
/// prompts, never interpreted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThoughtAction {
    /// Worker's reasoning about the current situation
    pub thought: String,
    /// Action the worker decided to take
    pub action: String,
    /// Result or feedback from the action, when recorded
    #[serde(default)]
    pub observation: Option<String>,
    /// Sequential number of this iteration
    pub iteration_number: i32,
}

/// Complete execution trace a worker posts back for one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RaHistory {
    /// Ordered reasoning-acting iterations
    pub iterations: Vec<ThoughtAction>,
    /// Final task output after all iterations
    pub final_result: String,
    /// Agent role that produced the result
    pub source_agent: String,
    /// Total execution duration in seconds
    pub execution_time: f64,
    /// Worker client that executed the task
    pub client_id: String,
}

/// One task of a workflow, with its dependency list and claim bookkeeping.
///
/// `step_id` is the externally visible sequential identifier (`TID` +
/// 10 digits once persisted). `dependencies` only ever references sibling
/// step ids of the same workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStep {
    /// Unique identifier used for dependency tracking
    pub step_id: String,
    /// Parent workflow identifier
    pub workflow_id: String,
    /// Human-readable task name
    #[serde(default = "default_task_name")]
    pub task_name: String,
    /// Detailed description handed to the executing worker
    pub task_description: String,
    /// Agent role responsible for execution
    pub assigned_agent: String,
    /// Step ids that must complete before this task becomes ready
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Project directory for file operations, once resolved
    #[serde(default)]
    pub project_path: Option<String>,
    /// File paths this task declares it will touch
    #[serde(default)]
    pub file_dependencies: Vec<String>,
    /// Declared access mode per file path
    #[serde(default)]
    pub file_access_types: HashMap<String, AccessType>,
    /// Current execution status
    #[serde(default = "default_task_status")]
    pub status: TaskStatus,
    /// Worker currently executing the task, if claimed
    #[serde(default)]
    pub client_id: Option<String>,
    /// Claim timestamp
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Completion timestamp
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

fn default_task_name() -> String {
    "Untitled Task".to_string()
}

fn default_task_status() -> TaskStatus {
    TaskStatus::Pending
}

impl TaskStep {
    /// Tasks without dependencies are ready the moment they exist.
    pub fn is_initial(&self) -> bool {
        self.dependencies.is_empty()
    }
}

/// The persisted DAG of tasks produced from one user request.
///
/// `metadata` is an opaque JSON object: the core appends keys (original
/// request, rework history) but never branches on its contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskGraph {
    pub workflow_id: String,
    #[serde(default = "default_workflow_name")]
    pub workflow_name: String,
    pub tasks: Vec<TaskStep>,
    /// Set by the database on save
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default = "empty_metadata")]
    pub metadata: serde_json::Value,
}

fn default_workflow_name() -> String {
    "Untitled Workflow".to_string()
}

fn empty_metadata() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl TaskGraph {
    /// Number of tasks currently in `Ready` status.
    pub fn ready_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Ready)
            .count()
    }
}

/// Completion report a worker posts to `/v1/results`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    pub workflow_id: String,
    /// Step id of the completed task
    pub task_id: String,
    pub ra_history: RaHistory,
    pub completed_at: DateTime<Utc>,
}

/// Quality assessment produced by one audit attempt on a workflow.
///
/// Insert-only: rework produces additional reports rather than mutating
/// earlier ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditReport {
    pub workflow_id: String,
    /// Whether the work met the quality bar
    pub is_successful: bool,
    /// Detailed assessment text
    pub feedback: String,
    /// Actionable improvements, fed back into the rework reset
    #[serde(default)]
    pub rework_suggestions: Vec<String>,
    /// Auditor confidence in `[0, 1]`
    pub confidence_score: f64,
    /// Step ids of the tasks that were reviewed
    pub reviewed_tasks: Vec<String>,
    /// Criteria used for the evaluation
    #[serde(default)]
    pub audit_criteria: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A named grouping of workflows with a filesystem directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    /// External sequential identifier (`PID` + 6 digits)
    pub project_id: String,
    pub project_name: String,
    pub project_path: Option<String>,
    pub status: WorkflowStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Advisory database record of one active file acquisition, visible to
/// external observers. The authoritative conflict check is the
/// compatibility matrix applied over the active rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileLockRecord {
    pub file_path: String,
    pub client_id: String,
    pub task_step_id: Option<String>,
    pub workflow_id: Option<String>,
    pub access_type: AccessType,
    pub locked_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Progress summary for one workflow, as returned by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowProgress {
    pub workflow_id: String,
    pub workflow_name: String,
    pub status: WorkflowStatus,
    pub total_tasks: i64,
    pub pending_tasks: i64,
    pub ready_tasks: i64,
    pub in_progress_tasks: i64,
    pub completed_tasks: i64,
    pub is_complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Ready,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("DONE"), None);
        assert_eq!(TaskStatus::parse("pending"), None);
    }

    #[test]
    fn test_workflow_status_round_trip() {
        for status in [
            WorkflowStatus::InProgress,
            WorkflowStatus::Completed,
            WorkflowStatus::Failed,
        ] {
            assert_eq!(WorkflowStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(WorkflowStatus::parse("ACTIVE"), None);
    }

    #[test]
    fn test_access_compatibility_matrix() {
        use AccessType::*;

        assert!(Read.is_compatible_with(Read));
        assert!(!Read.is_compatible_with(Write));
        assert!(!Read.is_compatible_with(Exclusive));
        assert!(!Write.is_compatible_with(Read));
        assert!(!Write.is_compatible_with(Write));
        assert!(!Write.is_compatible_with(Exclusive));
        assert!(!Exclusive.is_compatible_with(Read));
        assert!(!Exclusive.is_compatible_with(Write));
        assert!(!Exclusive.is_compatible_with(Exclusive));
    }

    #[test]
    fn test_task_step_defaults_on_deserialize() {
        let json = serde_json::json!({
            "step_id": "plan_outline",
            "workflow_id": "WID_LOCAL",
            "task_description": "Outline the report",
            "assigned_agent": "writer",
            "created_at": Utc::now(),
        });

        let task: TaskStep = serde_json::from_value(json).unwrap();
        assert_eq!(task.task_name, "Untitled Task");
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.dependencies.is_empty());
        assert!(task.is_initial());
        assert!(task.client_id.is_none());
    }

    #[test]
    fn test_graph_ready_count() {
        let now = Utc::now();
        let mk = |id: &str, status: TaskStatus| TaskStep {
            step_id: id.to_string(),
            workflow_id: "WID_LOCAL".to_string(),
            task_name: "t".to_string(),
            task_description: "d".to_string(),
            assigned_agent: "analyst".to_string(),
            dependencies: vec![],
            project_path: None,
            file_dependencies: vec![],
            file_access_types: HashMap::new(),
            status,
            client_id: None,
            started_at: None,
            completed_at: None,
            created_at: now,
        };

        let graph = TaskGraph {
            workflow_id: "WID_LOCAL".to_string(),
            workflow_name: "test".to_string(),
            tasks: vec![
                mk("a", TaskStatus::Ready),
                mk("b", TaskStatus::Pending),
                mk("c", TaskStatus::Ready),
            ],
            created_at: None,
            metadata: serde_json::json!({}),
        };

        assert_eq!(graph.ready_count(), 2);
    }
}
