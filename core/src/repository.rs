use crate::{
    error::Result,
    models::{
        AccessType, AuditReport, FileLockRecord, RaHistory, TaskGraph, TaskResult, TaskStep,
        WorkflowProgress,
    },
};
use async_trait::async_trait;

/// Repository trait for workflow, task, result, and audit persistence.
///
/// Implementations must be thread-safe and support concurrent access; every
/// mutating operation runs inside a single transaction and fails atomically.
/// Concurrency-sensitive read-modify-writes (task claiming, counter
/// increments, status cascades) must be arbitrated so that at most one
/// concurrent caller wins.
#[async_trait]
pub trait CoordRepository: Send + Sync {
    /// Create a new project, minting its sequential `PID` id.
    ///
    /// Each call mints a new project; idempotence by name is not required.
    ///
    /// # Returns
    /// * `Ok((project_id, project_key))` - External id plus internal row key
    async fn create_project(
        &self,
        project_name: &str,
        project_path: Option<&str>,
        metadata: &serde_json::Value,
    ) -> Result<(String, i64)>;

    /// Record the resolved filesystem path of a project.
    async fn update_project_path(&self, project_key: i64, project_path: &str) -> Result<()>;

    /// Atomically persist a task graph.
    ///
    /// Allocates a sequential workflow id, rewrites each task's transient
    /// step id to a freshly minted sequential task id, rewrites every
    /// dependency reference accordingly, and inserts all rows. Never
    /// partially persists.
    ///
    /// # Returns
    /// * `Ok(workflow_id)` - The allocated workflow id
    async fn save_task_graph(
        &self,
        graph: &TaskGraph,
        project_key: Option<i64>,
    ) -> Result<String>;

    /// Load a complete workflow with all its tasks in one round trip.
    async fn get_task_graph(&self, workflow_id: &str) -> Result<Option<TaskGraph>>;

    /// Rewrite `project_path` on every task of a workflow.
    async fn update_tasks_project_path(
        &self,
        workflow_id: &str,
        project_path: &str,
    ) -> Result<()>;

    /// Atomically select and claim one READY task for a polling worker.
    ///
    /// Picks the oldest READY task (FIFO by `created_at`) whose
    /// `assigned_agent` is in `capabilities` and that has no claimant, then
    /// transitions it to IN_PROGRESS bound to `client_id`. When
    /// `preferred_task_id` is given that task is attempted first in its own
    /// transaction, falling through to the generic query if unavailable.
    ///
    /// Two concurrent callers can never both claim the same row; the loser
    /// observes no match. Internal errors are swallowed into `Ok(None)` so
    /// polling clients cannot distinguish them from an empty queue.
    async fn get_and_claim_ready_task(
        &self,
        capabilities: &[String],
        client_id: &str,
        preferred_task_id: Option<&str>,
    ) -> Result<Option<TaskStep>>;

    /// Persist a worker's result and mark its task COMPLETED.
    ///
    /// Single transaction: inserts the result row, flips the task status,
    /// and stamps `completed_at`. Afterwards cascades workflow and project
    /// status (a completing task may complete a workflow, which may
    /// complete a project).
    ///
    /// # Returns
    /// * `Ok(false)` - The referenced task does not exist
    async fn save_task_result(&self, result: &TaskResult) -> Result<bool>;

    /// Dependency resolution: mark PENDING tasks READY once every
    /// dependency is COMPLETED. Transitions are one-way; READY tasks are
    /// never demoted.
    ///
    /// # Returns
    /// * `Ok(n)` - Number of tasks newly marked READY
    async fn check_and_dispatch_ready_tasks(&self, workflow_id: &str) -> Result<u32>;

    /// Whether every task of the workflow is COMPLETED.
    async fn is_workflow_complete(&self, workflow_id: &str) -> Result<bool>;

    /// Flip the workflow to COMPLETED when all of its tasks are.
    ///
    /// # Returns
    /// * `Ok(true)` - This call performed the transition
    async fn update_workflow_status_if_complete(&self, workflow_id: &str) -> Result<bool>;

    /// Flip the project to COMPLETED when all of its workflows are.
    ///
    /// # Returns
    /// * `Ok(true)` - This call performed the transition
    async fn update_project_status_if_complete(&self, project_key: i64) -> Result<bool>;

    /// All results of a workflow, ordered by completion time.
    async fn get_workflow_results(&self, workflow_id: &str) -> Result<Vec<RaHistory>>;

    /// Insert-only persistence of an audit report.
    async fn save_audit_report(&self, report: &AuditReport) -> Result<()>;

    /// All audit reports of a workflow in chronological order.
    async fn get_audit_reports(&self, workflow_id: &str) -> Result<Vec<AuditReport>>;

    /// Reset a workflow for rework after a failed audit.
    ///
    /// Single transaction: every COMPLETED task goes back to PENDING with
    /// claimant and timing cleared and its result row deleted; every task
    /// with an empty dependency list becomes READY; rework info is appended
    /// to the workflow metadata. Idempotent.
    ///
    /// # Returns
    /// * `Ok(false)` - The workflow does not exist
    async fn reset_tasks_for_rework(
        &self,
        workflow_id: &str,
        rework_suggestions: &[String],
    ) -> Result<bool>;

    /// Progress summary for the status endpoint.
    async fn get_workflow_progress(&self, workflow_id: &str) -> Result<Option<WorkflowProgress>>;

    /// Internal project row key of a workflow, when linked to a project.
    async fn get_workflow_project_key(&self, workflow_id: &str) -> Result<Option<i64>>;

    /// All currently claimed tasks, for the worker-status endpoint.
    async fn list_in_progress_tasks(&self) -> Result<Vec<TaskStep>>;

    /// Verify store connectivity.
    async fn health_check(&self) -> Result<()>;
}

/// Store for advisory file-lock records visible across processes.
///
/// These records let dashboards and sibling server processes observe live
/// locks; conflict checking applies the access-type compatibility matrix
/// over the active rows.
#[async_trait]
pub trait FileLockStore: Send + Sync {
    /// Record an acquisition if no incompatible active record exists.
    ///
    /// # Returns
    /// * `Ok(false)` - A conflicting active lock exists
    async fn acquire_file_lock(&self, record: &FileLockRecord) -> Result<bool>;

    /// Flip matching active records to inactive.
    ///
    /// # Returns
    /// * `Ok(false)` - No matching active record was found
    async fn release_file_lock(
        &self,
        file_path: &str,
        client_id: &str,
        access_type: Option<AccessType>,
    ) -> Result<bool>;

    /// List lock records, optionally filtered by path and client.
    async fn get_file_locks(
        &self,
        file_path: Option<&str>,
        client_id: Option<&str>,
        active_only: bool,
    ) -> Result<Vec<FileLockRecord>>;

    /// Mark expired records inactive.
    ///
    /// # Returns
    /// * `Ok(n)` - Number of records swept
    async fn cleanup_expired_file_locks(&self) -> Result<u64>;
}
