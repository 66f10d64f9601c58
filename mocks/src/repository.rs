//! In-memory implementation of the coordination repository traits.
//!
//! Thread-safe mock with error injection and call tracking, used by the
//! orchestrator and HTTP-surface tests. Behavior mirrors the SQLite store:
//! sequential id minting, FIFO claiming, status cascades, and rework
//! resets.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cortex_core::{
    error::{CoordError, Result},
    ids::IdKind,
    models::{
        AccessType, AuditReport, FileLockRecord, RaHistory, TaskGraph, TaskResult, TaskStatus,
        TaskStep, WorkflowProgress, WorkflowStatus,
    },
    repository::{CoordRepository, FileLockStore},
};
use parking_lot::Mutex;

#[derive(Debug, Clone)]
struct WorkflowRow {
    workflow_id: String,
    workflow_name: String,
    metadata: serde_json::Value,
    status: WorkflowStatus,
    project_key: Option<i64>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ProjectRow {
    key: i64,
    project_id: String,
    #[allow(dead_code)]
    project_name: String,
    project_path: Option<String>,
    status: WorkflowStatus,
}

#[derive(Debug, Clone)]
struct ResultRow {
    step_id: String,
    history: RaHistory,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    counters: HashMap<&'static str, i64>,
    projects: Vec<ProjectRow>,
    workflows: Vec<WorkflowRow>,
    tasks: Vec<TaskStep>,
    results: Vec<ResultRow>,
    audits: Vec<AuditReport>,
    locks: Vec<FileLockRecord>,
}

impl State {
    fn next_id(&mut self, kind: IdKind) -> String {
        let counter = self.counters.entry(kind.counter_key()).or_insert(0);
        *counter += 1;
        kind.format(*counter)
    }

    fn workflow(&self, workflow_id: &str) -> Option<&WorkflowRow> {
        self.workflows.iter().find(|w| w.workflow_id == workflow_id)
    }

    fn workflow_mut(&mut self, workflow_id: &str) -> Option<&mut WorkflowRow> {
        self.workflows
            .iter_mut()
            .find(|w| w.workflow_id == workflow_id)
    }

    fn workflow_tasks(&self, workflow_id: &str) -> Vec<&TaskStep> {
        self.tasks
            .iter()
            .filter(|t| t.workflow_id == workflow_id)
            .collect()
    }
}

/// In-memory coordination store for testing
pub struct InMemoryCoordStore {
    state: Arc<Mutex<State>>,
    error_injection: Arc<Mutex<Option<CoordError>>>,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl Default for InMemoryCoordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCoordStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            error_injection: Arc::new(Mutex::new(None)),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Inject an error returned by the next repository call
    pub fn inject_error(&self, error: CoordError) {
        *self.error_injection.lock() = Some(error);
    }

    /// History of called methods
    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().clone()
    }

    /// Assert that a method was called at least once
    pub fn assert_called(&self, method: &str) {
        let history = self.call_history.lock();
        assert!(
            history.iter().any(|call| call == method),
            "Method '{method}' was not called. Call history: {history:?}"
        );
    }

    /// Direct snapshot of a task, bypassing the repository interface
    pub fn task_snapshot(&self, step_id: &str) -> Option<TaskStep> {
        self.state
            .lock()
            .tasks
            .iter()
            .find(|t| t.step_id == step_id)
            .cloned()
    }

    fn record_call(&self, method: &str) -> Result<()> {
        self.call_history.lock().push(method.to_string());
        if let Some(error) = self.error_injection.lock().take() {
            return Err(error);
        }
        Ok(())
    }

    fn cascade_statuses(state: &mut State, workflow_id: &str) {
        let tasks = state.workflow_tasks(workflow_id);
        let complete =
            !tasks.is_empty() && tasks.iter().all(|t| t.status == TaskStatus::Completed);
        if !complete {
            return;
        }

        let project_key = match state.workflow_mut(workflow_id) {
            Some(workflow) => {
                workflow.status = WorkflowStatus::Completed;
                workflow.project_key
            }
            None => return,
        };

        if let Some(project_key) = project_key {
            let all_done = state
                .workflows
                .iter()
                .filter(|w| w.project_key == Some(project_key))
                .all(|w| w.status == WorkflowStatus::Completed);
            if all_done {
                if let Some(project) = state.projects.iter_mut().find(|p| p.key == project_key) {
                    project.status = WorkflowStatus::Completed;
                }
            }
        }
    }
}

#[async_trait]
impl CoordRepository for InMemoryCoordStore {
    async fn create_project(
        &self,
        project_name: &str,
        project_path: Option<&str>,
        _metadata: &serde_json::Value,
    ) -> Result<(String, i64)> {
        self.record_call("create_project")?;
        let mut state = self.state.lock();

        let project_id = state.next_id(IdKind::Project);
        let key = state.projects.len() as i64 + 1;
        state.projects.push(ProjectRow {
            key,
            project_id: project_id.clone(),
            project_name: project_name.to_string(),
            project_path: project_path.map(|p| p.to_string()),
            status: WorkflowStatus::InProgress,
        });

        Ok((project_id, key))
    }

    async fn update_project_path(&self, project_key: i64, project_path: &str) -> Result<()> {
        self.record_call("update_project_path")?;
        let mut state = self.state.lock();
        if let Some(project) = state.projects.iter_mut().find(|p| p.key == project_key) {
            project.project_path = Some(project_path.to_string());
        }
        Ok(())
    }

    async fn save_task_graph(
        &self,
        graph: &TaskGraph,
        project_key: Option<i64>,
    ) -> Result<String> {
        self.record_call("save_task_graph")?;
        let mut state = self.state.lock();

        let workflow_id = state.next_id(IdKind::Workflow);
        state.workflows.push(WorkflowRow {
            workflow_id: workflow_id.clone(),
            workflow_name: graph.workflow_name.clone(),
            metadata: graph.metadata.clone(),
            status: WorkflowStatus::InProgress,
            project_key,
            created_at: graph.created_at.unwrap_or_else(Utc::now),
        });

        let mut mapping = HashMap::new();
        for task in &graph.tasks {
            let new_id = state.next_id(IdKind::Task);
            mapping.insert(task.step_id.clone(), new_id);
        }

        for task in &graph.tasks {
            let mut saved = task.clone();
            saved.step_id = mapping[&task.step_id].clone();
            saved.workflow_id = workflow_id.clone();
            saved.dependencies = task
                .dependencies
                .iter()
                .map(|dep| mapping.get(dep).cloned().unwrap_or_else(|| dep.clone()))
                .collect();
            state.tasks.push(saved);
        }

        Ok(workflow_id)
    }

    async fn get_task_graph(&self, workflow_id: &str) -> Result<Option<TaskGraph>> {
        self.record_call("get_task_graph")?;
        let state = self.state.lock();

        let Some(workflow) = state.workflow(workflow_id) else {
            return Ok(None);
        };

        Ok(Some(TaskGraph {
            workflow_id: workflow.workflow_id.clone(),
            workflow_name: workflow.workflow_name.clone(),
            tasks: state
                .workflow_tasks(workflow_id)
                .into_iter()
                .cloned()
                .collect(),
            created_at: Some(workflow.created_at),
            metadata: workflow.metadata.clone(),
        }))
    }

    async fn update_tasks_project_path(
        &self,
        workflow_id: &str,
        project_path: &str,
    ) -> Result<()> {
        self.record_call("update_tasks_project_path")?;
        let mut state = self.state.lock();
        for task in state
            .tasks
            .iter_mut()
            .filter(|t| t.workflow_id == workflow_id)
        {
            task.project_path = Some(project_path.to_string());
        }
        Ok(())
    }

    async fn get_and_claim_ready_task(
        &self,
        capabilities: &[String],
        client_id: &str,
        preferred_task_id: Option<&str>,
    ) -> Result<Option<TaskStep>> {
        if self.record_call("get_and_claim_ready_task").is_err() {
            // Claim coordinator swallows internal errors into "no task"
            return Ok(None);
        }
        let mut state = self.state.lock();

        let claimable = |task: &TaskStep| {
            task.status == TaskStatus::Ready
                && task.client_id.is_none()
                && capabilities.contains(&task.assigned_agent)
        };

        let chosen_index = preferred_task_id
            .and_then(|preferred| {
                state
                    .tasks
                    .iter()
                    .position(|t| t.step_id == preferred && claimable(t))
            })
            .or_else(|| {
                state
                    .tasks
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| claimable(t))
                    .min_by_key(|(_, t)| t.created_at)
                    .map(|(i, _)| i)
            });

        let Some(index) = chosen_index else {
            return Ok(None);
        };

        let task = &mut state.tasks[index];
        task.status = TaskStatus::InProgress;
        task.client_id = Some(client_id.to_string());
        task.started_at = Some(Utc::now());
        Ok(Some(task.clone()))
    }

    async fn save_task_result(&self, result: &TaskResult) -> Result<bool> {
        self.record_call("save_task_result")?;
        let mut state = self.state.lock();

        let Some(task) = state
            .tasks
            .iter_mut()
            .find(|t| t.workflow_id == result.workflow_id && t.step_id == result.task_id)
        else {
            return Ok(false);
        };

        task.status = TaskStatus::Completed;
        task.completed_at = Some(result.completed_at);

        state.results.push(ResultRow {
            step_id: result.task_id.clone(),
            history: result.ra_history.clone(),
            created_at: result.completed_at,
        });

        Self::cascade_statuses(&mut state, &result.workflow_id);
        Ok(true)
    }

    async fn check_and_dispatch_ready_tasks(&self, workflow_id: &str) -> Result<u32> {
        self.record_call("check_and_dispatch_ready_tasks")?;
        let mut state = self.state.lock();

        let completed: Vec<String> = state
            .workflow_tasks(workflow_id)
            .into_iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.step_id.clone())
            .collect();

        let mut newly_ready = 0;
        for task in state
            .tasks
            .iter_mut()
            .filter(|t| t.workflow_id == workflow_id)
        {
            if task.status == TaskStatus::Pending
                && task.dependencies.iter().all(|dep| completed.contains(dep))
            {
                task.status = TaskStatus::Ready;
                newly_ready += 1;
            }
        }
        Ok(newly_ready)
    }

    async fn is_workflow_complete(&self, workflow_id: &str) -> Result<bool> {
        self.record_call("is_workflow_complete")?;
        let state = self.state.lock();
        let tasks = state.workflow_tasks(workflow_id);
        Ok(!tasks.is_empty() && tasks.iter().all(|t| t.status == TaskStatus::Completed))
    }

    async fn update_workflow_status_if_complete(&self, workflow_id: &str) -> Result<bool> {
        self.record_call("update_workflow_status_if_complete")?;
        let mut state = self.state.lock();

        let tasks = state.workflow_tasks(workflow_id);
        let complete =
            !tasks.is_empty() && tasks.iter().all(|t| t.status == TaskStatus::Completed);
        if !complete {
            return Ok(false);
        }

        match state.workflow_mut(workflow_id) {
            Some(workflow) if workflow.status != WorkflowStatus::Completed => {
                workflow.status = WorkflowStatus::Completed;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_project_status_if_complete(&self, project_key: i64) -> Result<bool> {
        self.record_call("update_project_status_if_complete")?;
        let mut state = self.state.lock();

        let workflows: Vec<&WorkflowRow> = state
            .workflows
            .iter()
            .filter(|w| w.project_key == Some(project_key))
            .collect();
        if workflows.is_empty()
            || !workflows
                .iter()
                .all(|w| w.status == WorkflowStatus::Completed)
        {
            return Ok(false);
        }

        match state.projects.iter_mut().find(|p| p.key == project_key) {
            Some(project) if project.status != WorkflowStatus::Completed => {
                project.status = WorkflowStatus::Completed;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_workflow_results(&self, workflow_id: &str) -> Result<Vec<RaHistory>> {
        self.record_call("get_workflow_results")?;
        let state = self.state.lock();

        let step_ids: Vec<String> = state
            .workflow_tasks(workflow_id)
            .into_iter()
            .map(|t| t.step_id.clone())
            .collect();

        let mut rows: Vec<&ResultRow> = state
            .results
            .iter()
            .filter(|r| step_ids.contains(&r.step_id))
            .collect();
        rows.sort_by_key(|r| r.created_at);

        Ok(rows.into_iter().map(|r| r.history.clone()).collect())
    }

    async fn save_audit_report(&self, report: &AuditReport) -> Result<()> {
        self.record_call("save_audit_report")?;
        self.state.lock().audits.push(report.clone());
        Ok(())
    }

    async fn get_audit_reports(&self, workflow_id: &str) -> Result<Vec<AuditReport>> {
        self.record_call("get_audit_reports")?;
        let state = self.state.lock();
        let mut reports: Vec<AuditReport> = state
            .audits
            .iter()
            .filter(|a| a.workflow_id == workflow_id)
            .cloned()
            .collect();
        reports.sort_by_key(|a| a.created_at);
        Ok(reports)
    }

    async fn reset_tasks_for_rework(
        &self,
        workflow_id: &str,
        rework_suggestions: &[String],
    ) -> Result<bool> {
        self.record_call("reset_tasks_for_rework")?;
        let mut state = self.state.lock();

        if state.workflow(workflow_id).is_none() {
            return Ok(false);
        }

        let reset_ids: Vec<String> = state
            .workflow_tasks(workflow_id)
            .into_iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.step_id.clone())
            .collect();

        state.results.retain(|r| !reset_ids.contains(&r.step_id));

        for task in state
            .tasks
            .iter_mut()
            .filter(|t| t.workflow_id == workflow_id)
        {
            if task.status == TaskStatus::Completed {
                task.status = TaskStatus::Pending;
                task.client_id = None;
                task.started_at = None;
                task.completed_at = None;
            }
            if task.dependencies.is_empty() && task.status == TaskStatus::Pending {
                task.status = TaskStatus::Ready;
            }
        }

        if let Some(workflow) = state.workflow_mut(workflow_id) {
            workflow.status = WorkflowStatus::InProgress;
            if let Some(object) = workflow.metadata.as_object_mut() {
                object.insert(
                    "rework_suggestions".to_string(),
                    serde_json::json!(rework_suggestions),
                );
                object.insert(
                    "rework_timestamp".to_string(),
                    serde_json::json!(Utc::now().to_rfc3339()),
                );
            }
        }

        Ok(true)
    }

    async fn get_workflow_progress(&self, workflow_id: &str) -> Result<Option<WorkflowProgress>> {
        self.record_call("get_workflow_progress")?;
        let state = self.state.lock();

        let Some(workflow) = state.workflow(workflow_id) else {
            return Ok(None);
        };

        let tasks = state.workflow_tasks(workflow_id);
        let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count() as i64;

        let total = tasks.len() as i64;
        let completed = count(TaskStatus::Completed);
        Ok(Some(WorkflowProgress {
            workflow_id: workflow_id.to_string(),
            workflow_name: workflow.workflow_name.clone(),
            status: workflow.status,
            total_tasks: total,
            pending_tasks: count(TaskStatus::Pending),
            ready_tasks: count(TaskStatus::Ready),
            in_progress_tasks: count(TaskStatus::InProgress),
            completed_tasks: completed,
            is_complete: total > 0 && total == completed,
        }))
    }

    async fn get_workflow_project_key(&self, workflow_id: &str) -> Result<Option<i64>> {
        self.record_call("get_workflow_project_key")?;
        Ok(self
            .state
            .lock()
            .workflow(workflow_id)
            .and_then(|w| w.project_key))
    }

    async fn list_in_progress_tasks(&self) -> Result<Vec<TaskStep>> {
        self.record_call("list_in_progress_tasks")?;
        Ok(self
            .state
            .lock()
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        self.record_call("health_check")
    }
}

#[async_trait]
impl FileLockStore for InMemoryCoordStore {
    async fn acquire_file_lock(&self, record: &FileLockRecord) -> Result<bool> {
        self.record_call("acquire_file_lock")?;
        let mut state = self.state.lock();

        let now = Utc::now();
        let conflict = state.locks.iter().any(|lock| {
            lock.file_path == record.file_path
                && lock.is_active
                && lock.expires_at.map_or(true, |e| e > now)
                && !lock.access_type.is_compatible_with(record.access_type)
        });
        if conflict {
            return Ok(false);
        }

        state.locks.push(record.clone());
        Ok(true)
    }

    async fn release_file_lock(
        &self,
        file_path: &str,
        client_id: &str,
        access_type: Option<AccessType>,
    ) -> Result<bool> {
        self.record_call("release_file_lock")?;
        let mut state = self.state.lock();

        let mut released = false;
        for lock in state.locks.iter_mut() {
            if lock.file_path == file_path
                && lock.client_id == client_id
                && lock.is_active
                && access_type.map_or(true, |a| a == lock.access_type)
            {
                lock.is_active = false;
                released = true;
            }
        }
        Ok(released)
    }

    async fn get_file_locks(
        &self,
        file_path: Option<&str>,
        client_id: Option<&str>,
        active_only: bool,
    ) -> Result<Vec<FileLockRecord>> {
        self.record_call("get_file_locks")?;
        let now = Utc::now();
        Ok(self
            .state
            .lock()
            .locks
            .iter()
            .filter(|lock| file_path.map_or(true, |p| lock.file_path == p))
            .filter(|lock| client_id.map_or(true, |c| lock.client_id == c))
            .filter(|lock| {
                !active_only || (lock.is_active && lock.expires_at.map_or(true, |e| e > now))
            })
            .cloned()
            .collect())
    }

    async fn cleanup_expired_file_locks(&self) -> Result<u64> {
        self.record_call("cleanup_expired_file_locks")?;
        let mut state = self.state.lock();
        let now = Utc::now();

        let mut swept = 0;
        for lock in state.locks.iter_mut() {
            if lock.is_active && lock.expires_at.is_some_and(|e| e <= now) {
                lock.is_active = false;
                swept += 1;
            }
        }
        Ok(swept)
    }
}
