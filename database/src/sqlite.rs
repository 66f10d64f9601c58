use crate::common::{
    encode_access_map, encode_string_list, push_claim_candidate, row_to_audit_report,
    row_to_history, row_to_lock_record, row_to_task, sqlx_error_to_coord_error, string_to_status,
};
use async_trait::async_trait;
use chrono::Utc;
use cortex_core::{
    error::{CoordError, Result},
    ids::IdKind,
    models::{
        AccessType, AuditReport, FileLockRecord, RaHistory, TaskGraph, TaskResult, TaskStatus,
        TaskStep, WorkflowProgress, WorkflowStatus,
    },
    repository::{CoordRepository, FileLockStore},
};
use sqlx::{migrate::MigrateDatabase, Row, Sqlite, SqlitePool, Transaction};

/// SQLite implementation of the coordination store.
///
/// Uses connection pooling with WAL journaling and a busy timeout. SQLite
/// has no `SELECT ... FOR UPDATE`; every concurrency-sensitive transition
/// is a guarded `UPDATE ... WHERE <state predicate>` whose `rows_affected`
/// decides the winner, so two concurrent callers can never both move the
/// same row.
#[derive(Debug, Clone)]
pub struct SqliteCoordStore {
    pool: SqlitePool,
}

impl SqliteCoordStore {
    /// Create a new store for the given database URL.
    ///
    /// # Arguments
    /// * `database_url` - SQLite database URL (file path or `:memory:`)
    pub async fn new(database_url: &str) -> Result<Self> {
        let db_url = if database_url.starts_with(":memory:")
            || database_url.starts_with("sqlite://")
        {
            database_url.to_string()
        } else {
            format!("sqlite://{database_url}")
        };

        // Create database if it doesn't exist (for file-based databases)
        if !db_url.contains(":memory:") && !Sqlite::database_exists(&db_url).await.unwrap_or(false)
        {
            Sqlite::create_database(&db_url).await.map_err(|error| {
                tracing::error!("Error creating database: {}", error);
                CoordError::Database(format!("Failed to create database: {error}"))
            })?;
            tracing::info!("Database created successfully");
        }

        let connect_options = if db_url.contains(":memory:") {
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(&db_url)
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Memory)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
        } else {
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(db_url.replace("sqlite://", ""))
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
        };

        let pool = SqlitePool::connect_with(connect_options)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        Ok(Self { pool })
    }

    /// Apply all pending migrations. Call once after construction.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CoordError::Database(format!("Migration failed: {e}")))?;

        tracing::info!("Database migrations completed successfully");
        Ok(())
    }

    /// Access to the underlying pool, primarily for tests.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Mint the next sequential id of the given kind.
    ///
    /// The counter row is advanced inside the caller's transaction, so the
    /// id is consumed atomically with whatever row it identifies, keeping
    /// ids monotonic across restarts and concurrent writers.
    async fn next_id(tx: &mut Transaction<'_, Sqlite>, kind: IdKind) -> Result<String> {
        let value: i64 = sqlx::query_scalar(
            "UPDATE id_counters SET current_value = current_value + 1 \
             WHERE counter_type = ? RETURNING current_value",
        )
        .bind(kind.counter_key())
        .fetch_one(&mut **tx)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        Ok(kind.format(value))
    }

    async fn fetch_task(&self, step_id: &str) -> Result<Option<TaskStep>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE step_id = ?")
            .bind(step_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        match row {
            Some(row) => Ok(Some(row_to_task(&row)?)),
            None => Ok(None),
        }
    }

    /// Defensive re-check that every dependency of a task is COMPLETED.
    /// Readiness propagation already guarantees this for READY tasks; a
    /// violation indicates a bug elsewhere and is logged.
    async fn dependencies_satisfied(&self, task: &TaskStep) -> Result<bool> {
        // Same set-membership test as the readiness resolver: a duplicated
        // entry in the dependencies list must not skew a count comparison.
        let distinct: std::collections::HashSet<&str> =
            task.dependencies.iter().map(String::as_str).collect();
        if distinct.is_empty() {
            return Ok(true);
        }

        let mut query_builder: sqlx::QueryBuilder<Sqlite> = sqlx::QueryBuilder::new(
            "SELECT COUNT(*) FROM tasks WHERE status = 'COMPLETED' AND workflow_id = ",
        );
        query_builder.push_bind(&task.workflow_id);
        query_builder.push(" AND step_id IN (");
        let mut separated = query_builder.separated(", ");
        for dep in &distinct {
            separated.push_bind(*dep);
        }
        query_builder.push(")");

        let completed: i64 = query_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        Ok(completed as usize == distinct.len())
    }

    /// Attempt to claim one specific READY task. Its own transaction; used
    /// for the `preferred_task_id` path and committed on success.
    async fn try_claim_specific(
        &self,
        step_id: &str,
        capabilities: &[String],
        client_id: &str,
    ) -> Result<Option<TaskStep>> {
        let now = Utc::now();

        let mut query_builder: sqlx::QueryBuilder<Sqlite> = sqlx::QueryBuilder::new(
            "UPDATE tasks SET status = 'IN_PROGRESS', client_id = ",
        );
        query_builder.push_bind(client_id);
        query_builder.push(", started_at = ");
        query_builder.push_bind(now);
        query_builder.push(" WHERE step_id = ");
        query_builder.push_bind(step_id);
        query_builder.push(" AND status = 'READY' AND client_id IS NULL AND assigned_agent IN (");
        let mut separated = query_builder.separated(", ");
        for capability in capabilities {
            separated.push_bind(capability);
        }
        query_builder.push(") RETURNING step_id");

        let claimed: Option<String> = query_builder
            .build_query_scalar()
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        match claimed {
            Some(step_id) => self.finish_claim(&step_id, client_id).await,
            None => Ok(None),
        }
    }

    /// Post-claim dependency verification shared by both claim paths.
    /// Reverts the claim when a dependency turns out incomplete.
    async fn finish_claim(&self, step_id: &str, client_id: &str) -> Result<Option<TaskStep>> {
        let task = self
            .fetch_task(step_id)
            .await?
            .ok_or_else(|| CoordError::task_not_found(step_id))?;

        if !self.dependencies_satisfied(&task).await? {
            tracing::warn!(
                step_id = %step_id,
                "Claimed task had incomplete dependencies; reverting claim"
            );
            sqlx::query(
                "UPDATE tasks SET status = 'READY', client_id = NULL, started_at = NULL \
                 WHERE step_id = ? AND client_id = ?",
            )
            .bind(step_id)
            .bind(client_id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;
            return Ok(None);
        }

        tracing::info!(step_id = %step_id, client_id = %client_id, "Task claimed");
        Ok(Some(task))
    }

    /// Inner claim logic; the trait method swallows its errors.
    async fn claim_inner(
        &self,
        capabilities: &[String],
        client_id: &str,
        preferred_task_id: Option<&str>,
    ) -> Result<Option<TaskStep>> {
        if capabilities.is_empty() {
            return Ok(None);
        }

        // Preferred task first: commits on success, falls through otherwise.
        if let Some(preferred) = preferred_task_id {
            if let Some(task) = self
                .try_claim_specific(preferred, capabilities, client_id)
                .await?
            {
                return Ok(Some(task));
            }
        }

        // Atomic select-and-claim: one UPDATE with the FIFO candidate as a
        // subquery. Concurrent callers serialize on the write lock and each
        // re-evaluates the subquery, so the loser picks the next task or
        // nothing.
        let now = Utc::now();
        let mut query_builder: sqlx::QueryBuilder<Sqlite> = sqlx::QueryBuilder::new(
            "UPDATE tasks SET status = 'IN_PROGRESS', client_id = ",
        );
        query_builder.push_bind(client_id);
        query_builder.push(", started_at = ");
        query_builder.push_bind(now);
        query_builder.push(" WHERE step_id = (");
        push_claim_candidate(&mut query_builder, capabilities);
        query_builder.push(") AND status = 'READY' AND client_id IS NULL RETURNING step_id");

        let claimed: Option<String> = query_builder
            .build_query_scalar()
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        match claimed {
            Some(step_id) => self.finish_claim(&step_id, client_id).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CoordRepository for SqliteCoordStore {
    async fn create_project(
        &self,
        project_name: &str,
        project_path: Option<&str>,
        metadata: &serde_json::Value,
    ) -> Result<(String, i64)> {
        if project_name.trim().is_empty() {
            return Err(CoordError::empty_field("project_name"));
        }

        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_coord_error)?;
        let project_id = Self::next_id(&mut tx, IdKind::Project).await?;
        let now = Utc::now();

        let project_key: i64 = sqlx::query_scalar(
            "INSERT INTO projects (project_id, project_name, project_path, status, metadata, created_at, updated_at) \
             VALUES (?, ?, ?, 'IN_PROGRESS', ?, ?, ?) RETURNING id",
        )
        .bind(&project_id)
        .bind(project_name)
        .bind(project_path)
        .bind(metadata.to_string())
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        tx.commit().await.map_err(sqlx_error_to_coord_error)?;

        tracing::info!(project_id = %project_id, project_name = %project_name, "Created project");
        Ok((project_id, project_key))
    }

    async fn update_project_path(&self, project_key: i64, project_path: &str) -> Result<()> {
        sqlx::query("UPDATE projects SET project_path = ?, updated_at = ? WHERE id = ?")
            .bind(project_path)
            .bind(Utc::now())
            .bind(project_key)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;
        Ok(())
    }

    async fn save_task_graph(
        &self,
        graph: &TaskGraph,
        project_key: Option<i64>,
    ) -> Result<String> {
        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_coord_error)?;

        let workflow_id = Self::next_id(&mut tx, IdKind::Workflow).await?;
        let created_at = graph.created_at.unwrap_or_else(Utc::now);
        let user_request = graph
            .metadata
            .get("user_request")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        sqlx::query(
            "INSERT INTO workflows (workflow_id, workflow_name, user_request, metadata, status, project_key, created_at) \
             VALUES (?, ?, ?, ?, 'IN_PROGRESS', ?, ?)",
        )
        .bind(&workflow_id)
        .bind(&graph.workflow_name)
        .bind(user_request)
        .bind(graph.metadata.to_string())
        .bind(project_key)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        // Rewrite transient step ids to fresh sequential task ids, then
        // rewrite every dependency reference accordingly.
        let mut step_id_mapping = std::collections::HashMap::new();
        for task in &graph.tasks {
            let task_id = Self::next_id(&mut tx, IdKind::Task).await?;
            step_id_mapping.insert(task.step_id.clone(), task_id);
        }

        for task in &graph.tasks {
            let step_id = &step_id_mapping[&task.step_id];
            let dependencies: Vec<String> = task
                .dependencies
                .iter()
                .map(|dep| step_id_mapping.get(dep).cloned().unwrap_or_else(|| dep.clone()))
                .collect();

            sqlx::query(
                "INSERT INTO tasks (step_id, workflow_id, task_name, task_description, assigned_agent, \
                 dependencies, file_dependencies, file_access_types, project_path, status, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(step_id)
            .bind(&workflow_id)
            .bind(&task.task_name)
            .bind(&task.task_description)
            .bind(&task.assigned_agent)
            .bind(encode_string_list(&dependencies))
            .bind(encode_string_list(&task.file_dependencies))
            .bind(encode_access_map(&task.file_access_types))
            .bind(&task.project_path)
            .bind(task.status.as_str())
            .bind(task.created_at)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_error_to_coord_error)?;
        }

        tx.commit().await.map_err(sqlx_error_to_coord_error)?;

        tracing::info!(
            workflow_id = %workflow_id,
            task_count = graph.tasks.len(),
            "Saved task graph"
        );
        Ok(workflow_id)
    }

    async fn get_task_graph(&self, workflow_id: &str) -> Result<Option<TaskGraph>> {
        let workflow = sqlx::query(
            "SELECT workflow_id, workflow_name, metadata, created_at FROM workflows WHERE workflow_id = ?",
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        let Some(workflow) = workflow else {
            return Ok(None);
        };

        let task_rows = sqlx::query("SELECT * FROM tasks WHERE workflow_id = ? ORDER BY id ASC")
            .bind(workflow_id)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        let mut tasks = Vec::with_capacity(task_rows.len());
        for row in &task_rows {
            tasks.push(row_to_task(row)?);
        }

        let metadata_raw: String = workflow.get("metadata");
        let metadata = serde_json::from_str(&metadata_raw)
            .map_err(|e| CoordError::Database(format!("Invalid workflow metadata JSON: {e}")))?;

        Ok(Some(TaskGraph {
            workflow_id: workflow.get("workflow_id"),
            workflow_name: workflow.get("workflow_name"),
            tasks,
            created_at: workflow.get("created_at"),
            metadata,
        }))
    }

    async fn update_tasks_project_path(
        &self,
        workflow_id: &str,
        project_path: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE tasks SET project_path = ? WHERE workflow_id = ?")
            .bind(project_path)
            .bind(workflow_id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;
        Ok(())
    }

    async fn get_and_claim_ready_task(
        &self,
        capabilities: &[String],
        client_id: &str,
        preferred_task_id: Option<&str>,
    ) -> Result<Option<TaskStep>> {
        // Internal errors are swallowed into "no task" so that polling
        // clients cannot distinguish them from an empty queue.
        match self
            .claim_inner(capabilities, client_id, preferred_task_id)
            .await
        {
            Ok(task) => Ok(task),
            Err(error) => {
                tracing::error!(client_id = %client_id, %error, "Claim failed; returning no task");
                Ok(None)
            }
        }
    }

    async fn save_task_result(&self, result: &TaskResult) -> Result<bool> {
        let iterations = serde_json::to_string(&result.ra_history.iterations)
            .map_err(|e| CoordError::Internal(format!("Failed to encode iterations: {e}")))?;

        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_coord_error)?;

        // The guarded UPDATE leads the transaction so the write lock is
        // taken before anything is read.
        let task_key: Option<i64> = sqlx::query_scalar(
            "UPDATE tasks SET status = 'COMPLETED', completed_at = ? \
             WHERE workflow_id = ? AND step_id = ? RETURNING id",
        )
        .bind(result.completed_at)
        .bind(&result.workflow_id)
        .bind(&result.task_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        let Some(task_key) = task_key else {
            tracing::warn!(task_id = %result.task_id, "Result for unknown task rejected");
            return Ok(false);
        };

        // A second result for the same task violates the unique task_key
        // constraint and rolls the whole transaction back.
        sqlx::query(
            "INSERT INTO results (task_key, iterations, final_result, source_agent, client_id, execution_time, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task_key)
        .bind(iterations)
        .bind(&result.ra_history.final_result)
        .bind(&result.ra_history.source_agent)
        .bind(&result.ra_history.client_id)
        .bind(result.ra_history.execution_time)
        .bind(result.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        tx.commit().await.map_err(sqlx_error_to_coord_error)?;

        tracing::info!(task_id = %result.task_id, "Saved task result");

        // Cascade: a completing task may complete its workflow, which may
        // complete its project.
        let workflow_completed = self
            .update_workflow_status_if_complete(&result.workflow_id)
            .await?;
        if workflow_completed {
            if let Some(project_key) = self.get_workflow_project_key(&result.workflow_id).await? {
                self.update_project_status_if_complete(project_key).await?;
            }
        }

        Ok(true)
    }

    async fn check_and_dispatch_ready_tasks(&self, workflow_id: &str) -> Result<u32> {
        // One atomic statement: a PENDING task becomes READY when none of
        // its dependency references is missing from the workflow's
        // COMPLETED set. Transitions are one-way; nothing is ever demoted.
        let updated = sqlx::query(
            "UPDATE tasks SET status = 'READY' \
             WHERE workflow_id = ?1 AND status = 'PENDING' \
               AND NOT EXISTS ( \
                 SELECT 1 FROM json_each(tasks.dependencies) \
                 WHERE json_each.value NOT IN ( \
                   SELECT done.step_id FROM tasks done \
                   WHERE done.workflow_id = ?1 AND done.status = 'COMPLETED' \
                 ) \
               )",
        )
        .bind(workflow_id)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        let newly_ready = updated.rows_affected() as u32;
        if newly_ready > 0 {
            tracing::info!(workflow_id = %workflow_id, newly_ready, "Marked tasks READY");
        }
        Ok(newly_ready)
    }

    async fn is_workflow_complete(&self, workflow_id: &str) -> Result<bool> {
        let (total, completed): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(status = 'COMPLETED'), 0) FROM tasks WHERE workflow_id = ?",
        )
        .bind(workflow_id)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        Ok(total > 0 && total == completed)
    }

    async fn update_workflow_status_if_complete(&self, workflow_id: &str) -> Result<bool> {
        if !self.is_workflow_complete(workflow_id).await? {
            return Ok(false);
        }

        let updated = sqlx::query(
            "UPDATE workflows SET status = 'COMPLETED' WHERE workflow_id = ? AND status != 'COMPLETED'",
        )
        .bind(workflow_id)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        let transitioned = updated.rows_affected() > 0;
        if transitioned {
            tracing::info!(workflow_id = %workflow_id, "Workflow marked COMPLETED");
        }
        Ok(transitioned)
    }

    async fn update_project_status_if_complete(&self, project_key: i64) -> Result<bool> {
        let (total, completed): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(status = 'COMPLETED'), 0) FROM workflows WHERE project_key = ?",
        )
        .bind(project_key)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        if total == 0 || total != completed {
            return Ok(false);
        }

        let updated = sqlx::query(
            "UPDATE projects SET status = 'COMPLETED', updated_at = ? WHERE id = ? AND status != 'COMPLETED'",
        )
        .bind(Utc::now())
        .bind(project_key)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        let transitioned = updated.rows_affected() > 0;
        if transitioned {
            tracing::info!(project_key, "Project marked COMPLETED");
        }
        Ok(transitioned)
    }

    async fn get_workflow_results(&self, workflow_id: &str) -> Result<Vec<RaHistory>> {
        let rows = sqlx::query(
            "SELECT r.iterations, r.final_result, r.source_agent, r.client_id, r.execution_time \
             FROM results r JOIN tasks t ON r.task_key = t.id \
             WHERE t.workflow_id = ? ORDER BY r.created_at ASC, r.id ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        let mut histories = Vec::with_capacity(rows.len());
        for row in &rows {
            histories.push(row_to_history(row)?);
        }
        Ok(histories)
    }

    async fn save_audit_report(&self, report: &AuditReport) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_reports (workflow_id, is_successful, feedback, rework_suggestions, \
             confidence_score, reviewed_tasks, audit_criteria, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&report.workflow_id)
        .bind(report.is_successful)
        .bind(&report.feedback)
        .bind(encode_string_list(&report.rework_suggestions))
        .bind(report.confidence_score)
        .bind(encode_string_list(&report.reviewed_tasks))
        .bind(encode_string_list(&report.audit_criteria))
        .bind(report.created_at)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        tracing::info!(workflow_id = %report.workflow_id, successful = report.is_successful, "Saved audit report");
        Ok(())
    }

    async fn get_audit_reports(&self, workflow_id: &str) -> Result<Vec<AuditReport>> {
        let rows = sqlx::query(
            "SELECT * FROM audit_reports WHERE workflow_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        let mut reports = Vec::with_capacity(rows.len());
        for row in &rows {
            reports.push(row_to_audit_report(row)?);
        }
        Ok(reports)
    }

    async fn reset_tasks_for_rework(
        &self,
        workflow_id: &str,
        rework_suggestions: &[String],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_coord_error)?;

        // A reset task's result is discarded in the same transaction, so a
        // task never carries more than one result. The DELETE leads the
        // transaction so the write lock is taken before anything is read.
        sqlx::query(
            "DELETE FROM results WHERE task_key IN \
             (SELECT id FROM tasks WHERE workflow_id = ? AND status = 'COMPLETED')",
        )
        .bind(workflow_id)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        let metadata_raw: Option<String> =
            sqlx::query_scalar("SELECT metadata FROM workflows WHERE workflow_id = ?")
                .bind(workflow_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(sqlx_error_to_coord_error)?;

        let Some(metadata_raw) = metadata_raw else {
            return Ok(false);
        };

        sqlx::query(
            "UPDATE tasks SET status = 'PENDING', client_id = NULL, started_at = NULL, completed_at = NULL \
             WHERE workflow_id = ? AND status = 'COMPLETED'",
        )
        .bind(workflow_id)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        // Re-enforce readiness of dependency-free tasks. IN_PROGRESS tasks
        // keep their live claim.
        sqlx::query(
            "UPDATE tasks SET status = 'READY' \
             WHERE workflow_id = ? AND dependencies = '[]' AND status = 'PENDING'",
        )
        .bind(workflow_id)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        let mut metadata: serde_json::Value = serde_json::from_str(&metadata_raw)
            .map_err(|e| CoordError::Database(format!("Invalid workflow metadata JSON: {e}")))?;
        if let Some(object) = metadata.as_object_mut() {
            object.insert(
                "rework_suggestions".to_string(),
                serde_json::json!(rework_suggestions),
            );
            object.insert(
                "rework_timestamp".to_string(),
                serde_json::json!(crate::common::iso_now()),
            );
        }

        sqlx::query("UPDATE workflows SET metadata = ?, status = 'IN_PROGRESS' WHERE workflow_id = ?")
            .bind(metadata.to_string())
            .bind(workflow_id)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        tx.commit().await.map_err(sqlx_error_to_coord_error)?;

        tracing::info!(workflow_id = %workflow_id, "Workflow reset for rework");
        Ok(true)
    }

    async fn get_workflow_progress(&self, workflow_id: &str) -> Result<Option<WorkflowProgress>> {
        let workflow = sqlx::query(
            "SELECT workflow_name, status FROM workflows WHERE workflow_id = ?",
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        let Some(workflow) = workflow else {
            return Ok(None);
        };

        let status_str: String = workflow.get("status");
        let status = WorkflowStatus::parse(&status_str).ok_or_else(|| {
            CoordError::Database(format!("Invalid workflow status in database: {status_str}"))
        })?;

        let counts = sqlx::query(
            "SELECT status, COUNT(*) as count FROM tasks WHERE workflow_id = ? GROUP BY status",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        let mut progress = WorkflowProgress {
            workflow_id: workflow_id.to_string(),
            workflow_name: workflow.get("workflow_name"),
            status,
            total_tasks: 0,
            pending_tasks: 0,
            ready_tasks: 0,
            in_progress_tasks: 0,
            completed_tasks: 0,
            is_complete: false,
        };

        for row in &counts {
            let count: i64 = row.get("count");
            progress.total_tasks += count;
            match string_to_status(row.get("status"))? {
                TaskStatus::Pending => progress.pending_tasks = count,
                TaskStatus::Ready => progress.ready_tasks = count,
                TaskStatus::InProgress => progress.in_progress_tasks = count,
                TaskStatus::Completed => progress.completed_tasks = count,
                TaskStatus::Failed => {}
            }
        }

        progress.is_complete =
            progress.total_tasks > 0 && progress.total_tasks == progress.completed_tasks;
        Ok(Some(progress))
    }

    async fn get_workflow_project_key(&self, workflow_id: &str) -> Result<Option<i64>> {
        let project_key: Option<Option<i64>> =
            sqlx::query_scalar("SELECT project_key FROM workflows WHERE workflow_id = ?")
                .bind(workflow_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(sqlx_error_to_coord_error)?;

        Ok(project_key.flatten())
    }

    async fn list_in_progress_tasks(&self) -> Result<Vec<TaskStep>> {
        let rows = sqlx::query(
            "SELECT * FROM tasks WHERE status = 'IN_PROGRESS' ORDER BY started_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            tasks.push(row_to_task(row)?);
        }
        Ok(tasks)
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;
        Ok(())
    }
}

#[async_trait]
impl FileLockStore for SqliteCoordStore {
    async fn acquire_file_lock(&self, record: &FileLockRecord) -> Result<bool> {
        // One atomic statement applying the compatibility matrix: the row
        // is inserted only when every active, unexpired holder of the path
        // is a read and the request is a read.
        let inserted = sqlx::query(
            "INSERT INTO file_locks (file_path, client_id, task_step_id, workflow_id, access_type, \
             locked_at, expires_at, is_active) \
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, 1 \
             WHERE NOT EXISTS ( \
               SELECT 1 FROM file_locks \
               WHERE file_path = ?1 AND is_active = 1 \
                 AND (expires_at IS NULL OR expires_at > ?8) \
                 AND NOT (access_type = 'read' AND ?5 = 'read') \
             )",
        )
        .bind(&record.file_path)
        .bind(&record.client_id)
        .bind(&record.task_step_id)
        .bind(&record.workflow_id)
        .bind(record.access_type.as_str())
        .bind(record.locked_at)
        .bind(record.expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        if inserted.rows_affected() == 0 {
            return Ok(false);
        }

        tracing::debug!(
            file_path = %record.file_path,
            client_id = %record.client_id,
            access_type = %record.access_type,
            "File lock recorded"
        );
        Ok(true)
    }

    async fn release_file_lock(
        &self,
        file_path: &str,
        client_id: &str,
        access_type: Option<AccessType>,
    ) -> Result<bool> {
        let mut query_builder: sqlx::QueryBuilder<Sqlite> = sqlx::QueryBuilder::new(
            "UPDATE file_locks SET is_active = 0 WHERE file_path = ",
        );
        query_builder.push_bind(file_path);
        query_builder.push(" AND client_id = ");
        query_builder.push_bind(client_id);
        query_builder.push(" AND is_active = 1");
        if let Some(access_type) = access_type {
            query_builder.push(" AND access_type = ");
            query_builder.push_bind(access_type.as_str());
        }

        let released = query_builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        Ok(released.rows_affected() > 0)
    }

    async fn get_file_locks(
        &self,
        file_path: Option<&str>,
        client_id: Option<&str>,
        active_only: bool,
    ) -> Result<Vec<FileLockRecord>> {
        let mut query_builder: sqlx::QueryBuilder<Sqlite> =
            sqlx::QueryBuilder::new("SELECT * FROM file_locks WHERE 1 = 1");

        if let Some(file_path) = file_path {
            query_builder.push(" AND file_path = ");
            query_builder.push_bind(file_path);
        }
        if let Some(client_id) = client_id {
            query_builder.push(" AND client_id = ");
            query_builder.push_bind(client_id);
        }
        if active_only {
            query_builder.push(" AND is_active = 1 AND (expires_at IS NULL OR expires_at > ");
            query_builder.push_bind(Utc::now());
            query_builder.push(")");
        }

        let rows = query_builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_coord_error)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(row_to_lock_record(row)?);
        }
        Ok(records)
    }

    async fn cleanup_expired_file_locks(&self) -> Result<u64> {
        let swept = sqlx::query(
            "UPDATE file_locks SET is_active = 0 WHERE is_active = 1 \
             AND expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_coord_error)?;

        let swept = swept.rows_affected();
        if swept > 0 {
            tracing::info!(swept, "Cleaned up expired file locks");
        }
        Ok(swept)
    }
}
