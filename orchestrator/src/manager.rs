use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use cortex_core::{
    error::{CoordError, Result},
    models::{AuditReport, RaHistory, TaskGraph, TaskStatus, TaskStep},
    prompts,
    repository::CoordRepository,
    GraphValidator,
};
use llm_gateway::LlmClient;

use crate::artifacts::ArtifactWriter;
use crate::auditor::Auditor;
use crate::planner::{name_from_request, PlannedGraph};

/// Central coordinator for multi-agent workflow orchestration.
///
/// Owns the workflow state machine: planning (with a fallback workflow when
/// the LLM is down), dependency dispatch, quality audit with rework reset,
/// and result synthesis. Generic over the repository so tests can run
/// against the in-memory store.
pub struct WorkflowManager<R> {
    repository: Arc<R>,
    llm: Arc<LlmClient>,
    auditor: Auditor,
    artifacts: ArtifactWriter,
}

impl<R: CoordRepository> WorkflowManager<R> {
    pub fn new(
        repository: Arc<R>,
        llm: Arc<LlmClient>,
        auditor: Auditor,
        artifacts: ArtifactWriter,
    ) -> Self {
        Self {
            repository,
            llm,
            auditor,
            artifacts,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Plan a user request into a task graph and persist it.
    ///
    /// Planning failure is never surfaced: any gateway or plan-validation
    /// error falls back to a single-task workflow whose READY task carries
    /// the original request. Only an empty request is rejected.
    pub async fn plan_and_save(
        &self,
        user_request: &str,
        metadata: serde_json::Value,
    ) -> Result<String> {
        if user_request.trim().is_empty() {
            return Err(CoordError::empty_field("user_request"));
        }

        tracing::info!(
            request = %truncate_for_log(user_request),
            "Planning workflow"
        );

        let mut graph = match self.plan_with_llm(user_request, &metadata).await {
            Ok(graph) => graph,
            Err(error) => {
                tracing::warn!(%error, "Planning failed; using fallback workflow");
                fallback_workflow(user_request)
            }
        };

        // Resolve the workflow name: planner output, then caller metadata,
        // then a truncated request.
        if graph.workflow_name.is_empty() || graph.workflow_name == "Untitled Workflow" {
            graph.workflow_name = metadata
                .get("workflow_name")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| name_from_request(user_request));
        }

        let project_name = metadata
            .get("project_name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| graph.workflow_name.clone());

        // Attach the original request and caller metadata to the graph
        let mut merged = match metadata {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        if let Some(existing) = graph.metadata.as_object() {
            for (key, value) in existing {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged.insert(
            "user_request".to_string(),
            serde_json::Value::String(user_request.to_string()),
        );
        graph.metadata = serde_json::Value::Object(merged);

        let (project_id, project_key) = self
            .repository
            .create_project(&project_name, None, &serde_json::json!({}))
            .await?;

        let workflow_id = self
            .repository
            .save_task_graph(&graph, Some(project_key))
            .await?;

        let project_folder = self
            .artifacts
            .project_folder(&project_id, Some(&project_name))?;
        let project_path = project_folder
            .canonicalize()
            .unwrap_or(project_folder.clone())
            .display()
            .to_string();

        self.repository
            .update_project_path(project_key, &project_path)
            .await?;
        self.repository
            .update_tasks_project_path(&workflow_id, &project_path)
            .await?;

        if let Err(error) = self
            .artifacts
            .save_request(
                &project_folder,
                &workflow_id,
                user_request,
                &graph.metadata,
                &project_name,
            )
            .await
        {
            tracing::warn!(%error, "Failed to save request artifact");
        }

        tracing::info!(
            workflow_id = %workflow_id,
            project_id = %project_id,
            task_count = graph.tasks.len(),
            ready = graph.ready_count(),
            "Workflow persisted"
        );
        Ok(workflow_id)
    }

    async fn plan_with_llm(
        &self,
        user_request: &str,
        metadata: &serde_json::Value,
    ) -> Result<TaskGraph> {
        let plan: PlannedGraph = self
            .llm
            .run_for_structured(
                &prompts::planning_prompt(),
                &prompts::planning_input(user_request, metadata),
            )
            .await
            .map_err(CoordError::from)?;

        let mut graph = plan.into_task_graph(Utc::now());
        GraphValidator::validate(&graph)?;
        GraphValidator::remap_agents(&mut graph);
        GraphValidator::mark_initial_tasks_ready(&mut graph);
        Ok(graph)
    }

    /// Identify and mark tasks that became ready for execution.
    pub async fn check_and_dispatch_ready_tasks(&self, workflow_id: &str) -> Result<u32> {
        self.repository
            .check_and_dispatch_ready_tasks(workflow_id)
            .await
    }

    /// Whether every task of the workflow is completed.
    pub async fn check_workflow_completion(&self, workflow_id: &str) -> Result<bool> {
        self.repository.is_workflow_complete(workflow_id).await
    }

    /// Trigger a quality audit for a completed workflow.
    ///
    /// The report is always stored. An unsuccessful report (including the
    /// synthetic one the auditor produces when the LLM call fails) resets
    /// the workflow for rework. A workflow without results yields a stored
    /// synthetic failure but no reset, since there is nothing to redo.
    pub async fn trigger_audit(&self, workflow_id: &str) -> Result<AuditReport> {
        tracing::info!(workflow_id = %workflow_id, "Triggering audit");

        let results = self.repository.get_workflow_results(workflow_id).await?;

        if results.is_empty() {
            let report = AuditReport {
                workflow_id: workflow_id.to_string(),
                is_successful: false,
                feedback: format!("No task results found for workflow {workflow_id}."),
                rework_suggestions: vec![],
                confidence_score: 0.0,
                reviewed_tasks: vec![],
                audit_criteria: self.auditor.criteria().to_vec(),
                created_at: Utc::now(),
            };
            self.repository.save_audit_report(&report).await?;
            return Ok(report);
        }

        let reviewed_tasks = match self.repository.get_task_graph(workflow_id).await? {
            Some(graph) => graph.tasks.iter().map(|t| t.step_id.clone()).collect(),
            None => vec![],
        };

        let report = self
            .auditor
            .run_audit(&self.llm, workflow_id, &results, reviewed_tasks)
            .await;

        self.repository.save_audit_report(&report).await?;

        if report.is_successful {
            tracing::info!(workflow_id = %workflow_id, "Audit passed");
        } else {
            tracing::warn!(
                workflow_id = %workflow_id,
                rework_items = report.rework_suggestions.len(),
                "Audit failed; resetting workflow for rework"
            );
            self.repository
                .reset_tasks_for_rework(workflow_id, &report.rework_suggestions)
                .await?;
        }

        Ok(report)
    }

    /// Synthesize all task results into the final consolidated response
    /// and persist the project artifacts.
    pub async fn synthesize_results(
        &self,
        workflow_id: &str,
        results: &[RaHistory],
    ) -> Result<String> {
        if results.is_empty() {
            return Ok(format!(
                "Workflow {workflow_id} completed but no results to synthesize."
            ));
        }

        tracing::info!(workflow_id = %workflow_id, "Synthesizing results");

        let prompt = prompts::synthesis_prompt(workflow_id, results);
        let final_output = match self.llm.run_simple(&prompt).await {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(%error, "Synthesis failed; falling back to concatenation");
                fallback_synthesis(workflow_id, results)
            }
        };

        // Persist into the project folder the tasks were planned against
        if let Some(graph) = self.repository.get_task_graph(workflow_id).await? {
            let project_folder = graph
                .tasks
                .iter()
                .find_map(|t| t.project_path.clone())
                .map(PathBuf::from);

            if let Some(project_folder) = project_folder {
                if let Err(error) = self
                    .artifacts
                    .save_results(&project_folder, workflow_id, results, &final_output)
                    .await
                {
                    tracing::warn!(%error, "Failed to save result artifacts");
                }
            }
        }

        Ok(final_output)
    }

    /// Rapid single-result validation against the original request.
    pub async fn quick_audit(&self, final_result: &str, original_request: &str) -> bool {
        self.auditor
            .run_quick_audit(&self.llm, final_result, original_request)
            .await
    }
}

/// Single-task workflow used when planning fails: one READY analyst task
/// carrying the original request.
fn fallback_workflow(user_request: &str) -> TaskGraph {
    let task = TaskStep {
        step_id: "fallback_task".to_string(),
        workflow_id: String::new(),
        task_name: "Complete User Request".to_string(),
        task_description: format!("Complete the user request: {user_request}"),
        assigned_agent: "analyst".to_string(),
        dependencies: vec![],
        project_path: None,
        file_dependencies: vec![],
        file_access_types: Default::default(),
        status: TaskStatus::Ready,
        client_id: None,
        started_at: None,
        completed_at: None,
        created_at: Utc::now(),
    };

    TaskGraph {
        workflow_id: String::new(),
        workflow_name: name_from_request(user_request),
        tasks: vec![task],
        created_at: Some(Utc::now()),
        metadata: serde_json::json!({"fallback": true}),
    }
}

/// Deterministic synthesis used when the LLM is unavailable.
fn fallback_synthesis(workflow_id: &str, results: &[RaHistory]) -> String {
    let mut parts = vec![
        format!("Workflow {workflow_id} Results Summary"),
        "=".repeat(50),
        String::new(),
    ];

    for (i, result) in results.iter().enumerate() {
        parts.push(format!("Task {} ({}):", i + 1, result.source_agent));
        parts.push(result.final_result.clone());
        parts.push(String::new());
    }

    parts.join("\n")
}

fn truncate_for_log(request: &str) -> String {
    request.chars().take(100).collect()
}
