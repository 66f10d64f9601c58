//! Project directory layout and artifact persistence.
//!
//! Per workflow, under `<projects_root>/<PID>_<sanitized_name>/`: the
//! request JSON in the project root, `src/` for per-task markdown, `tests/`
//! for test artifacts, `FINAL_OUTPUT.md`, and `workflow_summary.json`.
//! Every write goes through the file coordinator with a write lock.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cortex_core::{
    error::{CoordError, Result},
    models::{AccessType, RaHistory},
};
use file_coordinator::FileAccessManager;

/// Timeout for artifact write locks; artifacts are small local files
const WRITE_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Client id recorded on orchestrator-held locks
const ORCHESTRATOR_CLIENT: &str = "orchestrator";

/// Writes workflow artifacts into the project directory tree.
pub struct ArtifactWriter {
    base_project_dir: PathBuf,
    locks: Arc<FileAccessManager>,
}

impl ArtifactWriter {
    pub fn new(base_project_dir: impl Into<PathBuf>, locks: Arc<FileAccessManager>) -> Self {
        Self {
            base_project_dir: base_project_dir.into(),
            locks,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_project_dir
    }

    /// Create (or reuse) the project folder `<PID>_<sanitized_name>` with
    /// its `src/` and `tests/` subdirectories.
    pub fn project_folder(&self, project_id: &str, project_name: Option<&str>) -> Result<PathBuf> {
        let folder_name = match project_name {
            Some(name) => format!("{project_id}_{}", sanitize_name(name)),
            None => format!("{project_id}_Untitled"),
        };

        let folder = self.base_project_dir.join(folder_name);
        for dir in [folder.clone(), folder.join("src"), folder.join("tests")] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                CoordError::Internal(format!("Failed to create project directory: {e}"))
            })?;
        }
        Ok(folder)
    }

    /// Persist the original request as `<sanitized_name>_request.json`.
    pub async fn save_request(
        &self,
        project_folder: &Path,
        workflow_id: &str,
        user_request: &str,
        metadata: &serde_json::Value,
        project_name: &str,
    ) -> Result<PathBuf> {
        let request_file =
            project_folder.join(format!("{}_request.json", sanitize_name(project_name)));
        let request_data = serde_json::json!({
            "user_request": user_request,
            "metadata": metadata,
            "workflow_id": workflow_id,
            "submitted_at": Utc::now().to_rfc3339(),
        });

        self.write_locked(&request_file, &pretty(&request_data)?)
            .await?;
        tracing::info!(path = %request_file.display(), "Saved workflow request");
        Ok(request_file)
    }

    /// Persist the synthesized output, per-task markdown files, and the
    /// workflow summary.
    pub async fn save_results(
        &self,
        project_folder: &Path,
        workflow_id: &str,
        results: &[RaHistory],
        final_output: &str,
    ) -> Result<()> {
        self.write_locked(&project_folder.join("FINAL_OUTPUT.md"), final_output)
            .await?;

        let src_folder = project_folder.join("src");
        std::fs::create_dir_all(&src_folder)
            .map_err(|e| CoordError::Internal(format!("Failed to create src directory: {e}")))?;

        for (i, result) in results.iter().enumerate() {
            let task_file = src_folder.join(format!("task_{}_{}.md", i + 1, result.source_agent));
            self.write_locked(&task_file, &render_task_markdown(result))
                .await?;
        }

        let summary_file = project_folder.join("workflow_summary.json");
        self.write_locked(&summary_file, &pretty(&render_summary(workflow_id, results))?)
            .await?;

        tracing::info!(path = %project_folder.display(), "Saved workflow results");
        Ok(())
    }

    /// Truncate-and-write under a write lock.
    async fn write_locked(&self, path: &Path, content: &str) -> Result<()> {
        let mut guard = self
            .locks
            .acquire(
                path,
                AccessType::Write,
                WRITE_LOCK_TIMEOUT,
                Some(ORCHESTRATOR_CLIENT),
            )
            .await
            .map_err(CoordError::from)?;

        let file = guard.file_mut();
        file.set_len(0)
            .and_then(|_| file.write_all(content.as_bytes()))
            .map_err(|e| {
                CoordError::Internal(format!("Failed to write {}: {e}", path.display()))
            })
    }
}

fn sanitize_name(name: &str) -> String {
    name.replace([' ', '/'], "_")
}

fn pretty(value: &serde_json::Value) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CoordError::Internal(format!("Failed to encode artifact JSON: {e}")))
}

fn render_task_markdown(result: &RaHistory) -> String {
    let mut content = format!(
        "# Task Result: {}\n\n## Execution Time\n{:.2} seconds\n\n## Reasoning & Actions\n",
        result.source_agent, result.execution_time
    );

    for (j, iteration) in result.iterations.iter().enumerate() {
        content.push_str(&format!("\n### Iteration {}\n", j + 1));
        content.push_str(&format!("**Thought:** {}\n\n", iteration.thought));
        content.push_str(&format!("**Action:** {}\n\n", iteration.action));
        if let Some(observation) = &iteration.observation {
            content.push_str(&format!("**Observation:** {observation}\n\n"));
        }
    }

    content.push_str(&format!("\n## Final Result\n\n{}\n", result.final_result));
    content
}

fn render_summary(workflow_id: &str, results: &[RaHistory]) -> serde_json::Value {
    let agents: BTreeSet<&str> = results.iter().map(|r| r.source_agent.as_str()).collect();
    let mut task_count_by_agent: BTreeMap<&str, usize> = BTreeMap::new();
    for result in results {
        *task_count_by_agent
            .entry(result.source_agent.as_str())
            .or_default() += 1;
    }

    serde_json::json!({
        "workflow_id": workflow_id,
        "created_at": Utc::now().to_rfc3339(),
        "total_tasks": results.len(),
        "total_execution_time": results.iter().map(|r| r.execution_time).sum::<f64>(),
        "agents_used": agents,
        "task_count_by_agent": task_count_by_agent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocks::RaHistoryBuilder;

    fn writer(dir: &Path) -> ArtifactWriter {
        ArtifactWriter::new(dir, Arc::new(FileAccessManager::new()))
    }

    #[test]
    fn test_project_folder_layout() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path());

        let folder = writer
            .project_folder("PID000001", Some("My Report Project"))
            .unwrap();
        assert!(folder.ends_with("PID000001_My_Report_Project"));
        assert!(folder.join("src").is_dir());
        assert!(folder.join("tests").is_dir());

        let unnamed = writer.project_folder("PID000002", None).unwrap();
        assert!(unnamed.ends_with("PID000002_Untitled"));
    }

    #[tokio::test]
    async fn test_save_request_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path());
        let folder = writer.project_folder("PID000001", Some("Report")).unwrap();

        let path = writer
            .save_request(
                &folder,
                "WID00000001",
                "Research AI developments",
                &serde_json::json!({"priority": "high"}),
                "Report",
            )
            .await
            .unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["user_request"], "Research AI developments");
        assert_eq!(saved["workflow_id"], "WID00000001");
        assert_eq!(saved["metadata"]["priority"], "high");
    }

    #[tokio::test]
    async fn test_save_results_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path());
        let folder = writer.project_folder("PID000001", Some("Report")).unwrap();

        let results = vec![
            RaHistoryBuilder::new()
                .with_agent("researcher")
                .with_final_result("Findings")
                .build(),
            RaHistoryBuilder::new()
                .with_agent("writer")
                .with_final_result("Summary")
                .build(),
        ];

        writer
            .save_results(&folder, "WID00000001", &results, "The final answer")
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(folder.join("FINAL_OUTPUT.md")).unwrap(),
            "The final answer"
        );

        let task_md =
            std::fs::read_to_string(folder.join("src").join("task_1_researcher.md")).unwrap();
        assert!(task_md.contains("# Task Result: researcher"));
        assert!(task_md.contains("Findings"));
        assert!(folder.join("src").join("task_2_writer.md").exists());

        let summary: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(folder.join("workflow_summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(summary["total_tasks"], 2);
        assert_eq!(summary["task_count_by_agent"]["writer"], 1);
    }

    #[tokio::test]
    async fn test_rewrite_truncates_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path());
        let folder = writer.project_folder("PID000001", None).unwrap();

        writer
            .save_results(&folder, "WID00000001", &[], "a much longer first output")
            .await
            .unwrap();
        writer
            .save_results(&folder, "WID00000001", &[], "short")
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(folder.join("FINAL_OUTPUT.md")).unwrap(),
            "short"
        );
    }
}
