//! Planner output shapes and their conversion into the domain graph.
//!
//! These are the wire structures the LLM gateway enforces during planning;
//! transient step ids survive only until the database save rewrites them
//! to sequential task ids.

use chrono::{DateTime, Utc};
use cortex_core::models::{TaskGraph, TaskStatus, TaskStep};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One planned task as emitted by the model
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlannedTask {
    /// Transient identifier used for dependency references within the plan
    pub step_id: String,
    /// Concise human-readable task name (2-5 words)
    #[serde(default)]
    pub task_name: Option<String>,
    /// Clear, specific task description
    pub task_description: String,
    /// Agent type responsible for execution
    pub assigned_agent: String,
    /// Step ids that must complete first
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// The full planned workflow as emitted by the model
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlannedGraph {
    /// Concise descriptive workflow name (3-6 words)
    #[serde(default)]
    pub workflow_name: Option<String>,
    pub tasks: Vec<PlannedTask>,
}

impl PlannedGraph {
    /// Convert the plan into a domain task graph. All tasks start PENDING;
    /// readiness and agent remapping are applied by the caller.
    pub fn into_task_graph(self, now: DateTime<Utc>) -> TaskGraph {
        let tasks = self
            .tasks
            .into_iter()
            .map(|planned| TaskStep {
                step_id: planned.step_id,
                workflow_id: String::new(),
                task_name: planned
                    .task_name
                    .unwrap_or_else(|| "Untitled Task".to_string()),
                task_description: planned.task_description,
                assigned_agent: planned.assigned_agent,
                dependencies: planned.dependencies,
                project_path: None,
                file_dependencies: vec![],
                file_access_types: Default::default(),
                status: TaskStatus::Pending,
                client_id: None,
                started_at: None,
                completed_at: None,
                created_at: now,
            })
            .collect();

        TaskGraph {
            workflow_id: String::new(),
            workflow_name: self
                .workflow_name
                .unwrap_or_else(|| "Untitled Workflow".to_string()),
            tasks,
            created_at: Some(now),
            metadata: serde_json::json!({}),
        }
    }
}

/// Truncate a user request into a display name (50 chars plus ellipsis)
pub fn name_from_request(user_request: &str) -> String {
    let mut name: String = user_request.chars().take(50).collect();
    if user_request.chars().count() > 50 {
        name.push_str("...");
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_conversion() {
        let plan = PlannedGraph {
            workflow_name: Some("Market Analysis Report".to_string()),
            tasks: vec![
                PlannedTask {
                    step_id: "research_competitors".to_string(),
                    task_name: Some("Research Competitors".to_string()),
                    task_description: "Gather competitor data".to_string(),
                    assigned_agent: "researcher".to_string(),
                    dependencies: vec![],
                },
                PlannedTask {
                    step_id: "write_summary".to_string(),
                    task_name: None,
                    task_description: "Write the summary".to_string(),
                    assigned_agent: "writer".to_string(),
                    dependencies: vec!["research_competitors".to_string()],
                },
            ],
        };

        let graph = plan.into_task_graph(Utc::now());
        assert_eq!(graph.workflow_name, "Market Analysis Report");
        assert_eq!(graph.tasks.len(), 2);
        assert_eq!(graph.tasks[0].status, TaskStatus::Pending);
        assert_eq!(graph.tasks[1].task_name, "Untitled Task");
        assert_eq!(
            graph.tasks[1].dependencies,
            vec!["research_competitors".to_string()]
        );
    }

    #[test]
    fn test_plan_deserializes_with_defaults() {
        let plan: PlannedGraph = serde_json::from_str(
            r#"{"tasks": [{"step_id": "a", "task_description": "d", "assigned_agent": "analyst"}]}"#,
        )
        .unwrap();
        assert!(plan.workflow_name.is_none());
        assert!(plan.tasks[0].dependencies.is_empty());
    }

    #[test]
    fn test_name_from_request_truncation() {
        assert_eq!(name_from_request("short"), "short");

        let long = "x".repeat(80);
        let name = name_from_request(&long);
        assert_eq!(name.chars().count(), 53);
        assert!(name.ends_with("..."));
    }
}
