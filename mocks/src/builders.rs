//! Builder pattern implementations for test data construction.

use std::collections::HashMap;

use chrono::Utc;
use cortex_core::models::{
    RaHistory, TaskGraph, TaskStatus, TaskStep, ThoughtAction,
};

/// Builder for constructing TaskStep instances in tests
pub struct TaskStepBuilder {
    task: TaskStep,
}

impl Default for TaskStepBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStepBuilder {
    pub fn new() -> Self {
        Self {
            task: TaskStep {
                step_id: "step_1".to_string(),
                workflow_id: "WID_LOCAL".to_string(),
                task_name: "Test Task".to_string(),
                task_description: "A test task".to_string(),
                assigned_agent: "analyst".to_string(),
                dependencies: vec![],
                project_path: None,
                file_dependencies: vec![],
                file_access_types: HashMap::new(),
                status: TaskStatus::Pending,
                client_id: None,
                started_at: None,
                completed_at: None,
                created_at: Utc::now(),
            },
        }
    }

    pub fn with_step_id(mut self, step_id: impl Into<String>) -> Self {
        self.task.step_id = step_id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.task.task_description = description.into();
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.task.assigned_agent = agent.into();
        self
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.task.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_file_dependency(mut self, path: impl Into<String>) -> Self {
        self.task.file_dependencies.push(path.into());
        self
    }

    pub fn build(self) -> TaskStep {
        self.task
    }
}

/// Builder for constructing TaskGraph instances in tests
pub struct TaskGraphBuilder {
    graph: TaskGraph,
}

impl Default for TaskGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGraphBuilder {
    pub fn new() -> Self {
        Self {
            graph: TaskGraph {
                workflow_id: "WID_LOCAL".to_string(),
                workflow_name: "Test Workflow".to_string(),
                tasks: vec![],
                created_at: None,
                metadata: serde_json::json!({}),
            },
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.graph.workflow_name = name.into();
        self
    }

    pub fn with_task(mut self, task: TaskStep) -> Self {
        self.graph.tasks.push(task);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.graph.metadata = metadata;
        self
    }

    /// Mark dependency-free tasks READY, as the planner does before save
    pub fn mark_initial_ready(mut self) -> Self {
        cortex_core::GraphValidator::mark_initial_tasks_ready(&mut self.graph);
        self
    }

    pub fn build(self) -> TaskGraph {
        self.graph
    }
}

/// Builder for constructing RaHistory instances in tests
pub struct RaHistoryBuilder {
    history: RaHistory,
}

impl Default for RaHistoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RaHistoryBuilder {
    pub fn new() -> Self {
        Self {
            history: RaHistory {
                iterations: vec![ThoughtAction {
                    thought: "Consider the task".to_string(),
                    action: "Do the work".to_string(),
                    observation: Some("Work done".to_string()),
                    iteration_number: 1,
                }],
                final_result: "Finished".to_string(),
                source_agent: "analyst".to_string(),
                execution_time: 1.0,
                client_id: "test-worker".to_string(),
            },
        }
    }

    pub fn with_final_result(mut self, result: impl Into<String>) -> Self {
        self.history.final_result = result.into();
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.history.source_agent = agent.into();
        self
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.history.client_id = client_id.into();
        self
    }

    pub fn with_iteration(mut self, thought: &str, action: &str) -> Self {
        let number = self.history.iterations.len() as i32 + 1;
        self.history.iterations.push(ThoughtAction {
            thought: thought.to_string(),
            action: action.to_string(),
            observation: None,
            iteration_number: number,
        });
        self
    }

    pub fn build(self) -> RaHistory {
        self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_builder_defaults() {
        let task = TaskStepBuilder::new().build();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.dependencies.is_empty());
    }

    #[test]
    fn test_graph_builder_marks_initial_ready() {
        let graph = TaskGraphBuilder::new()
            .with_task(TaskStepBuilder::new().with_step_id("a").build())
            .with_task(
                TaskStepBuilder::new()
                    .with_step_id("b")
                    .with_dependencies(&["a"])
                    .build(),
            )
            .mark_initial_ready()
            .build();

        assert_eq!(graph.tasks[0].status, TaskStatus::Ready);
        assert_eq!(graph.tasks[1].status, TaskStatus::Pending);
    }

    #[test]
    fn test_history_builder_iteration_numbers() {
        let history = RaHistoryBuilder::new()
            .with_iteration("again", "more work")
            .build();
        assert_eq!(history.iterations.len(), 2);
        assert_eq!(history.iterations[1].iteration_number, 2);
    }
}
