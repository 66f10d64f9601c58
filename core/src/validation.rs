use std::collections::{HashMap, HashSet};

use crate::{
    error::{CoordError, Result},
    models::{TaskGraph, TaskStatus},
};

/// Agent roles the worker fleet can execute. Tasks assigned to anything
/// else are remapped before persistence so they cannot get stuck unclaimed.
pub const VALID_AGENTS: [&str; 6] = [
    "researcher",
    "writer",
    "analyst",
    "developer",
    "tester",
    "architect",
];

/// Remap table for agent names planners commonly invent.
/// Anything not listed here (and not valid) falls back to `analyst`.
const AGENT_REMAP: [(&str, &str); 4] = [
    ("reviewer", "analyst"),
    ("planner", "architect"),
    ("coordinator", "architect"),
    ("manager", "architect"),
];

/// Fallback role for unrecognized agent names
const FALLBACK_AGENT: &str = "analyst";

/// Validation for planner-produced task graphs.
///
/// Applied before persistence: a graph that references unknown step ids or
/// contains a dependency cycle is rejected with a `Validation` error;
/// unknown agent assignments are auto-corrected instead of rejected.
pub struct GraphValidator;

impl GraphValidator {
    /// Validate structural integrity of a task graph.
    ///
    /// # Errors
    /// * `CoordError::Validation` - empty graph, duplicate step ids,
    ///   dependency on an unknown step id, or a dependency cycle
    pub fn validate(graph: &TaskGraph) -> Result<()> {
        if graph.tasks.is_empty() {
            return Err(CoordError::Validation(
                "Task graph contains no tasks".to_string(),
            ));
        }

        let mut step_ids = HashSet::new();
        for task in &graph.tasks {
            if task.task_description.trim().is_empty() {
                return Err(CoordError::empty_field("task_description"));
            }
            if !step_ids.insert(task.step_id.as_str()) {
                return Err(CoordError::Validation(format!(
                    "Duplicate step id: {}",
                    task.step_id
                )));
            }
        }

        for task in &graph.tasks {
            for dep in &task.dependencies {
                if !step_ids.contains(dep.as_str()) {
                    return Err(CoordError::Validation(format!(
                        "Task {} has invalid dependency: {dep}",
                        task.step_id
                    )));
                }
            }
        }

        Self::check_acyclic(graph)
    }

    /// Reject graphs whose dependency edges contain a cycle.
    fn check_acyclic(graph: &TaskGraph) -> Result<()> {
        let deps: HashMap<&str, &Vec<String>> = graph
            .tasks
            .iter()
            .map(|t| (t.step_id.as_str(), &t.dependencies))
            .collect();

        // 0 = unvisited, 1 = on the current path, 2 = done
        let mut state: HashMap<&str, u8> = HashMap::new();

        fn visit<'a>(
            node: &'a str,
            deps: &HashMap<&'a str, &'a Vec<String>>,
            state: &mut HashMap<&'a str, u8>,
        ) -> bool {
            match state.get(node) {
                Some(1) => return false,
                Some(2) => return true,
                _ => {}
            }
            state.insert(node, 1);
            if let Some(children) = deps.get(node) {
                for dep in children.iter() {
                    if !visit(dep.as_str(), deps, state) {
                        return false;
                    }
                }
            }
            state.insert(node, 2);
            true
        }

        for task in &graph.tasks {
            if !visit(task.step_id.as_str(), &deps, &mut state) {
                return Err(CoordError::Validation(format!(
                    "Dependency cycle detected involving task {}",
                    task.step_id
                )));
            }
        }

        Ok(())
    }

    /// Auto-correct invalid agent assignments in place.
    ///
    /// Returns the number of tasks remapped.
    pub fn remap_agents(graph: &mut TaskGraph) -> usize {
        let valid: HashSet<&str> = VALID_AGENTS.iter().copied().collect();
        let remap: HashMap<&str, &str> = AGENT_REMAP.iter().copied().collect();

        let mut corrected = 0;
        for task in &mut graph.tasks {
            if !valid.contains(task.assigned_agent.as_str()) {
                let replacement = remap
                    .get(task.assigned_agent.as_str())
                    .copied()
                    .unwrap_or(FALLBACK_AGENT);
                tracing::warn!(
                    step_id = %task.step_id,
                    invalid_agent = %task.assigned_agent,
                    corrected_to = %replacement,
                    "Auto-corrected invalid agent assignment"
                );
                task.assigned_agent = replacement.to_string();
                corrected += 1;
            }
        }
        corrected
    }

    /// Mark tasks without dependencies READY; everything else stays PENDING.
    pub fn mark_initial_tasks_ready(graph: &mut TaskGraph) {
        for task in &mut graph.tasks {
            task.status = if task.is_initial() {
                TaskStatus::Ready
            } else {
                TaskStatus::Pending
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStep;
    use chrono::Utc;
    use std::collections::HashMap as StdHashMap;

    fn task(id: &str, agent: &str, deps: &[&str]) -> TaskStep {
        TaskStep {
            step_id: id.to_string(),
            workflow_id: "WID_LOCAL".to_string(),
            task_name: id.to_string(),
            task_description: format!("do {id}"),
            assigned_agent: agent.to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            project_path: None,
            file_dependencies: vec![],
            file_access_types: StdHashMap::new(),
            status: TaskStatus::Pending,
            client_id: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    fn graph(tasks: Vec<TaskStep>) -> TaskGraph {
        TaskGraph {
            workflow_id: "WID_LOCAL".to_string(),
            workflow_name: "test".to_string(),
            tasks,
            created_at: None,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn test_valid_graph_passes() {
        let g = graph(vec![
            task("research", "researcher", &[]),
            task("write", "writer", &["research"]),
            task("review", "analyst", &["write"]),
        ]);
        assert!(GraphValidator::validate(&g).is_ok());
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let g = graph(vec![task("write", "writer", &["missing_step"])]);
        let err = GraphValidator::validate(&g).unwrap_err();
        assert!(err.is_validation());
        assert!(format!("{err}").contains("missing_step"));
    }

    #[test]
    fn test_cycle_rejected() {
        let g = graph(vec![
            task("a", "analyst", &["b"]),
            task("b", "analyst", &["a"]),
        ]);
        let err = GraphValidator::validate(&g).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_self_cycle_rejected() {
        let g = graph(vec![task("a", "analyst", &["a"])]);
        assert!(GraphValidator::validate(&g).is_err());
    }

    #[test]
    fn test_empty_graph_rejected() {
        assert!(GraphValidator::validate(&graph(vec![])).is_err());
    }

    #[test]
    fn test_duplicate_step_id_rejected() {
        let g = graph(vec![
            task("a", "analyst", &[]),
            task("a", "writer", &[]),
        ]);
        assert!(GraphValidator::validate(&g).is_err());
    }

    #[test]
    fn test_agent_remap() {
        let mut g = graph(vec![
            task("a", "reviewer", &[]),
            task("b", "planner", &[]),
            task("c", "wizard", &[]),
            task("d", "developer", &[]),
        ]);

        let corrected = GraphValidator::remap_agents(&mut g);
        assert_eq!(corrected, 3);
        assert_eq!(g.tasks[0].assigned_agent, "analyst");
        assert_eq!(g.tasks[1].assigned_agent, "architect");
        assert_eq!(g.tasks[2].assigned_agent, "analyst");
        assert_eq!(g.tasks[3].assigned_agent, "developer");
    }

    #[test]
    fn test_mark_initial_tasks_ready() {
        let mut g = graph(vec![
            task("a", "researcher", &[]),
            task("b", "writer", &["a"]),
        ]);

        GraphValidator::mark_initial_tasks_ready(&mut g);
        assert_eq!(g.tasks[0].status, TaskStatus::Ready);
        assert_eq!(g.tasks[1].status, TaskStatus::Pending);
    }
}
