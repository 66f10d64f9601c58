//! Prompt rendering for planning, auditing, and synthesis.
//!
//! The prompts are plain `format!` templates; the structured-output schema
//! is appended by the LLM gateway, not here.

use crate::models::RaHistory;

/// Capabilities advertised per agent role, used in the planning prompt.
/// These must match the roles the worker fleet actually runs.
pub const AGENT_CAPABILITIES: [(&str, &str); 6] = [
    (
        "researcher",
        "research, information gathering, fact checking, data collection",
    ),
    ("writer", "writing, content creation, editing, documentation"),
    (
        "analyst",
        "analysis, evaluation, data processing, insights, review, quality control",
    ),
    (
        "developer",
        "software development, coding, implementation, programming",
    ),
    ("tester", "testing, quality assurance, validation, debugging"),
    (
        "architect",
        "system design, architecture, technical planning, infrastructure, planning, strategy",
    ),
];

/// Default quality criteria applied by the auditor.
pub fn default_audit_criteria() -> Vec<String> {
    [
        "Completeness: All task requirements are fully addressed",
        "Accuracy: Information and conclusions are factually correct",
        "Clarity: Content is clear, well-organized, and easy to understand",
        "Relevance: All content directly relates to the original request",
        "Quality: Work demonstrates professionalism and attention to detail",
        "Consistency: Style and approach are consistent throughout",
        "Actionability: Deliverables are practical and implementable",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

/// System prompt for workflow planning and dependency analysis.
pub fn planning_prompt() -> String {
    let capabilities = AGENT_CAPABILITIES
        .iter()
        .map(|(role, caps)| format!("- {role}: {caps}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an expert workflow planner in a multi-agent coordination system.

Your role is to break down complex user requests into executable tasks with proper dependencies and agent assignments.

AVAILABLE AGENT TYPES AND CAPABILITIES:
{capabilities}

PLANNING PRINCIPLES:
1. Break complex requests into manageable, specific tasks
2. Identify dependencies between tasks (some tasks must complete before others can start)
3. Assign appropriate agent types based on task requirements
4. Ensure logical flow and proper sequencing
5. Create clear, actionable task descriptions
6. Consider parallel execution opportunities

DEPENDENCY RULES:
- Research tasks often come first to gather information
- Analysis tasks depend on research or data gathering
- Writing tasks depend on research and analysis
- Review tasks come last to validate work

CRITICAL: You MUST ONLY use the agent types listed above. DO NOT invent new agent types.
For review/quality control tasks, use "analyst". For planning/coordination, use "architect".

IMPORTANT:
- Each task should be specific and actionable
- Dependencies must reference valid step_ids from other tasks
- Tasks with no dependencies can start immediately (they will be marked READY)
- Use clear, descriptive step_ids (e.g., "research_market_analysis", "write_executive_summary")
- Generate a concise, descriptive workflow_name (3-6 words) and a task_name (2-5 words) per task
- Do NOT include timestamps; they are set automatically
- step_id and workflow_id are rewritten to sequential identifiers on save"#
    )
}

/// User-side input for the planning call.
pub fn planning_input(user_request: &str, metadata: &serde_json::Value) -> String {
    let mut parts = vec![
        format!("USER REQUEST: {user_request}"),
        String::new(),
        "Please analyze this request and create a comprehensive workflow plan.".to_string(),
    ];

    if metadata.as_object().is_some_and(|m| !m.is_empty()) {
        parts.push(String::new());
        parts.push("ADDITIONAL CONTEXT:".to_string());
        parts.push(serde_json::to_string_pretty(metadata).unwrap_or_default());
    }

    parts.extend(
        [
            "",
            "PLANNING CONSIDERATIONS:",
            "- What information needs to be gathered first?",
            "- What analysis or processing is required?",
            "- What deliverables need to be created?",
            "- How should the work be sequenced for optimal results?",
            "- Which agent types are best suited for each task?",
            "",
            "Create a detailed workflow plan with proper task dependencies.",
        ]
        .iter()
        .map(|s| s.to_string()),
    );

    parts.join("\n")
}

/// System prompt for the quality audit.
pub fn audit_prompt(auditor_name: &str, criteria: &[String]) -> String {
    let criteria_text = criteria
        .iter()
        .map(|c| format!("- {c}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are {auditor_name}, a rigorous quality auditor in a multi-agent coordination system.

Your role is CRITICAL: you are the final quality gate that determines whether completed work meets professional standards. Be thorough, objective, and uncompromising.

AUDIT RESPONSIBILITIES:
1. Review all completed work against the defined quality criteria
2. Identify specific strengths and weaknesses
3. Provide actionable feedback for improvement
4. Make go/no-go decisions based on quality standards
5. Ensure work meets the original requirements

QUALITY CRITERIA:
{criteria_text}

CRITICAL STANDARDS:
- Be objective and evidence-based in your evaluation
- Point out specific examples of both strengths and weaknesses
- Provide concrete, actionable improvement suggestions
- Only approve work that truly meets high professional standards
- Your confidence score should reflect your certainty in the assessment"#
    )
}

/// User-side input for the audit call: criteria enumerated, every
/// iteration history appended verbatim.
pub fn audit_input(workflow_id: &str, results: &[RaHistory], criteria: &[String]) -> String {
    let mut parts = vec![
        "WORKFLOW AUDIT REQUEST".to_string(),
        format!("Workflow ID: {workflow_id}"),
        format!("Total Tasks: {}", results.len()),
        String::new(),
        "QUALITY CRITERIA TO EVALUATE:".to_string(),
    ];

    for (i, criterion) in criteria.iter().enumerate() {
        parts.push(format!("{}. {criterion}", i + 1));
    }

    parts.push(String::new());
    parts.push("COMPLETED TASK RESULTS FOR REVIEW:".to_string());
    parts.push(String::new());

    for (i, result) in results.iter().enumerate() {
        parts.push(format!("TASK {}:", i + 1));
        parts.push(format!("  Agent: {}", result.source_agent));
        parts.push(format!("  Client: {}", result.client_id));
        parts.push(format!("  Execution Time: {:.2}s", result.execution_time));
        parts.push(format!("  Iterations: {}", result.iterations.len()));
        parts.push(String::new());
        parts.push("  EXECUTION HISTORY:".to_string());

        for (j, iteration) in result.iterations.iter().enumerate() {
            parts.push(format!("    Iteration {}:", j + 1));
            parts.push(format!("      Thought: {}", iteration.thought));
            parts.push(format!("      Action: {}", iteration.action));
            if let Some(observation) = &iteration.observation {
                parts.push(format!("      Observation: {observation}"));
            }
        }

        parts.push(String::new());
        parts.push("  FINAL RESULT:".to_string());
        parts.push(format!("  {}", result.final_result));
        parts.push(String::new());
        parts.push(format!("  {}", "-".repeat(80)));
        parts.push(String::new());
    }

    parts.extend(
        [
            "",
            "AUDIT INSTRUCTIONS:",
            "1. Evaluate each task result against all quality criteria",
            "2. Consider the overall workflow coherence and completeness",
            "3. Identify specific strengths and areas for improvement",
            "4. Provide actionable feedback with concrete examples",
            "5. Determine if the work meets professional standards",
            "6. Assign an appropriate confidence score for your assessment",
            "",
            "Please provide your comprehensive audit assessment:",
        ]
        .iter()
        .map(|s| s.to_string()),
    );

    parts.join("\n")
}

/// Prompt for synthesizing all task results into the final deliverable.
pub fn synthesis_prompt(workflow_id: &str, results: &[RaHistory]) -> String {
    let mut prompt = format!(
        r#"You are synthesizing the final deliverable for a completed multi-agent workflow.

WORKFLOW ID: {workflow_id}
TOTAL TASKS: {}

TASK RESULTS TO SYNTHESIZE:
"#,
        results.len()
    );

    for (i, result) in results.iter().enumerate() {
        prompt.push_str(&format!(
            "\nTASK {} ({}):\n{}\n\n---\n",
            i + 1,
            result.source_agent,
            result.final_result
        ));
    }

    prompt.push_str(
        r#"
Please create a comprehensive, well-organized final response that:
1. Integrates all task results coherently
2. Addresses the original user request completely
3. Presents information in a logical, professional format
4. Highlights key insights and recommendations
5. Provides clear, actionable conclusions

The response should be polished, complete, and ready for delivery to the end user.
"#,
    );

    prompt
}

/// Prompt for a quick single-result PASS/FAIL spot check.
pub fn quick_audit_prompt(final_result: &str, original_request: &str) -> String {
    format!(
        r#"You are a quality auditor doing a quick assessment.

ORIGINAL REQUEST: {original_request}

RESULT TO EVALUATE: {final_result}

Does this result adequately address the original request with reasonable quality?
Consider: completeness, accuracy, clarity, and relevance.

Respond with just "PASS" or "FAIL" followed by a brief reason."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThoughtAction;

    fn sample_history() -> RaHistory {
        RaHistory {
            iterations: vec![ThoughtAction {
                thought: "Need market data".to_string(),
                action: "Search industry reports".to_string(),
                observation: Some("Found three reports".to_string()),
                iteration_number: 1,
            }],
            final_result: "Market summary".to_string(),
            source_agent: "researcher".to_string(),
            execution_time: 12.5,
            client_id: "worker-1".to_string(),
        }
    }

    #[test]
    fn test_planning_prompt_lists_all_roles() {
        let prompt = planning_prompt();
        for (role, _) in AGENT_CAPABILITIES {
            assert!(prompt.contains(role), "missing role {role}");
        }
    }

    #[test]
    fn test_planning_input_includes_metadata() {
        let meta = serde_json::json!({"priority": "high"});
        let input = planning_input("Build a todo app", &meta);
        assert!(input.contains("USER REQUEST: Build a todo app"));
        assert!(input.contains("ADDITIONAL CONTEXT:"));
        assert!(input.contains("priority"));

        let empty = planning_input("Build a todo app", &serde_json::json!({}));
        assert!(!empty.contains("ADDITIONAL CONTEXT:"));
    }

    #[test]
    fn test_audit_input_replays_iterations_verbatim() {
        let criteria = default_audit_criteria();
        let input = audit_input("WID00000001", &[sample_history()], &criteria);

        assert!(input.contains("Workflow ID: WID00000001"));
        assert!(input.contains("Thought: Need market data"));
        assert!(input.contains("Action: Search industry reports"));
        assert!(input.contains("Observation: Found three reports"));
        assert!(input.contains("FINAL RESULT:"));
        for criterion in &criteria {
            assert!(input.contains(criterion.as_str()));
        }
    }

    #[test]
    fn test_synthesis_prompt_numbers_tasks() {
        let prompt = synthesis_prompt("WID00000001", &[sample_history(), sample_history()]);
        assert!(prompt.contains("TASK 1 (researcher):"));
        assert!(prompt.contains("TASK 2 (researcher):"));
        assert!(prompt.contains("TOTAL TASKS: 2"));
    }
}
