use chrono::Utc;
use cortex_core::{
    models::{AuditReport, RaHistory},
    prompts,
};
use llm_gateway::LlmClient;
use schemars::JsonSchema;
use serde::Deserialize;

/// Default minimum confidence for an audit to count as approval
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Structured audit outcome demanded from the model
#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct AuditOutcome {
    is_successful: bool,
    feedback: String,
    #[serde(default)]
    rework_suggestions: Vec<String>,
    confidence_score: f64,
}

/// Quality gate over completed workflows.
///
/// Reviews every task's execution history against the configured criteria
/// and produces an [`AuditReport`]. A report whose confidence falls below
/// the threshold is forced unsuccessful; an audit that itself fails yields
/// a synthetic failed report with zero confidence rather than an error.
pub struct Auditor {
    name: String,
    criteria: Vec<String>,
    confidence_threshold: f64,
}

impl Default for Auditor {
    fn default() -> Self {
        Self::new()
    }
}

impl Auditor {
    pub fn new() -> Self {
        Self {
            name: "QualityAuditor".to_string(),
            criteria: prompts::default_audit_criteria(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    pub fn with_criteria(mut self, criteria: Vec<String>) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn criteria(&self) -> &[String] {
        &self.criteria
    }

    /// Conduct a full audit of a workflow's results.
    ///
    /// `reviewed_tasks` carries the step ids of the audited tasks.
    pub async fn run_audit(
        &self,
        llm: &LlmClient,
        workflow_id: &str,
        results: &[RaHistory],
        reviewed_tasks: Vec<String>,
    ) -> AuditReport {
        tracing::info!(workflow_id = %workflow_id, "Starting audit");

        let system_prompt = prompts::audit_prompt(&self.name, &self.criteria);
        let audit_input = prompts::audit_input(workflow_id, results, &self.criteria);

        match llm
            .run_for_structured::<AuditOutcome>(&system_prompt, &audit_input)
            .await
        {
            Ok(outcome) => {
                let mut report = AuditReport {
                    workflow_id: workflow_id.to_string(),
                    is_successful: outcome.is_successful,
                    feedback: outcome.feedback,
                    rework_suggestions: outcome.rework_suggestions,
                    confidence_score: outcome.confidence_score.clamp(0.0, 1.0),
                    reviewed_tasks,
                    audit_criteria: self.criteria.clone(),
                    created_at: Utc::now(),
                };

                if report.confidence_score < self.confidence_threshold {
                    report.is_successful = false;
                    if !report.feedback.to_lowercase().contains("low confidence") {
                        report.feedback.push_str(&format!(
                            " NOTE: Confidence score ({:.2}) below threshold ({:.2}).",
                            report.confidence_score, self.confidence_threshold
                        ));
                    }
                }

                tracing::info!(
                    workflow_id = %workflow_id,
                    successful = report.is_successful,
                    confidence = report.confidence_score,
                    "Audit completed"
                );
                report
            }
            Err(error) => {
                tracing::error!(workflow_id = %workflow_id, %error, "Audit failed");
                AuditReport {
                    workflow_id: workflow_id.to_string(),
                    is_successful: false,
                    feedback: format!(
                        "Audit process encountered an error: {error}. Manual review required."
                    ),
                    rework_suggestions: vec![
                        "Review workflow execution for technical issues".to_string(),
                        "Ensure all tasks completed successfully".to_string(),
                        "Verify data integrity and completeness".to_string(),
                    ],
                    confidence_score: 0.0,
                    reviewed_tasks,
                    audit_criteria: self.criteria.clone(),
                    created_at: Utc::now(),
                }
            }
        }
    }

    /// Quick PASS/FAIL spot check on a single result. Fails closed.
    pub async fn run_quick_audit(
        &self,
        llm: &LlmClient,
        final_result: &str,
        original_request: &str,
    ) -> bool {
        let prompt = prompts::quick_audit_prompt(final_result, original_request);
        match llm.run_simple(&prompt).await {
            Ok(response) => response.trim().to_uppercase().starts_with("PASS"),
            Err(_) => false,
        }
    }
}
