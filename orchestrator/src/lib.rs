//! Workflow lifecycle controller.
//!
//! Orchestrates the plan → dispatch → audit → rework → synthesize state
//! machine over the persistence layer and the LLM gateway:
//!
//! - [`WorkflowManager`] - planning (with fallback), audit triggering,
//!   result synthesis, project artifact persistence
//! - [`Auditor`] - quality gate with confidence thresholding
//! - [`ArtifactWriter`] - project directory layout and artifact writes
//! - [`planner`] - LLM wire shapes for planning output

mod artifacts;
mod auditor;
mod manager;
pub mod planner;

pub use artifacts::ArtifactWriter;
pub use auditor::{Auditor, DEFAULT_CONFIDENCE_THRESHOLD};
pub use manager::WorkflowManager;
