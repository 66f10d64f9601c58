//! Test doubles for the coordination server.
//!
//! - [`InMemoryCoordStore`] - full in-memory repository with error
//!   injection and call tracking
//! - [`ScriptedBackend`] - LLM backend replaying canned replies
//! - builders for tasks, graphs, and execution histories

mod builders;
mod gateway;
mod repository;

pub use builders::{RaHistoryBuilder, TaskGraphBuilder, TaskStepBuilder};
pub use gateway::ScriptedBackend;
pub use repository::InMemoryCoordStore;
