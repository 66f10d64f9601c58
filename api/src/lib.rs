//! HTTP surface of the coordination server.
//!
//! An axum router under `/v1`, authenticated by a bearer token matched
//! against the configured server secret. Handlers are thin adapters over
//! the [`orchestrator::WorkflowManager`]; error kinds map to status codes
//! per the coordination error taxonomy, and the poll endpoint never leaks
//! internal failures.

mod auth;
mod cache;
mod error;
mod handlers;
mod views;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use cortex_core::repository::CoordRepository;
use orchestrator::WorkflowManager;

pub use cache::ReadyTaskCache;
pub use error::ApiError;
pub use views::{
    ErrorResponse, HealthResponse, SubmitTaskRequest, TaskGraphResponse, WorkerStatusResponse,
    WorkerTaskView, WorkflowStatusResponse,
};

/// Shared state injected into every handler
pub struct AppState<R> {
    pub manager: WorkflowManager<R>,
    pub cache: ReadyTaskCache,
}

/// Coordination API server
pub struct ApiServer<R> {
    state: Arc<AppState<R>>,
    auth_token: String,
}

impl<R: CoordRepository + 'static> ApiServer<R> {
    pub fn new(
        manager: WorkflowManager<R>,
        auth_token: impl Into<String>,
        cache: ReadyTaskCache,
    ) -> Self {
        Self {
            state: Arc::new(AppState { manager, cache }),
            auth_token: auth_token.into(),
        }
    }

    /// Build the full router. The health check is reachable without
    /// authentication; everything else under `/v1` requires the bearer
    /// token.
    pub fn router(&self) -> Router {
        let authenticated = Router::new()
            .route("/tasks", post(handlers::submit_task::<R>))
            .route("/tasks/ready", get(handlers::get_ready_task::<R>))
            .route("/results", post(handlers::report_result::<R>))
            .route(
                "/workflows/:workflow_id/status",
                get(handlers::get_workflow_status::<R>),
            )
            .route(
                "/workflows/:workflow_id/result",
                get(handlers::get_workflow_result::<R>),
            )
            .route(
                "/workflows/:workflow_id/audit",
                get(handlers::get_audit_reports::<R>),
            )
            .route(
                "/workflows/:workflow_id/reset",
                post(handlers::reset_workflow::<R>),
            )
            .route("/workers/status", get(handlers::get_worker_status::<R>))
            .layer(middleware::from_fn_with_state(
                self.auth_token.clone(),
                auth::require_bearer,
            ));

        let v1 = Router::new()
            .route("/health", get(handlers::health))
            .merge(authenticated);

        Router::new()
            .nest("/v1", v1)
            .route("/health", get(handlers::health))
            .with_state(Arc::clone(&self.state))
    }

    /// Bind and serve until the process is stopped.
    pub async fn serve(
        self,
        addr: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let router = self.router();
        tracing::info!(addr = %addr, "Starting coordination API");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;
        Ok(())
    }
}
