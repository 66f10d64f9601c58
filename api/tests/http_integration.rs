//! End-to-end tests for the HTTP surface: a real listener, a real client,
//! the in-memory repository, and a scripted LLM backend.

use std::sync::Arc;
use std::time::Duration;

use cortex_core::models::{TaskStatus, TaskStep};
use file_coordinator::FileAccessManager;
use llm_gateway::LlmClient;
use mocks::{InMemoryCoordStore, RaHistoryBuilder, ScriptedBackend};
use orchestrator::{ArtifactWriter, Auditor, WorkflowManager};
use rest_api::{ApiServer, ReadyTaskCache, TaskGraphResponse, WorkflowStatusResponse};

const TOKEN: &str = "test-secret-token";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    repository: Arc<InMemoryCoordStore>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    async fn spawn(backend: ScriptedBackend) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repository = Arc::new(InMemoryCoordStore::new());
        let llm = Arc::new(LlmClient::new(
            Arc::new(backend),
            1,
            Duration::from_millis(1),
        ));
        let artifacts = ArtifactWriter::new(dir.path(), Arc::new(FileAccessManager::new()));
        let manager = WorkflowManager::new(
            Arc::clone(&repository),
            llm,
            Auditor::new(),
            artifacts,
        );
        let server = ApiServer::new(manager, TOKEN, ReadyTaskCache::disabled());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = server.router();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            repository,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn submit(&self, user_request: &str) -> TaskGraphResponse {
        let response = self
            .client
            .post(self.url("/v1/tasks"))
            .bearer_auth(TOKEN)
            .json(&serde_json::json!({"user_request": user_request}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        response.json().await.unwrap()
    }

    async fn poll(&self, agent_id: &str, capability: &str) -> Option<TaskStep> {
        let response = self
            .client
            .get(self.url("/v1/tasks/ready"))
            .bearer_auth(TOKEN)
            .query(&[("agent_id", agent_id), ("agent_capabilities", capability)])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        response.json().await.unwrap()
    }

    async fn report(&self, workflow_id: &str, task: &TaskStep, client_id: &str) -> u16 {
        let envelope = serde_json::json!({
            "workflow_id": workflow_id,
            "task_id": task.step_id,
            "ra_history": RaHistoryBuilder::new()
                .with_agent(&task.assigned_agent)
                .with_client(client_id)
                .build(),
            "completed_at": chrono::Utc::now(),
        });
        self.client
            .post(self.url("/v1/results"))
            .bearer_auth(TOKEN)
            .json(&envelope)
            .send()
            .await
            .unwrap()
            .status()
            .as_u16()
    }
}

fn planned_reply() -> String {
    serde_json::json!({
        "workflow_name": "Research And Summarize AI",
        "tasks": [
            {
                "step_id": "research_ai_news",
                "task_name": "Research AI News",
                "task_description": "Gather the latest developments in AI",
                "assigned_agent": "researcher",
                "dependencies": []
            },
            {
                "step_id": "write_summary",
                "task_name": "Write Summary",
                "task_description": "Summarize the research into a report",
                "assigned_agent": "writer",
                "dependencies": ["research_ai_news"]
            }
        ]
    })
    .to_string()
}

fn passing_audit_reply() -> String {
    serde_json::json!({
        "is_successful": true,
        "feedback": "Meets the quality bar",
        "rework_suggestions": [],
        "confidence_score": 0.93
    })
    .to_string()
}

fn failing_audit_reply() -> String {
    serde_json::json!({
        "is_successful": false,
        "feedback": "Summary does not cite its sources",
        "rework_suggestions": ["Add citations to the summary"],
        "confidence_score": 0.9
    })
    .to_string()
}

#[tokio::test]
async fn test_health_needs_no_auth() {
    let server = TestServer::spawn(ScriptedBackend::with_reply(planned_reply())).await;

    for path in ["/health", "/v1/health"] {
        let response = server.client.get(server.url(path)).send().await.unwrap();
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
    }
}

#[tokio::test]
async fn test_missing_or_wrong_token_is_401() {
    let server = TestServer::spawn(ScriptedBackend::with_reply(planned_reply())).await;

    let response = server
        .client
        .post(server.url("/v1/tasks"))
        .json(&serde_json::json!({"user_request": "anything"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = server
        .client
        .get(server.url("/v1/workers/status"))
        .bearer_auth("wrong-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

// Submit shape: >= 2 tasks, dependency-free ones READY, the rest PENDING
#[tokio::test]
async fn test_submit_returns_planned_graph() {
    let server = TestServer::spawn(ScriptedBackend::with_reply(planned_reply())).await;

    let graph = server
        .submit("Research the latest developments in AI and summarize")
        .await;

    assert!(graph.workflow_id.starts_with("WID"));
    assert_eq!(graph.total_tasks, 2);
    assert!(graph.tasks.len() >= 2);

    let ready: Vec<&TaskStep> = graph
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Ready)
        .collect();
    assert_eq!(ready.len(), 1);
    assert!(ready[0].dependencies.is_empty());
    assert!(graph
        .tasks
        .iter()
        .filter(|t| t.status != TaskStatus::Ready)
        .all(|t| t.status == TaskStatus::Pending));
}

// The planner failing on every retry still yields 201 with one READY
// fallback task carrying the request
#[tokio::test]
async fn test_submit_with_llm_down_falls_back() {
    let server = TestServer::spawn(ScriptedBackend::always_fail()).await;

    let graph = server.submit("Summarize the quarterly numbers").await;
    assert_eq!(graph.total_tasks, 1);
    assert_eq!(graph.tasks[0].status, TaskStatus::Ready);
    assert!(graph.tasks[0]
        .task_description
        .contains("Summarize the quarterly numbers"));
}

#[tokio::test]
async fn test_submit_empty_request_is_422() {
    let server = TestServer::spawn(ScriptedBackend::with_reply(planned_reply())).await;

    let response = server
        .client
        .post(server.url("/v1/tasks"))
        .bearer_auth(TOKEN)
        .json(&serde_json::json!({"user_request": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn test_poll_claims_once_then_null() {
    let server = TestServer::spawn(ScriptedBackend::with_reply(planned_reply())).await;
    server.submit("Research and summarize").await;

    let first = server.poll("worker-1", "researcher").await;
    let task = first.expect("first poller receives the ready task");
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.client_id.as_deref(), Some("worker-1"));

    // The only READY research task is claimed; the next poll gets null
    let second = server.poll("worker-2", "researcher").await;
    assert!(second.is_none());

    // Capability mismatch never claims
    let wrong = server.poll("worker-3", "tester").await;
    assert!(wrong.is_none());
}

#[tokio::test]
async fn test_result_for_unknown_task_is_404() {
    let server = TestServer::spawn(ScriptedBackend::with_reply(planned_reply())).await;
    let graph = server.submit("Research and summarize").await;

    let mut phantom = graph.tasks[0].clone();
    phantom.step_id = "TID9999999999".to_string();
    let status = server.report(&graph.workflow_id, &phantom, "worker-1").await;
    assert_eq!(status, 404);
}

// Full cycle with a passing audit: report flips dependents READY, the
// final report completes the workflow and triggers the audit
#[tokio::test]
async fn test_full_cycle_with_passing_audit() {
    let server = TestServer::spawn(ScriptedBackend::with_replies(vec![
        Ok(planned_reply()),
        Ok(passing_audit_reply()),
        Ok("The synthesized final answer.".to_string()),
    ]))
    .await;

    let graph = server.submit("Research and summarize").await;
    let workflow_id = graph.workflow_id.clone();

    // Result endpoint is null while incomplete
    let response = server
        .client
        .get(server.url(&format!("/v1/workflows/{workflow_id}/result")))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Option<String> = response.json().await.unwrap();
    assert!(body.is_none());

    let research = server.poll("worker-1", "researcher").await.unwrap();
    assert_eq!(server.report(&workflow_id, &research, "worker-1").await, 204);

    // Dependency propagation made the writer task claimable
    let write = server.poll("worker-2", "writer").await.unwrap();
    assert_eq!(write.dependencies, vec![research.step_id.clone()]);
    assert_eq!(server.report(&workflow_id, &write, "worker-2").await, 204);

    // Workflow completed; the audit ran and passed
    let response = server
        .client
        .get(server.url(&format!("/v1/workflows/{workflow_id}/status")))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let status: WorkflowStatusResponse = response.json().await.unwrap();
    assert!(status.is_complete);
    assert_eq!(status.completed_tasks, 2);

    let response = server
        .client
        .get(server.url(&format!("/v1/workflows/{workflow_id}/audit")))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let reports: Vec<serde_json::Value> = response.json().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["is_successful"], true);

    // Synthesized result is served once complete
    let response = server
        .client
        .get(server.url(&format!("/v1/workflows/{workflow_id}/result")))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let body: Option<String> = response.json().await.unwrap();
    assert_eq!(body.as_deref(), Some("The synthesized final answer."));
}

// Rework arm: a failing audit resets completed tasks to PENDING with
// initial tasks READY again
#[tokio::test]
async fn test_failed_audit_resets_workflow() {
    let server = TestServer::spawn(ScriptedBackend::with_replies(vec![
        Ok(planned_reply()),
        Ok(failing_audit_reply()),
    ]))
    .await;

    let graph = server.submit("Research and summarize").await;
    let workflow_id = graph.workflow_id.clone();

    let research = server.poll("worker-1", "researcher").await.unwrap();
    server.report(&workflow_id, &research, "worker-1").await;
    let write = server.poll("worker-2", "writer").await.unwrap();
    server.report(&workflow_id, &write, "worker-2").await;

    let response = server
        .client
        .get(server.url(&format!("/v1/workflows/{workflow_id}/status")))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let status: WorkflowStatusResponse = response.json().await.unwrap();

    assert!(!status.is_complete);
    assert_eq!(status.ready_tasks, 1);
    assert_eq!(status.pending_tasks, 1);
    assert_eq!(status.completed_tasks, 0);

    // The failed report is stored
    let reports: Vec<serde_json::Value> = server
        .client
        .get(server.url(&format!("/v1/workflows/{workflow_id}/audit")))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["is_successful"], false);
}

#[tokio::test]
async fn test_status_unknown_workflow_is_404() {
    let server = TestServer::spawn(ScriptedBackend::with_reply(planned_reply())).await;

    let response = server
        .client
        .get(server.url("/v1/workflows/WID99999999/status"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_reset_endpoint() {
    let server = TestServer::spawn(ScriptedBackend::with_reply(planned_reply())).await;
    let graph = server.submit("Research and summarize").await;

    let response = server
        .client
        .post(server.url(&format!("/v1/workflows/{}/reset", graph.workflow_id)))
        .bearer_auth(TOKEN)
        .json(&serde_json::json!(["Start over with better sources"]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let response = server
        .client
        .post(server.url("/v1/workflows/WID99999999/reset"))
        .bearer_auth(TOKEN)
        .json(&serde_json::json!([]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_worker_status_reflects_claims() {
    let server = TestServer::spawn(ScriptedBackend::with_reply(planned_reply())).await;
    let graph = server.submit("Research and summarize").await;

    let response = server
        .client
        .get(server.url("/v1/workers/status"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["total_active"], 0);

    let task = server.poll("worker-1", "researcher").await.unwrap();

    let body: serde_json::Value = server
        .client
        .get(server.url("/v1/workers/status"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total_active"], 1);
    assert_eq!(
        body["worker_tasks"]["worker-1"]["task_id"],
        serde_json::json!(task.step_id)
    );
    assert_eq!(
        body["worker_tasks"]["worker-1"]["workflow_id"],
        serde_json::json!(graph.workflow_id)
    );
}

// Internal repository errors on poll are swallowed into a 200 null
#[tokio::test]
async fn test_poll_swallows_internal_errors() {
    let server = TestServer::spawn(ScriptedBackend::with_reply(planned_reply())).await;
    server.submit("Research and summarize").await;

    server
        .repository
        .inject_error(cortex_core::error::CoordError::Database(
            "connection lost".to_string(),
        ));

    let task = server.poll("worker-1", "researcher").await;
    assert!(task.is_none());

    // The queue is intact; the next poll claims normally
    let task = server.poll("worker-1", "researcher").await;
    assert!(task.is_some());
}
