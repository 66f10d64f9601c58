//! Scripted LLM backend for tests.

use async_trait::async_trait;
use llm_gateway::{ChatBackend, ChatRequest, GatewayError};
use parking_lot::Mutex;

/// Backend replaying a scripted sequence of replies, recording every
/// request it receives. Once the script is exhausted (or when constructed
/// with [`ScriptedBackend::always_fail`]) every call errors.
pub struct ScriptedBackend {
    replies: Mutex<Vec<Result<String, GatewayError>>>,
    calls: Mutex<Vec<ChatRequest>>,
    exhausted_error: GatewayError,
}

impl ScriptedBackend {
    /// Replay the given replies in order
    pub fn with_replies(replies: Vec<Result<String, GatewayError>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            calls: Mutex::new(Vec::new()),
            exhausted_error: GatewayError::Other("scripted backend exhausted".to_string()),
        }
    }

    /// Every call fails with a retryable error, exercising fallback paths
    pub fn always_fail() -> Self {
        Self {
            replies: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            exhausted_error: GatewayError::Http {
                status: 503,
                message: "scripted outage".to_string(),
            },
        }
    }

    /// Single successful reply
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self::with_replies(vec![Ok(reply.into())])
    }

    /// Requests received so far
    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        self.calls.lock().push(request.clone());
        let mut replies = self.replies.lock();
        if replies.is_empty() {
            Err(self.exhausted_error.clone())
        } else {
            replies.remove(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replay_then_exhaustion() {
        let backend = ScriptedBackend::with_replies(vec![Ok("first".to_string())]);
        let request = ChatRequest {
            messages: vec![],
            json_mode: false,
        };

        assert_eq!(backend.complete(&request).await.unwrap(), "first");
        assert!(backend.complete(&request).await.is_err());
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_always_fail_is_retryable() {
        let backend = ScriptedBackend::always_fail();
        let request = ChatRequest {
            messages: vec![],
            json_mode: true,
        };

        let error = backend.complete(&request).await.unwrap_err();
        assert!(error.is_retryable());
    }
}
