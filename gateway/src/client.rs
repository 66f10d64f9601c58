use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Models known to support the provider's JSON output mode
const JSON_MODE_MODELS: [&str; 4] = [
    "gpt-4-1106-preview",
    "gpt-4-turbo",
    "gpt-4o",
    "gpt-3.5-turbo-1106",
];

/// Gateway configuration, normally populated from environment by the
/// server binary.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Per-call timeout
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            max_tokens: 2000,
            temperature: 0.1,
            timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.api_key.trim().is_empty() {
            return Err(GatewayError::Configuration(
                "LLM API key is required".to_string(),
            ));
        }
        Ok(())
    }

    fn supports_json_mode(&self) -> bool {
        JSON_MODE_MODELS.iter().any(|m| self.model.contains(m))
    }
}

/// One chat message in provider wire format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A single completion request against the backend
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Ask the provider for JSON output when the model supports it
    pub json_mode: bool,
}

/// Seam between the retry/validation loop and the actual provider call.
/// Tests substitute a scripted implementation.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError>;
}

/// OpenAI-compatible chat-completions backend over reqwest.
pub struct OpenAiBackend {
    http: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiBackend {
    pub fn new(config: LlmConfig) -> Result<Self, GatewayError> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        let mut payload = serde_json::json!({
            "model": self.config.model,
            "messages": request.messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });
        if request.json_mode && self.config.supports_json_mode() {
            payload["response_format"] = serde_json::json!({"type": "json_object"});
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(e.to_string())
                } else {
                    GatewayError::Other(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Other(format!("Failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(GatewayError::Http {
                status: status.as_u16(),
                message: body,
            });
        }

        let envelope: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Other(format!("Malformed response envelope: {e}")))?;

        envelope["choices"][0]["message"]["content"]
            .as_str()
            .map(|content| content.trim().to_string())
            .ok_or_else(|| {
                GatewayError::Other("Response envelope missing message content".to_string())
            })
    }
}

/// LLM client enforcing structured output.
///
/// `run_for_structured` appends the declared JSON schema to the system
/// prompt, and on parse or validation failure appends the failed output
/// plus a repair directive to the conversation before retrying with
/// exponential backoff.
pub struct LlmClient {
    backend: Arc<dyn ChatBackend>,
    max_retries: u32,
    retry_delay: Duration,
}

impl LlmClient {
    pub fn new(backend: Arc<dyn ChatBackend>, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            backend,
            max_retries,
            retry_delay,
        }
    }

    /// Client with the default retry policy (3 retries, 1s base delay)
    pub fn from_backend(backend: Arc<dyn ChatBackend>) -> Self {
        Self::new(backend, 3, Duration::from_secs(1))
    }

    /// Call the model demanding a value conforming to `T`'s JSON schema.
    pub async fn run_for_structured<T>(
        &self,
        system_prompt: &str,
        user_input: &str,
    ) -> Result<T, GatewayError>
    where
        T: serde::de::DeserializeOwned + schemars::JsonSchema,
    {
        let schema = schemars::schema_for!(T);
        let schema_text = serde_json::to_string(&schema)
            .map_err(|e| GatewayError::Other(format!("Failed to render schema: {e}")))?;

        let mut messages = vec![
            ChatMessage::system(format!(
                "{system_prompt}\n\nIMPORTANT: You must respond with valid JSON that matches this schema: {schema_text}"
            )),
            ChatMessage::user(user_input),
        ];

        let mut last_error = GatewayError::Other("Maximum retries exceeded".to_string());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay * 2u32.pow(attempt - 1)).await;
            }

            let request = ChatRequest {
                messages: messages.clone(),
                json_mode: true,
            };

            match self.backend.complete(&request).await {
                Ok(content) => match parse_structured::<T>(&content) {
                    Ok(value) => return Ok(value),
                    Err(parse_error) => {
                        tracing::warn!(attempt, %parse_error, "LLM output failed validation");
                        messages.push(ChatMessage::assistant(content));
                        messages.push(ChatMessage::user(format!(
                            "The previous response was not valid JSON or did not match the \
                             required schema. Error: {parse_error}. Please provide a valid JSON \
                             response matching the schema."
                        )));
                        last_error = GatewayError::Validation(parse_error);
                    }
                },
                Err(error) if error.is_retryable() => {
                    tracing::warn!(attempt, %error, "LLM call failed; will retry");
                    last_error = error;
                }
                Err(error) => return Err(error),
            }
        }

        Err(last_error)
    }

    /// Run a plain prompt without JSON enforcement; transport errors are
    /// retried, the output is returned as-is.
    pub async fn run_simple(&self, prompt: &str) -> Result<String, GatewayError> {
        let request = ChatRequest {
            messages: vec![ChatMessage::user(prompt)],
            json_mode: false,
        };

        let mut last_error = GatewayError::Other("Maximum retries exceeded".to_string());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay * 2u32.pow(attempt - 1)).await;
            }

            match self.backend.complete(&request).await {
                Ok(content) => return Ok(content),
                Err(error) if error.is_retryable() => {
                    tracing::warn!(attempt, %error, "LLM call failed; will retry");
                    last_error = error;
                }
                Err(error) => return Err(error),
            }
        }

        Err(last_error)
    }
}

/// Parse model output into `T`, tolerating markdown code fences.
fn parse_structured<T: serde::de::DeserializeOwned>(content: &str) -> Result<T, String> {
    let stripped = strip_code_fences(content);
    serde_json::from_str(stripped).map_err(|e| e.to_string())
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence
    let inner = match inner.find('\n') {
        Some(newline) => &inner[newline + 1..],
        None => inner,
    };
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use schemars::JsonSchema;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Verdict {
        passed: bool,
        score: f64,
    }

    /// Backend replaying a scripted sequence of replies
    struct Scripted {
        replies: Mutex<Vec<Result<String, GatewayError>>>,
        calls: Mutex<Vec<ChatRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, GatewayError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatBackend for Scripted {
        async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
            self.calls.lock().push(request.clone());
            let mut replies = self.replies.lock();
            if replies.is_empty() {
                Err(GatewayError::Other("script exhausted".to_string()))
            } else {
                replies.remove(0)
            }
        }
    }

    fn client(backend: Arc<Scripted>) -> LlmClient {
        LlmClient::new(backend, 2, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_structured_success_first_try() {
        let backend = Arc::new(Scripted::new(vec![Ok(
            r#"{"passed": true, "score": 0.9}"#.to_string()
        )]));
        let verdict: Verdict = client(Arc::clone(&backend))
            .run_for_structured("system", "input")
            .await
            .unwrap();

        assert_eq!(
            verdict,
            Verdict {
                passed: true,
                score: 0.9
            }
        );

        // Schema was embedded into the system prompt
        let calls = backend.calls.lock();
        assert!(calls[0].messages[0].content.contains("schema"));
        assert!(calls[0].json_mode);
    }

    #[tokio::test]
    async fn test_repair_prompt_on_invalid_output() {
        let backend = Arc::new(Scripted::new(vec![
            Ok("this is not json".to_string()),
            Ok(r#"{"passed": false, "score": 0.2}"#.to_string()),
        ]));
        let verdict: Verdict = client(Arc::clone(&backend))
            .run_for_structured("system", "input")
            .await
            .unwrap();
        assert!(!verdict.passed);

        // The retry conversation carries the failed output and a repair
        // directive
        let calls = backend.calls.lock();
        assert_eq!(calls.len(), 2);
        let retry = &calls[1].messages;
        assert_eq!(retry[retry.len() - 2].role, "assistant");
        assert_eq!(retry[retry.len() - 2].content, "this is not json");
        assert!(retry[retry.len() - 1].content.contains("valid JSON"));
    }

    #[tokio::test]
    async fn test_validation_retries_exhausted() {
        let backend = Arc::new(Scripted::new(vec![
            Ok("garbage".to_string()),
            Ok("still garbage".to_string()),
            Ok("more garbage".to_string()),
        ]));
        let result = client(backend)
            .run_for_structured::<Verdict>("system", "input")
            .await;
        assert!(matches!(result, Err(GatewayError::Validation(_))));
    }

    #[tokio::test]
    async fn test_4xx_is_not_retried() {
        let backend = Arc::new(Scripted::new(vec![Err(GatewayError::Http {
            status: 401,
            message: "unauthorized".to_string(),
        })]));
        let result = client(Arc::clone(&backend))
            .run_for_structured::<Verdict>("system", "input")
            .await;

        assert!(matches!(
            result,
            Err(GatewayError::Http { status: 401, .. })
        ));
        assert_eq!(backend.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_5xx_is_retried() {
        let backend = Arc::new(Scripted::new(vec![
            Err(GatewayError::Http {
                status: 503,
                message: "unavailable".to_string(),
            }),
            Ok(r#"{"passed": true, "score": 1.0}"#.to_string()),
        ]));
        let verdict: Verdict = client(Arc::clone(&backend))
            .run_for_structured("system", "input")
            .await
            .unwrap();
        assert!(verdict.passed);
        assert_eq!(backend.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_run_simple_passes_through() {
        let backend = Arc::new(Scripted::new(vec![Ok("plain text answer".to_string())]));
        let answer = client(Arc::clone(&backend)).run_simple("hello").await.unwrap();
        assert_eq!(answer, "plain text answer");
        assert!(!backend.calls.lock()[0].json_mode);
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn test_json_mode_gating() {
        let mut config = LlmConfig::new("key", "gpt-4o-mini");
        assert!(config.supports_json_mode());
        config.model = "gpt-4".to_string();
        assert!(!config.supports_json_mode());
    }

    #[test]
    fn test_config_validation() {
        assert!(LlmConfig::new("", "gpt-4o").validate().is_err());
        assert!(LlmConfig::new("sk-test", "gpt-4o").validate().is_ok());
    }
}
