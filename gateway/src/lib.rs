//! LLM gateway with structured-output enforcement.
//!
//! Wraps an OpenAI-compatible chat-completions API behind the
//! [`ChatBackend`] seam. [`LlmClient::run_for_structured`] demands output
//! conforming to a declared JSON schema, retrying with a repair prompt and
//! exponential backoff; timeouts and 5xx responses are retried, 4xx are
//! not.

mod client;
mod error;

pub use client::{
    ChatBackend, ChatMessage, ChatRequest, LlmClient, LlmConfig, OpenAiBackend,
};
pub use error::GatewayError;
