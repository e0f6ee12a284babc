//! Language-model access.
//!
//! The conversation loop only sees the [`ModelClient`] capability, so it can
//! be driven by the HTTP client here or by a scripted model in tests.

pub mod client;

pub use client::InferenceClient;

use crate::tools::ToolDefinition;
use crate::types::{ChatMessage, InferenceResponse};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference request failed: {0}")]
    Transport(String),

    #[error("inference API rejected the credentials (HTTP {code})")]
    Unauthorized { code: u16 },

    #[error("inference failed (HTTP {code}): {body}")]
    Status { code: u16, body: String },

    #[error("model emitted a malformed tool call: {0}")]
    MalformedToolCall(String),

    #[error("failed to parse inference response: {0}")]
    Decode(String),
}

/// Capability to run one chat completion with tools available.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<InferenceResponse, InferenceError>;
}
