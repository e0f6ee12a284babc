//! Configuration schema for trialscope.toml.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialscopeConfig {
    /// ClinicalTrials.gov v2 API base URL.
    pub registry_url: String,

    /// OpenAI-compatible inference API base URL.
    pub inference_url: String,

    /// Inference API key. Overridden by `api_key_env` when that variable is set.
    pub api_key: String,

    /// Environment variable holding the inference API key.
    pub api_key_env: String,

    /// Model used for tool selection and the final answer.
    pub model: String,

    /// Maximum tokens per inference call.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f64,

    /// Maximum model round-trips per question.
    pub max_turns: u32,

    /// Maximum tool calls executed from a single model turn.
    pub max_tool_calls_per_turn: u32,

    /// Timeout applied to every outbound HTTP call.
    pub http_timeout_secs: u64,

    /// Wall-clock cap for answering one question.
    pub question_timeout_secs: u64,

    /// How often the CLI resubmits a question after a malformed tool call.
    pub resubmit_on_malformed: u32,

    /// Log level (debug, info, warn, error).
    pub log_level: String,

    /// Replaces the built-in system prompt when set.
    pub system_prompt: Option<String>,
}

impl Default for TrialscopeConfig {
    fn default() -> Self {
        Self {
            registry_url: "https://clinicaltrials.gov/api/v2".into(),
            inference_url: "https://api.groq.com/openai".into(),
            api_key: String::new(),
            api_key_env: "GROQ_API_KEY".into(),
            model: "llama-3.3-70b-versatile".into(),
            max_tokens: 4096,
            temperature: 0.7,
            max_turns: 5,
            max_tool_calls_per_turn: 8,
            http_timeout_secs: 30,
            question_timeout_secs: 120,
            resubmit_on_malformed: 1,
            log_level: "info".into(),
            system_prompt: None,
        }
    }
}

impl TrialscopeConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn question_timeout(&self) -> Duration {
        Duration::from_secs(self.question_timeout_secs)
    }

    /// Take the API key from the configured environment variable, if present.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Same as [`apply_env`](Self::apply_env) with an injectable lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(&self.api_key_env).filter(|k| !k.trim().is_empty()) {
            self.api_key = key.trim().to_string();
        }
    }
}
