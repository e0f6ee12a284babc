//! Conversation loop for one question: ask the model, run the tools it
//! requests, feed the results back, until it answers.
//!
//! AwaitingModel → Done when the model replies without tool calls, otherwise
//! AwaitingModel → ExecutingTools → AwaitingModel. The number of model turns
//! and the wall-clock time per question are both capped.

use crate::agent::{context, system_prompt};
use crate::config::TrialscopeConfig;
use crate::inference::{InferenceError, ModelClient};
use crate::tools::{self, ToolDefinition, ToolDispatcher, ToolError};
use crate::types::*;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Fatal outcomes for a question.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("no final answer after {limit} model turns")]
    TurnLimitExceeded { limit: u32 },

    #[error("model emitted a malformed tool call: {0}")]
    ModelToolCallMalformed(String),

    #[error(transparent)]
    Inference(InferenceError),

    #[error("question was cancelled")]
    Cancelled,

    #[error("question exceeded its {secs}s deadline")]
    DeadlineExceeded { secs: u64 },
}

impl From<InferenceError> for AgentError {
    fn from(e: InferenceError) -> Self {
        match e {
            InferenceError::MalformedToolCall(detail) => Self::ModelToolCallMalformed(detail),
            other => Self::Inference(other),
        }
    }
}

/// Limits and prompt for the loop.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_turns: u32,
    pub max_tool_calls_per_turn: u32,
    pub question_timeout: Duration,
    /// Replaces the default assistant role; the dated prompt is built per question.
    pub system_prompt: Option<String>,
}

impl AgentSettings {
    pub fn from_config(config: &TrialscopeConfig) -> Self {
        Self {
            max_turns: config.max_turns.max(1),
            max_tool_calls_per_turn: config.max_tool_calls_per_turn.max(1),
            question_timeout: config.question_timeout(),
            system_prompt: config.system_prompt.clone(),
        }
    }
}

/// Answers questions using a model client and the registry tools.
pub struct Agent {
    model: Arc<dyn ModelClient>,
    dispatcher: ToolDispatcher,
    tool_defs: Vec<ToolDefinition>,
    settings: AgentSettings,
}

impl Agent {
    pub fn new(
        model: Arc<dyn ModelClient>,
        dispatcher: ToolDispatcher,
        settings: AgentSettings,
    ) -> Self {
        Self {
            model,
            dispatcher,
            tool_defs: tools::tool_definitions(),
            settings,
        }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Answer one question. Dropping in-flight requests on cancellation or
    /// deadline releases their connections.
    pub async fn ask(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<Answer, AgentError> {
        let question_id = ulid::Ulid::new().to_string();
        let span = info_span!("question", id = %question_id);
        let deadline = self.settings.question_timeout;

        let run = tokio::time::timeout(deadline, self.run(question, question_id.clone()));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(parent: &span, "Question cancelled");
                Err(AgentError::Cancelled)
            }
            outcome = run.instrument(span.clone()) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    warn!(parent: &span, "Question exceeded {:?}", deadline);
                    Err(AgentError::DeadlineExceeded { secs: deadline.as_secs() })
                }
            },
        }
    }

    async fn run(&self, question: &str, question_id: String) -> Result<Answer, AgentError> {
        info!("Question: {}", question);

        let prompt = system_prompt::build_system_prompt(self.settings.system_prompt.as_deref());
        let mut messages = context::build_messages(&prompt, question);
        let mut turns: Vec<TurnRecord> = Vec::new();
        let mut state = LoopState::AwaitingModel;

        for turn_number in 1..=self.settings.max_turns {
            debug!("[Turn {}] {}", turn_number, state);
            let response = self.model.complete(&messages, &self.tool_defs).await?;

            if response.tool_calls.is_empty() {
                state = LoopState::Done;
                let text = response.content.unwrap_or_default();
                if text.is_empty() {
                    warn!("[Turn {}] Model returned an empty answer", turn_number);
                }
                info!("[Turn {}] Answer: {} chars", turn_number, text.len());

                turns.push(TurnRecord {
                    id: ulid::Ulid::new().to_string(),
                    turn_number,
                    tool_calls: Vec::new(),
                    tool_results: Vec::new(),
                    token_usage: response.usage,
                    next_state: state,
                    created_at: Utc::now(),
                });
                return Ok(Answer {
                    question_id,
                    text,
                    turns,
                });
            }

            state = LoopState::ExecutingTools;
            debug!("[Turn {}] {}", turn_number, state);
            let results = self.execute_tools(turn_number, &response.tool_calls).await;

            context::append_tool_turn(
                &mut messages,
                response.content,
                &response.tool_calls,
                &results,
            );

            state = LoopState::AwaitingModel;
            turns.push(TurnRecord {
                id: ulid::Ulid::new().to_string(),
                turn_number,
                tool_calls: response.tool_calls,
                tool_results: results,
                token_usage: response.usage,
                next_state: state,
                created_at: Utc::now(),
            });
        }

        warn!(
            "No final answer after {} turns, giving up",
            self.settings.max_turns
        );
        Err(AgentError::TurnLimitExceeded {
            limit: self.settings.max_turns,
        })
    }

    /// Run one turn's tool calls concurrently. Calls past the per-turn cap get
    /// an error result; results keep the model's call order.
    async fn execute_tools(&self, turn_number: u32, calls: &[ToolCall]) -> Vec<ToolResult> {
        let limit = self.settings.max_tool_calls_per_turn;
        let (run, skipped) = calls.split_at(calls.len().min(limit as usize));

        for tc in run {
            info!("[Turn {}] Tool: {}({})", turn_number, tc.name, tc.arguments);
        }

        let mut results = join_all(run.iter().map(|tc| self.dispatcher.dispatch(tc))).await;
        results.extend(
            skipped
                .iter()
                .map(|tc| ToolDispatcher::refuse(tc, ToolError::CallLimitExceeded { limit })),
        );

        for result in &results {
            if result.success {
                info!(
                    "[Turn {}] Tool result: {} ({} chars)",
                    turn_number,
                    result.name,
                    result.content.to_string().len()
                );
            } else {
                warn!(
                    "[Turn {}] Tool error: {} -> {}",
                    turn_number, result.name, result.content
                );
            }
        }

        results
    }
}
