//! Chat completions with tool use over an OpenAI-compatible API.

use super::{InferenceError, ModelClient};
use crate::tools::ToolDefinition;
use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Inference client for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    http: reqwest::Client,
}

// -- OpenAI-compatible request/response types --------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<MessagePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolPayload<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct MessagePayload {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCallPayload>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct ToolPayload<'a> {
    r#type: &'a str,
    function: FunctionPayload<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionPayload<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
struct ToolCallPayload {
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: FunctionCallPayload,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Clone, Serialize)]
struct FunctionCallPayload {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    /// Kept raw; a bad call must not fail the whole body.
    #[serde(default)]
    tool_calls: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl InferenceClient {
    /// Create a new inference client.
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            http,
        })
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f64) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn message_payload(m: &ChatMessage) -> MessagePayload {
    let role = match m.role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    };

    let tool_calls = (!m.tool_calls.is_empty()).then(|| {
        m.tool_calls
            .iter()
            .map(|tc| ToolCallPayload {
                id: tc.id.clone(),
                r#type: function_type(),
                function: FunctionCallPayload {
                    name: tc.name.clone(),
                    arguments: tc.arguments.to_string(),
                },
            })
            .collect()
    });

    // Assistant turns that only carry tool calls send a null content.
    let content = if m.role == ChatRole::Assistant && m.content.is_empty() && tool_calls.is_some() {
        None
    } else {
        Some(m.content.clone())
    };

    MessagePayload {
        role,
        content,
        tool_calls,
        tool_call_id: m.tool_call_id.clone(),
        name: m.name.clone(),
    }
}

/// Map a non-success status to the matching error.
fn status_error(code: u16, body: String) -> InferenceError {
    match code {
        401 | 403 => InferenceError::Unauthorized { code },
        400 if body.contains("tool_use_failed") => InferenceError::MalformedToolCall(body),
        _ => InferenceError::Status { code, body },
    }
}

/// Parse a completion body into the model's answer or tool calls.
fn parse_response(body: &[u8]) -> Result<InferenceResponse, InferenceError> {
    let body: ChatResponse =
        serde_json::from_slice(body).map_err(|e| InferenceError::Decode(e.to_string()))?;

    let message = body
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .unwrap_or_default();

    let tool_calls = match message.tool_calls {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::Array(calls) => calls
            .iter()
            .map(parse_tool_call)
            .collect::<Result<Vec<_>, InferenceError>>()?,
        other => {
            return Err(InferenceError::MalformedToolCall(format!(
                "tool_calls is not an array: {other}"
            )))
        }
    };

    let usage = body
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        })
        .unwrap_or_default();

    Ok(InferenceResponse {
        content: message.content.filter(|c| !c.trim().is_empty()),
        tool_calls,
        usage,
    })
}

/// Read one entry of `message.tool_calls`. Arguments may arrive as a JSON
/// string, an object, or be absent.
fn parse_tool_call(raw: &serde_json::Value) -> Result<ToolCall, InferenceError> {
    let malformed = |what: &str| InferenceError::MalformedToolCall(format!("{what}: {raw}"));

    let id = raw
        .get("id")
        .and_then(serde_json::Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| malformed("tool call without an id"))?;
    let name = raw
        .pointer("/function/name")
        .and_then(serde_json::Value::as_str)
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| malformed("tool call without a function name"))?;

    let arguments = match raw.pointer("/function/arguments") {
        None | Some(serde_json::Value::Null) => serde_json::Value::Object(Default::default()),
        Some(serde_json::Value::String(text)) if text.trim().is_empty() => {
            serde_json::Value::Object(Default::default())
        }
        Some(serde_json::Value::String(text)) => {
            serde_json::from_str(text.trim()).map_err(|e| {
                InferenceError::MalformedToolCall(format!(
                    "arguments of `{}` are not valid JSON ({}): {}",
                    name, e, text
                ))
            })?
        }
        Some(object @ serde_json::Value::Object(_)) => object.clone(),
        Some(_) => return Err(malformed("tool call arguments are neither a string nor an object")),
    };

    Ok(ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    })
}

#[async_trait]
impl ModelClient for InferenceClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<InferenceResponse, InferenceError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let tool_payloads: Option<Vec<ToolPayload>> = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|t| ToolPayload {
                        r#type: "function",
                        function: FunctionPayload {
                            name: &t.name,
                            description: &t.description,
                            parameters: &t.parameters,
                        },
                    })
                    .collect(),
            )
        };

        let request = ChatRequest {
            model: &self.model,
            messages: messages.iter().map(message_payload).collect(),
            tool_choice: tool_payloads.as_ref().map(|_| "auto"),
            tools: tool_payloads,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!(
            "Inference request to model {} ({} messages)",
            self.model,
            messages.len()
        );

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|e| {
                debug!("Failed to read inference error body: {}", e);
                String::new()
            });
            return Err(status_error(status.as_u16(), body));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;
        parse_response(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_direct_answer() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "There are 343 trials."}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let resp = parse_response(body.to_string().as_bytes()).unwrap();
        assert_eq!(resp.content.as_deref(), Some("There are 343 trials."));
        assert!(resp.tool_calls.is_empty());
        assert_eq!(resp.usage.total_tokens, 15);
    }

    #[test]
    fn parses_tool_calls_with_string_arguments() {
        let body = json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "count_trials", "arguments": "{\"condition\":\"diabetes\"}"}
                }, {
                    "id": "call_2",
                    "type": "function",
                    "function": {"name": "get_trial_locations", "arguments": ""}
                }]
            }}]
        });
        let resp = parse_response(body.to_string().as_bytes()).unwrap();
        assert!(resp.content.is_none());
        assert_eq!(resp.tool_calls.len(), 2);
        assert_eq!(resp.tool_calls[0].name, "count_trials");
        assert_eq!(resp.tool_calls[0].arguments, json!({"condition": "diabetes"}));
        assert_eq!(resp.tool_calls[1].arguments, json!({}));
    }

    #[test]
    fn unparsable_arguments_are_malformed_tool_calls() {
        let body = json!({
            "choices": [{"message": {"tool_calls": [{
                "id": "call_1",
                "function": {"name": "count_trials", "arguments": "{condition: diabetes"}
            }]}}]
        });
        let err = parse_response(body.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, InferenceError::MalformedToolCall(_)));
    }

    #[test]
    fn structurally_broken_tool_calls_are_malformed() {
        let bodies = [
            json!({"choices": [{"message": {"tool_calls": [{
                "id": "call_1", "function": {"arguments": "{}"}
            }]}}]}),
            json!({"choices": [{"message": {"tool_calls": [{
                "function": {"name": "count_trials", "arguments": "{}"}
            }]}}]}),
            json!({"choices": [{"message": {"tool_calls": [{
                "id": "call_1", "function": {"name": "count_trials", "arguments": 42}
            }]}}]}),
            json!({"choices": [{"message": {"tool_calls": "count_trials"}}]}),
        ];
        for body in bodies {
            let err = parse_response(body.to_string().as_bytes()).unwrap_err();
            assert!(matches!(err, InferenceError::MalformedToolCall(_)), "{body}");
        }
    }

    #[test]
    fn accepts_object_arguments() {
        let body = json!({"choices": [{"message": {"tool_calls": [{
            "id": "call_1",
            "function": {"name": "get_trial_phases", "arguments": {"condition": "asthma", "phase": "PHASE3"}}
        }]}}]});
        let resp = parse_response(body.to_string().as_bytes()).unwrap();
        assert_eq!(resp.tool_calls[0].id, "call_1");
        assert_eq!(
            resp.tool_calls[0].arguments,
            json!({"condition": "asthma", "phase": "PHASE3"})
        );
    }

    #[test]
    fn garbage_body_is_a_decode_error() {
        let err = parse_response(b"<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, InferenceError::Decode(_)));
    }

    #[test]
    fn classifies_error_statuses() {
        assert!(matches!(
            status_error(401, String::new()),
            InferenceError::Unauthorized { code: 401 }
        ));
        assert!(matches!(
            status_error(400, r#"{"error":{"code":"tool_use_failed"}}"#.into()),
            InferenceError::MalformedToolCall(_)
        ));
        assert!(matches!(
            status_error(503, "busy".into()),
            InferenceError::Status { code: 503, .. }
        ));
    }

    #[test]
    fn echoes_tool_calls_and_results() {
        let call = ToolCall {
            id: "call_9".into(),
            name: "count_trials".into(),
            arguments: json!({"condition": "asthma"}),
        };
        let assistant = message_payload(&ChatMessage::assistant(None, vec![call]));
        let value = serde_json::to_value(&assistant).unwrap();
        assert_eq!(value["role"], "assistant");
        assert!(value["content"].is_null());
        assert_eq!(value["tool_calls"][0]["function"]["arguments"], r#"{"condition":"asthma"}"#);

        let result = ToolResult {
            tool_call_id: "call_9".into(),
            name: "count_trials".into(),
            content: json!({"count": 1}),
            success: true,
        };
        let tool = serde_json::to_value(message_payload(&ChatMessage::tool(&result))).unwrap();
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["tool_call_id"], "call_9");
        assert_eq!(tool["name"], "count_trials");
        assert_eq!(tool["content"], r#"{"count":1}"#);
    }
}
