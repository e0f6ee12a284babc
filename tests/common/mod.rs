#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use trialscope::inference::{InferenceError, ModelClient};
use trialscope::tools::ToolDefinition;
use trialscope::trials::{ClientError, SearchPage, TrialQuery, TrialsApi};
use trialscope::types::{ChatMessage, InferenceResponse, TokenUsage, ToolCall};

/// A registry request as seen by the stub.
#[derive(Debug, Clone)]
pub struct RecordedSearch {
    pub query: TrialQuery,
    pub fields: Vec<String>,
    pub page_size: u32,
}

/// Registry stub returning a fixed page (or error) for every search.
pub struct StubApi {
    response: Box<dyn Fn() -> Result<SearchPage, ClientError> + Send + Sync>,
    calls: Mutex<Vec<RecordedSearch>>,
    hang: bool,
    abandoned: Arc<AtomicBool>,
}

impl StubApi {
    pub fn page(page: SearchPage) -> Arc<Self> {
        Self::build(Box::new(move || Ok(page.clone())), false)
    }

    pub fn failing(make: fn() -> ClientError) -> Arc<Self> {
        Self::build(Box::new(move || Err(make())), false)
    }

    /// Never answers. Records whether an in-flight search was dropped.
    pub fn hanging() -> Arc<Self> {
        Self::build(Box::new(|| Ok(page(Vec::new(), None))), true)
    }

    fn build(
        response: Box<dyn Fn() -> Result<SearchPage, ClientError> + Send + Sync>,
        hang: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            response,
            calls: Mutex::new(Vec::new()),
            hang,
            abandoned: Arc::new(AtomicBool::new(false)),
        })
    }

    pub async fn calls(&self) -> Vec<RecordedSearch> {
        self.calls.lock().await.clone()
    }

    /// Whether a pending search future was dropped before completing.
    pub fn abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }
}

/// Sets its flag when dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TrialsApi for StubApi {
    async fn search(
        &self,
        query: &TrialQuery,
        fields: &[&str],
        page_size: u32,
    ) -> Result<SearchPage, ClientError> {
        self.calls.lock().await.push(RecordedSearch {
            query: query.clone(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            page_size,
        });
        if self.hang {
            let _flag = DropFlag(self.abandoned.clone());
            std::future::pending::<()>().await;
        }
        (self.response)()
    }
}

/// Model that replays scripted responses and records what it was sent.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<InferenceResponse, InferenceError>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    repeat_last: bool,
    served: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<InferenceResponse, InferenceError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            repeat_last: false,
            served: AtomicUsize::new(0),
        })
    }

    /// Keeps returning the same tool-call response forever.
    pub fn looping(calls: Vec<ToolCall>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::from([Ok(tool_calls(calls))])),
            requests: Mutex::new(Vec::new()),
            repeat_last: true,
            served: AtomicUsize::new(0),
        })
    }

    pub async fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().await.clone()
    }

    pub fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<InferenceResponse, InferenceError> {
        self.requests.lock().await.push(messages.to_vec());
        self.served.fetch_add(1, Ordering::SeqCst);

        let mut responses = self.responses.lock().await;
        if self.repeat_last {
            if let Some(Ok(resp)) = responses.front() {
                return Ok(resp.clone());
            }
        }
        responses
            .pop_front()
            .unwrap_or_else(|| Ok(answer("script exhausted")))
    }
}

pub fn answer(text: &str) -> InferenceResponse {
    InferenceResponse {
        content: Some(text.to_string()),
        tool_calls: Vec::new(),
        usage: TokenUsage::default(),
    }
}

pub fn tool_calls(calls: Vec<ToolCall>) -> InferenceResponse {
    InferenceResponse {
        content: None,
        tool_calls: calls,
        usage: TokenUsage::default(),
    }
}

pub fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

pub fn study(nct_id: &str, title: &str) -> Value {
    json!({
        "protocolSection": {
            "identificationModule": {"nctId": nct_id, "briefTitle": title}
        }
    })
}

pub fn page(studies: Vec<Value>, total_count: Option<u64>) -> SearchPage {
    SearchPage {
        studies,
        total_count,
        next_page_token: None,
    }
}
