pub mod args;
pub mod definitions;

pub use args::ToolInvocation;
pub use definitions::{tool_definitions, ToolDefinition, TOOL_NAMES};

use crate::trials::normalize::{self, LocationSummary};
use crate::trials::{ClientError, OverallStatus, Phase, Recognized, Sex, TrialsApi};
use crate::types::{ToolCall, ToolResult};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Registry projections and page sizes per tool.
const COUNT_FIELDS: &[&str] = &["NCTId", "BriefTitle"];
const COUNT_PAGE_SIZE: u32 = 1000;
const ELIGIBILITY_FIELDS: &[&str] = &[
    "NCTId",
    "BriefTitle",
    "EligibilityCriteria",
    "Sex",
    "MinimumAge",
    "MaximumAge",
];
const LOCATION_FIELDS: &[&str] = &[
    "NCTId",
    "BriefTitle",
    "LocationFacility",
    "LocationCity",
    "LocationCountry",
];
const LOCATION_PAGE_SIZE: u32 = 50;
const PHASE_FIELDS: &[&str] = &["NCTId", "BriefTitle", "Phase", "StartDate", "CompletionDate"];
const PHASE_PAGE_SIZE: u32 = 100;

/// Number of sample titles returned by `count_trials`.
const SAMPLE_TITLES: usize = 3;

/// Why a tool call produced an error result instead of data.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),

    #[error("invalid arguments for `{tool}`: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("at most {limit} tool calls are executed per turn")]
    CallLimitExceeded { limit: u32 },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("failed to encode tool output: {0}")]
    Encode(String),
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "UnknownTool",
            Self::InvalidArguments { .. } => "InvalidArguments",
            Self::CallLimitExceeded { .. } => "CallLimitExceeded",
            Self::Client(e) => e.kind(),
            Self::Encode(_) => "EncodeFailure",
        }
    }

    /// Structured error descriptor handed back to the model.
    pub fn to_content(&self) -> Value {
        let mut error = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        match self {
            Self::UnknownTool(_) => {
                error["availableTools"] = json!(TOOL_NAMES);
            }
            Self::Client(ClientError::ApiStatus { code, .. }) => {
                error["httpCode"] = json!(code);
            }
            _ => {}
        }
        json!({ "error": error })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialCount {
    pub count: u64,
    pub condition: String,
    pub status: OverallStatus,
    pub sample_titles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityEntry {
    pub nct_id: String,
    pub title: String,
    pub criteria_text: Option<String>,
    pub sex: Option<Recognized<Sex>>,
    pub min_age: Option<String>,
    pub max_age: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseEntry {
    pub nct_id: String,
    pub title: String,
    pub phases: Vec<Recognized<Phase>>,
    pub start_date: Option<String>,
    pub completion_date: Option<String>,
}

/// Maps model tool calls onto registry queries.
#[derive(Clone)]
pub struct ToolDispatcher {
    api: Arc<dyn TrialsApi>,
}

impl ToolDispatcher {
    pub fn new(api: Arc<dyn TrialsApi>) -> Self {
        Self { api }
    }

    /// Validate and run one tool call. Failures of any kind come back as an
    /// error result rather than an `Err`.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let outcome = match ToolInvocation::parse(&call.name, &call.arguments) {
            Ok(invocation) => self.execute(&invocation).await,
            Err(e) => Err(e),
        };
        to_result(call, outcome)
    }

    /// Error result for a call that is not executed.
    pub fn refuse(call: &ToolCall, error: ToolError) -> ToolResult {
        to_result(call, Err(error))
    }

    /// Run an already-validated invocation.
    pub async fn execute(&self, invocation: &ToolInvocation) -> Result<Value, ToolError> {
        let query = invocation.query();
        match invocation {
            ToolInvocation::CountTrials(_) => {
                let page = self.api.search(&query, COUNT_FIELDS, COUNT_PAGE_SIZE).await?;
                encode(TrialCount {
                    count: page.count(),
                    condition: query.condition.clone(),
                    status: query.status.unwrap_or_default(),
                    sample_titles: normalize::normalize_all(&page.studies)
                        .into_iter()
                        .take(SAMPLE_TITLES)
                        .map(|r| r.brief_title)
                        .collect(),
                })
            }
            ToolInvocation::GetEligibilityCriteria(_) => {
                let page_size = query.max_trials.unwrap_or(args::DEFAULT_MAX_TRIALS);
                let page = self.api.search(&query, ELIGIBILITY_FIELDS, page_size).await?;
                let entries: Vec<EligibilityEntry> = normalize::normalize_all(&page.studies)
                    .into_iter()
                    .take(page_size as usize)
                    .map(|r| EligibilityEntry {
                        nct_id: r.nct_id,
                        title: r.brief_title,
                        criteria_text: r.eligibility_criteria,
                        sex: r.sex,
                        min_age: r.min_age,
                        max_age: r.max_age,
                    })
                    .collect();
                encode(entries)
            }
            ToolInvocation::GetTrialLocations(_) => {
                let page = self.api.search(&query, LOCATION_FIELDS, LOCATION_PAGE_SIZE).await?;
                let records = normalize::normalize_all(&page.studies);
                let summary = match query.country.as_deref() {
                    Some(country) => normalize::summarize(normalize::dedup_locations(
                        records
                            .iter()
                            .flat_map(|r| r.locations.iter())
                            .filter(|loc| loc.in_country(country)),
                    )),
                    None => normalize::unique_locations(&records),
                };
                encode::<LocationSummary>(summary)
            }
            ToolInvocation::GetTrialPhases(_) => {
                let page = self.api.search(&query, PHASE_FIELDS, PHASE_PAGE_SIZE).await?;
                let entries: Vec<PhaseEntry> = normalize::normalize_all(&page.studies)
                    .into_iter()
                    .map(|r| PhaseEntry {
                        nct_id: r.nct_id,
                        title: r.brief_title,
                        phases: r.phases,
                        start_date: r.start_date,
                        completion_date: r.completion_date,
                    })
                    .collect();
                encode(entries)
            }
        }
    }
}

fn encode<T: Serialize>(value: T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Encode(e.to_string()))
}

fn to_result(call: &ToolCall, outcome: Result<Value, ToolError>) -> ToolResult {
    match outcome {
        Ok(content) => {
            debug!("Tool {} succeeded", call.name);
            ToolResult {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                content,
                success: true,
            }
        }
        Err(e) => {
            debug!("Tool {} failed: {}", call.name, e);
            ToolResult {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                content: e.to_content(),
                success: false,
            }
        }
    }
}
