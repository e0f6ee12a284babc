//! ClinicalTrials.gov v2 API client for the study-search endpoint.

use super::query::TrialQuery;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Projection requested when the caller does not name one.
pub const DEFAULT_FIELDS: &[&str] = &[
    "NCTId",
    "BriefTitle",
    "Condition",
    "Phase",
    "BriefSummary",
    "LocationFacility",
    "LocationCity",
    "LocationCountry",
    "EligibilityCriteria",
];

/// Largest page the registry serves.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Upper bound on how much of an error body is kept.
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("registry returned HTTP {code}: {body}")]
    ApiStatus { code: u16, body: String },

    #[error("malformed registry response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "NetworkFailure",
            Self::ApiStatus { .. } => "ApiStatusFailure",
            Self::Decode(_) => "DecodeFailure",
        }
    }
}

/// One page of raw search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub studies: Vec<Value>,
    pub total_count: Option<u64>,
    pub next_page_token: Option<String>,
}

impl SearchPage {
    /// Decode a response body. A body that is not a JSON object, or whose
    /// `studies` member is not an array, is a decode failure.
    pub fn from_body(body: &[u8]) -> Result<Self, ClientError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| ClientError::Decode(e.to_string()))?;

        let Value::Object(mut map) = value else {
            return Err(ClientError::Decode("expected a JSON object".into()));
        };

        let studies = match map.remove("studies") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(studies)) => studies,
            Some(_) => return Err(ClientError::Decode("`studies` is not an array".into())),
        };

        Ok(Self {
            studies,
            total_count: map.get("totalCount").and_then(Value::as_u64),
            next_page_token: map
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    /// Total matching studies: the registry's count, else what this page holds.
    pub fn count(&self) -> u64 {
        self.total_count.unwrap_or(self.studies.len() as u64)
    }
}

/// Capability to search the registry. Implemented over HTTP by
/// [`TrialsClient`] and by stubs in tests.
#[async_trait]
pub trait TrialsApi: Send + Sync {
    /// Fetch a single page of studies matching `query`, projected to `fields`.
    async fn search(
        &self,
        query: &TrialQuery,
        fields: &[&str],
        page_size: u32,
    ) -> Result<SearchPage, ClientError>;
}

/// HTTP client for the registry.
#[derive(Debug, Clone)]
pub struct TrialsClient {
    base_url: String,
    http: reqwest::Client,
}

impl TrialsClient {
    /// Create a new registry client with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn studies_url(&self) -> String {
        format!("{}/studies", self.base_url)
    }
}

/// Build the query string for a search request.
pub fn query_params(query: &TrialQuery, fields: &[&str], page_size: u32) -> Vec<(&'static str, String)> {
    let fields = if fields.is_empty() { DEFAULT_FIELDS } else { fields };

    let mut params = vec![
        ("format", "json".to_string()),
        ("countTotal", "true".to_string()),
        ("pageSize", page_size.clamp(1, MAX_PAGE_SIZE).to_string()),
        ("query.cond", query.condition.clone()),
    ];
    if let Some(status) = query.status {
        params.push(("filter.overallStatus", status.to_string()));
    }
    if let Some(phase) = query.phase {
        params.push(("query.term", phase.to_string()));
    }
    if let Some(country) = query.country.as_deref().filter(|c| !c.trim().is_empty()) {
        params.push(("query.locn", country.trim().to_string()));
    }
    params.push(("fields", fields.join(",")));
    params
}

#[async_trait]
impl TrialsApi for TrialsClient {
    async fn search(
        &self,
        query: &TrialQuery,
        fields: &[&str],
        page_size: u32,
    ) -> Result<SearchPage, ClientError> {
        let params = query_params(query, fields, page_size);
        debug!("Registry search: {:?}", params);

        let resp = self
            .http
            .get(self.studies_url())
            .query(&params)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_else(|e| {
                debug!("Failed to read registry error body: {}", e);
                String::new()
            });
            if body.len() > ERROR_BODY_LIMIT {
                let cut = (0..=ERROR_BODY_LIMIT)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(ClientError::ApiStatus {
                code: status.as_u16(),
                body,
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let page = SearchPage::from_body(&bytes)?;
        debug!(
            "Registry returned {} studies (total {:?})",
            page.studies.len(),
            page.total_count
        );
        Ok(page)
    }
}
