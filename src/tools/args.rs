//! Typed tool arguments.
//!
//! Every tool has its own argument struct; unknown fields are rejected and
//! enum-valued fields are matched case-insensitively.

use super::definitions::{
    COUNT_TRIALS, GET_ELIGIBILITY_CRITERIA, GET_TRIAL_LOCATIONS, GET_TRIAL_PHASES, TOOL_NAMES,
};
use super::ToolError;
use crate::trials::{OverallStatus, Phase, TrialQuery};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt::Display;
use std::str::FromStr;

pub const DEFAULT_MAX_TRIALS: u32 = 5;

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse::<T>()
        .map_err(|_| D::Error::custom(format!("unknown variant `{raw}`")))
}

fn lenient_opt<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| D::Error::custom(format!("unknown variant `{raw}`")))
        })
        .transpose()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CountTrialsArgs {
    pub condition: String,
    #[serde(default, deserialize_with = "lenient_opt")]
    pub status: Option<OverallStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EligibilityArgs {
    pub condition: String,
    #[serde(default, alias = "maxTrials")]
    pub max_trials: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationsArgs {
    pub condition: String,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhasesArgs {
    pub condition: String,
    #[serde(deserialize_with = "lenient")]
    pub phase: Phase,
}

/// A validated tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    CountTrials(CountTrialsArgs),
    GetEligibilityCriteria(EligibilityArgs),
    GetTrialLocations(LocationsArgs),
    GetTrialPhases(PhasesArgs),
}

fn decode<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| invalid(tool, e))
}

fn invalid(tool: &str, reason: impl Display) -> ToolError {
    ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: reason.to_string(),
    }
}

impl ToolInvocation {
    /// Resolve a tool name and check its arguments against the tool's schema.
    pub fn parse(name: &str, arguments: &Value) -> Result<Self, ToolError> {
        if !TOOL_NAMES.contains(&name) {
            return Err(ToolError::UnknownTool(name.to_string()));
        }

        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            Value::Object(_) => arguments.clone(),
            other => return Err(invalid(name, format!("expected an object, got {other}"))),
        };

        let invocation = match name {
            COUNT_TRIALS => Self::CountTrials(decode(name, arguments)?),
            GET_ELIGIBILITY_CRITERIA => Self::GetEligibilityCriteria(decode(name, arguments)?),
            GET_TRIAL_LOCATIONS => Self::GetTrialLocations(decode(name, arguments)?),
            GET_TRIAL_PHASES => Self::GetTrialPhases(decode(name, arguments)?),
            _ => return Err(ToolError::UnknownTool(name.to_string())),
        };

        invocation.validate()?;
        Ok(invocation)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CountTrials(_) => COUNT_TRIALS,
            Self::GetEligibilityCriteria(_) => GET_ELIGIBILITY_CRITERIA,
            Self::GetTrialLocations(_) => GET_TRIAL_LOCATIONS,
            Self::GetTrialPhases(_) => GET_TRIAL_PHASES,
        }
    }

    fn condition(&self) -> &str {
        match self {
            Self::CountTrials(a) => &a.condition,
            Self::GetEligibilityCriteria(a) => &a.condition,
            Self::GetTrialLocations(a) => &a.condition,
            Self::GetTrialPhases(a) => &a.condition,
        }
    }

    fn validate(&self) -> Result<(), ToolError> {
        if self.condition().trim().is_empty() {
            return Err(invalid(self.name(), "`condition` must not be empty"));
        }
        if let Self::GetEligibilityCriteria(EligibilityArgs {
            max_trials: Some(0),
            ..
        }) = self
        {
            return Err(invalid(self.name(), "`max_trials` must be at least 1"));
        }
        Ok(())
    }

    /// The registry query this invocation issues.
    pub fn query(&self) -> TrialQuery {
        let query = TrialQuery::new(self.condition().trim());
        match self {
            Self::CountTrials(a) => query.with_status(a.status.unwrap_or_default()),
            Self::GetEligibilityCriteria(a) => query
                .with_status(OverallStatus::Recruiting)
                .with_max_trials(a.max_trials.unwrap_or(DEFAULT_MAX_TRIALS)),
            Self::GetTrialLocations(a) => match a.country.as_deref().map(str::trim) {
                Some(country) if !country.is_empty() => query.with_country(country),
                _ => query,
            },
            Self::GetTrialPhases(a) => query.with_phase(a.phase),
        }
    }
}
