//! Tool schemas exposed to the inference model.

use crate::trials::{OverallStatus, Phase};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const COUNT_TRIALS: &str = "count_trials";
pub const GET_ELIGIBILITY_CRITERIA: &str = "get_eligibility_criteria";
pub const GET_TRIAL_LOCATIONS: &str = "get_trial_locations";
pub const GET_TRIAL_PHASES: &str = "get_trial_phases";

/// Every tool name the dispatcher knows.
pub const TOOL_NAMES: [&str; 4] = [
    COUNT_TRIALS,
    GET_ELIGIBILITY_CRITERIA,
    GET_TRIAL_LOCATIONS,
    GET_TRIAL_PHASES,
];

/// Definition of a tool exposed to the inference model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Build the list of tool definitions exposed to the inference model.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let statuses: Vec<&str> = OverallStatus::ALL.iter().map(|s| s.as_str()).collect();
    let phases: Vec<&str> = Phase::ALL.iter().map(|p| p.as_str()).collect();

    vec![
        ToolDefinition {
            name: COUNT_TRIALS.into(),
            description: "Count the clinical trials registered for a medical condition with a \
                          given status. Use this when the user asks how many trials exist."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "condition": {
                        "type": "string",
                        "description": "The medical condition or disease (e.g. 'diabetes', 'ulcerative colitis')"
                    },
                    "status": {
                        "type": "string",
                        "enum": statuses,
                        "description": "Overall trial status",
                        "default": "RECRUITING"
                    }
                },
                "required": ["condition"]
            }),
        },
        ToolDefinition {
            name: GET_ELIGIBILITY_CRITERIA.into(),
            description: "Get eligibility criteria of recruiting trials for a condition. Use this \
                          for questions about inclusion/exclusion criteria or who can participate."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "condition": {
                        "type": "string",
                        "description": "The medical condition"
                    },
                    "max_trials": {
                        "type": "integer",
                        "description": "Maximum number of trials to return",
                        "minimum": 1,
                        "default": 5
                    }
                },
                "required": ["condition"]
            }),
        },
        ToolDefinition {
            name: GET_TRIAL_LOCATIONS.into(),
            description: "Get the facilities running trials for a condition, optionally limited \
                          to one country. Use this for questions about trial sites, hospitals or centers."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "condition": {
                        "type": "string",
                        "description": "The medical condition"
                    },
                    "country": {
                        "type": "string",
                        "description": "Country name to filter by (e.g. 'Spain', 'Germany')"
                    }
                },
                "required": ["condition"]
            }),
        },
        ToolDefinition {
            name: GET_TRIAL_PHASES.into(),
            description: "List trials for a condition in a specific phase, with start and \
                          completion dates. Use this for questions about Phase 1-4 trials or trial duration."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "condition": {
                        "type": "string",
                        "description": "The medical condition"
                    },
                    "phase": {
                        "type": "string",
                        "enum": phases,
                        "description": "The trial phase"
                    }
                },
                "required": ["condition", "phase"]
            }),
        },
    ]
}
