//! Query values and registry enumerations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Overall recruitment status as the registry spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    NotYetRecruiting,
    Recruiting,
    EnrollingByInvitation,
    ActiveNotRecruiting,
    Suspended,
    Terminated,
    Completed,
    Withdrawn,
    Unknown,
}

impl OverallStatus {
    pub const ALL: [OverallStatus; 9] = [
        Self::NotYetRecruiting,
        Self::Recruiting,
        Self::EnrollingByInvitation,
        Self::ActiveNotRecruiting,
        Self::Suspended,
        Self::Terminated,
        Self::Completed,
        Self::Withdrawn,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotYetRecruiting => "NOT_YET_RECRUITING",
            Self::Recruiting => "RECRUITING",
            Self::EnrollingByInvitation => "ENROLLING_BY_INVITATION",
            Self::ActiveNotRecruiting => "ACTIVE_NOT_RECRUITING",
            Self::Suspended => "SUSPENDED",
            Self::Terminated => "TERMINATED",
            Self::Completed => "COMPLETED",
            Self::Withdrawn => "WITHDRAWN",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl Default for OverallStatus {
    fn default() -> Self {
        Self::Recruiting
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverallStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(())
    }
}

/// Trial phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Phase1,
    Phase2,
    Phase3,
    Phase4,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Self::Phase1, Self::Phase2, Self::Phase3, Self::Phase4];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phase1 => "PHASE1",
            Self::Phase2 => "PHASE2",
            Self::Phase3 => "PHASE3",
            Self::Phase4 => "PHASE4",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(())
    }
}

/// Sex eligible for enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sex {
    All,
    Male,
    Female,
}

impl FromStr for Sex {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALL" => Ok(Self::All),
            "MALE" => Ok(Self::Male),
            "FEMALE" => Ok(Self::Female),
            _ => Err(()),
        }
    }
}

/// A registry enum value, or the raw string when it is not one we know.
///
/// Serializes as the plain enum value, or as `{"unrecognized": "<raw>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recognized<T> {
    Known(T),
    Unrecognized { unrecognized: String },
}

impl<T: FromStr> Recognized<T> {
    pub fn from_raw(raw: &str) -> Self {
        match raw.parse::<T>() {
            Ok(value) => Self::Known(value),
            Err(_) => Self::Unrecognized {
                unrecognized: raw.to_string(),
            },
        }
    }
}

impl<T> Recognized<T> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Self::Known(value) => Some(value),
            Self::Unrecognized { .. } => None,
        }
    }
}

/// Search parameters for one registry request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrialQuery {
    pub condition: String,
    pub status: Option<OverallStatus>,
    pub country: Option<String>,
    pub phase: Option<Phase>,
    pub max_trials: Option<u32>,
}

impl TrialQuery {
    pub fn new(condition: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: OverallStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_max_trials(mut self, max_trials: u32) -> Self {
        self.max_trials = Some(max_trials);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(
            "recruiting".parse::<OverallStatus>(),
            Ok(OverallStatus::Recruiting)
        );
        assert_eq!(
            " ACTIVE_NOT_RECRUITING ".parse::<OverallStatus>(),
            Ok(OverallStatus::ActiveNotRecruiting)
        );
        assert!("OPEN".parse::<OverallStatus>().is_err());
    }

    #[test]
    fn recognized_phase_serializes_plainly() {
        let phase: Recognized<Phase> = Recognized::from_raw("PHASE3");
        assert_eq!(phase, Recognized::Known(Phase::Phase3));
        assert_eq!(serde_json::to_value(&phase).unwrap(), json!("PHASE3"));
    }

    #[test]
    fn unrecognized_values_are_tagged_not_dropped() {
        let phase: Recognized<Phase> = Recognized::from_raw("EARLY_PHASE1");
        assert!(phase.known().is_none());
        assert_eq!(
            serde_json::to_value(&phase).unwrap(),
            json!({"unrecognized": "EARLY_PHASE1"})
        );

        let sex: Recognized<Sex> = Recognized::from_raw("OTHER");
        assert_eq!(
            serde_json::to_value(&sex).unwrap(),
            json!({"unrecognized": "OTHER"})
        );
    }
}
