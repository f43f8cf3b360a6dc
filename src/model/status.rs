/// Lifecycle status shared by clusters and node groups
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Operation currently driving an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
        }
    }
}

/// Progress of the current action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    InProgress,
    Complete,
    Failed,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::InProgress => "IN_PROGRESS",
            Phase::Complete => "COMPLETE",
            Phase::Failed => "FAILED",
        }
    }
}

/// Composite lifecycle status, persisted as `<ACTION>_<PHASE>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LifecycleStatus {
    pub action: Action,
    pub phase: Phase,
}

impl LifecycleStatus {
    pub const CREATE_IN_PROGRESS: Self = Self::new(Action::Create, Phase::InProgress);
    pub const CREATE_COMPLETE: Self = Self::new(Action::Create, Phase::Complete);
    pub const CREATE_FAILED: Self = Self::new(Action::Create, Phase::Failed);
    pub const UPDATE_IN_PROGRESS: Self = Self::new(Action::Update, Phase::InProgress);
    pub const UPDATE_COMPLETE: Self = Self::new(Action::Update, Phase::Complete);
    pub const UPDATE_FAILED: Self = Self::new(Action::Update, Phase::Failed);
    pub const DELETE_IN_PROGRESS: Self = Self::new(Action::Delete, Phase::InProgress);
    pub const DELETE_COMPLETE: Self = Self::new(Action::Delete, Phase::Complete);
    pub const DELETE_FAILED: Self = Self::new(Action::Delete, Phase::Failed);

    pub const fn new(action: Action, phase: Phase) -> Self {
        Self { action, phase }
    }

    /// Same action, different phase
    pub fn with_phase(self, phase: Phase) -> Self {
        Self { phase, ..self }
    }

    /// Whether the current action has finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        self.phase != Phase::InProgress
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.action.as_str(), self.phase.as_str())
    }
}

impl FromStr for LifecycleStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (action, phase) = s
            .split_once('_')
            .ok_or_else(|| Error::malformed("status", format!("'{}' has no action prefix", s)))?;

        let action = match action {
            "CREATE" => Action::Create,
            "UPDATE" => Action::Update,
            "DELETE" => Action::Delete,
            other => {
                return Err(Error::malformed(
                    "status",
                    format!("unknown action '{}' in '{}'", other, s),
                ))
            }
        };

        let phase = match phase {
            "IN_PROGRESS" => Phase::InProgress,
            "COMPLETE" => Phase::Complete,
            "FAILED" => Phase::Failed,
            other => {
                return Err(Error::malformed(
                    "status",
                    format!("unknown phase '{}' in '{}'", other, s),
                ))
            }
        };

        Ok(Self { action, phase })
    }
}

impl TryFrom<String> for LifecycleStatus {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LifecycleStatus> for String {
    fn from(status: LifecycleStatus) -> Self {
        status.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_string_form() {
        assert_eq!(
            LifecycleStatus::CREATE_IN_PROGRESS.to_string(),
            "CREATE_IN_PROGRESS"
        );
        assert_eq!(
            "UPDATE_FAILED".parse::<LifecycleStatus>().unwrap(),
            LifecycleStatus::UPDATE_FAILED
        );
        assert_eq!(
            "DELETE_COMPLETE".parse::<LifecycleStatus>().unwrap(),
            LifecycleStatus::DELETE_COMPLETE
        );
    }

    #[test]
    fn test_status_without_action_prefix_is_rejected() {
        let err = "COMPLETE".parse::<LifecycleStatus>().unwrap_err();
        assert!(matches!(err, Error::MalformedState { .. }));

        let err = "RESUME_COMPLETE".parse::<LifecycleStatus>().unwrap_err();
        assert!(err.to_string().contains("unknown action"));

        let err = "CREATE_PENDING".parse::<LifecycleStatus>().unwrap_err();
        assert!(err.to_string().contains("unknown phase"));
    }

    #[test]
    fn test_with_phase_keeps_action() {
        let status = LifecycleStatus::UPDATE_IN_PROGRESS.with_phase(Phase::Complete);
        assert_eq!(status, LifecycleStatus::UPDATE_COMPLETE);
        assert!(status.is_terminal());
        assert!(!LifecycleStatus::DELETE_IN_PROGRESS.is_terminal());
    }

    #[test]
    fn test_serde_uses_string_form() {
        let yaml = serde_yaml::to_string(&LifecycleStatus::DELETE_IN_PROGRESS).unwrap();
        assert_eq!(yaml.trim(), "DELETE_IN_PROGRESS");

        let parsed: Result<LifecycleStatus, _> = serde_yaml::from_str("IN_PROGRESS");
        assert!(parsed.is_err());
    }
}
